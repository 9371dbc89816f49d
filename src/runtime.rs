// Command loop: one line at a time, straight to the motor driver
// End of input or Ctrl+C floats every motor before returning

use std::net::SocketAddr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::config::UDP_RETRY_DELAY;
use crate::motor::{BusError, MotorDriver, MotorError, RegisterBus};

/// Error types for the command loop
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Runtime<B> {
    driver: MotorDriver<B>,
}

impl<B: RegisterBus> Runtime<B> {
    pub fn new(driver: MotorDriver<B>) -> Self {
        Self { driver }
    }

    /// Process one input line
    ///
    /// Malformed lines and out-of-range values are logged and skipped.
    /// Only bus failures are returned.
    pub fn handle_line(&mut self, line: &str) -> Result<(), BusError> {
        let cmd = match line.parse::<Command>() {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Ignoring line {:?}: {}", line, e);
                return Ok(());
            }
        };
        debug!("Command: {:?}", cmd);

        for (motor, velocity) in cmd.targets() {
            match self.driver.command(motor, velocity) {
                Ok(_) => {}
                Err(MotorError::Bus(e)) => return Err(e),
                Err(e) => warn!("Ignoring command for motor {} in {:?}: {}", motor, line, e),
            }
        }
        Ok(())
    }

    /// Float every motor; runs on every exit path
    pub fn shutdown(&mut self) -> Result<(), BusError> {
        info!("Releasing all motors");
        self.driver.release_all()
    }

    pub fn into_driver(self) -> MotorDriver<B> {
        self.driver
    }

    /// Handle a line, and on a bus fault still try to release everything
    fn handle_or_release(&mut self, line: &str) -> Result<(), RuntimeError> {
        if let Err(e) = self.handle_line(line) {
            error!("Bus failure, stopping: {}", e);
            self.release_after_failure();
            return Err(e.into());
        }
        Ok(())
    }

    /// Best-effort release on the way out of a failure; the original
    /// error is the one that gets reported
    fn release_after_failure(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("Release after failure also failed: {}", e);
        }
    }
}

/// Read command lines until end of stream or Ctrl+C
///
/// A line that is not valid UTF-8 is logged and skipped like any other
/// malformed line.
pub async fn run_lines<B, R>(runtime: &mut Runtime<B>, mut reader: R) -> Result<(), RuntimeError>
where
    B: RegisterBus,
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => {
                    info!("End of input");
                    break;
                }
                Ok(_) => {
                    let raw = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
                    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                    match std::str::from_utf8(raw) {
                        Ok(line) => runtime.handle_or_release(line)?,
                        Err(e) => warn!("Ignoring line that is not UTF-8 ({:02X?}): {}", raw, e),
                    }
                    buf.clear();
                }
                Err(e) => {
                    runtime.release_after_failure();
                    return Err(e.into());
                }
            },
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    runtime.shutdown()?;
    Ok(())
}

/// Read command lines from UDP datagrams until Ctrl+C
///
/// A datagram may hold several lines; a bare "\n" releases all motors.
pub async fn run_udp<B: RegisterBus>(
    runtime: &mut Runtime<B>,
    bind: SocketAddr,
) -> Result<(), RuntimeError> {
    let socket = match UdpSocket::bind(bind).await {
        Ok(socket) => socket,
        Err(e) => {
            runtime.release_after_failure();
            return Err(e.into());
        }
    };
    info!("Listening for commands on udp://{}", bind);

    let mut buf = [0u8; 1024];
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("Failed to receive datagram: {}", e);
                        tokio::time::sleep(UDP_RETRY_DELAY).await;
                        continue;
                    }
                };
                let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                    warn!("Dropping non-UTF-8 datagram from {}", peer);
                    continue;
                };
                for line in text.lines() {
                    runtime.handle_or_release(line)?;
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    runtime.shutdown()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::pca9685;

    #[derive(Default)]
    struct RecordingBus {
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl RegisterBus for RecordingBus {
        fn write_block(&mut self, _address: u8, register: u8, bytes: &[u8]) -> pca9685::Result<()> {
            self.writes.push((register, bytes.to_vec()));
            Ok(())
        }
    }

    fn runtime() -> Runtime<RecordingBus> {
        let driver = MotorDriver::initialize(RecordingBus::default(), 0x40).unwrap();
        Runtime::new(driver)
    }

    fn motor_writes(runtime: Runtime<RecordingBus>) -> Vec<u8> {
        let writes = runtime.into_driver().into_bus().writes;
        // Skip MODE1/MODE2
        writes[2..].iter().map(|(register, _)| *register).collect()
    }

    #[test]
    fn test_set_all_in_index_order() {
        let mut rt = runtime();
        rt.handle_line("1 2 3 4").unwrap();
        assert_eq!(motor_writes(rt), vec![0x06, 0x16, 0x26, 0x36]);
    }

    #[test]
    fn test_rejected_sub_command_does_not_stop_the_rest() {
        let mut rt = runtime();
        rt.handle_line("1 5000 3 4").unwrap();
        assert_eq!(motor_writes(rt), vec![0x06, 0x26, 0x36]);
    }

    #[test]
    fn test_parse_errors_write_nothing() {
        let mut rt = runtime();
        for line in ["1 2 3", "a b c d", "x", "1 2 3 4 5"] {
            rt.handle_line(line).unwrap();
        }
        assert!(motor_writes(rt).is_empty());
    }

    #[tokio::test]
    async fn test_crlf_and_bad_utf8_lines() {
        let mut rt = runtime();
        run_lines(&mut rt, &b"1 10\r\n\xff\xfe 100\n2 1000"[..])
            .await
            .unwrap();
        assert_eq!(motor_writes(rt), vec![0x16, 0x26, 0x06, 0x16, 0x26, 0x36]);
    }

    #[tokio::test]
    async fn test_end_of_input_releases_all() {
        let mut rt = runtime();
        run_lines(&mut rt, &b"0 100\n"[..]).await.unwrap();
        assert_eq!(motor_writes(rt), vec![0x06, 0x06, 0x16, 0x26, 0x36]);
    }
}
