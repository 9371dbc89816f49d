// Keyboard teleop over UDP: Up/Down speed, Left/Right turn, Space go, Backspace reset, Q quit
//
// Usage: cargo run --example drive_teleop -- [host:port]
// Example: cargo run --example drive_teleop -- 192.168.3.2:3322
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use pwm_motor_runtime::command::Command;
use pwm_motor_runtime::config::{TELEOP_PERIOD, UDP_PORT};
use pwm_motor_runtime::motor::{MAX_SPEED, mixing::TURN_LIMIT_DEG, skid_steer};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::info;

const FORWARD_STEP: f64 = 100.0;
const TURN_STEP_DEG: f64 = 5.0;

#[derive(Debug, Default)]
struct Teleop {
    go: bool,
    forward: f64,
    turn: f64,
}

impl Teleop {
    /// Returns false when the user asked to quit
    fn on_key(&mut self, code: KeyCode) -> bool {
        let max = MAX_SPEED as f64;
        match code {
            KeyCode::Up => self.forward = (self.forward + FORWARD_STEP).min(max),
            KeyCode::Down => self.forward = (self.forward - FORWARD_STEP).max(-max),
            KeyCode::Left => self.turn = (self.turn - TURN_STEP_DEG).max(-TURN_LIMIT_DEG),
            KeyCode::Right => self.turn = (self.turn + TURN_STEP_DEG).min(TURN_LIMIT_DEG),
            KeyCode::Char(' ') => {
                self.go = !self.go;
                info!("Go: {}", self.go);
            }
            // Reset everything to the defaults
            KeyCode::Backspace => *self = Self::default(),
            KeyCode::Char('q') | KeyCode::Esc => return false,
            _ => {}
        }
        true
    }

    fn command(&self) -> Command {
        if self.go {
            Command::SetAll(skid_steer(self.forward, self.turn))
        } else {
            Command::ReleaseAll
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let target = std::env::args()
        .nth(1)
        .unwrap_or_else(|| format!("127.0.0.1:{}", UDP_PORT));

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(target.as_str()).await?;
    info!("Sending commands to udp://{}", target);
    info!("Controls: Up/Down=speed, Left/Right=turn, Space=go, Backspace=reset, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&socket).await;
    disable_raw_mode()?;

    // Leave the motors floating on the way out
    socket.send(b"\n").await?;
    result
}

async fn run_teleop(socket: &UdpSocket) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut teleop = Teleop::default();
    let mut last_sent = Instant::now() - TELEOP_PERIOD;

    loop {
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                if pressed && !teleop.on_key(code) {
                    break;
                }
            }
        }

        if last_sent.elapsed() >= TELEOP_PERIOD {
            let line = format!("{}\n", teleop.command());
            socket.send(line.as_bytes()).await?;
            last_sent = Instant::now();
        }
    }

    Ok(())
}
