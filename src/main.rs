use std::net::SocketAddr;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pwm_motor_runtime::config::{DEVICE_ADDRESS, I2C_BUS_PATH, UDP_BIND};
use pwm_motor_runtime::motor::{self, JsonBus, MotorDriver, RegisterBus};
use pwm_motor_runtime::runtime::{self, Runtime, RuntimeError};

/// Drive four DC motors through a PCA9685 from text commands
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// I2C character device the PWM chip is on
    #[arg(long, default_value = I2C_BUS_PATH)]
    i2c: String,

    /// Read commands from UDP datagrams instead of stdin
    #[arg(long, value_name = "ADDR", num_args = 0..=1, default_missing_value = UDP_BIND)]
    udp: Option<SocketAddr>,

    /// Print register writes as JSON lines instead of touching the bus
    #[arg(long)]
    dry_run: bool,
}

async fn serve<B: RegisterBus>(bus: B, args: &Args) -> Result<(), RuntimeError> {
    let driver = MotorDriver::initialize(bus, DEVICE_ADDRESS)?;
    let mut runtime = Runtime::new(driver);

    match args.udp {
        Some(bind) => runtime::run_udp(&mut runtime, bind).await,
        None => {
            info!("Reading commands from stdin");
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            runtime::run_lines(&mut runtime, stdin).await
        }
    }
}

#[tokio::main]
async fn main() {
    // Setup logging on stderr (set RUST_LOG=info or debug); stdout carries --dry-run output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let result = if args.dry_run {
        info!("Dry run: register writes go to stdout");
        serve(JsonBus::stdout(), &args).await
    } else {
        info!("Opening I2C bus {}", args.i2c);
        match motor::open_i2c(&args.i2c) {
            Ok(bus) => serve(bus, &args).await,
            Err(e) => Err(e.into()),
        }
    };

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }

    // After Ctrl+C the stdin reader thread is still blocked; don't wait for it
    std::process::exit(0);
}
