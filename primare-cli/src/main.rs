//! Primare amplifier control
//!
//! Runs one client operation per invocation (`primare volume_set 40`) or an
//! interactive shell (`primare interactive`) against an amplifier on a
//! serial port.

mod error;
mod operations;
mod ports;
mod repl;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use primare_control::{Amplifier, ConnectionConfig, DeviceModel};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use operations::Value;

const BAUD_RATES: [u32; 9] = [300, 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

const DEFAULT_FILTER: &str =
    "primare=info,primare_protocol=info,primare_control=info,primare_sim=info";
const DEBUG_FILTER: &str =
    "primare=debug,primare_protocol=debug,primare_control=debug,primare_sim=debug";

#[derive(Parser)]
#[command(name = "primare", version, about = "Control a Primare amplifier over RS232")]
struct Cli {
    /// Serial port the amplifier is connected to [default: /dev/ttyUSB0]
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate [default: 4800]
    #[arg(long, value_parser = parse_baud_rate)]
    baudrate: Option<u32>,

    /// Amplifier model
    #[arg(long, value_enum)]
    model: Option<ModelArg>,

    /// JSON connection config; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Power on, initialize and print device info before the command
    #[arg(long)]
    amp_info: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,
    /// List every operation
    Operations,
    /// Read operations from stdin, one per line
    Interactive,
    /// Any operation name followed by an optional value
    #[command(external_subcommand)]
    Operation(Vec<String>),
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    I22,
    I32,
}

impl From<ModelArg> for DeviceModel {
    fn from(model: ModelArg) -> Self {
        match model {
            ModelArg::I22 => DeviceModel::I22,
            ModelArg::I32 => DeviceModel::I32,
        }
    }
}

fn parse_baud_rate(s: &str) -> Result<u32, String> {
    let rate: u32 = s.parse().map_err(|_| format!("{s} is not a number"))?;
    if BAUD_RATES.contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("supported rates: {BAUD_RATES:?}"))
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new(DEBUG_FILTER)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| DEFAULT_FILTER.into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Config file first, then the model preset, then individual flags
fn build_config(cli: &Cli) -> Result<ConnectionConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<ConnectionConfig>(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => ConnectionConfig::default(),
    };
    if let Some(model) = cli.model {
        config.profile = config.profile.clone().with_model(model.into());
    }
    if let Some(port) = &cli.port {
        config.port = port.clone();
    }
    if let Some(rate) = cli.baudrate {
        config.profile.serial.baud_rate = rate;
    }
    config.profile.validate()?;
    Ok(config)
}

/// Split `[name, value?]` from the command line
fn operation_args(args: &[String]) -> Result<(&str, Option<Value>)> {
    match args {
        [name] => Ok((name.as_str(), None)),
        [name, token] => Ok((name.as_str(), Some(Value::parse(token)?))),
        [name, ..] => bail!("{name} takes at most one value"),
        [] => bail!("no operation given"),
    }
}

async fn run_with_amplifier(cli: &Cli, command: &Commands) -> Result<()> {
    let config = build_config(cli)?;
    let amplifier = Amplifier::open(&config)
        .with_context(|| format!("opening {}", config.port))?;
    let client = amplifier.client().clone();

    let result = async {
        if cli.amp_info {
            let info = client.setup(config.input_source).await?;
            println!("Manufacturer:  {}", info.manufacturer);
            println!("Model:         {}", info.model);
            println!("SW Version:    {}", info.software_version);
            println!("Current input: {}", info.input_name);
        }
        match command {
            Commands::Interactive => {
                let stdin = BufReader::new(tokio::io::stdin());
                repl::run(&client, stdin, tokio::io::stdout()).await?;
            }
            Commands::Operation(args) => {
                let (name, value) = operation_args(args)?;
                match operations::invoke(&client, name, value).await {
                    Ok(output) => println!("{output}"),
                    Err(error::CliError::UnknownOperation(name)) => {
                        warn!("No such operation: {}", name);
                        println!("{}", operations::help_text());
                    }
                    Err(e) => return Err(anyhow::Error::new(e).context(name.to_string())),
                }
            }
            Commands::Ports | Commands::Operations => {}
        }
        anyhow::Ok(())
    }
    .await;

    amplifier.close().await;
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match &cli.command {
        Some(Commands::Ports) => {
            let ports = ports::list().context("listing serial ports")?;
            if ports.is_empty() {
                info!("No serial ports found");
            }
            for port in ports {
                println!("{}", port.describe());
            }
            Ok(())
        }
        Some(Commands::Operations) => {
            print!("{}", operations::help_text());
            Ok(())
        }
        Some(command) => run_with_amplifier(&cli, command).await,
        None if cli.amp_info => run_with_amplifier(&cli, &Commands::Operations).await,
        None => {
            print!("{}", operations::help_text());
            Ok(())
        }
    }
}
