use std::time::Duration;

use {
    anyhow::{Context, Result},
    clap::{Parser, Subcommand, ValueEnum},
    selve_gateway::{EntityKind, Gateway, GatewayConfig, Interest, Notification},
};

/// Command-line client for a Selve USB-RF gateway, reached through a
/// serial-to-TCP bridge or (with the `serial` feature) its USB port.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Bridge address, HOST:PORT.
    #[arg(long)]
    addr: Option<String>,

    /// Serial device of the USB stick, e.g. /dev/ttyUSB0.
    #[cfg(feature = "serial")]
    #[arg(long, conflicts_with = "addr")]
    port: Option<String>,

    /// YAML configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Per-command timeout in milliseconds; overrides the configuration.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the gateway answers and print its state and version.
    Ping,
    /// Discover entities of one kind, or of every kind.
    Discover {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Discover everything and print the registry as JSON.
    List,
    /// Print events as they arrive.
    Watch {
        /// Stop after this many seconds.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Stop a device.
    Stop { id: u8 },
    /// Drive a device up.
    Up { id: u8 },
    /// Drive a device down.
    Down { id: u8 },
    /// Drive a device to a position in percent (0 = open).
    Position { id: u8, percent: u8 },
    GroupUp { id: u8 },
    GroupDown { id: u8 },
    GroupStop { id: u8 },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Device,
    Iveo,
    Group,
    Sensor,
    Sender,
    Controller,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Device => EntityKind::Device,
            KindArg::Iveo => EntityKind::Iveo,
            KindArg::Group => EntityKind::Group,
            KindArg::Sensor => EntityKind::Sensor,
            KindArg::Sender => EntityKind::Sender,
            KindArg::Controller => EntityKind::Controller,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => GatewayConfig::from_file(path).context("failed to load configuration")?,
        None => GatewayConfig::default(),
    };
    let endpoint = endpoint(&args)?;
    config.name = endpoint.to_string();
    if let Some(timeout) = args.timeout_ms {
        config.command_timeout_ms = timeout;
    }
    if matches!(args.command, Command::Watch { .. }) {
        config.enable_events = true;
    }
    config.validate().context("invalid configuration")?;

    let gateway = endpoint
        .connect(config)
        .await
        .with_context(|| format!("failed to connect to {}", endpoint))?;

    let outcome = run(&gateway, args.command).await;
    gateway.disconnect().await?;
    outcome
}

enum Endpoint {
    Tcp(String),
    #[cfg(feature = "serial")]
    Serial(String),
}

impl Endpoint {
    async fn connect(&self, config: GatewayConfig) -> selve_gateway::Result<Gateway> {
        match self {
            Endpoint::Tcp(addr) => Gateway::connect_tcp(addr, config).await,
            #[cfg(feature = "serial")]
            Endpoint::Serial(path) => Gateway::connect_serial(path, config).await,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "{}", addr),
            #[cfg(feature = "serial")]
            Endpoint::Serial(path) => write!(f, "{}", path),
        }
    }
}

fn endpoint(args: &Args) -> Result<Endpoint> {
    #[cfg(feature = "serial")]
    if let Some(path) = &args.port {
        return Ok(Endpoint::Serial(path.clone()));
    }
    match &args.addr {
        Some(addr) => Ok(Endpoint::Tcp(addr.clone())),
        #[cfg(feature = "serial")]
        None => anyhow::bail!("one of --addr or --port is required"),
        #[cfg(not(feature = "serial"))]
        None => anyhow::bail!("--addr is required"),
    }
}

async fn run(gateway: &Gateway, command: Command) -> Result<()> {
    match command {
        Command::Ping => {
            gateway.ping().await?;
            let state = gateway.gateway_state().await?;
            let version = gateway.version().await?;
            println!(
                "{:?}, serial {}, firmware {}, spec {}",
                state,
                version.serial,
                version.firmware_string(),
                version.spec_string()
            );
        }
        Command::Discover { kind: Some(kind) } => {
            let entities = gateway.discover(kind.into()).await?;
            println!("{}", serde_json::to_string_pretty(&entities)?);
        }
        Command::Discover { kind: None } => {
            let count = gateway.discover_all().await?;
            println!("discovered {} entities", count);
        }
        Command::List => {
            gateway.discover_all().await?;
            println!("{}", serde_json::to_string_pretty(&gateway.all_entities())?);
        }
        Command::Watch { seconds } => watch(gateway, seconds).await?,
        Command::Stop { id } => report(gateway.stop(id).await?),
        Command::Up { id } => report(gateway.move_up(id).await?),
        Command::Down { id } => report(gateway.move_down(id).await?),
        Command::Position { id, percent } => report(gateway.set_position(id, percent).await?),
        Command::GroupUp { id } => report(gateway.group_up(id).await?),
        Command::GroupDown { id } => report(gateway.group_down(id).await?),
        Command::GroupStop { id } => report(gateway.group_stop(id).await?),
    }
    Ok(())
}

fn report(executed: bool) {
    println!("{}", if executed { "executed" } else { "not executed" });
}

async fn watch(gateway: &Gateway, seconds: Option<u64>) -> Result<()> {
    gateway.discover_all().await?;
    gateway.subscribe(Interest::Any, |notification| {
        match notification {
            Notification::EntityUpdated { entity, .. } => {
                println!("{}", serde_json::to_string(entity)?);
            }
            other => println!("{:?}", other),
        }
        Ok(())
    });

    let mut state = gateway.state_changes();
    let ended = async {
        while !state.borrow_and_update().is_terminal() {
            if state.changed().await.is_err() {
                break;
            }
        }
    };
    match seconds {
        Some(secs) => {
            let _ = tokio::time::timeout(Duration::from_secs(secs), ended).await;
        }
        None => {
            tokio::select! {
                _ = ended => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
    }
    Ok(())
}
