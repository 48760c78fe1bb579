use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tagwatch::{
    alarm::evaluate_against,
    config::Backend,
    reader::RegisterReader,
    reading::{format_timestamp, parse_timestamp},
    setpoint::SetpointClient,
    transport::{ControllerTransport, SimulatedController},
    Config, ConfigError, Engine, LogStore, StoredReading, TagRegistry,
};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "tagwatch", version, about = "PLC tag polling and alarm logging")]
struct Cli {
    /// Configuration file (YAML, or JSON by extension)
    #[arg(short, long, default_value = "tagwatch.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll all tags until interrupted
    Run,
    /// Validate the configuration and list the tags
    Check,
    /// Create the reading log schema
    InitDb,
    /// Run a single poll cycle and print the latest values
    Snapshot {
        /// Compare every REAL tag against this tag's value
        #[arg(long)]
        against: Option<String>,
    },
    /// Most recent readings, newest first
    Recent {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Readings between two timestamps, inclusive
    Range {
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long)]
        json: bool,
    },
    /// Acknowledge one reading by id
    Ack {
        #[arg(long)]
        id: i64,
    },
    /// Alarm setpoint block
    Setpoints {
        #[command(subcommand)]
        action: SetpointAction,
    },
}

#[derive(Subcommand)]
enum SetpointAction {
    /// Print all setpoints
    Read,
    /// Write one setpoint, or all of them with --all
    Write {
        #[arg(long, conflicts_with = "all")]
        index: Option<usize>,
        #[arg(long, conflicts_with = "all")]
        value: Option<f32>,
        #[arg(long, value_delimiter = ',')]
        all: Vec<f32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tagwatch::init_tracing();
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Run => run(config).await,
        Command::Check => check(&config),
        Command::InitDb => {
            let store = open_store(&config)?;
            info!("Schema ready, {} readings stored", store.count()?);
            Ok(())
        }
        Command::Snapshot { against } => snapshot(config, against).await,
        Command::Recent { limit, json } => print_rows(&open_store(&config)?.query_recent(limit)?, json),
        Command::Range { start, end, json } => {
            let start = parse_timestamp(&start)?;
            let end = parse_timestamp(&end)?;
            if start > end {
                bail!("--start must not be after --end");
            }
            print_rows(&open_store(&config)?.query_range(start, end)?, json)
        }
        Command::Ack { id } => {
            if open_store(&config)?.acknowledge(id)? {
                info!(id, "Reading acknowledged");
                Ok(())
            } else {
                bail!("no reading with id {}", id)
            }
        }
        Command::Setpoints { action } => setpoints(config, action).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!("Tagwatch v{} starting (built {})", tagwatch::VERSION, tagwatch::BUILD_TIMESTAMP);

    let registry = config.registry()?;
    info!("Loaded {} tags", registry.len());

    let store = open_store(&config)?;
    let reader = connect(&config, &registry).await?;
    let engine = Engine::new(registry, reader, store, config.engine.clone());

    let token = engine.shutdown_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            token.cancel();
        }
    });

    if let Err(e) = engine.run().await {
        error!("Engine error: {}", e);
        return Err(e.into());
    }

    let stats = engine.stats();
    info!(
        "Final stats: {} cycles, {} rows, {} read / {} decode / {} store failures, uptime: {}s",
        stats.cycles,
        stats.rows_appended,
        stats.read_failures,
        stats.decode_failures,
        stats.store_failures,
        stats.uptime_secs
    );
    Ok(())
}

fn check(config: &Config) -> anyhow::Result<()> {
    let registry = config.registry()?;
    println!("{} tags", registry.len());
    for tag in &registry {
        let rule = match &tag.alarm_rule {
            Some(rule) => format!("{:?}", rule),
            None => "-".to_string(),
        };
        println!(
            "  {:<20} {:<14} {:<5} {}",
            tag.name,
            tag.address.to_string(),
            tag.value_type.to_string(),
            rule
        );
    }
    if let Some(sp) = &config.setpoints {
        println!("setpoints: DB{} x{}", sp.db, sp.count);
    }
    Ok(())
}

async fn snapshot(config: Config, against: Option<String>) -> anyhow::Result<()> {
    let registry = config.registry()?;
    if let Some(reference) = &against {
        if registry.get(reference).is_none() {
            bail!("unknown reference tag {}", reference);
        }
    }

    let reader = connect(&config, &registry).await?;
    let engine = Engine::new(registry, reader.clone(), open_store(&config)?, config.engine.clone());
    let report = engine.run_cycle().await;
    reader.shutdown().await;

    for (name, outcome) in &report.outcomes {
        if let Some(kind) = outcome.error_kind() {
            println!("{:<20} FAILED ({})", name, kind);
        }
    }
    for (name, latest) in engine.latest().snapshot() {
        let mut line = format!("{:<20} {:>12}", name, latest.value.to_string());
        if let Some(reference) = against.as_deref().filter(|r| *r != name) {
            if latest.value.as_real().is_some() {
                match evaluate_against(&latest.value, engine.latest(), reference) {
                    Some(true) => line.push_str(&format!("  >= {}", reference)),
                    Some(false) => line.push_str(&format!("  <  {}", reference)),
                    None => line.push_str(&format!("  ({} unavailable)", reference)),
                }
            }
        }
        println!("{}", line);
    }
    Ok(())
}

async fn setpoints(config: Config, action: SetpointAction) -> anyhow::Result<()> {
    let setpoint_config = config
        .setpoints
        .ok_or_else(|| ConfigError::Invalid("no setpoints section configured".into()))?;
    let registry = config.registry()?;
    let reader = connect(&config, &registry).await?;
    let client = SetpointClient::new(reader.clone(), setpoint_config);

    let result = match action {
        SetpointAction::Read => client.read_all().await.map(|values| {
            for (i, v) in values.iter().enumerate() {
                println!("SP{} = {}", i + 1, v);
            }
        }),
        SetpointAction::Write { index, value, all } => match (index, value) {
            (Some(index), Some(value)) => client.write(index, value).await,
            (None, None) if !all.is_empty() => client.write_all(&all).await,
            _ => {
                reader.shutdown().await;
                bail!("use --index with --value, or --all v1,v2,...");
            }
        },
    };

    reader.shutdown().await;
    Ok(result?)
}

fn open_store(config: &Config) -> anyhow::Result<LogStore> {
    let busy = Duration::from_millis(config.storage.busy_timeout_ms);
    LogStore::open(&config.storage.path, busy)
        .with_context(|| format!("opening {}", config.storage.path.display()))
}

/// Build the configured transport and open the session. A controller that is
/// down at start is not fatal; the engine retries once per cycle.
async fn connect(config: &Config, registry: &TagRegistry) -> anyhow::Result<Arc<RegisterReader>> {
    let transport = build_transport(config, registry)?;
    let reader = Arc::new(RegisterReader::new(transport, config.engine.read_timeout()));
    if let Err(e) = reader.connect().await {
        warn!("Starting without a controller session: {}", e);
    }
    Ok(reader)
}

fn build_transport(config: &Config, registry: &TagRegistry) -> anyhow::Result<Box<dyn ControllerTransport>> {
    match config.controller.backend {
        Backend::Simulated => {
            let (plc, handle) = SimulatedController::for_registry(registry, config.controller.drift);
            if let Some(sp) = &config.setpoints {
                handle.set_bytes(sp.db, 0, &vec![0u8; sp.count * 4]);
            }
            Ok(Box::new(plc))
        }
        #[cfg(feature = "s7-support")]
        Backend::S7 => Ok(Box::new(tagwatch::transport::s7::S7Transport::new(
            config.controller.clone(),
        ))),
        #[cfg(not(feature = "s7-support"))]
        Backend::S7 => Err(ConfigError::Invalid(
            "backend s7 needs a build with the s7-support feature".into(),
        )
        .into()),
    }
}

fn print_rows(rows: &[StoredReading], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
        return Ok(());
    }
    for row in rows {
        let r = &row.reading;
        println!(
            "{:>8}  {}  {:<20} {:>12}  {}{}",
            row.id,
            format_timestamp(&r.timestamp),
            r.tag_name,
            r.value,
            if r.alarm { "ALARM" } else { "ok" },
            if r.acknowledged { " (ack)" } else { "" },
        );
    }
    Ok(())
}
