use anyhow::{bail, Context, Result};
use azstack::arm::client::ArmClient;
use azstack::arm::error::{format_arm_error, ProviderError};
use azstack::config::ProviderConfig;
use azstack::provider::Provider;
use azstack::schema;
use azstack::state::{parse_blocks, ConfigBlock, StateFile};
use azstack::timeouts::StopContext;
use azstack::VERSION;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Declarative Azure Stack resource management
#[derive(Parser, Debug)]
#[command(name = "azstack", version, about, long_about = None)]
struct Args {
    /// Subscription to manage (overrides config file and ARM_SUBSCRIPTION_ID)
    #[arg(long, global = true)]
    subscription_id: Option<String>,

    /// Azure Stack ARM endpoint (overrides config file and ARM_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the schema of one type, or of every type
    Schema { type_name: Option<String> },

    /// Validate configuration blocks without calling ARM
    Validate {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Create, update or replace the resources in a configuration file
    Apply {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long, env = "AZSTACK_STATE", default_value = "azstack.state.json")]
        state: PathBuf,
    },

    /// Re-read every managed resource and drop the ones that are gone
    Refresh {
        #[arg(long, env = "AZSTACK_STATE", default_value = "azstack.state.json")]
        state: PathBuf,
    },

    /// Delete managed resources (all of them, or one address)
    Destroy {
        #[arg(long, env = "AZSTACK_STATE", default_value = "azstack.state.json")]
        state: PathBuf,
        /// Only destroy `<type>.<name>`
        #[arg(long)]
        target: Option<String>,
    },

    /// Adopt an existing object into the state
    Import {
        type_name: String,
        id: String,
        /// Local name of the imported resource
        #[arg(long, default_value = "imported")]
        name: String,
        #[arg(long, env = "AZSTACK_STATE", default_value = "azstack.state.json")]
        state: PathBuf,
    },

    /// Evaluate data source blocks and print the results
    Query {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Persist non-secret provider settings to the config file
    Configure {
        #[arg(long)]
        tenant_id: Option<String>,
        #[arg(long)]
        client_id: Option<String>,
        #[arg(long)]
        authentication_endpoint: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, err);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("azstack {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azstack").join("azstack.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azstack").join("azstack.log");
    }
    PathBuf::from("azstack.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let stop = StopContext::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted - stopping after the current request");
            signal_stop.cancel();
        }
    });

    let result = run(args, &stop).await;
    if let Err(err) = &result {
        tracing::error!("{:#}", err);
    }
    result
}

async fn run(args: Args, stop: &StopContext) -> Result<()> {
    match &args.command {
        Command::Schema { type_name } => print_schema(type_name.as_deref()),
        Command::Validate { file } => validate(file),
        Command::Configure {
            tenant_id,
            client_id,
            authentication_endpoint,
        } => {
            let mut config = ProviderConfig::config_path()
                .map(|path| ProviderConfig::load_from(&path))
                .unwrap_or_default();
            set_if_some(&mut config.subscription_id, &args.subscription_id);
            set_if_some(&mut config.arm_endpoint, &args.endpoint);
            set_if_some(&mut config.tenant_id, tenant_id);
            set_if_some(&mut config.client_id, client_id);
            set_if_some(&mut config.authentication_endpoint, authentication_endpoint);
            config.save().context("Failed to save configuration")?;
            println!("Configuration saved");
            Ok(())
        }
        Command::Apply { file, state } => apply(&connect(&args)?, file, state, stop).await,
        Command::Refresh { state } => refresh(&connect(&args)?, state, stop).await,
        Command::Destroy { state, target } => {
            destroy(&connect(&args)?, state, target.as_deref(), stop).await
        }
        Command::Import {
            type_name,
            id,
            name,
            state,
        } => import(&connect(&args)?, type_name, id, name, state, stop).await,
        Command::Query { file } => query(&connect(&args)?, file, stop).await,
    }
}

fn set_if_some(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *target = Some(value.clone());
    }
}

/// Build the provider: config file < environment < command-line flags
fn connect(args: &Args) -> Result<Provider> {
    let mut config = ProviderConfig::load();
    set_if_some(&mut config.subscription_id, &args.subscription_id);
    set_if_some(&mut config.arm_endpoint, &args.endpoint);

    let client = ArmClient::new(&config).map_err(user_error)?;
    tracing::info!(
        "Using subscription {} at {}",
        client.subscription_id,
        client.endpoint
    );
    Ok(Provider::new(client))
}

/// Attach the short user-facing message to a provider error
fn user_error(err: ProviderError) -> anyhow::Error {
    let message = format_arm_error(&err);
    anyhow::Error::new(err).context(message)
}

fn read_blocks(file: &Path) -> Result<Vec<ConfigBlock>> {
    let content = std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    parse_blocks(&content)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_schema(type_name: Option<&str>) -> Result<()> {
    let Some(type_name) = type_name else {
        return print_json(schema::get_registry());
    };

    match schema::get_resource_schema(type_name).or_else(|| schema::get_data_source_schema(type_name)) {
        Some(block) => print_json(block),
        None => bail!(
            "Unknown type {:?} (available: {})",
            type_name,
            schema::all_type_names().join(", ")
        ),
    }
}

fn validate(file: &Path) -> Result<()> {
    let blocks = read_blocks(file)?;
    let mut failed = 0;

    for block in &blocks {
        match Provider::validate(block) {
            Ok(()) => println!("{}: ok", block.address()),
            Err(err) => {
                failed += 1;
                println!("{}: {}", block.address(), err);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} blocks are invalid", failed, blocks.len());
    }
    Ok(())
}

async fn apply(provider: &Provider, file: &Path, state_path: &Path, stop: &StopContext) -> Result<()> {
    let blocks = read_blocks(file)?;
    let mut state = StateFile::load(state_path)?;

    for block in &blocks {
        let address = block.address();

        if schema::get_data_source_schema(&block.type_name).is_some() {
            let data = provider
                .read_data_source(block, stop)
                .await
                .map_err(user_error)
                .with_context(|| format!("reading {}", address))?;
            print_json(&data)?;
            continue;
        }

        let data = provider
            .apply(block, state.get(&address), stop)
            .await
            .map_err(user_error)
            .with_context(|| format!("applying {}", address))?;

        println!("{}: {}", address, data.id());
        state.put(address, data);
        state.save(state_path)?;
    }

    Ok(())
}

async fn refresh(provider: &Provider, state_path: &Path, stop: &StopContext) -> Result<()> {
    let mut state = StateFile::load(state_path)?;
    let addresses: Vec<String> = state.resources.keys().cloned().collect();

    for address in addresses {
        let Some(data) = state.get(&address) else {
            continue;
        };
        let refreshed = provider
            .refresh(data, stop)
            .await
            .map_err(user_error)
            .with_context(|| format!("refreshing {}", address))?;

        if refreshed.is_gone() {
            tracing::warn!("{} no longer exists - removing from state", address);
            println!("{}: gone", address);
            state.remove(&address);
        } else {
            println!("{}: {}", address, refreshed.id());
            state.put(address, refreshed);
        }
    }

    state.save(state_path)
}

async fn destroy(provider: &Provider, state_path: &Path, target: Option<&str>, stop: &StopContext) -> Result<()> {
    let mut state = StateFile::load(state_path)?;
    let addresses: Vec<String> = match target {
        Some(target) if state.get(target).is_none() => bail!("{} is not in the state", target),
        Some(target) => vec![target.to_string()],
        None => state.resources.keys().cloned().collect(),
    };

    for address in addresses {
        let Some(data) = state.get(&address) else {
            continue;
        };
        provider
            .destroy(data, stop)
            .await
            .map_err(user_error)
            .with_context(|| format!("destroying {}", address))?;

        println!("{}: destroyed", address);
        state.remove(&address);
        state.save(state_path)?;
    }

    Ok(())
}

async fn import(
    provider: &Provider,
    type_name: &str,
    id: &str,
    name: &str,
    state_path: &Path,
    stop: &StopContext,
) -> Result<()> {
    let mut state = StateFile::load(state_path)?;
    let address = format!("{}.{}", type_name, name);
    if state.get(&address).is_some() {
        bail!("{} is already managed", address);
    }

    let data = provider
        .import(type_name, id, stop)
        .await
        .map_err(user_error)
        .with_context(|| format!("importing {}", id))?;

    println!("{}: imported {}", address, data.id());
    state.put(address, data);
    state.save(state_path)
}

async fn query(provider: &Provider, file: &Path, stop: &StopContext) -> Result<()> {
    for block in read_blocks(file)? {
        let data = provider
            .read_data_source(&block, stop)
            .await
            .map_err(user_error)
            .with_context(|| format!("reading {}", block.address()))?;
        print_json(&data.attributes)?;
    }
    Ok(())
}
