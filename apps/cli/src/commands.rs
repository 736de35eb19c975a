//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bizclass_core::{ClassificationEngine, EngineConfig, ProgressReporter};
use bizclass_shared::{
    AppConfig, ClassificationRequest, ClassificationResult, Deadline, RequestFlags, expand_home,
    init_config, load_config,
};
use bizclass_storage::ReferenceStore;
use bizclass_taxonomy::{ReferenceData, ReferenceFile};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// bizclass: business classification into NAICS, SIC and MCC.
#[derive(Parser)]
#[command(
    name = "bizclass",
    version,
    about = "Classify businesses into NAICS, SIC and MCC industry codes.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Classify a business by name and/or website.
    Classify {
        /// Business name.
        #[arg(short, long)]
        name: Option<String>,

        /// Business website (scheme optional).
        #[arg(short, long)]
        website: Option<String>,

        /// Total deadline in seconds (clamped to the configured range).
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Run the ML classifier, if one is configured.
        #[arg(long)]
        ml: bool,

        /// Include per-method scenarios in the output.
        #[arg(long)]
        scenarios: bool,

        /// Reference data JSON file (overrides the configured database).
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Render service endpoint (overrides config).
        #[arg(long, env = "BIZCLASS_RENDER_ENDPOINT")]
        render_endpoint: Option<String>,

        /// Single-line JSON instead of pretty-printed.
        #[arg(long)]
        compact: bool,
    },

    /// Reference data management.
    Data {
        /// Database path (defaults to `[reference] database`).
        #[arg(long, global = true)]
        database: Option<PathBuf>,

        /// Data subcommand.
        #[command(subcommand)]
        action: DataAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Reference data subcommands.
#[derive(Subcommand)]
pub(crate) enum DataAction {
    /// Replace the stored reference data with a JSON reference file.
    Import {
        /// Path to the reference JSON file.
        file: PathBuf,
    },
    /// Show row counts and the last import.
    Stats,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

const LOG_TARGETS: &[&str] = &[
    "bizclass",
    "bizclass_core",
    "bizclass_crawler",
    "bizclass_discovery",
    "bizclass_shared",
    "bizclass_storage",
    "bizclass_taxonomy",
];

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",");

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr; stdout carries the JSON result.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Classify {
            name,
            website,
            timeout,
            ml,
            scenarios,
            reference,
            render_endpoint,
            compact,
        } => {
            let request = ClassificationRequest {
                business_name: name,
                website,
                timeout: timeout.map(Duration::from_secs),
                flags: RequestFlags {
                    enable_ml: ml,
                    include_scenarios: scenarios,
                },
            };
            cmd_classify(request, reference.as_deref(), render_endpoint, compact).await
        }
        Command::Data { database, action } => match action {
            DataAction::Import { file } => cmd_data_import(database.as_deref(), &file).await,
            DataAction::Stats => cmd_data_stats(database.as_deref()).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

async fn cmd_classify(
    request: ClassificationRequest,
    reference: Option<&Path>,
    render_endpoint: Option<String>,
    compact: bool,
) -> Result<()> {
    let config = load_config()?;
    let reference = Arc::new(load_reference(&config, reference).await?);

    let mut engine_config = EngineConfig::from(&config);
    if render_endpoint.is_some() {
        engine_config.acquisition.render_endpoint = render_endpoint;
    }
    let engine = ClassificationEngine::new(&engine_config, reference)?;

    if request.flags.enable_ml && engine_config.ml.endpoint.is_none() {
        warn!("--ml given but no [ml] endpoint is configured; ML will be skipped");
    }

    // Ctrl-C cancels the request; the engine reports DeadlineExceeded.
    let root = Deadline::after(engine_config.budget.max_timeout);
    let on_interrupt = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let reporter = CliProgress::new()?;
    let result = engine.run(request, &root, &reporter).await;
    reporter.spinner.finish_and_clear();
    let result = result?;

    let json = if compact {
        serde_json::to_string(&result)?
    } else {
        serde_json::to_string_pretty(&result)?
    };
    println!("{json}");
    Ok(())
}

/// Reference data from `--reference`, else from the configured database.
async fn load_reference(config: &AppConfig, file: Option<&Path>) -> Result<ReferenceData> {
    if let Some(path) = file {
        return Ok(ReferenceData::load_json(path)?);
    }

    let db_path = expand_home(&config.reference.database)?;
    if !db_path.exists() {
        return Err(eyre!(
            "no reference database at '{}'. Run `bizclass data import <file>` or pass --reference",
            db_path.display()
        ));
    }
    let store = ReferenceStore::open_readonly(&db_path).await?;
    Ok(store.load_reference_data().await?)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, result: &ClassificationResult) {
        self.spinner.finish_and_clear();
        info!(
            status = ?result.status,
            overall_confidence = result.overall_confidence,
            elapsed_ms = result.diagnostics.elapsed_ms,
            "done"
        );
    }
}

// ---------------------------------------------------------------------------
// data
// ---------------------------------------------------------------------------

fn database_path(database: Option<&Path>) -> Result<PathBuf> {
    match database {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(expand_home(&load_config()?.reference.database)?),
    }
}

async fn cmd_data_import(database: Option<&Path>, file: &Path) -> Result<()> {
    let db_path = database_path(database)?;
    let reference = ReferenceFile::load(file)?;

    info!(file = %file.display(), database = %db_path.display(), "importing reference data");
    let store = ReferenceStore::open(&db_path).await?;
    let stats = store
        .import(&reference, &file.display().to_string())
        .await?;

    println!();
    println!("  Reference data imported!");
    println!("  Database:  {}", db_path.display());
    println!("  Codes:     {}", stats.codes);
    println!("  Keywords:  {}", stats.keywords);
    println!("  Crosswalk: {}", stats.crosswalk_edges);
    println!();

    Ok(())
}

async fn cmd_data_stats(database: Option<&Path>) -> Result<()> {
    let db_path = database_path(database)?;
    let store = ReferenceStore::open_readonly(&db_path).await?;
    let stats = store.stats().await?;

    println!();
    println!("  Database:       {}", db_path.display());
    println!("  Codes:          {}", stats.codes);
    println!("  Keywords:       {}", stats.keywords);
    println!("  Keyword codes:  {}", stats.keyword_codes);
    println!("  Crosswalk:      {}", stats.crosswalk_edges);
    match store.last_import().await? {
        Some((source, at)) => println!("  Last import:    {source} ({at})"),
        None => println!("  Last import:    never"),
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn classify_flags_parse() {
        let cli = Cli::try_parse_from([
            "bizclass",
            "classify",
            "--name",
            "Joe's Pizza",
            "--website",
            "joespizza.example",
            "--timeout",
            "10",
            "--ml",
        ])
        .unwrap();

        match cli.command {
            Command::Classify {
                name,
                website,
                timeout,
                ml,
                scenarios,
                ..
            } => {
                assert_eq!(name.as_deref(), Some("Joe's Pizza"));
                assert_eq!(website.as_deref(), Some("joespizza.example"));
                assert_eq!(timeout, Some(10));
                assert!(ml);
                assert!(!scenarios);
            }
            _ => panic!("expected classify"),
        }
    }

    #[test]
    fn data_database_flag_is_global() {
        let cli = Cli::try_parse_from(["bizclass", "data", "stats", "--database", "/tmp/ref.db"])
            .unwrap();
        match cli.command {
            Command::Data { database, action } => {
                assert_eq!(database, Some(PathBuf::from("/tmp/ref.db")));
                assert!(matches!(action, DataAction::Stats));
            }
            _ => panic!("expected data"),
        }
    }
}
