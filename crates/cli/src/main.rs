use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::{router, AppState};
use records_core::schema::{
    AchievementReference, AchievementView, CreateAchievementRequest, CreatedAchievement, FileMeta,
    HistoryEntry, Principal, RejectRequest, UpdateAchievementRequest,
};
use records_core::Config;
use schemars::schema::RootSchema;
use schemars::schema_for;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "records")]
#[command(about = "Student achievement records service", long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Listen address, overrides config and RECORDS_BIND
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Export JSON Schemas for the wire types
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
    /// Relational database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Export JSON Schema files for the request and response types
    Export {
        /// Output directory (default: ./schemas)
        #[arg(long, default_value = "schemas")]
        out_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Create the reference table and history ledger if missing
    Init {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Database file, overrides config
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Serve { config, bind } => serve(config.as_deref(), bind).await,
        Commands::Schema { command } => match command {
            SchemaCommands::Export { out_dir } => schema_export(out_dir),
        },
        Commands::Db { command } => match command {
            DbCommands::Init { config, path } => db_init(config.as_deref(), path),
        },
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

async fn serve(config_path: Option<&Path>, bind: Option<SocketAddr>) -> Result<()> {
    let mut config = Config::load(config_path)?;
    if let Some(bind) = bind {
        config.bind = bind;
    }

    let app = router(AppState::open(&config)?);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(addr = %config.bind, "records API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("records API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn schema_export(out_dir: PathBuf) -> Result<()> {
    fs::create_dir_all(&out_dir)?;

    let schemas: [(&str, RootSchema); 9] = [
        ("AchievementReference", schema_for!(AchievementReference)),
        ("AchievementView", schema_for!(AchievementView)),
        ("HistoryEntry", schema_for!(HistoryEntry)),
        ("FileMeta", schema_for!(FileMeta)),
        ("Principal", schema_for!(Principal)),
        ("CreateAchievementRequest", schema_for!(CreateAchievementRequest)),
        ("CreatedAchievement", schema_for!(CreatedAchievement)),
        ("UpdateAchievementRequest", schema_for!(UpdateAchievementRequest)),
        ("RejectRequest", schema_for!(RejectRequest)),
    ];
    for (name, schema) in schemas {
        let json = serde_json::to_string_pretty(&schema)?;
        fs::write(out_dir.join(format!("{name}.schema.json")), json)?;
    }

    println!("Exported schemas to {}", out_dir.display());
    Ok(())
}

fn db_init(config_path: Option<&Path>, path: Option<PathBuf>) -> Result<()> {
    let config = Config::load(config_path)?;
    let path = path.unwrap_or(config.database_path);
    records_core::db::open(&path).with_context(|| format!("initializing {}", path.display()))?;
    println!("Initialized database at {}", path.display());
    Ok(())
}
