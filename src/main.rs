//! gce-metadata-scripts - stage metadata scripts for execution
//!
//! Reads `<type>-script` and `<type>-script-url` attributes from the GCE
//! metadata server, stages each script in the destination directory, and
//! prints a JSON map of attribute key to staged file (`null` when a declared
//! script could not be fetched).

use anyhow::{Context, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use gce_metadata_scripts::ScriptRetriever;
use gce_metadata_scripts::config::{CONFIG_DIR, ConfigPaths, load_settings};

#[derive(Parser)]
#[command(name = "gce-metadata-scripts")]
#[command(author, version, about = "Retrieve and stage GCE metadata scripts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory holding scripts.cfg and scripts.cfg.d/
    #[arg(long, default_value = CONFIG_DIR)]
    config_dir: PathBuf,

    /// Existing directory to stage scripts in
    #[arg(short, long)]
    dest_dir: PathBuf,

    /// Script type to retrieve (e.g., startup, shutdown)
    #[arg(env = "GCE_SCRIPT_TYPE")]
    script_type: String,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact();

    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish()),
        Err(_) => tracing::subscriber::set_global_default(builder.with_max_level(level).finish()),
    };

    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if !cli.dest_dir.is_dir() {
        bail!("destination directory {} does not exist", cli.dest_dir.display());
    }

    let settings = load_settings(&ConfigPaths::with_dir(&cli.config_dir))
        .await
        .with_context(|| format!("loading settings from {}", cli.config_dir.display()))?;

    let mut retriever = ScriptRetriever::from_settings(cli.script_type.as_str(), &settings)
        .context("building script retriever")?;

    info!("Retrieving {} scripts into {}", cli.script_type, cli.dest_dir.display());
    let scripts = retriever.get_scripts(&cli.dest_dir).await;

    if scripts.is_empty() {
        info!("No {} scripts found in metadata.", cli.script_type);
    }
    for (key, path) in &scripts {
        if path.is_none() {
            warn!("{} was declared but could not be retrieved.", key);
        }
    }

    println!("{}", serde_json::to_string_pretty(&scripts)?);
    Ok(())
}
