use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use town_atlas::cancel::CancelToken;
use town_atlas::config::EngineConfig;
use town_atlas::enrich::EnrichmentOrchestrator;
use town_atlas::location::Store;

/// Town Atlas: enrich French town names with administrative metadata,
/// curated Wikipedia imagery and a cached generated description.
///
/// Examples:
///   atlas serve --port 3000
///   atlas enrich "Saint-Malo" --lang fr
///   atlas enrich Marseille --sub-region 13
///   atlas invalidate 75056 75
///   atlas nearest --lat 48.85 --lon 2.35
#[derive(Parser)]
#[command(name = "atlas", version, about, long_about = None)]
struct Cli {
    /// SQLite database holding the reference tables and the description cache.
    #[arg(long, global = true, env = "ATLAS_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        #[arg(long, env = "ATLAS_HOST", default_value = "127.0.0.1")]
        host: String,
        #[arg(long, env = "ATLAS_PORT", default_value_t = 3000)]
        port: u16,
    },
    /// Enrich one town and print the result as JSON.
    Enrich {
        name: String,
        /// Description language (ISO 639-1).
        #[arg(long, default_value = "en")]
        lang: String,
        /// Department code to pin the lookup.
        #[arg(long)]
        sub_region: Option<String>,
    },
    /// Drop every cached description of a town.
    Invalidate { town_code: String, department: String },
    /// Closest known town to a coordinate.
    Nearest {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Create the database schema.
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,town_atlas=debug")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env();
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    match cli.command {
        Command::Init => {
            let store = Store::open(&config.database_path)
                .with_context(|| format!("cannot open database {}", config.database_path.display()))?;
            eprintln!("  Schema ready at {}", store.path().unwrap_or(config.database_path.as_path()).display());
        }
        Command::Serve { host, port } => {
            let orchestrator = Arc::new(build(&config)?);
            town_atlas::server::start(orchestrator, &host, port)
                .await
                .with_context(|| format!("server on {}:{} failed", host, port))?;
        }
        Command::Enrich { name, lang, sub_region } => {
            let orchestrator = build(&config)?;
            let enrichment = orchestrator
                .enrich(&name, &lang, sub_region.as_deref(), &CancelToken::new())
                .await
                .with_context(|| format!("cannot enrich '{}'", name))?;
            println!("{}", serde_json::to_string_pretty(&enrichment)?);
        }
        Command::Invalidate { town_code, department } => {
            let orchestrator = build(&config)?;
            let deleted = orchestrator.invalidate(&town_code, &department).await?;
            println!("{}", serde_json::json!({ "success": true, "deleted": deleted }));
        }
        Command::Nearest { lat, lon } => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                bail!("coordinates out of range: {}, {}", lat, lon);
            }
            let orchestrator = build(&config)?;
            match orchestrator.nearest(lat, lon).await? {
                Some(meta) => println!("{}", serde_json::to_string_pretty(&meta)?),
                None => bail!("no town within range of {:.4}, {:.4}", lat, lon),
            }
        }
    }
    Ok(())
}

fn build(config: &EngineConfig) -> Result<EnrichmentOrchestrator> {
    EnrichmentOrchestrator::from_config(config)
        .with_context(|| format!("cannot open database {}", config.database_path.display()))
}
