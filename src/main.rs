//! Minimal CLI front-end over the catalog engine's programmatic entry
//! points. The GUI, viewer, and export tooling are external collaborators;
//! this binary only exists to drive the core from a shell: one
//! `clap::Parser` with a `Subcommand` enum, matched in `main`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use photocat::config::load_config;

#[derive(Parser)]
#[command(name = "photocat")]
#[command(about = "Local photo catalog engine", long_about = None)]
struct Cli {
    /// Path to the catalog's SQLite file.
    #[arg(short, long, global = true)]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a fresh catalog.
    Create,
    /// Scan a directory tree into the catalog.
    Scan {
        directory: PathBuf,
        #[arg(long, help = "Path to a plain-text or YAML template file")]
        template: Option<PathBuf>,
        #[arg(long, default_value_t = true)]
        recursive: bool,
    },
    /// Run the boolean tag-query compiler against the catalog.
    Query {
        expression: String,
    },
    /// Detect and persist duplicate-image groups.
    Dedupe,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Create => {
            photocat::create_catalog(&cli.catalog).await?;
            println!("created catalog at {}", cli.catalog.display());
        }
        Commands::Scan {
            directory,
            template,
            recursive,
        } => {
            let store = photocat::open_catalog(&cli.catalog).await?;
            let config = load_config(&store).await;
            let templates = match template {
                Some(path) => {
                    let contents = std::fs::read_to_string(&path)?;
                    Some(photocat::template::load_template_path(&path, &contents)?)
                }
                None => None,
            };
            let report = photocat::scan(
                &store,
                &directory,
                templates,
                recursive,
                &config,
                |current, total, path| {
                    tracing::info!(current, total, path, "scanning");
                },
            )
            .await?;
            println!(
                "scanned {}: found={} added={} skipped={} errors={}",
                directory.display(),
                report.total_found,
                report.added,
                report.skipped,
                report.errors
            );
        }
        Commands::Query { expression } => {
            let store = photocat::open_catalog(&cli.catalog).await?;
            let results = photocat::query(&store, &expression).await?;
            for image in results {
                println!("{}", image.filepath);
            }
        }
        Commands::Dedupe => {
            let store = photocat::open_catalog(&cli.catalog).await?;
            let config = load_config(&store).await;
            let count = photocat::detect_duplicates(&store, config.duplicate_threshold, |processed, total| {
                if total > 0 {
                    tracing::info!(processed, total, "detecting duplicates");
                }
            })
            .await?;
            println!("found {count} duplicate group(s)");
        }
    }

    Ok(())
}
