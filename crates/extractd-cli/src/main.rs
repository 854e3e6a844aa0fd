//! extractd command-line interface.
//!
//! `serve` runs the HTTP API, `extract` handles a single file or URL, and
//! `worker` is the child side of self-forking: it reads one document and
//! writes the header line plus text to stdout. `cache` inspects or empties the
//! filesystem cache. Logs always go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use extractd::cache::FsCache;
use extractd::core::ServiceConfig;
use extractd::document::Metadata;
use extractd::extractor::{ExtractParams, Extractor, HeaderSink};
use extractd::factory::DocumentFactory;
use extractd::fork::{STDIN_ARG, WorkerInput, run_worker};
use extractd::pdf::PdfBackend;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "extractd")]
#[command(version, about = "Document text extraction service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    #[cfg(feature = "api")]
    Serve {
        /// Address to bind
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Extract one document read from a path or stdin and write the worker protocol to stdout
    Worker {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Input file, or `-` for stdin
        input: String,
    },

    /// Extract text from a local file or an http(s) URL to stdout
    Extract {
        /// File path or URL
        target: String,

        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the resolved PDF backend as JSON
    Info {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Inspect or empty the filesystem cache directory
    Cache {
        #[command(subcommand)]
        action: CacheAction,

        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long, global = true)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print entry count and size as JSON
    Stats,
    /// Remove every cached entry
    Clear,
}

/// Prints announced headers to stderr so stdout carries only the text.
struct StderrHeaders;

impl HeaderSink for StderrHeaders {
    fn send_headers(&mut self, status: u16, metadata: &Metadata) {
        let mut keys: Vec<_> = metadata.keys().collect();
        keys.sort();
        eprintln!("status: {}", status);
        for key in keys {
            eprintln!("{}: {}", key, metadata[key]);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<ServiceConfig> {
    ServiceConfig::load(path.as_deref()).context("Failed to load configuration")
}

fn is_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "api")]
        Commands::Serve { host, port, config } => {
            let config = load_config(config)?;
            extractd::api::serve(&host, port, config)
                .await
                .context("API server failed")?;
        }

        Commands::Worker { config, input } => {
            let config = load_config(config)?;
            let factory = DocumentFactory::new(&config)
                .context("Failed to initialize document factory")?
                .without_fork();
            let ocr = extractd::ocr::from_config(&config.ocr);
            let input = if input == STDIN_ARG {
                WorkerInput::Stdin
            } else {
                WorkerInput::Path(PathBuf::from(input))
            };

            let result = run_worker(&factory, ocr.as_deref(), input, tokio::io::stdin(), tokio::io::stdout()).await;
            factory.shutdown();
            let mut stdout = result.context("Worker extraction failed")?;
            stdout.flush().await.context("Failed to flush stdout")?;
        }

        Commands::Extract { target, config } => {
            let config = load_config(config)?;
            let extractor = Extractor::new(&config).context("Failed to initialize extractor")?;

            let result = if is_url(&target) {
                let mut params = ExtractParams::new(target.clone());
                params.no_cache = true;
                extractor
                    .doc_from_url(&params, tokio::io::stdout(), &mut StderrHeaders)
                    .await
                    .map(|_| ())
            } else {
                extractor
                    .doc_from_path(&PathBuf::from(&target), tokio::io::stdout())
                    .await
                    .map(|_| ())
            };
            extractor.shutdown().await;
            result.with_context(|| format!("Failed to extract {}", target))?;
        }

        Commands::Info { config } => {
            let config = load_config(config)?;
            let backend = PdfBackend::select(&config.pdf).context("Failed to load PDF backend")?;
            let info = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "pdf_backend": backend.descriptor(),
                "exclusive": backend.is_exclusive(),
                "ocr_enabled": config.ocr.enabled,
                "cache_backend": config.cache.backend,
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
            backend.cleanup();
        }

        Commands::Cache { action, config } => {
            let config = load_config(config)?;
            let cache = FsCache::new(&config.cache.directory).context("Failed to open cache directory")?;
            let report = match action {
                CacheAction::Stats => {
                    let stats = cache.stats().context("Failed to read cache statistics")?;
                    serde_json::json!({
                        "directory": cache.directory(),
                        "entries": stats.entries,
                        "total_bytes": stats.total_bytes,
                    })
                }
                CacheAction::Clear => {
                    let (removed, freed) = cache.clear().context("Failed to clear cache")?;
                    tracing::info!(removed, freed, "cache cleared");
                    serde_json::json!({
                        "directory": cache.directory(),
                        "removed_entries": removed,
                        "freed_bytes": freed,
                    })
                }
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
