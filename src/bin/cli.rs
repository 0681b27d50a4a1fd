//! mangawatch CLI
//!
//! Runs the update service in the foreground, performs one-off checks and
//! manages the tracked manga list.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mangawatch::{
    error::{AppError, Result},
    models::{Config, MangaKey, TrackedManga},
    service::Service,
    source::plugin,
    storage::{LocalStore, StateStore},
    utils::http,
};

/// mangawatch - manga update checker
#[derive(Parser, Debug)]
#[command(
    name = "mangawatch",
    version,
    about = "Checks manga sources for new chapters and sends notifications"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "MANGAWATCH_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until interrupted
    Run,

    /// Run a single update cycle and exit
    Check,

    /// Validate configuration and source manifests
    Validate,

    /// Start tracking a manga
    Track {
        /// Source id as declared in its manifest
        source: String,
        /// Manga id on that source
        manga_id: String,
        /// Display title
        title: String,
    },

    /// Stop tracking a manga
    Untrack {
        /// Source id the manga was tracked with
        source: String,
        /// Manga id on that source
        manga_id: String,
    },

    /// List tracked manga
    List,
}

/// Initialize logging; `--verbose` beats the configured level and
/// `RUST_LOG` beats both.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;
    init_logging(cli.verbose, &config.logging.level);

    log::info!("Using configuration {}", cli.config.display());

    match cli.command {
        Command::Run => {
            let service = Service::build(&config)?;
            let shutdown = service.shutdown_token();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::info!("Interrupt received, stopping after the current cycle");
                        shutdown.cancel();
                    }
                    Err(e) => log::error!("Cannot listen for interrupt: {}", e),
                }
            });
            service.run().await?;
        }

        Command::Check => {
            let service = Service::build(&config)?;
            match service.check_once().await? {
                Some(report) => {
                    mangawatch::utils::log::summary(
                        "Update cycle",
                        &mangawatch::utils::log::cycle_items(&report),
                    );
                }
                None => log::warn!("A cycle was already running"),
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");

            let client = http::create_async_client(&config.http)?;
            let registry = plugin::discover(&config.paths.plugin_dir, &client)?;
            log::info!(
                "✓ {} sources: {}",
                registry.len(),
                registry.ids().join(", ")
            );
            log::info!("✓ {} notification channels", config.notifiers.len());
        }

        Command::Track {
            source,
            manga_id,
            title,
        } => {
            let client = http::create_async_client(&config.http)?;
            let registry = plugin::discover(&config.paths.plugin_dir, &client)?;
            if registry.get(&source).is_err() {
                return Err(AppError::UnknownSource(source));
            }

            let store = LocalStore::new(&config.paths.state_dir);
            store
                .track(TrackedManga::new(manga_id, source, title))
                .await?;
        }

        Command::Untrack { source, manga_id } => {
            let store = LocalStore::new(&config.paths.state_dir);
            let key = MangaKey::new(source, manga_id);
            if store.untrack(&key).await? {
                log::info!("Stopped tracking {}", key);
            } else {
                log::warn!("{} was not tracked", key);
            }
        }

        Command::List => {
            let store = LocalStore::new(&config.paths.state_dir);
            let tracked = store.tracked().await?;
            mangawatch::utils::log::header(&format!("{} tracked manga", tracked.len()));
            for manga in tracked {
                let chapters = store.get(&manga.key()).await?;
                let last_checked = manga
                    .last_checked
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                mangawatch::utils::log::sub_item(&format!(
                    "{} [{}] {} chapters, last checked {}",
                    manga.title,
                    manga.key(),
                    chapters.len(),
                    last_checked
                ));
            }
        }
    }

    Ok(())
}
