use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use venue_scrape::scraping::{
    AutomationFactory, BrowserlessFactory, HttpLoader, NoAutomation, ScrapeOutcome, Scraper,
};
use venue_scrape::{load_venues, EngineConfig};

#[derive(Parser)]
#[command(name = "venue-scrape", about = "Scrape venue event programs from declarative configurations")]
struct Cli {
    /// Engine config file; defaults to the per-user data directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the venues described in a JSON file
    Scrape {
        venues: PathBuf,
        /// Only scrape venues with this name
        #[arg(long)]
        venue: Option<String>,
        /// Print each venue's scrape log
        #[arg(long)]
        log: bool,
        /// Print the scraped events as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            let mut config = EngineConfig::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => EngineConfig::load()?,
    };

    match cli.command {
        Commands::Scrape {
            venues,
            venue,
            log,
            json,
        } => scrape(config, &venues, venue.as_deref(), log, json).await,
    }
}

async fn scrape(
    config: EngineConfig,
    path: &Path,
    only: Option<&str>,
    show_log: bool,
    json: bool,
) -> Result<()> {
    let mut venues = load_venues(path)?;
    if let Some(name) = only {
        venues.retain(|venue| venue.name == name);
        if venues.is_empty() {
            bail!("no venue named '{name}' in {}", path.display());
        }
    }

    let loader = HttpLoader::new(&config).context("building http client")?;
    let automation: Arc<dyn AutomationFactory> = match BrowserlessFactory::from_config(&config)? {
        Some(factory) => Arc::new(factory),
        None => Arc::new(NoAutomation),
    };
    let scraper = Scraper::new(Arc::new(loader), automation, config);
    let outcomes = scraper.refresh_all(&mut venues).await;

    if json {
        let events: Vec<_> = outcomes.iter().flat_map(|o| o.events.iter()).collect();
        println!("{}", serde_json::to_string_pretty(&events)?);
    } else {
        for outcome in &outcomes {
            print_outcome(outcome, show_log);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &ScrapeOutcome, show_log: bool) {
    let status = if outcome.failed() { "FAILED" } else { "ok" };
    println!(
        "{}: {} events, {} errors [{status}]",
        outcome.venue,
        outcome.events.len(),
        outcome.errors.len()
    );
    for event in &outcome.events {
        println!("  {}  {}", event.date, event.name);
    }
    for err in &outcome.errors {
        println!("  ! {err}");
    }
    if show_log {
        for line in outcome.log.text().lines() {
            println!("  | {line}");
        }
    }
}
