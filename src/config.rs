use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::models::Venue;

/// `VENUE_SCRAPE_HOME`, else `<data dir>/venue-scrape`.
static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var_os("VENUE_SCRAPE_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::data_dir().map(|dir| dir.join("venue-scrape")))
        .unwrap_or_else(|| PathBuf::from(".venue-scrape"))
});

pub fn config_path() -> PathBuf {
    DATA_ROOT.join("config.json")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Budget for a venue's first page; exceeding it fails the venue.
    pub first_load_timeout_secs: u64,
    /// Budget for each click/scroll/navigate round; exceeding it ends paging.
    pub paging_timeout_secs: u64,
    /// Hard stop for runaway pagination.
    pub max_rounds: usize,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: "VenueScrape/0.1 (+https://github.com/venue-scrape/venue-scrape)".to_string(),
            request_timeout_secs: 20,
            first_load_timeout_secs: 30,
            paging_timeout_secs: 10,
            max_rounds: 50,
            browserless_url: None,
            browserless_token: None,
        }
    }
}

impl EngineConfig {
    /// Reads [`config_path`] (defaults when absent),
    /// then applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = config_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(agent) = lookup("VENUE_SCRAPE_USER_AGENT") {
            self.user_agent = agent;
        }
        if let Some(url) = lookup("VENUE_SCRAPE_BROWSERLESS_URL") {
            self.browserless_url = Some(url);
        }
        if let Some(token) = lookup("VENUE_SCRAPE_BROWSERLESS_TOKEN") {
            self.browserless_token = Some(token);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn first_load_timeout(&self) -> Duration {
        Duration::from_secs(self.first_load_timeout_secs)
    }

    pub fn paging_timeout(&self) -> Duration {
        Duration::from_secs(self.paging_timeout_secs)
    }
}

pub fn load_venues(path: &Path) -> Result<Vec<Venue>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading venues {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing venues {}", path.display()))
}
