//! One venue's loading handle: either a static loader or an exclusively
//! owned automation session, behind the same first-load / load-more calls.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::automation::{AutomationDriver, AutomationFactory, AutomationOutcome};
use super::loader::StaticLoader;
use crate::config::EngineConfig;
use crate::dom::Document;
use crate::error::{Result, ScrapeError};
use crate::models::Venue;

/// What the pagination controller asks the context for next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Navigate(String),
    ClickMore(String),
    ClickDifferent(String),
    Scroll,
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRequest::Navigate(url) => write!(f, "navigate to {url}"),
            PageRequest::ClickMore(selector) => write!(f, "click '{selector}' to load more"),
            PageRequest::ClickDifferent(selector) => {
                write!(f, "click '{selector}' to load a different page")
            }
            PageRequest::Scroll => f.write_str("scroll down to load more"),
        }
    }
}

pub enum Loading {
    Static {
        loader: Arc<dyn StaticLoader>,
        url: String,
        encoding: Option<String>,
    },
    Automated {
        driver: AutomationDriver,
        url: String,
    },
}

pub struct VenueScrapeContext {
    venue: String,
    loading: Loading,
    first_load_timeout: Duration,
    paging_timeout: Duration,
}

impl VenueScrapeContext {
    pub fn new(
        venue: &Venue,
        loader: Arc<dyn StaticLoader>,
        automation: &dyn AutomationFactory,
        config: &EngineConfig,
    ) -> Result<Self> {
        let loading = if venue.event_scrape_job.requires_automation() {
            Loading::Automated {
                driver: AutomationDriver::new(automation.create(venue)?),
                url: venue.program_url.clone(),
            }
        } else {
            Loading::Static {
                loader,
                url: venue.program_url.clone(),
                encoding: venue.encoding.clone(),
            }
        };
        Ok(Self {
            venue: venue.name.clone(),
            loading,
            first_load_timeout: config.first_load_timeout(),
            paging_timeout: config.paging_timeout(),
        })
    }

    pub fn is_automated(&self) -> bool {
        matches!(self.loading, Loading::Automated { .. })
    }

    /// Address of the page currently loaded.
    pub fn url(&self) -> &str {
        match &self.loading {
            Loading::Static { url, .. } | Loading::Automated { url, .. } => url,
        }
    }

    /// Loads the program page. Any failure to produce content is fatal.
    pub async fn load_first(&mut self) -> Result<Document> {
        let wait = self.first_load_timeout;
        match &mut self.loading {
            Loading::Static {
                loader,
                url,
                encoding,
            } => {
                match tokio::time::timeout(wait, loader.open_with_encoding(url, encoding.as_deref()))
                    .await
                {
                    Ok(document) => document,
                    Err(_) => Err(ScrapeError::Timeout {
                        url: url.clone(),
                        seconds: wait.as_secs(),
                    }),
                }
            }
            Loading::Automated { driver, url } => {
                let target = url.clone();
                match driver.navigate(&target, wait).await? {
                    AutomationOutcome::Html(html) => {
                        if let Some(current) = driver.url() {
                            *url = current;
                        }
                        Ok(Document::parse(&html, Some(url.as_str())))
                    }
                    AutomationOutcome::NoChange => Err(ScrapeError::Load {
                        url: target,
                        reason: "page rendered no content".to_string(),
                    }),
                    AutomationOutcome::TimedOut => Err(ScrapeError::Timeout {
                        url: target,
                        seconds: wait.as_secs(),
                    }),
                }
            }
        }
    }

    /// `Ok(None)` when the request produced nothing new in time; paging ends
    /// softly in that case.
    pub async fn load_more_async(&mut self, request: PageRequest) -> Result<Option<Document>> {
        let wait = self.paging_timeout;
        match &mut self.loading {
            Loading::Static {
                loader,
                url,
                encoding,
            } => {
                let target = match request {
                    PageRequest::Navigate(target) => target,
                    other => {
                        return Err(ScrapeError::Configuration {
                            venue: self.venue.clone(),
                            reason: format!("cannot {other} without a browser session"),
                        })
                    }
                };
                match tokio::time::timeout(wait, loader.open_with_encoding(&target, encoding.as_deref()))
                    .await
                {
                    Ok(Ok(document)) => {
                        *url = target;
                        Ok(Some(document))
                    }
                    Ok(Err(err)) => Err(err),
                    Err(_) => {
                        tracing::debug!(url = %target, "static page load timed out while paging");
                        Ok(None)
                    }
                }
            }
            Loading::Automated { driver, url } => {
                let outcome = match &request {
                    PageRequest::Navigate(target) => driver.navigate(target, wait).await?,
                    PageRequest::ClickMore(selector) => driver.click_more(selector, wait).await?,
                    PageRequest::ClickDifferent(selector) => {
                        driver.click_different(selector, wait).await?
                    }
                    PageRequest::Scroll => driver.scroll(wait).await?,
                };
                match outcome {
                    AutomationOutcome::Html(html) => {
                        if let Some(current) = driver.url() {
                            *url = current;
                        }
                        Ok(Some(Document::parse(&html, Some(url.as_str()))))
                    }
                    AutomationOutcome::NoChange => Ok(None),
                    AutomationOutcome::TimedOut => {
                        tracing::debug!(venue = %self.venue, "{request} timed out");
                        Ok(None)
                    }
                }
            }
        }
    }
}
