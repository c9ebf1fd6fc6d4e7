use std::hash::{Hash, Hasher};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Venue {
    pub name: String,
    pub program_url: String,
    #[serde(default)]
    pub location: Option<String>,
    /// IANA zone used to decide which events are in the past.
    #[serde(default)]
    pub time_zone: Option<String>,
    /// Forces the charset used to decode the program page.
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub last_refreshed: Option<DateTime<Utc>>,
    pub event_scrape_job: EventScrapeJob,
}

impl PartialEq for Venue {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.program_url == other.program_url
    }
}

impl Eq for Venue {}

impl Hash for Venue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.program_url.hash(state);
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PagingStrategy {
    #[default]
    AllOnOnePage,
    ClickElementToLoadMore,
    ClickElementToLoadDifferent,
    NavigateLinkToLoadMore,
    NavigateLinkToLoadDifferent,
    ScrollDownToLoadMore,
}

impl PagingStrategy {
    pub fn is_multi_page(self) -> bool {
        self != PagingStrategy::AllOnOnePage
    }

    pub fn needs_next_page_selector(self) -> bool {
        matches!(
            self,
            PagingStrategy::ClickElementToLoadMore
                | PagingStrategy::ClickElementToLoadDifferent
                | PagingStrategy::NavigateLinkToLoadMore
                | PagingStrategy::NavigateLinkToLoadDifferent
        )
    }

    pub fn needs_automation(self) -> bool {
        matches!(
            self,
            PagingStrategy::ClickElementToLoadMore
                | PagingStrategy::ClickElementToLoadDifferent
                | PagingStrategy::ScrollDownToLoadMore
        )
    }
}

impl std::fmt::Display for PagingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PagingStrategy::AllOnOnePage => "all events on one page",
            PagingStrategy::ClickElementToLoadMore => "clicking an element to load more events",
            PagingStrategy::ClickElementToLoadDifferent => {
                "clicking an element to load different events"
            }
            PagingStrategy::NavigateLinkToLoadMore => "navigating a link to load more events",
            PagingStrategy::NavigateLinkToLoadDifferent => {
                "navigating a link to load different events"
            }
            PagingStrategy::ScrollDownToLoadMore => "scrolling down to load more events",
        };
        f.write_str(label)
    }
}

/// A single field extraction rule.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct ScrapeJob {
    pub selector: String,
    pub attribute: Option<String>,
    #[serde(rename = "match")]
    pub match_pattern: Option<String>,
    pub ignore_nested_text: bool,
}

impl ScrapeJob {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn with_match(mut self, pattern: impl Into<String>) -> Self {
        self.match_pattern = Some(pattern.into());
        self
    }

    pub fn ignoring_nested_text(mut self) -> Self {
        self.ignore_nested_text = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.selector.trim().is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct DateScrapeJob {
    #[serde(flatten)]
    pub rule: ScrapeJob,
    /// chrono `strftime` pattern.
    pub format: Option<String>,
    /// Language tag for month and weekday names, e.g. `de`.
    pub culture: Option<String>,
}

impl DateScrapeJob {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            rule: ScrapeJob::new(selector),
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = Some(culture.into());
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "value")]
pub enum FilterPattern {
    Substring(String),
    Keywords(Vec<String>),
    Regex(String),
}

impl FilterPattern {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            FilterPattern::Substring(needle) => value.contains(needle.as_str()),
            FilterPattern::Keywords(words) => {
                let haystack = value.to_lowercase();
                words
                    .iter()
                    .any(|word| haystack.contains(&word.to_lowercase()))
            }
            FilterPattern::Regex(pattern) => match Regex::new(pattern) {
                Ok(re) => re.is_match(value),
                Err(err) => {
                    tracing::warn!("invalid filter pattern {pattern}: {err}");
                    false
                }
            },
        }
    }
}

/// Relevance filter: the text extracted by `rule` must satisfy `pattern`.
/// An empty rule selector tests the candidate's whole text.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventFilter {
    #[serde(default)]
    pub rule: ScrapeJob,
    pub pattern: FilterPattern,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct EventScrapeJob {
    pub selector: String,
    pub filter: Option<EventFilter>,
    pub next_page_selector: Option<String>,
    pub paging_strategy: PagingStrategy,
    pub wait_for_js_rendering: bool,
    pub scroll_down_to_load_more: bool,
    pub name: ScrapeJob,
    pub date: DateScrapeJob,
    pub sub_title: Option<ScrapeJob>,
    pub description: Option<ScrapeJob>,
    pub genres: Option<ScrapeJob>,
    pub stage: Option<ScrapeJob>,
    pub door_time: Option<ScrapeJob>,
    pub start_time: Option<ScrapeJob>,
    pub presale_price: Option<ScrapeJob>,
    pub door_price: Option<ScrapeJob>,
    pub url: Option<ScrapeJob>,
    pub ticket_url: Option<ScrapeJob>,
    pub image_url: Option<ScrapeJob>,
}

impl EventScrapeJob {
    pub fn requires_automation(&self) -> bool {
        self.wait_for_js_rendering
            || self.scroll_down_to_load_more
            || self.paging_strategy.needs_automation()
    }

    /// The strategy actually driven; the legacy scroll flag implies scrolling.
    pub fn effective_strategy(&self) -> PagingStrategy {
        if self.scroll_down_to_load_more && self.paging_strategy == PagingStrategy::AllOnOnePage {
            PagingStrategy::ScrollDownToLoadMore
        } else {
            self.paging_strategy
        }
    }

    pub fn missing_requirements(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.selector.trim().is_empty() {
            missing.push("event selector");
        }
        if self.name.is_empty() {
            missing.push("name rule");
        }
        if self.date.rule.is_empty() {
            missing.push("date rule");
        }
        let needs_next = self.effective_strategy().needs_next_page_selector();
        if needs_next
            && self
                .next_page_selector
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            missing.push("next page selector");
        }
        missing
    }
}

/// Deduplication key shared across pages and runs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub venue: String,
    pub url_or_name: String,
    pub date: NaiveDate,
}

impl EventKey {
    pub fn new(venue: &str, url: Option<&str>, name: &str, date: NaiveDate) -> Self {
        let url_or_name = url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(name)
            .to_string();
        Self {
            venue: venue.to_string(),
            url_or_name,
            date,
        }
    }

    /// Stable hex digest: venue|url-or-name|date.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.venue.as_bytes());
        hasher.update(b"|");
        hasher.update(self.url_or_name.as_bytes());
        hasher.update(b"|");
        hasher.update(self.date.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Event {
    pub id: String, // EventKey::digest
    pub name: String,
    pub date: NaiveDate,
    pub sub_title: Option<String>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub venue: String,
    pub stage: Option<String>,
    pub door_time: Option<NaiveTime>,
    pub start_time: Option<NaiveTime>,
    pub presale_price: Option<String>,
    pub door_price: Option<String>,
    pub price_min_cents: Option<i64>,
    pub price_max_cents: Option<i64>,
    pub url: Option<String>,
    pub ticket_url: Option<String>,
    pub image_url: Option<String>,
    pub scraped: DateTime<Utc>,
}

impl Event {
    pub fn key(&self) -> EventKey {
        EventKey::new(&self.venue, self.url.as_deref(), &self.name, self.date)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}
