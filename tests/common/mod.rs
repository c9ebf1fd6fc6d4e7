#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use venue_scrape::scraping::{
    AutomationEvents, AutomationFactory, BrowserAutomation, NavigationResult, StaticLoader,
    VirtualResponse,
};
use venue_scrape::{Document, Result, ScrapeError, Venue};

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
}

pub fn date(offset_days: i64) -> NaiveDate {
    today() + chrono::Duration::days(offset_days)
}

/// One listing entry in the markup every scenario uses.
pub fn event_html(name: &str, date: NaiveDate) -> String {
    let slug = name.to_lowercase().replace(' ', "-");
    format!(
        r#"<div class="event"><h3>{name}</h3><time>{date}</time><a class="info" href="/events/{slug}">Info</a></div>"#
    )
}

pub fn listing(events: &[(String, NaiveDate)], next: Option<&str>) -> String {
    let mut html = String::from("<html><body><main>");
    for (name, date) in events {
        html.push_str(&event_html(name, *date));
    }
    if let Some(next) = next {
        html.push_str(next);
    }
    html.push_str("</main></body></html>");
    html
}

pub fn events(prefix: &str, dates: impl IntoIterator<Item = NaiveDate>) -> Vec<(String, NaiveDate)> {
    dates
        .into_iter()
        .enumerate()
        .map(|(i, date)| (format!("{prefix} {i}"), date))
        .collect()
}

pub fn venue(name: &str, program_url: &str, job: serde_json::Value) -> Venue {
    let mut base = serde_json::json!({
        "selector": ".event",
        "name": { "selector": "h3" },
        "date": { "selector": "time", "format": "%Y-%m-%d" },
        "url": { "selector": "a.info", "attribute": "href" },
    });
    if let (Some(base), Some(extra)) = (base.as_object_mut(), job.as_object()) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(serde_json::json!({
        "name": name,
        "program_url": program_url,
        "event_scrape_job": base,
    }))
    .unwrap()
}

/// Serves fixed pages by address and records every request.
#[derive(Default)]
pub struct PageServer {
    pages: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl PageServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), html.into());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl StaticLoader for PageServer {
    async fn open(&self, url: &str) -> Result<Document> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(html) => Ok(Document::parse(html, Some(url))),
            None => Err(ScrapeError::Load {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            }),
        }
    }

    async fn open_response(&self, response: VirtualResponse) -> Result<Document> {
        response.into_document().await
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Html(String),
    NoChange,
    Silent,
    Fail(u16),
}

/// Browser session that answers commands from a script, one step per command.
pub struct ScriptedBrowser {
    steps: Arc<Mutex<Vec<Step>>>,
    commands: Arc<Mutex<Vec<String>>>,
    url: Option<String>,
    events: Option<AutomationEvents>,
}

impl ScriptedBrowser {
    fn answer(&mut self, command: String) {
        self.commands.lock().unwrap().push(command);
        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.is_empty() {
                Step::NoChange
            } else {
                steps.remove(0)
            }
        };
        let Some(events) = &self.events else { return };
        match step {
            Step::Html(html) => events.html_with_events_loaded(Some(html)),
            Step::NoChange => events.html_with_events_loaded(None),
            Step::Silent => {}
            Step::Fail(status) => events.error_loading(NavigationResult {
                url: self.url.clone().unwrap_or_default(),
                status: Some(status),
                reason: "navigation failed".to_string(),
            }),
        }
    }
}

impl BrowserAutomation for ScriptedBrowser {
    fn attach(&mut self, events: AutomationEvents) {
        self.events = Some(events);
    }

    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    fn set_url(&mut self, url: &str) {
        self.url = Some(url.to_string());
        self.answer(format!("goto {url}"));
    }

    fn click_element_to_load_more(&mut self, selector: &str) {
        self.answer(format!("click more {selector}"));
    }

    fn click_element_to_load_different(&mut self, selector: &str) {
        self.answer(format!("click different {selector}"));
    }

    fn scroll_down_to_load_more(&mut self) {
        self.answer("scroll".to_string());
    }
}

#[derive(Clone, Default)]
pub struct ScriptedFactory {
    steps: Arc<Mutex<Vec<Step>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFactory {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps)),
            commands: Arc::default(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl AutomationFactory for ScriptedFactory {
    fn create(&self, _venue: &Venue) -> Result<Box<dyn BrowserAutomation>> {
        Ok(Box::new(ScriptedBrowser {
            steps: self.steps.clone(),
            commands: self.commands.clone(),
            url: None,
            events: None,
        }))
    }
}
