//! Awaitable wrapper around the event-driven browser automation facade.
//!
//! The facade reports results through [`AutomationEvents`]. The driver arms
//! a one-shot listener before each command and disarms it afterwards, so an
//! event can complete at most the one request that was in flight.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{Result, ScrapeError};
use crate::models::Venue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResult {
    pub url: String,
    pub status: Option<u16>,
    pub reason: String,
}

impl std::fmt::Display for NavigationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {status})", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

#[derive(Debug)]
enum AutomationEvent {
    HtmlLoaded(Option<String>),
    ErrorLoading(NavigationResult),
}

/// Callback handle handed to the facade.
#[derive(Clone, Default)]
pub struct AutomationEvents {
    pending: Arc<Mutex<Option<oneshot::Sender<AutomationEvent>>>>,
}

impl AutomationEvents {
    /// `None` means the action finished without changing the page.
    pub fn html_with_events_loaded(&self, html: Option<String>) {
        self.fire(AutomationEvent::HtmlLoaded(html));
    }

    pub fn error_loading(&self, result: NavigationResult) {
        self.fire(AutomationEvent::ErrorLoading(result));
    }

    pub fn has_listener(&self) -> bool {
        self.slot().is_some()
    }

    fn slot(&self) -> MutexGuard<'_, Option<oneshot::Sender<AutomationEvent>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fire(&self, event: AutomationEvent) {
        let listener = self.slot().take();
        match listener {
            Some(sender) => {
                if sender.send(event).is_err() {
                    tracing::debug!("automation result arrived after its request gave up");
                }
            }
            None => tracing::debug!("dropping automation event with no pending request"),
        }
    }

    fn listen(&self) -> oneshot::Receiver<AutomationEvent> {
        let (sender, receiver) = oneshot::channel();
        *self.slot() = Some(sender);
        receiver
    }

    fn detach(&self) {
        self.slot().take();
    }
}

/// The live browser session, driven only through this facade.
pub trait BrowserAutomation: Send {
    fn attach(&mut self, events: AutomationEvents);
    fn url(&self) -> Option<String>;
    fn set_url(&mut self, url: &str);
    fn click_element_to_load_more(&mut self, selector: &str);
    fn click_element_to_load_different(&mut self, selector: &str);
    fn scroll_down_to_load_more(&mut self);
}

/// Creates one exclusively-owned session per venue scrape.
pub trait AutomationFactory: Send + Sync {
    fn create(&self, venue: &Venue) -> Result<Box<dyn BrowserAutomation>>;
}

/// Factory for deployments without a browser backend.
pub struct NoAutomation;

impl AutomationFactory for NoAutomation {
    fn create(&self, venue: &Venue) -> Result<Box<dyn BrowserAutomation>> {
        Err(ScrapeError::AutomationUnavailable(format!(
            "{} needs a browser session but no automation backend is configured",
            venue.name
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationOutcome {
    Html(String),
    NoChange,
    TimedOut,
}

pub struct AutomationDriver {
    session: Box<dyn BrowserAutomation>,
    events: AutomationEvents,
}

impl AutomationDriver {
    pub fn new(mut session: Box<dyn BrowserAutomation>) -> Self {
        let events = AutomationEvents::default();
        session.attach(events.clone());
        Self { session, events }
    }

    pub fn url(&self) -> Option<String> {
        self.session.url()
    }

    pub async fn navigate(&mut self, url: &str, wait: Duration) -> Result<AutomationOutcome> {
        self.request(url, wait, |session| session.set_url(url)).await
    }

    pub async fn click_more(&mut self, selector: &str, wait: Duration) -> Result<AutomationOutcome> {
        let url = self.url().unwrap_or_default();
        self.request(&url, wait, |session| {
            session.click_element_to_load_more(selector)
        })
        .await
    }

    pub async fn click_different(
        &mut self,
        selector: &str,
        wait: Duration,
    ) -> Result<AutomationOutcome> {
        let url = self.url().unwrap_or_default();
        self.request(&url, wait, |session| {
            session.click_element_to_load_different(selector)
        })
        .await
    }

    pub async fn scroll(&mut self, wait: Duration) -> Result<AutomationOutcome> {
        let url = self.url().unwrap_or_default();
        self.request(&url, wait, |session| session.scroll_down_to_load_more())
            .await
    }

    /// `&mut self` keeps a single request in flight per session.
    async fn request<F>(&mut self, url: &str, wait: Duration, command: F) -> Result<AutomationOutcome>
    where
        F: FnOnce(&mut Box<dyn BrowserAutomation>),
    {
        let receiver = self.events.listen();
        command(&mut self.session);
        let outcome = match tokio::time::timeout(wait, receiver).await {
            Ok(Ok(AutomationEvent::HtmlLoaded(Some(html)))) => Ok(AutomationOutcome::Html(html)),
            Ok(Ok(AutomationEvent::HtmlLoaded(None))) => Ok(AutomationOutcome::NoChange),
            Ok(Ok(AutomationEvent::ErrorLoading(result))) => Err(ScrapeError::Navigation {
                url: if result.url.is_empty() {
                    url.to_string()
                } else {
                    result.url.clone()
                },
                result: result.to_string(),
            }),
            Ok(Err(_)) => Err(ScrapeError::AutomationUnavailable(
                "automation session closed before responding".to_string(),
            )),
            Err(_) => Ok(AutomationOutcome::TimedOut),
        };
        self.events.detach();
        outcome
    }
}

impl Drop for AutomationDriver {
    fn drop(&mut self) {
        self.events.detach();
        tracing::debug!("released automation session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers each command synchronously with the next scripted event.
    struct Scripted {
        events: Option<AutomationEvents>,
        url: Option<String>,
        replies: Vec<Option<AutomationEvent>>,
    }

    impl Scripted {
        fn reply(&mut self) {
            if self.replies.is_empty() {
                return;
            }
            if let (Some(events), Some(reply)) = (&self.events, self.replies.remove(0)) {
                match reply {
                    AutomationEvent::HtmlLoaded(html) => events.html_with_events_loaded(html),
                    AutomationEvent::ErrorLoading(result) => events.error_loading(result),
                }
            }
        }
    }

    impl BrowserAutomation for Scripted {
        fn attach(&mut self, events: AutomationEvents) {
            self.events = Some(events);
        }
        fn url(&self) -> Option<String> {
            self.url.clone()
        }
        fn set_url(&mut self, url: &str) {
            self.url = Some(url.to_string());
            self.reply();
        }
        fn click_element_to_load_more(&mut self, _selector: &str) {
            self.reply();
        }
        fn click_element_to_load_different(&mut self, _selector: &str) {
            self.reply();
        }
        fn scroll_down_to_load_more(&mut self) {
            self.reply();
        }
    }

    fn driver(replies: Vec<Option<AutomationEvent>>) -> AutomationDriver {
        AutomationDriver::new(Box::new(Scripted {
            events: None,
            url: None,
            replies,
        }))
    }

    const WAIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn resolves_each_request_once() {
        let mut driver = driver(vec![
            Some(AutomationEvent::HtmlLoaded(Some("<p>1</p>".into()))),
            Some(AutomationEvent::HtmlLoaded(None)),
        ]);
        assert_eq!(
            driver.navigate("https://venue.test/", WAIT).await.unwrap(),
            AutomationOutcome::Html("<p>1</p>".into())
        );
        assert_eq!(
            driver.click_more(".more", WAIT).await.unwrap(),
            AutomationOutcome::NoChange
        );
        assert!(!driver.events.has_listener());
    }

    #[tokio::test]
    async fn silent_session_times_out() {
        let mut driver = driver(vec![None]);
        assert_eq!(driver.scroll(WAIT).await.unwrap(), AutomationOutcome::TimedOut);
        assert!(!driver.events.has_listener());

        // a late event after the timeout is discarded
        driver.events.html_with_events_loaded(Some("late".into()));
        assert!(!driver.events.has_listener());
    }

    #[tokio::test]
    async fn navigation_errors_surface() {
        let mut driver = driver(vec![Some(AutomationEvent::ErrorLoading(NavigationResult {
            url: String::new(),
            status: Some(503),
            reason: "service unavailable".into(),
        }))]);
        let err = driver
            .navigate("https://venue.test/program", WAIT)
            .await
            .unwrap_err();
        match err {
            ScrapeError::Navigation { url, result } => {
                assert_eq!(url, "https://venue.test/program");
                assert_eq!(result, "service unavailable (status 503)");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_backend_is_reported() {
        let venue: Venue = serde_json::from_str(
            r#"{ "name": "Neurolux", "program_url": "https://neurolux.com", "event_scrape_job": {} }"#,
        )
        .unwrap();
        assert!(matches!(
            NoAutomation.create(&venue),
            Err(ScrapeError::AutomationUnavailable(_))
        ));
    }
}
