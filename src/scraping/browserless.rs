//! Browser automation backed by a Browserless server.
//!
//! Browserless is stateless over HTTP, so the session records the page
//! address and every UI action performed so far and replays them for each
//! round. Plain navigation uses the `/content` endpoint; rounds with actions
//! run a puppeteer script through `/function`.

use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use super::automation::{AutomationEvents, AutomationFactory, BrowserAutomation, NavigationResult};
use crate::config::EngineConfig;
use crate::dom;
use crate::error::{Result, ScrapeError};
use crate::models::Venue;

const REPLAY_SCRIPT: &str = r#"
module.exports = async ({ page, context }) => {
  const settle = () => new Promise((resolve) => setTimeout(resolve, context.settleMs));
  await page.goto(context.url, { waitUntil: 'networkidle2' });
  let before = await page.content();
  let changed = true;
  for (const action of context.actions) {
    before = await page.content();
    if (action.kind === 'scroll') {
      await page.evaluate(() => window.scrollTo(0, document.body.scrollHeight));
    } else {
      const target = action.syntax === 'xpath'
        ? await page.$('xpath/' + action.selector)
        : await page.$(action.selector);
      if (!target) { changed = false; break; }
      await target.click();
    }
    await settle();
  }
  const html = await page.content();
  if (!changed || (context.actions.length > 0 && html === before)) {
    return { data: '', type: 'text/html' };
  }
  return { data: html, type: 'text/html' };
};
"#;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum Syntax {
    Css,
    Xpath,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Action {
    ClickMore { selector: String, syntax: Syntax },
    ClickDifferent { selector: String, syntax: Syntax },
    Scroll,
}

/// Strips the XPath tag so puppeteer gets a bare expression.
fn untag(selector: &str) -> (String, Syntax) {
    match dom::xpath_expression(selector) {
        Some(expr) => (expr.to_string(), Syntax::Xpath),
        None => (selector.trim().to_string(), Syntax::Css),
    }
}

#[derive(Clone)]
struct Endpoint {
    client: reqwest::Client,
    base_url: reqwest::Url,
    token: Option<String>,
}

impl Endpoint {
    fn url(&self, path: &str) -> reqwest::Url {
        let mut endpoint = self.base_url.clone();
        if let Ok(mut segments) = endpoint.path_segments_mut() {
            segments.pop_if_empty().push(path);
        }
        if let Some(ref token) = self.token {
            endpoint.query_pairs_mut().append_pair("token", token);
        }
        endpoint
    }

    async fn post(&self, path: &str, body: serde_json::Value, page: &str) -> std::result::Result<String, NavigationResult> {
        let failure = |status: Option<u16>, reason: String| NavigationResult {
            url: page.to_string(),
            status,
            reason,
        };
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(|err| failure(None, format!("browserless request failed: {err}")))?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(failure(Some(status.as_u16()), message));
        }
        resp.text()
            .await
            .map_err(|err| failure(None, format!("browserless body unreadable: {err}")))
    }
}

pub struct BrowserlessAutomation {
    endpoint: Endpoint,
    settle: Duration,
    url: Option<String>,
    actions: Vec<Action>,
    events: Option<AutomationEvents>,
}

impl BrowserlessAutomation {
    fn run(&mut self) {
        let Some(events) = self.events.clone() else {
            tracing::warn!("browserless command issued before events were attached");
            return;
        };
        let Some(url) = self.url.clone() else {
            events.error_loading(NavigationResult {
                url: String::new(),
                status: None,
                reason: "no page address set".to_string(),
            });
            return;
        };
        let endpoint = self.endpoint.clone();
        let actions = self.actions.clone();
        let settle_ms = self.settle.as_millis() as u64;
        tokio::spawn(async move {
            let result = if actions.is_empty() {
                let body = json!({ "url": url, "gotoOptions": { "waitUntil": "networkidle2" } });
                endpoint.post("content", body, &url).await
            } else {
                let body = json!({
                    "code": REPLAY_SCRIPT,
                    "context": { "url": url, "actions": actions, "settleMs": settle_ms },
                });
                endpoint.post("function", body, &url).await
            };
            match result {
                Ok(html) if html.trim().is_empty() => events.html_with_events_loaded(None),
                Ok(html) => events.html_with_events_loaded(Some(html)),
                Err(result) => events.error_loading(result),
            }
        });
    }
}

impl BrowserAutomation for BrowserlessAutomation {
    fn attach(&mut self, events: AutomationEvents) {
        self.events = Some(events);
    }

    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    fn set_url(&mut self, url: &str) {
        self.url = Some(url.to_string());
        self.actions.clear();
        self.run();
    }

    fn click_element_to_load_more(&mut self, selector: &str) {
        let (selector, syntax) = untag(selector);
        self.actions.push(Action::ClickMore { selector, syntax });
        self.run();
    }

    fn click_element_to_load_different(&mut self, selector: &str) {
        let (selector, syntax) = untag(selector);
        self.actions.push(Action::ClickDifferent { selector, syntax });
        self.run();
    }

    fn scroll_down_to_load_more(&mut self) {
        self.actions.push(Action::Scroll);
        self.run();
    }
}

pub struct BrowserlessFactory {
    endpoint: Endpoint,
    settle: Duration,
}

impl BrowserlessFactory {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        let base = reqwest::Url::parse(base_url)
            .map_err(|err| ScrapeError::AutomationUnavailable(format!("browserless url '{base_url}': {err}")))?;
        if base.cannot_be_a_base() {
            return Err(ScrapeError::AutomationUnavailable(format!(
                "browserless url '{base_url}' has no path"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ScrapeError::AutomationUnavailable(format!("browserless client: {err}")))?;
        Ok(Self {
            endpoint: Endpoint {
                client,
                base_url: base,
                token: token.map(String::from),
            },
            settle: Duration::from_millis(1500),
        })
    }

    /// `None` when no Browserless server is configured.
    pub fn from_config(config: &EngineConfig) -> Result<Option<Self>> {
        config
            .browserless_url
            .as_deref()
            .map(|url| {
                Self::new(
                    url,
                    config.browserless_token.as_deref(),
                    config.first_load_timeout(),
                )
            })
            .transpose()
    }
}

impl AutomationFactory for BrowserlessFactory {
    fn create(&self, venue: &Venue) -> Result<Box<dyn BrowserAutomation>> {
        tracing::debug!(venue = %venue.name, "opening browserless session");
        Ok(Box::new(BrowserlessAutomation {
            endpoint: self.endpoint.clone(),
            settle: self.settle,
            url: None,
            actions: Vec::new(),
            events: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_token() {
        let factory = BrowserlessFactory::new("http://localhost:3000/", Some("abc"), Duration::from_secs(5))
            .expect("factory");
        assert_eq!(
            factory.endpoint.url("content").as_str(),
            "http://localhost:3000/content?token=abc"
        );
    }

    #[test]
    fn endpoint_encodes_token_and_keeps_base_path() {
        let factory = BrowserlessFactory::new("https://chrome.example.com/bl", Some("a b&c=d"), Duration::from_secs(5))
            .expect("factory");
        assert_eq!(
            factory.endpoint.url("function").as_str(),
            "https://chrome.example.com/bl/function?token=a+b%26c%3Dd"
        );
    }

    #[test]
    fn rejects_unusable_server_address() {
        assert!(BrowserlessFactory::new("not a url", None, Duration::from_secs(5)).is_err());
        assert!(BrowserlessFactory::new("mailto:ops@example.com", None, Duration::from_secs(5)).is_err());
    }

    #[test]
    fn actions_serialize_for_replay() {
        let actions = vec![
            Action::ClickMore {
                selector: "button.more".into(),
                syntax: Syntax::Css,
            },
            Action::Scroll,
        ];
        assert_eq!(
            serde_json::to_value(&actions).unwrap(),
            json!([
                { "kind": "click_more", "selector": "button.more", "syntax": "css" },
                { "kind": "scroll" }
            ])
        );
    }

    #[test]
    fn xpath_clicks_are_sent_untagged() {
        let factory = BrowserlessFactory::new("http://localhost:3000", None, Duration::from_secs(5))
            .expect("factory");
        let mut session = BrowserlessAutomation {
            endpoint: factory.endpoint.clone(),
            settle: factory.settle,
            url: None,
            actions: Vec::new(),
            events: None,
        };
        // no events attached, so nothing is sent
        session.click_element_to_load_more("xpath://button[@class='more']");
        session.click_element_to_load_different(" .pager a.next ");
        assert_eq!(
            serde_json::to_value(&session.actions).unwrap(),
            json!([
                { "kind": "click_more", "selector": "//button[@class='more']", "syntax": "xpath" },
                { "kind": "click_different", "selector": ".pager a.next", "syntax": "css" }
            ])
        );
    }

    #[test]
    fn unconfigured_browserless_yields_none() {
        assert!(BrowserlessFactory::from_config(&EngineConfig::default())
            .unwrap()
            .is_none());
    }
}
