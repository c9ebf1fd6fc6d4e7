use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use tracing::instrument;

use super::automation::AutomationFactory;
use super::context::{PageRequest, VenueScrapeContext};
use super::extract::CompiledJob;
use super::loader::StaticLoader;
use super::log::ScrapeLog;
use super::pagination::{Decision, PageSignals, PaginationController, PagingState, RoundReport};
use crate::config::EngineConfig;
use crate::dom::Document;
use crate::error::ScrapeError;
use crate::models::{Event, EventKey, PagingStrategy, Venue};

/// Everything one venue's scrape produced. Events gathered before a failure
/// are kept.
#[derive(Debug)]
pub struct ScrapeOutcome {
    pub venue: String,
    pub events: Vec<Event>,
    pub errors: Vec<ScrapeError>,
    pub log: ScrapeLog,
    pub state: PagingState,
}

impl ScrapeOutcome {
    pub fn failed(&self) -> bool {
        self.state == PagingState::Failed
    }
}

pub struct Scraper {
    loader: Arc<dyn StaticLoader>,
    automation: Arc<dyn AutomationFactory>,
    config: EngineConfig,
    today: Option<NaiveDate>,
}

impl Scraper {
    pub fn new(
        loader: Arc<dyn StaticLoader>,
        automation: Arc<dyn AutomationFactory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            loader,
            automation,
            config,
            today: None,
        }
    }

    /// Pins the date events are compared against.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today_for(&self, venue: &Venue) -> NaiveDate {
        if let Some(today) = self.today {
            return today;
        }
        match venue.time_zone.as_deref().map(str::parse::<Tz>) {
            Some(Ok(tz)) => Utc::now().with_timezone(&tz).date_naive(),
            Some(Err(err)) => {
                tracing::warn!(venue = %venue.name, "ignoring time zone: {err}");
                Local::now().date_naive()
            }
            None => Local::now().date_naive(),
        }
    }

    /// Scrapes every venue concurrently; outcomes are in input order.
    pub async fn refresh_all(&self, venues: &mut [Venue]) -> Vec<ScrapeOutcome> {
        join_all(venues.iter_mut().map(|venue| self.scrape_venue(venue))).await
    }

    #[instrument(skip_all, fields(venue = %venue.name))]
    pub async fn scrape_venue(&self, venue: &mut Venue) -> ScrapeOutcome {
        let mut run = Run {
            venue: venue.name.clone(),
            today: self.today_for(venue),
            seen: HashSet::new(),
            events: Vec::new(),
            errors: Vec::new(),
            log: ScrapeLog::new(&venue.name),
        };

        let missing = venue.event_scrape_job.missing_requirements();
        if !missing.is_empty() {
            return run.misconfigured(format!("missing {}", missing.join(", ")));
        }
        let job = match CompiledJob::compile(&venue.event_scrape_job) {
            Ok(job) => job,
            Err(err) => return run.misconfigured(err.to_string()),
        };
        let mut pager = PaginationController::new(
            &venue.event_scrape_job,
            &venue.program_url,
            self.config.max_rounds,
        );
        let strategy = pager.strategy();
        if strategy.is_multi_page() {
            run.log.log(format!("paging by {strategy}"));
        }

        let mut context = match VenueScrapeContext::new(
            venue,
            self.loader.clone(),
            self.automation.as_ref(),
            &self.config,
        ) {
            Ok(context) => context,
            Err(err) => {
                run.log.warn(format!("cannot open {}: {err}", venue.program_url));
                run.errors.push(err);
                pager.mark_failed();
                return run.finish(strategy, pager.state());
            }
        };

        let mut request: Option<PageRequest> = None;
        loop {
            let loaded = match request.take() {
                None => context.load_first().await.map(Some),
                Some(next) => {
                    run.log.log(format!("trying to {next}"));
                    context.load_more_async(next).await
                }
            };
            let (report, signals) = {
                let document = match loaded {
                    Ok(Some(document)) => document,
                    Ok(None) => {
                        let reason = pager.mark_soft_end();
                        run.log.log(format!("stopped paging: {reason}"));
                        break;
                    }
                    Err(err) => {
                        run.log.warn(format!("loading {} failed: {err}", context.url()));
                        run.errors.push(err);
                        pager.mark_failed();
                        break;
                    }
                };
                pager.loaded();
                run.process_page(&document, &job)
            };
            match pager.after_round(&report, &signals) {
                Decision::Continue(next) => request = Some(next),
                Decision::Stop(reason) => {
                    if strategy.is_multi_page() {
                        run.log.log(format!("stopped paging: {reason}"));
                    }
                    break;
                }
            }
        }
        drop(context);

        let state = pager.state();
        if state == PagingState::Exhausted {
            venue.last_refreshed = Some(Utc::now());
        }
        run.finish(strategy, state)
    }
}

/// Accumulated state of one venue's scrape.
struct Run {
    venue: String,
    today: NaiveDate,
    seen: HashSet<EventKey>,
    events: Vec<Event>,
    errors: Vec<ScrapeError>,
    log: ScrapeLog,
}

impl Run {
    fn misconfigured(mut self, reason: String) -> ScrapeOutcome {
        let err = ScrapeError::Configuration {
            venue: self.venue.clone(),
            reason,
        };
        self.log.warn(format!("not scraping: {err}"));
        self.errors.push(err);
        ScrapeOutcome {
            venue: self.venue,
            events: self.events,
            errors: self.errors,
            log: self.log,
            state: PagingState::Initial,
        }
    }

    fn finish(mut self, strategy: PagingStrategy, state: PagingState) -> ScrapeOutcome {
        if strategy == PagingStrategy::AllOnOnePage {
            self.log
                .log(format!("found {} relevant events in total", self.events.len()));
        } else {
            self.log
                .log(format!("scraped {} events in total", self.seen.len()));
        }
        ScrapeOutcome {
            venue: self.venue,
            events: self.events,
            errors: self.errors,
            log: self.log,
            state,
        }
    }

    fn process_page(&mut self, document: &Document, job: &CompiledJob) -> (RoundReport, PageSignals) {
        let candidates = document.query_selector_all(&job.selector);
        let scraped = Utc::now();
        let mut report = RoundReport {
            selected: candidates.len(),
            ..RoundReport::default()
        };

        for candidate in &candidates {
            let identity = match job.identify(candidate, self.today) {
                Ok(Some(identity)) => identity,
                Ok(None) => {
                    report.unscrapable += 1;
                    continue;
                }
                Err(err) => {
                    tracing::debug!(venue = %self.venue, "candidate skipped: {err}");
                    report.failed += 1;
                    self.errors.push(err);
                    continue;
                }
            };

            let key = EventKey::new(&self.venue, identity.url.as_deref(), &identity.name, identity.date);
            if !self.seen.insert(key) {
                report.already_scraped += 1;
                continue;
            }
            report.new_scraped += 1;

            if identity.date < self.today {
                report.past += 1;
                continue;
            }
            if !job.passes_filter(candidate) {
                report.filtered += 1;
                continue;
            }

            let (event, problems) = job.build_event(candidate, identity, &self.venue, scraped);
            self.errors.extend(problems);
            self.events.push(event);
            report.new_relevant += 1;
        }

        self.log_round(&report);
        (report, next_page_signals(document, job))
    }

    fn log_round(&mut self, report: &RoundReport) {
        self.log.log(format!("found {} events", report.selected));
        if report.unscrapable > 0 {
            self.log.log(format!(
                "{} events could not be scraped (missing name or date)",
                report.unscrapable
            ));
        }
        if report.failed > 0 {
            self.log
                .warn(format!("{} events failed to extract", report.failed));
        }
        if report.already_scraped > 0 {
            self.log
                .log(format!("{} events already scraped", report.already_scraped));
        }
        if report.past > 0 {
            self.log.log(format!("{} events are in the past", report.past));
        }
        if report.filtered > 0 {
            self.log.log(format!("{} events filtered out", report.filtered));
        }
        self.log
            .log(format!("{} new relevant events", report.new_relevant));
    }
}

fn next_page_signals(document: &Document, job: &CompiledJob) -> PageSignals {
    let Some((_, selector)) = &job.next_page else {
        return PageSignals::default();
    };
    let Some(next) = document.query_selector(selector) else {
        return PageSignals::default();
    };
    let raw = next
        .attribute("href")
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(String::from);
    let resolved = raw.as_deref().and_then(|href| next.resolve_url(href));
    PageSignals {
        next_present: true,
        next_href_raw: raw,
        next_href: resolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraping::automation::NoAutomation;
    use crate::scraping::loader::VirtualResponse;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl StaticLoader for Fixed {
        async fn open(&self, url: &str) -> crate::error::Result<Document> {
            Ok(Document::parse(self.0, Some(url)))
        }

        async fn open_response(&self, response: VirtualResponse) -> crate::error::Result<Document> {
            response.into_document().await
        }
    }

    fn scraper(html: &'static str) -> Scraper {
        Scraper::new(Arc::new(Fixed(html)), Arc::new(NoAutomation), EngineConfig::default())
            .with_today(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap())
    }

    fn venue(job: serde_json::Value) -> Venue {
        serde_json::from_value(serde_json::json!({
            "name": "Neurolux",
            "program_url": "https://neurolux.com/shows",
            "event_scrape_job": job,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn unparsable_date_is_collected_not_fatal() {
        let html = r#"
            <div class="show"><h2>Good Show</h2><time>2026-11-01</time></div>
            <div class="show"><h2>Bad Date</h2><time>sometime soon</time></div>
            <div class="show"><h2></h2><time>2026-11-02</time></div>
        "#;
        let mut venue = venue(serde_json::json!({
            "selector": ".show",
            "name": { "selector": "h2" },
            "date": { "selector": "time", "format": "%Y-%m-%d" },
        }));
        let outcome = scraper(html).scrape_venue(&mut venue).await;
        assert_eq!(outcome.state, PagingState::Exhausted);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(outcome.errors[0], ScrapeError::Extraction { .. }));
        assert!(outcome.log.contains("1 events failed to extract"));
        assert!(outcome.log.contains("1 events could not be scraped (missing name or date)"));
        assert!(venue.last_refreshed.is_some());
    }

    #[tokio::test]
    async fn incomplete_configuration_is_a_no_op() {
        let mut venue = venue(serde_json::json!({ "selector": ".show" }));
        let outcome = scraper("<div class='show'></div>").scrape_venue(&mut venue).await;
        assert_eq!(outcome.state, PagingState::Initial);
        assert!(outcome.events.is_empty());
        match &outcome.errors[..] {
            [ScrapeError::Configuration { reason, .. }] => {
                assert_eq!(reason, "missing name rule, date rule")
            }
            other => panic!("unexpected errors {other:?}"),
        }
        assert!(venue.last_refreshed.is_none());
    }

    #[tokio::test]
    async fn invalid_selector_is_a_configuration_error() {
        let mut venue = venue(serde_json::json!({
            "selector": "div[",
            "name": { "selector": "h2" },
            "date": { "selector": "time" },
        }));
        let outcome = scraper("").scrape_venue(&mut venue).await;
        assert!(matches!(
            outcome.errors[..],
            [ScrapeError::Configuration { .. }]
        ));
    }

    #[tokio::test]
    async fn filter_excludes_non_matching_events() {
        let html = r#"
            <div class="show"><h2>Metal Night</h2><span class="tag">metal</span><time>2026-11-01</time></div>
            <div class="show"><h2>Jazz Brunch</h2><span class="tag">jazz</span><time>2026-11-02</time></div>
        "#;
        let mut venue = venue(serde_json::json!({
            "selector": ".show",
            "filter": { "rule": { "selector": ".tag" }, "pattern": { "kind": "Keywords", "value": ["METAL", "punk"] } },
            "name": { "selector": "h2" },
            "date": { "selector": "time", "format": "%Y-%m-%d" },
        }));
        let outcome = scraper(html).scrape_venue(&mut venue).await;
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].name, "Metal Night");
        assert!(outcome.log.contains("1 events filtered out"));
        assert!(outcome.log.contains("found 1 relevant events in total"));
    }

    #[test]
    fn next_link_signals_resolve_relative_hrefs() {
        let doc = Document::parse(
            r#"<a class="next" href="?page=2">Next</a>"#,
            Some("https://neurolux.com/shows"),
        );
        let job = CompiledJob::compile(&crate::models::EventScrapeJob {
            selector: ".show".into(),
            next_page_selector: Some("a.next".into()),
            ..Default::default()
        })
        .unwrap();
        let signals = next_page_signals(&doc, &job);
        assert!(signals.next_present);
        assert_eq!(signals.next_href_raw.as_deref(), Some("?page=2"));
        assert_eq!(
            signals.next_href.as_deref(),
            Some("https://neurolux.com/shows?page=2")
        );
    }
}
