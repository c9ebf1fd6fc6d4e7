//! Field extraction rules compiled once per venue scrape and evaluated
//! against each candidate element.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use regex::Regex;

use super::base;
use crate::dom::{Element, Selector};
use crate::error::{Result, RuleDescription, ScrapeError};
use crate::models::{DateScrapeJob, Event, EventKey, EventScrapeJob, FilterPattern, ScrapeJob};

#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: ScrapeJob,
    selector: Option<Selector>,
    pattern: Option<Regex>,
}

impl CompiledRule {
    /// An empty selector targets the candidate element itself.
    pub fn compile(rule: &ScrapeJob) -> Result<Self> {
        let selector = if rule.is_empty() {
            None
        } else {
            Some(Selector::parse(&rule.selector)?)
        };
        let pattern = match rule.match_pattern.as_deref().filter(|p| !p.is_empty()) {
            Some(pattern) => Some(Regex::new(pattern).map_err(|err| ScrapeError::Selector {
                selector: pattern.to_string(),
                reason: err.to_string(),
            })?),
            None => None,
        };
        Ok(Self {
            rule: rule.clone(),
            selector,
            pattern,
        })
    }

    pub fn description(&self) -> RuleDescription {
        RuleDescription {
            selector: self.rule.selector.clone(),
            attribute: self.rule.attribute.clone(),
            pattern: self.rule.match_pattern.clone(),
        }
    }

    fn target<'a>(&self, element: &Element<'a>) -> Option<Element<'a>> {
        match &self.selector {
            Some(selector) => element.query_selector(selector),
            None => Some(*element),
        }
    }

    /// Normalized value before the match pattern is applied.
    pub fn raw_value(&self, element: &Element<'_>) -> Option<String> {
        let target = self.target(element)?;
        let raw = match self.rule.attribute.as_deref() {
            Some(attribute) => target.attribute(attribute)?.to_string(),
            None if self.rule.ignore_nested_text => target.own_text(),
            None => target.text_content(),
        };
        base::non_empty(base::clean_text(&raw))
    }

    /// `None` when nothing matches; a pattern that misses keeps the raw value.
    pub fn extract(&self, element: &Element<'_>) -> Option<String> {
        let value = self.raw_value(element)?;
        let Some(pattern) = &self.pattern else {
            return Some(value);
        };
        let narrowed = pattern
            .find(&value)
            .map(|m| m.as_str().trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        Some(narrowed.unwrap_or(value))
    }

    pub fn extract_url(&self, element: &Element<'_>) -> Option<String> {
        self.extract(element)
            .map(|value| element.resolve_url(&value).unwrap_or(value))
    }
}

#[derive(Debug, Clone)]
pub struct CompiledDateRule {
    rule: CompiledRule,
    format: Option<String>,
    culture: Option<String>,
}

impl CompiledDateRule {
    pub fn compile(job: &DateScrapeJob) -> Result<Self> {
        Ok(Self {
            rule: CompiledRule::compile(&job.rule)?,
            format: job.format.clone().filter(|f| !f.trim().is_empty()),
            culture: job.culture.clone().filter(|c| !c.trim().is_empty()),
        })
    }

    pub fn extract(&self, element: &Element<'_>, today: NaiveDate) -> Result<Option<NaiveDate>> {
        let Some(value) = self.rule.extract(element) else {
            return Ok(None);
        };
        base::parse_date(&value, self.format.as_deref(), self.culture.as_deref(), today)
            .map(Some)
            .ok_or_else(|| ScrapeError::Extraction {
                rule: self.rule.description(),
                reason: format!(
                    "unparsable date (format {}, culture {})",
                    self.format.as_deref().unwrap_or("<fallback>"),
                    self.culture.as_deref().unwrap_or("<invariant>")
                ),
                raw: value,
            })
    }
}

#[derive(Debug, Clone)]
struct CompiledFilter {
    rule: CompiledRule,
    pattern: FilterPattern,
}

#[derive(Debug, Clone)]
pub struct CompiledJob {
    pub selector: Selector,
    pub next_page: Option<(String, Selector)>,
    pub name: CompiledRule,
    pub date: CompiledDateRule,
    url: Option<CompiledRule>,
    filter: Option<CompiledFilter>,
    sub_title: Option<CompiledRule>,
    description: Option<CompiledRule>,
    genres: Option<CompiledRule>,
    stage: Option<CompiledRule>,
    door_time: Option<CompiledRule>,
    start_time: Option<CompiledRule>,
    presale_price: Option<CompiledRule>,
    door_price: Option<CompiledRule>,
    ticket_url: Option<CompiledRule>,
    image_url: Option<CompiledRule>,
}

fn compile_optional(rule: &Option<ScrapeJob>) -> Result<Option<CompiledRule>> {
    rule.as_ref()
        .filter(|r| !r.is_empty() || r.attribute.is_some())
        .map(CompiledRule::compile)
        .transpose()
}

/// Name and date of a candidate, the minimum for it to become an event.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub date: NaiveDate,
    pub url: Option<String>,
}

impl CompiledJob {
    pub fn compile(job: &EventScrapeJob) -> Result<Self> {
        let next_page = job
            .next_page_selector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|raw| Selector::parse(raw).map(|selector| (raw.to_string(), selector)))
            .transpose()?;
        let filter = job
            .filter
            .as_ref()
            .map(|filter| {
                CompiledRule::compile(&filter.rule).map(|rule| CompiledFilter {
                    rule,
                    pattern: filter.pattern.clone(),
                })
            })
            .transpose()?;
        Ok(Self {
            selector: Selector::parse(&job.selector)?,
            next_page,
            name: CompiledRule::compile(&job.name)?,
            date: CompiledDateRule::compile(&job.date)?,
            url: compile_optional(&job.url)?,
            filter,
            sub_title: compile_optional(&job.sub_title)?,
            description: compile_optional(&job.description)?,
            genres: compile_optional(&job.genres)?,
            stage: compile_optional(&job.stage)?,
            door_time: compile_optional(&job.door_time)?,
            start_time: compile_optional(&job.start_time)?,
            presale_price: compile_optional(&job.presale_price)?,
            door_price: compile_optional(&job.door_price)?,
            ticket_url: compile_optional(&job.ticket_url)?,
            image_url: compile_optional(&job.image_url)?,
        })
    }

    /// `Ok(None)` marks the candidate unscrapable (name or date absent).
    pub fn identify(&self, element: &Element<'_>, today: NaiveDate) -> Result<Option<Identity>> {
        let Some(name) = self.name.extract(element) else {
            return Ok(None);
        };
        let Some(date) = self.date.extract(element, today)? else {
            return Ok(None);
        };
        let url = self.url.as_ref().and_then(|rule| rule.extract_url(element));
        Ok(Some(Identity { name, date, url }))
    }

    pub fn passes_filter(&self, element: &Element<'_>) -> bool {
        match &self.filter {
            Some(filter) => filter
                .rule
                .extract(element)
                .is_some_and(|value| filter.pattern.matches(&value)),
            None => true,
        }
    }

    /// Builds the full event; optional fields that fail to parse are
    /// reported alongside and left empty.
    pub fn build_event(
        &self,
        element: &Element<'_>,
        identity: Identity,
        venue: &str,
        scraped: DateTime<Utc>,
    ) -> (Event, Vec<ScrapeError>) {
        let mut errors = Vec::new();
        let text = |rule: &Option<CompiledRule>| rule.as_ref().and_then(|r| r.extract(element));
        let link = |rule: &Option<CompiledRule>| rule.as_ref().and_then(|r| r.extract_url(element));
        let mut time = |rule: &Option<CompiledRule>| -> Option<NaiveTime> {
            let rule = rule.as_ref()?;
            let value = rule.extract(element)?;
            let parsed = base::parse_time(&value);
            if parsed.is_none() {
                errors.push(ScrapeError::Extraction {
                    rule: rule.description(),
                    raw: value,
                    reason: "unparsable time".to_string(),
                });
            }
            parsed
        };
        let door_time = time(&self.door_time);
        let start_time = time(&self.start_time);

        let presale_price = text(&self.presale_price);
        let door_price = text(&self.door_price);
        let prices = base::price_cents(
            &[presale_price.as_deref(), door_price.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>(),
        );

        let key = EventKey::new(venue, identity.url.as_deref(), &identity.name, identity.date);
        let event = Event {
            id: key.digest(),
            name: identity.name,
            date: identity.date,
            sub_title: text(&self.sub_title),
            description: text(&self.description),
            genres: text(&self.genres)
                .map(|g| base::split_genres(&g))
                .unwrap_or_default(),
            venue: venue.to_string(),
            stage: text(&self.stage),
            door_time,
            start_time,
            presale_price,
            door_price,
            price_min_cents: prices.iter().min().copied(),
            price_max_cents: prices.iter().max().copied(),
            url: identity.url,
            ticket_url: link(&self.ticket_url),
            image_url: link(&self.image_url),
            scraped,
        };
        (event, errors)
    }
}
