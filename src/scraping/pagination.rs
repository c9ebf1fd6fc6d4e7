//! Decides, round by round, whether a venue's listing has more to offer and
//! how to ask for it.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use super::context::PageRequest;
use crate::models::{EventScrapeJob, PagingStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PagingState {
    Initial,
    Loaded,
    Continuing,
    Exhausted,
    Failed,
}

/// Per-round bookkeeping produced by the orchestrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub selected: usize,
    pub unscrapable: usize,
    pub failed: usize,
    pub already_scraped: usize,
    pub past: usize,
    pub filtered: usize,
    pub new_relevant: usize,
    /// Candidates whose dedup key first appeared this round, relevant or not.
    pub new_scraped: usize,
}

/// What the loaded page says about its next page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSignals {
    pub next_present: bool,
    pub next_href_raw: Option<String>,
    pub next_href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    SinglePage,
    NextPageAbsent,
    NoNextLink,
    SelfAnchor,
    AlreadyVisited(String),
    NothingNew,
    NoRelevantEvents,
    CountStable(usize),
    NoChange,
    MaxRounds(usize),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::SinglePage => f.write_str("all events are on one page"),
            StopReason::NextPageAbsent => f.write_str("next page element is gone"),
            StopReason::NoNextLink => f.write_str("next page link has no target"),
            StopReason::SelfAnchor => f.write_str("next page link points to the page itself"),
            StopReason::AlreadyVisited(url) => write!(f, "{url} was already visited"),
            StopReason::NothingNew => f.write_str("page contained only already scraped events"),
            StopReason::NoRelevantEvents => {
                f.write_str("no new relevant events after one extra attempt")
            }
            StopReason::CountStable(count) => {
                write!(f, "event count stayed at {count} after scrolling")
            }
            StopReason::NoChange => f.write_str("no more content was loaded"),
            StopReason::MaxRounds(rounds) => write!(f, "gave up after {rounds} rounds"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue(PageRequest),
    Stop(StopReason),
}

#[derive(Debug, Clone)]
enum Pager {
    AllOnOnePage,
    ClickMore {
        selector: String,
    },
    ClickDifferent {
        selector: String,
    },
    NavigateLink {
        visited: HashSet<String>,
        extra_attempt_used: bool,
    },
    Scroll {
        last_count: Option<usize>,
    },
}

impl Pager {
    fn next(&mut self, report: &RoundReport, signals: &PageSignals) -> Decision {
        match self {
            Pager::AllOnOnePage => Decision::Stop(StopReason::SinglePage),
            Pager::ClickMore { selector } => {
                if signals.next_present {
                    Decision::Continue(PageRequest::ClickMore(selector.clone()))
                } else {
                    Decision::Stop(StopReason::NextPageAbsent)
                }
            }
            Pager::ClickDifferent { selector } => {
                if signals.next_present {
                    Decision::Continue(PageRequest::ClickDifferent(selector.clone()))
                } else {
                    Decision::Stop(StopReason::NextPageAbsent)
                }
            }
            Pager::NavigateLink {
                visited,
                extra_attempt_used,
            } => {
                let (Some(raw), Some(href)) = (&signals.next_href_raw, &signals.next_href) else {
                    return Decision::Stop(StopReason::NoNextLink);
                };
                if raw.trim().starts_with('#') {
                    return Decision::Stop(StopReason::SelfAnchor);
                }
                if visited.contains(href) {
                    return Decision::Stop(StopReason::AlreadyVisited(href.clone()));
                }
                if report.new_relevant > 0 {
                    *extra_attempt_used = false;
                } else if report.new_scraped == 0 {
                    return Decision::Stop(StopReason::NothingNew);
                } else if *extra_attempt_used {
                    return Decision::Stop(StopReason::NoRelevantEvents);
                } else {
                    // seasonal listings may only show the current month
                    *extra_attempt_used = true;
                }
                visited.insert(href.clone());
                Decision::Continue(PageRequest::Navigate(href.clone()))
            }
            Pager::Scroll { last_count } => {
                if *last_count == Some(report.selected) {
                    Decision::Stop(StopReason::CountStable(report.selected))
                } else {
                    *last_count = Some(report.selected);
                    Decision::Continue(PageRequest::Scroll)
                }
            }
        }
    }
}

/// Drives one venue's scrape from its first load to exhaustion or failure.
#[derive(Debug, Clone)]
pub struct PaginationController {
    strategy: PagingStrategy,
    pager: Pager,
    state: PagingState,
    rounds: usize,
    max_rounds: usize,
}

impl PaginationController {
    pub fn new(job: &EventScrapeJob, start_url: &str, max_rounds: usize) -> Self {
        let strategy = job.effective_strategy();
        let selector = job
            .next_page_selector
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        let pager = match strategy {
            PagingStrategy::AllOnOnePage => Pager::AllOnOnePage,
            PagingStrategy::ClickElementToLoadMore => Pager::ClickMore { selector },
            PagingStrategy::ClickElementToLoadDifferent => Pager::ClickDifferent { selector },
            PagingStrategy::NavigateLinkToLoadMore | PagingStrategy::NavigateLinkToLoadDifferent => {
                Pager::NavigateLink {
                    visited: HashSet::from([start_url.to_string()]),
                    extra_attempt_used: false,
                }
            }
            PagingStrategy::ScrollDownToLoadMore => Pager::Scroll { last_count: None },
        };
        Self {
            strategy,
            pager,
            state: PagingState::Initial,
            rounds: 0,
            max_rounds: max_rounds.max(1),
        }
    }

    pub fn strategy(&self) -> PagingStrategy {
        self.strategy
    }

    pub fn state(&self) -> PagingState {
        self.state
    }

    pub fn loaded(&mut self) {
        self.state = PagingState::Loaded;
    }

    pub fn after_round(&mut self, report: &RoundReport, signals: &PageSignals) -> Decision {
        self.rounds += 1;
        let decision = match self.pager.next(report, signals) {
            Decision::Continue(_) if self.rounds >= self.max_rounds => {
                Decision::Stop(StopReason::MaxRounds(self.rounds))
            }
            decision => decision,
        };
        self.state = match decision {
            Decision::Continue(_) => PagingState::Continuing,
            Decision::Stop(_) => PagingState::Exhausted,
        };
        decision
    }

    /// A paging round that timed out or changed nothing ends the scrape
    /// normally.
    pub fn mark_soft_end(&mut self) -> StopReason {
        self.state = PagingState::Exhausted;
        StopReason::NoChange
    }

    pub fn mark_failed(&mut self) {
        self.state = PagingState::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const START: &str = "https://revolutionboise.com/events";

    fn job(strategy: PagingStrategy, next: Option<&str>) -> EventScrapeJob {
        EventScrapeJob {
            selector: ".event".into(),
            paging_strategy: strategy,
            next_page_selector: next.map(String::from),
            ..EventScrapeJob::default()
        }
    }

    fn link(href: &str) -> PageSignals {
        PageSignals {
            next_present: true,
            next_href_raw: Some(href.to_string()),
            next_href: Some(format!("{START}{href}")),
        }
    }

    fn report(new_relevant: usize, new_scraped: usize) -> RoundReport {
        RoundReport {
            selected: new_scraped,
            new_relevant,
            new_scraped,
            ..RoundReport::default()
        }
    }

    #[test]
    fn single_page_stops_after_first_round() {
        let mut pager = PaginationController::new(&job(PagingStrategy::AllOnOnePage, None), START, 50);
        assert_eq!(pager.state(), PagingState::Initial);
        pager.loaded();
        assert_eq!(
            pager.after_round(&report(10, 10), &PageSignals::default()),
            Decision::Stop(StopReason::SinglePage)
        );
        assert_eq!(pager.state(), PagingState::Exhausted);
    }

    #[test]
    fn clicking_continues_while_next_element_exists() {
        let mut pager = PaginationController::new(
            &job(PagingStrategy::ClickElementToLoadMore, Some(" .load-more ")),
            START,
            50,
        );
        let present = PageSignals {
            next_present: true,
            ..PageSignals::default()
        };
        assert_eq!(
            pager.after_round(&report(0, 0), &present),
            Decision::Continue(PageRequest::ClickMore(".load-more".into()))
        );
        assert_eq!(pager.state(), PagingState::Continuing);
        assert_eq!(
            pager.after_round(&report(3, 3), &PageSignals::default()),
            Decision::Stop(StopReason::NextPageAbsent)
        );
    }

    #[test]
    fn click_different_uses_its_own_request() {
        let mut pager = PaginationController::new(
            &job(PagingStrategy::ClickElementToLoadDifferent, Some(".tab.next")),
            START,
            50,
        );
        let present = PageSignals {
            next_present: true,
            ..PageSignals::default()
        };
        assert_eq!(
            pager.after_round(&report(1, 1), &present),
            Decision::Continue(PageRequest::ClickDifferent(".tab.next".into()))
        );
    }

    #[test]
    fn navigation_allows_exactly_one_extra_attempt_after_past_page() {
        let mut pager = PaginationController::new(
            &job(PagingStrategy::NavigateLinkToLoadDifferent, Some("a.next")),
            START,
            50,
        );
        // everything on the first page is in the past
        assert_eq!(
            pager.after_round(&report(0, 10), &link("?page=2")),
            Decision::Continue(PageRequest::Navigate(format!("{START}?page=2")))
        );
        assert_eq!(
            pager.after_round(&report(0, 10), &link("?page=3")),
            Decision::Stop(StopReason::NoRelevantEvents)
        );
    }

    #[test]
    fn relevant_events_reset_the_extra_attempt() {
        let mut pager = PaginationController::new(
            &job(PagingStrategy::NavigateLinkToLoadMore, Some("a.next")),
            START,
            50,
        );
        assert!(matches!(
            pager.after_round(&report(0, 5), &link("?page=2")),
            Decision::Continue(_)
        ));
        assert!(matches!(
            pager.after_round(&report(4, 5), &link("?page=3")),
            Decision::Continue(_)
        ));
        assert!(matches!(
            pager.after_round(&report(0, 5), &link("?page=4")),
            Decision::Continue(_)
        ));
        assert_eq!(
            pager.after_round(&report(0, 5), &link("?page=5")),
            Decision::Stop(StopReason::NoRelevantEvents)
        );
    }

    #[test]
    fn navigation_stops_on_dead_links() {
        let strategy = PagingStrategy::NavigateLinkToLoadDifferent;
        let mut missing = PaginationController::new(&job(strategy, Some("a.next")), START, 50);
        assert_eq!(
            missing.after_round(&report(2, 2), &PageSignals::default()),
            Decision::Stop(StopReason::NoNextLink)
        );

        let mut anchor = PaginationController::new(&job(strategy, Some("a.next")), START, 50);
        assert_eq!(
            anchor.after_round(&report(2, 2), &link("#")),
            Decision::Stop(StopReason::SelfAnchor)
        );

        let mut seen = PaginationController::new(&job(strategy, Some("a.next")), START, 50);
        let back_to_start = PageSignals {
            next_present: true,
            next_href_raw: Some("/events".into()),
            next_href: Some(START.into()),
        };
        assert_eq!(
            seen.after_round(&report(2, 2), &back_to_start),
            Decision::Stop(StopReason::AlreadyVisited(START.into()))
        );

        let mut stale = PaginationController::new(&job(strategy, Some("a.next")), START, 50);
        assert_eq!(
            stale.after_round(&report(0, 0), &link("?page=2")),
            Decision::Stop(StopReason::NothingNew)
        );
    }

    #[test]
    fn scrolling_stops_when_count_is_stable() {
        let mut pager =
            PaginationController::new(&job(PagingStrategy::ScrollDownToLoadMore, None), START, 50);
        let counts = [10, 20, 25, 25];
        let decisions: Vec<_> = counts
            .iter()
            .map(|&selected| {
                let report = RoundReport {
                    selected,
                    ..RoundReport::default()
                };
                pager.after_round(&report, &PageSignals::default())
            })
            .collect();
        assert_eq!(
            decisions,
            vec![
                Decision::Continue(PageRequest::Scroll),
                Decision::Continue(PageRequest::Scroll),
                Decision::Continue(PageRequest::Scroll),
                Decision::Stop(StopReason::CountStable(25)),
            ]
        );
    }

    #[test]
    fn legacy_scroll_flag_selects_scrolling() {
        let mut job = job(PagingStrategy::AllOnOnePage, None);
        job.scroll_down_to_load_more = true;
        let pager = PaginationController::new(&job, START, 50);
        assert_eq!(pager.strategy(), PagingStrategy::ScrollDownToLoadMore);
    }

    #[test]
    fn round_limit_caps_endless_listings() {
        let mut pager =
            PaginationController::new(&job(PagingStrategy::ScrollDownToLoadMore, None), START, 2);
        let first = RoundReport {
            selected: 1,
            ..RoundReport::default()
        };
        let second = RoundReport {
            selected: 2,
            ..RoundReport::default()
        };
        assert!(matches!(
            pager.after_round(&first, &PageSignals::default()),
            Decision::Continue(_)
        ));
        assert_eq!(
            pager.after_round(&second, &PageSignals::default()),
            Decision::Stop(StopReason::MaxRounds(2))
        );
    }

    #[test]
    fn failures_and_soft_ends_are_terminal_states() {
        let mut pager =
            PaginationController::new(&job(PagingStrategy::ScrollDownToLoadMore, None), START, 50);
        assert_eq!(pager.mark_soft_end(), StopReason::NoChange);
        assert_eq!(pager.state(), PagingState::Exhausted);
        pager.mark_failed();
        assert_eq!(pager.state(), PagingState::Failed);
    }
}
