pub mod automation;
pub mod base;
pub mod browserless;
pub mod context;
pub mod extract;
pub mod loader;
pub mod log;
pub mod orchestrator;
pub mod pagination;

pub use automation::{
    AutomationDriver, AutomationEvents, AutomationFactory, AutomationOutcome, BrowserAutomation,
    NavigationResult, NoAutomation,
};
pub use browserless::{BrowserlessAutomation, BrowserlessFactory};
pub use context::{Loading, PageRequest, VenueScrapeContext};
pub use extract::{CompiledDateRule, CompiledJob, CompiledRule};
pub use loader::{browsing_context, HttpLoader, StaticLoader, VirtualResponse};
pub use log::{LogEntry, ScrapeLog};
pub use orchestrator::{ScrapeOutcome, Scraper};
pub use pagination::{
    Decision, PageSignals, PaginationController, PagingState, RoundReport, StopReason,
};
