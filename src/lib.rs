pub mod config;
pub mod dom;
pub mod error;
pub mod models;
pub mod scraping;

pub use config::{load_venues, EngineConfig};
pub use dom::{Document, Element, Node, Selector};
pub use error::{Result, ScrapeError};
pub use models::{
    DateScrapeJob, Event, EventFilter, EventKey, EventScrapeJob, FilterPattern, PagingStrategy,
    ScrapeJob, Venue,
};
pub use scraping::{ScrapeLog, ScrapeOutcome, Scraper};
