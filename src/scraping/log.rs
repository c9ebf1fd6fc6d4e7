use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Append-only trail of the decisions taken while scraping one venue.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScrapeLog {
    venue: String,
    entries: Vec<LogEntry>,
}

impl ScrapeLog {
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            entries: Vec::new(),
        }
    }

    pub fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(venue = %self.venue, "{message}");
        self.entries.push(LogEntry {
            at: Utc::now(),
            message,
        });
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(venue = %self.venue, "{message}");
        self.entries.push(LogEntry {
            at: Utc::now(),
            message,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }

    pub fn text(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} {}", e.at.format("%H:%M:%S%.3f"), e.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
