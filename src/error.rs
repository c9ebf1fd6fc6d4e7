use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Identifies the rule that produced an extraction error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDescription {
    pub selector: String,
    pub attribute: Option<String>,
    pub pattern: Option<String>,
}

impl std::fmt::Display for RuleDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "selector '{}'", self.selector)?;
        if let Some(attribute) = &self.attribute {
            write!(f, ", attribute '{attribute}'")?;
        }
        if let Some(pattern) = &self.pattern {
            write!(f, ", match '{pattern}'")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("extraction failed for {rule} on value '{raw}': {reason}")]
    Extraction {
        rule: RuleDescription,
        raw: String,
        reason: String,
    },

    #[error("invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },

    #[error("failed to load {url}: {reason}")]
    Load { url: String, reason: String },

    #[error("timed out after {seconds}s waiting for {url}")]
    Timeout { url: String, seconds: u64 },

    #[error("navigation to {url} failed: {result}")]
    Navigation { url: String, result: String },

    #[error("configuration error for venue '{venue}': {reason}")]
    Configuration { venue: String, reason: String },

    #[error("automation unavailable: {0}")]
    AutomationUnavailable(String),
}

impl From<reqwest::Error> for ScrapeError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        ScrapeError::Load {
            url,
            reason: err.to_string(),
        }
    }
}
