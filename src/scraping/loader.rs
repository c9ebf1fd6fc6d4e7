use async_trait::async_trait;
use once_cell::sync::OnceCell;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::config::EngineConfig;
use crate::dom::Document;
use crate::error::{Result, ScrapeError};

/// Opens static (non-scripted) documents.
#[async_trait]
pub trait StaticLoader: Send + Sync {
    async fn open(&self, url: &str) -> Result<Document>;

    async fn open_response(&self, response: VirtualResponse) -> Result<Document>;

    /// Opens `url`, decoding the body with `encoding` instead of the charset
    /// the server announced.
    async fn open_with_encoding(&self, url: &str, encoding: Option<&str>) -> Result<Document> {
        let _ = encoding;
        self.open(url).await
    }
}

/// A response assembled in memory: content, address and headers.
#[derive(Debug, Clone, Default)]
pub struct VirtualResponse {
    address: String,
    content: Vec<u8>,
    headers: Vec<(String, String)>,
}

impl VirtualResponse {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replaces any announced charset with `label`.
    pub fn charset(mut self, label: &str) -> Self {
        let mime = self
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
            .and_then(|(_, value)| value.split(';').next())
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("text/html")
            .to_string();
        self.headers
            .retain(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
        self.headers
            .push((CONTENT_TYPE.to_string(), format!("{mime}; charset={label}")));
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Decodes the content per its content-type charset and parses it.
    pub async fn into_document(self) -> Result<Document> {
        let mut builder = http::Response::builder().status(200);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.body(self.content).map_err(|err| ScrapeError::Load {
            url: self.address.clone(),
            reason: format!("invalid virtual response: {err}"),
        })?;
        let text = reqwest::Response::from(response)
            .text()
            .await
            .map_err(|err| ScrapeError::Load {
                url: self.address.clone(),
                reason: err.to_string(),
            })?;
        Ok(Document::parse(&text, Some(&self.address)))
    }
}

static BROWSING_CONTEXT: OnceCell<Client> = OnceCell::new();

/// Process-wide HTTP client shared by every static load. The first caller's
/// configuration wins.
pub fn browsing_context(config: &EngineConfig) -> Result<&'static Client> {
    BROWSING_CONTEXT.get_or_try_init(|| {
        Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| ScrapeError::Load {
                url: "<client>".to_string(),
                reason: format!("unable to build http client: {err}"),
            })
    })
}

#[derive(Clone)]
pub struct HttpLoader {
    client: Client,
}

impl HttpLoader {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            client: browsing_context(config)?.clone(),
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ScrapeError::Load {
                url: url.to_string(),
                reason: format!("request failed: {err}"),
            })?;
        response.error_for_status().map_err(|err| ScrapeError::Load {
            url: url.to_string(),
            reason: format!("non-success status: {err}"),
        })
    }
}

#[async_trait]
impl StaticLoader for HttpLoader {
    async fn open(&self, url: &str) -> Result<Document> {
        let response = self.fetch(url).await?;
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|err| ScrapeError::Load {
            url: url.to_string(),
            reason: format!("unable to read response body: {err}"),
        })?;
        tracing::debug!(url = %final_url, bytes = body.len(), "loaded static document");
        Ok(Document::parse(&body, Some(&final_url)))
    }

    async fn open_response(&self, response: VirtualResponse) -> Result<Document> {
        response.into_document().await
    }

    async fn open_with_encoding(&self, url: &str, encoding: Option<&str>) -> Result<Document> {
        let Some(encoding) = encoding else {
            return self.open(url).await;
        };
        let response = self.fetch(url).await?;
        let mut virtual_response = VirtualResponse::new(response.url().to_string());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                virtual_response = virtual_response.header(name.as_str(), value);
            }
        }
        let bytes = response.bytes().await.map_err(|err| ScrapeError::Load {
            url: url.to_string(),
            reason: format!("unable to read response body: {err}"),
        })?;
        let virtual_response = virtual_response.content(bytes.to_vec()).charset(encoding);
        self.open_response(virtual_response).await
    }
}
