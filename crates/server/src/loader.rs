//! Fetches tutorial documents over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use chiron_types::{Document, DocumentError};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("invalid content url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("no document found at {0}")]
    NotFound(Url),
    #[error("request to {url} failed: {source}")]
    Http {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}")]
    Status { url: Url, status: StatusCode },
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Source of tutorial documents.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, content_url: &str) -> Result<Document, LoaderError>;
}

/// Resolves a content URL as submitted by the client. Bare hosts are fetched over plain HTTP.
pub fn resolve_content_url(raw: &str) -> Result<Url, LoaderError> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") { raw.to_string() } else { format!("http://{raw}") };
    Url::parse(&candidate).map_err(|source| LoaderError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

/// [`DocumentLoader`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpDocumentLoader {
    client: Client,
}

impl HttpDocumentLoader {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentLoader for HttpDocumentLoader {
    async fn load(&self, content_url: &str) -> Result<Document, LoaderError> {
        let url = resolve_content_url(content_url)?;
        debug!(%url, "fetching document");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| LoaderError::Http { url: url.clone(), source })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LoaderError::NotFound(url));
        }
        if !status.is_success() {
            return Err(LoaderError::Status { url, status });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|source| LoaderError::Http { url: url.clone(), source })?;
        let document = Document::from_value(body)?;
        info!(%url, steps = document.len(), "document fetched");
        Ok(document)
    }
}
