use crate::core::schema::parse_csv;
use crate::domain::ports::{DataFetcher, Fetched};
use crate::utils::error::{EpiError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Reads CSV datasets over HTTP(S) or from local files.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("epi-analytics/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("Making HTTP request to: {}", url);
        let response = self.client.get(url).send().await?;
        tracing::debug!("HTTP response status: {}", response.status());

        let response = response.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn read_local(&self, path: PathBuf) -> Result<Vec<u8>> {
        tracing::debug!("Reading local file: {}", path.display());
        Ok(tokio::fs::read(path).await?)
    }
}

#[async_trait]
impl DataFetcher for HttpFetcher {
    async fn fetch_source(&self, source: &str) -> Result<Fetched> {
        let bytes = if source.starts_with("http://") || source.starts_with("https://") {
            self.download(source).await?
        } else if source.starts_with("file://") {
            let path = Url::parse(source)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .ok_or_else(|| EpiError::InvalidParameter {
                    name: "source".to_string(),
                    reason: format!("not a usable file URL: {}", source),
                })?;
            self.read_local(path).await?
        } else {
            self.read_local(PathBuf::from(source)).await?
        };

        let parsed = parse_csv(source, &bytes)?;
        tracing::info!(
            "Fetched {} rows from {} ({} malformed rows skipped)",
            parsed.dataset.len(),
            source,
            parsed.skipped_rows
        );

        Ok(Fetched {
            dataset: parsed.dataset,
            source: source.to_string(),
            skipped_rows: parsed.skipped_rows,
        })
    }
}
