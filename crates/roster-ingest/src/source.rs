//! External directory access
//!
//! [`RecordSource`] is the seam between the pipeline and the network. The
//! pipeline only ever sees raw documents or a [`SourceError`]; parsing happens
//! in [`crate::parser`].

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::{HarvestError, SourceError};

/// Where listing and detail documents come from
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Listing page starting at record position `offset`
    async fn fetch_listing(&self, offset: usize) -> Result<String, SourceError>;

    /// Detail page for one roll number
    async fn fetch_detail(&self, roll: &str) -> Result<String, SourceError>;
}

/// [`RecordSource`] backed by the directory's HTTP endpoints
pub struct HttpSource {
    client: Client,
    base_url: String,
    listing_path: String,
    detail_path: String,
    timeout_secs: u64,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self, HarvestError> {
        if !config.listing_path.contains("{offset}") {
            return Err(HarvestError::config(format!(
                "listing path {:?} has no {{offset}} placeholder",
                config.listing_path
            )));
        }
        if !config.detail_path.contains("{roll}") {
            return Err(HarvestError::config(format!(
                "detail path {:?} has no {{roll}} placeholder",
                config.detail_path
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            listing_path: config.listing_path.trim_start_matches('/').to_string(),
            detail_path: config.detail_path.trim_start_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn listing_url(&self, offset: usize) -> String {
        format!(
            "{}/{}",
            self.base_url,
            self.listing_path.replace("{offset}", &offset.to_string())
        )
    }

    pub fn detail_url(&self, roll: &str) -> String {
        format!("{}/{}", self.base_url, self.detail_path.replace("{roll}", roll))
    }

    async fn get_text(&self, url: String) -> Result<String, SourceError> {
        debug!(url = %url, "GET");

        let response = self.client.get(&url).send().await.map_err(|e| self.classify(e, &url))?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        response.text().await.map_err(|e| self.classify(e, &url))
    }

    fn classify(&self, err: reqwest::Error, url: &str) -> SourceError {
        if err.is_timeout() {
            SourceError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            SourceError::Http(err)
        }
    }
}

#[async_trait]
impl RecordSource for HttpSource {
    async fn fetch_listing(&self, offset: usize) -> Result<String, SourceError> {
        self.get_text(self.listing_url(offset)).await
    }

    async fn fetch_detail(&self, roll: &str) -> Result<String, SourceError> {
        self.get_text(self.detail_url(roll)).await
    }
}
