use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn, error};

use crate::{
    config::HistoryConfig,
    error::PipelineError,
    models::{HistoryEntry, HistoryPage},
};

/// Paginated reads and single appends against the history service.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn fetch_history(&self, page: HistoryPage) -> Result<Vec<HistoryEntry>, PipelineError>;

    /// Does not return the created record; callers re-read it with [`HistoryPage::latest`].
    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), PipelineError>;
}

pub struct HistoryClient {
    client: Client,
    base_url: String,
}

impl HistoryClient {
    pub fn new(config: &HistoryConfig) -> Self {
        Self { client: Client::new(), base_url: config.api_base.clone() }
    }
}

#[async_trait]
impl HistoryStore for HistoryClient {
    async fn fetch_history(&self, page: HistoryPage) -> Result<Vec<HistoryEntry>, PipelineError> {
        let url = format!("{}/history", self.base_url);
        info!("📚 Fetching history skip={} limit={}", page.skip, page.limit);

        let response = self.client
            .get(&url)
            .query(&page)
            .send()
            .await
            .map_err(|e| PipelineError::HistoryFetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ History fetch failed with status {}: {}", status, body);
            return Err(PipelineError::HistoryFetchFailed(format!("status={} body={}", status, body)));
        }

        let mut entries: Vec<HistoryEntry> = response
            .json()
            .await
            .map_err(|e| PipelineError::HistoryFetchFailed(format!("decode error: {}", e)))?;

        if entries.len() > page.limit {
            warn!("⚠️ History service returned {} entries for limit {}, truncating", entries.len(), page.limit);
            entries.truncate(page.limit);
        }
        info!("✅ Fetched {} history entries", entries.len());
        Ok(entries)
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), PipelineError> {
        let url = format!("{}/save", self.base_url);
        info!("💾 Saving history entry for image: {}", entry.image_url);

        let response = self.client
            .post(&url)
            .json(entry)
            .send()
            .await
            .map_err(|e| PipelineError::HistorySaveFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ History save failed with status {}: {}", status, body);
            return Err(PipelineError::HistorySaveFailed(format!("status={} body={}", status, body)));
        }
        Ok(())
    }
}
