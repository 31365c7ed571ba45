//! Post-commit "table updated" fan-out. Failures are the caller's to log;
//! they never abort the operation that triggered them.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::engine::types::TableId;

const LOG_TARGET: &str = "felt_poker::notify";

#[async_trait]
pub trait TableNotifier: Send + Sync {
    async fn table_updated(&self, table_id: TableId) -> anyhow::Result<()>;
}

/// POSTs `{"tableId": ...}` to the configured publish endpoint.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpNotifier {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl TableNotifier for HttpNotifier {
    async fn table_updated(&self, table_id: TableId) -> anyhow::Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "tableId": table_id }))
            .send()
            .await?;
        response.error_for_status()?;
        debug!(target: LOG_TARGET, table_id = %table_id, "published table update");
        Ok(())
    }
}

/// Stands in when no publish endpoint is configured.
pub struct NoopNotifier;

#[async_trait]
impl TableNotifier for NoopNotifier {
    async fn table_updated(&self, _table_id: TableId) -> anyhow::Result<()> {
        Ok(())
    }
}
