//! Data source abstraction for pulling the upstream collection.

use crate::config::{Credentials, SourceConfig};
use crate::data::batch::DataBatch;
use crate::error::MlError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Information about a data source for the run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for loading data from a source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Load the whole collection.
    async fn load(&self) -> Result<DataBatch, MlError>;

    /// Return metadata about this source.
    fn source_info(&self) -> DataSourceInfo;
}

/// Build the source named by the ingestion configuration. `credentials` are
/// the already-resolved secrets for an API source.
pub fn source_from_config(
    config: &SourceConfig,
    credentials: Option<Credentials>,
) -> Box<dyn DataSource> {
    match config {
        SourceConfig::Csv { path } => Box::new(CsvSource { path: path.clone() }),
        SourceConfig::Jsonl { path } => Box::new(JsonlSource { path: path.clone() }),
        SourceConfig::Api {
            url, timeout_secs, ..
        } => Box::new(ApiSource {
            url: url.clone(),
            credentials,
            timeout: Duration::from_secs(*timeout_secs),
        }),
    }
}

// ---------------------------------------------------------------------------
// CsvSource
// ---------------------------------------------------------------------------

/// CSV file data source.
pub struct CsvSource {
    pub path: PathBuf,
}

#[async_trait]
impl DataSource for CsvSource {
    async fn load(&self) -> Result<DataBatch, MlError> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Err(MlError::upstream(format!(
                "CSV source {} does not exist",
                self.path.display()
            )));
        }
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || DataBatch::read_csv(&path))
            .await
            .map_err(|e| MlError::upstream(format!("CSV reader task failed: {e}")))?
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "csv".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// JsonlSource
// ---------------------------------------------------------------------------

/// Document-store export: one JSON object per line.
pub struct JsonlSource {
    pub path: PathBuf,
}

#[async_trait]
impl DataSource for JsonlSource {
    async fn load(&self) -> Result<DataBatch, MlError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            MlError::upstream(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let mut items = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(line)?;
            items.push(value);
        }
        Ok(DataBatch::from_json_items(&items))
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "jsonl".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApiSource
// ---------------------------------------------------------------------------

/// HTTP endpoint returning a JSON array of row objects.
pub struct ApiSource {
    pub url: String,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
}

#[async_trait]
impl DataSource for ApiSource {
    async fn load(&self) -> Result<DataBatch, MlError> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let mut request = client.get(&self.url);
        if let Some(credentials) = &self.credentials {
            request = credentials.apply(request);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MlError::upstream(format!("request to {} failed: {e}", self.url)))?;
        if !response.status().is_success() {
            return Err(MlError::upstream(format!(
                "API request to {} failed with status {}",
                self.url,
                response.status()
            )));
        }

        let value: serde_json::Value = response.json().await?;
        match value {
            serde_json::Value::Array(items) => Ok(DataBatch::from_json_items(&items)),
            _ => Err(MlError::upstream(
                "API response must be a JSON array of objects",
            )),
        }
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "api".to_string(),
            location: self.url.clone(),
            accessed_at: chrono::Utc::now(),
        }
    }
}
