//! HTTP client for the web-monitoring-db REST API

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::error::{DbError, Result};
use super::types::{
    DataEnvelope, ImportJob, ImportJobId, ImportJobOptions, PageChunk, PageListing, PageQuery,
};
use super::MonitoringDb;
use crate::archive::ImportVersion;
use crate::config::DatabaseConfig;

const NDJSON_CONTENT_TYPE: &str = "application/x-json-stream";

/// Authenticated web-monitoring-db client
#[derive(Debug, Clone)]
pub struct DbClient {
    client: Client,
    base_url: Url,
    email: String,
    password: String,
    batch_size: usize,
    poll_interval: Duration,
}

impl DbClient {
    /// Build from config; credentials must already be loaded from the environment
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let (Some(email), Some(password)) = (&config.email, &config.password) else {
            return Err(DbError::MissingCredentials);
        };

        let mut base_url = Url::parse(&config.url).map_err(|e| DbError::InvalidUrl {
            url: config.url.clone(),
            message: e.to_string(),
        })?;
        // Endpoints join relative to the base, so it must name a directory
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.timeout.as_duration())
            .build()
            .map_err(|e| DbError::Request {
                url: config.url.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            base_url,
            email: email.clone(),
            password: password.clone(),
            batch_size: config.import_batch_size.max(1),
            poll_interval: config.poll_interval.as_duration(),
        })
    }

    /// `path` is relative, keeping any prefix of the configured base URL
    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| DbError::InvalidUrl {
            url: format!("{}{}", self.base_url, path),
            message: e.to_string(),
        })
    }

    async fn send(&self, url: &Url, request: RequestBuilder) -> Result<Response> {
        let response = request
            .basic_auth(&self.email, Some(&self.password))
            .send()
            .await
            .map_err(|e| DbError::Request {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DbError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T> {
        response.json::<T>().await.map_err(|e| DbError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn submit_batch(
        &self,
        batch: &[ImportVersion],
        options: ImportJobOptions,
    ) -> Result<ImportJobId> {
        let url = self.endpoint("api/v0/imports")?;
        let body = encode_ndjson(batch).map_err(|e| DbError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let request = self
            .client
            .post(url.clone())
            .query(&[
                ("update", options.update.as_str()),
                ("create_pages", bool_param(options.create_pages)),
                (
                    "skip_unchanged_versions",
                    bool_param(options.skip_unchanged_versions),
                ),
            ])
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body);

        let response = self.send(&url, request).await?;
        let job: DataEnvelope<ImportJob> = Self::decode(&url, response).await?;
        info!(job_id = job.data.id, versions = batch.len(), "Submitted import batch");
        Ok(job.data.id)
    }

    async fn import_status(&self, job_id: ImportJobId) -> Result<ImportJob> {
        let url = self.endpoint(&format!("api/v0/imports/{}", job_id))?;
        let response = self.send(&url, self.client.get(url.clone())).await?;
        let job: DataEnvelope<ImportJob> = Self::decode(&url, response).await?;
        Ok(job.data)
    }
}

#[async_trait]
impl MonitoringDb for DbClient {
    async fn list_pages(&self, query: &PageQuery) -> Result<PageChunk> {
        let url = self.endpoint("api/v0/pages")?;
        let mut params = vec![
            ("sort", "created_at:asc".to_string()),
            ("chunk_size", query.chunk_size.to_string()),
            ("chunk", query.chunk.to_string()),
            ("active", "true".to_string()),
        ];
        if let Some(pattern) = &query.url_pattern {
            params.push(("url", pattern.clone()));
        }

        let response = self
            .send(&url, self.client.get(url.clone()).query(&params))
            .await?;
        let listing: PageListing = Self::decode(&url, response).await?;

        Ok(PageChunk {
            pages: listing.data,
            has_next: listing.links.next.is_some(),
        })
    }

    async fn add_versions(
        &self,
        mut versions: UnboundedReceiver<ImportVersion>,
        options: ImportJobOptions,
    ) -> Result<Vec<ImportJobId>> {
        let mut job_ids = Vec::new();
        let mut batch = Vec::with_capacity(self.batch_size);

        while let Some(version) = versions.recv().await {
            batch.push(version);
            if batch.len() >= self.batch_size {
                job_ids.push(self.submit_batch(&batch, options).await?);
                batch.clear();
            }
        }
        if !batch.is_empty() {
            job_ids.push(self.submit_batch(&batch, options).await?);
        }

        Ok(job_ids)
    }

    async fn monitor_import_statuses(
        &self,
        job_ids: &[ImportJobId],
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let mut pending: Vec<ImportJobId> = job_ids.to_vec();
        let mut errors = Vec::new();

        while !pending.is_empty() && !cancel.is_cancelled() {
            let mut still_pending = Vec::with_capacity(pending.len());
            for job_id in pending {
                let job = self.import_status(job_id).await?;
                if job.is_complete() {
                    debug!(job_id, errors = job.processing_errors.len(), "Import job complete");
                    errors.extend(job.processing_errors);
                } else {
                    still_pending.push(job_id);
                }
            }
            pending = still_pending;

            if !pending.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        if !pending.is_empty() {
            warn!(jobs = ?pending, "Stopped polling before import jobs finished");
        }
        Ok(errors)
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

/// Newline-delimited JSON, one version per line
fn encode_ndjson(batch: &[ImportVersion]) -> serde_json::Result<Bytes> {
    let mut body = Vec::new();
    for version in batch {
        serde_json::to_writer(&mut body, version)?;
        body.push(b'\n');
    }
    Ok(Bytes::from(body))
}
