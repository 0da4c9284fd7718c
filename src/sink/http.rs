use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::error::SinkError;
use crate::models::{LocationSample, OpKind, QueuedOperation};

use super::RemoteSink;

/// HTTP binding of the remote sink: one logical table endpoint per queue
/// kind, rows keyed by the client-generated operation id.
pub struct HttpRemoteSink {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectConfig {
    capture_interval_seconds: Option<u64>,
}

impl HttpRemoteSink {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<&str>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .context("api key is not a valid header value")?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.sink_timeout)
            .default_headers(headers)
            .build()
            .context("failed to build remote sink client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, kind: OpKind) -> String {
        format!("{}/{}", self.base_url, kind.remote_table())
    }

    /// The stored payload with the idempotency key spliced in, in case the
    /// payload itself does not carry one.
    fn row_for(op: &QueuedOperation<Value>) -> Value {
        let mut row = op.payload.clone();
        if let Value::Object(map) = &mut row {
            map.entry("id")
                .or_insert_with(|| Value::String(op.id.to_string()));
        }
        row
    }

    fn check_insert_status(status: StatusCode) -> Result<(), SinkError> {
        if status.is_success() {
            return Ok(());
        }
        // A duplicate-key conflict means a retried operation already
        // landed; that is the idempotent replay working as intended.
        if status == StatusCode::CONFLICT {
            return Ok(());
        }
        Err(SinkError::Rejected {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl RemoteSink for HttpRemoteSink {
    async fn insert(
        &self,
        kind: OpKind,
        items: &[QueuedOperation<Value>],
    ) -> Result<(), SinkError> {
        let rows: Vec<Value> = items.iter().map(Self::row_for).collect();
        let response = self
            .client
            .post(self.table_url(kind))
            .json(&rows)
            .send()
            .await?;
        Self::check_insert_status(response.status())
    }

    async fn update_latest_position(
        &self,
        subject_id: &str,
        sample: &LocationSample,
        active: bool,
    ) -> Result<(), SinkError> {
        let body = serde_json::json!({
            "subjectEmail": sample.subject_email,
            "latitude": sample.latitude,
            "longitude": sample.longitude,
            "deviceLabel": sample.device_label,
            "updatedAt": Utc::now(),
            "isActive": active,
        });

        let response = self
            .client
            .put(format!("{}/agents/{subject_id}/latest_position", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Rejected {
                status: status.as_u16(),
            })
        }
    }

    async fn fetch_capture_interval(&self, subject_id: &str) -> Result<Option<u64>, SinkError> {
        let response = self
            .client
            .get(format!("{}/agents/{subject_id}/config", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SinkError::Rejected {
                status: status.as_u16(),
            });
        }

        let config: SubjectConfig = response.json().await?;
        Ok(config.capture_interval_seconds)
    }
}
