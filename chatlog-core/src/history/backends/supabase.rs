//! Supabase table backend
//!
//! Talks to the PostgREST endpoint of a Supabase project. Rows have the
//! shape `{session_id, message, created_at}`; rows carry no list order of
//! their own, so reads sort on `created_at`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SupabaseConfig;
use crate::error::BackendError;
use crate::history::backend::{BackendResult, HistoryBackend};
use crate::history::message::PersistenceRecord;

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    session_id: &'a str,
    message: &'a str,
    created_at: String,
}

#[derive(Debug, Deserialize)]
struct SelectRow {
    message: serde_json::Value,
    /// `timestamptz` columns carry an offset, `timestamp` columns do not
    #[serde(default)]
    created_at: Option<String>,
}

impl SelectRow {
    fn created_at(&self) -> Option<NaiveDateTime> {
        let raw = self.created_at.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.naive_utc())
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
            .ok()
    }
}

/// History stored as rows of a Supabase table
#[derive(Clone)]
pub struct SupabaseBackend {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl SupabaseBackend {
    /// Build the client and probe the table once
    pub async fn connect(config: &SupabaseConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        let backend = Self {
            client,
            endpoint: format!(
                "{}/rest/v1/{}",
                config.url.trim_end_matches('/'),
                config.table
            ),
            api_key: config.key.clone(),
        };

        let response = backend
            .authorized(backend.client.get(&backend.endpoint))
            .query(&[("select", "session_id"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Self::check(response)
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        debug!("Supabase table reachable at {}", backend.endpoint);
        Ok(backend)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    fn session_filter(session_id: &str) -> (&'static str, String) {
        ("session_id", format!("eq.{}", session_id))
    }

    async fn check(response: Response) -> BackendResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(BackendError::Request(format!("HTTP {}: {}", status, error_text)))
    }
}

/// Turn the `message` column into a record payload.
///
/// A `jsonb` column hands back an object, a `text` column a string.
fn payload_from_column(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(raw) => raw,
        other => other.to_string(),
    }
}

#[async_trait]
impl HistoryBackend for SupabaseBackend {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn load(&self, session_id: &str) -> BackendResult<Vec<PersistenceRecord>> {
        let filter = Self::session_filter(session_id);
        let response = self
            .authorized(self.client.get(&self.endpoint))
            .query(&[
                ("select", "message,created_at"),
                (filter.0, filter.1.as_str()),
                ("order", "created_at.asc"),
            ])
            .send()
            .await?;
        let rows: Vec<SelectRow> = Self::check(response).await?.json().await?;

        debug!("Loaded {} rows for session {}", rows.len(), session_id);
        let out_of_order = rows
            .windows(2)
            .any(|w| match (w[0].created_at(), w[1].created_at()) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            });
        if out_of_order {
            warn!("Rows for session {} came back out of order", session_id);
        }

        Ok(rows
            .into_iter()
            .map(|row| PersistenceRecord::from_payload(payload_from_column(row.message)))
            .collect())
    }

    async fn append(&self, session_id: &str, record: &PersistenceRecord) -> BackendResult<()> {
        let row = InsertRow {
            session_id,
            message: record.payload(),
            created_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
        };
        let response = self
            .authorized(self.client.post(&self.endpoint))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_all(&self, session_id: &str) -> BackendResult<()> {
        let filter = Self::session_filter(session_id);
        let response = self
            .authorized(self.client.delete(&self.endpoint))
            .query(&[(filter.0, filter.1.as_str())])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
