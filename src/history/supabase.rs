//! Supabase backend
//!
//! Reaches the hosted message table through its PostgREST interface at
//! `{project_url}/rest/v1/{table}`. The table has to exist already; see
//! `schema_sql` for the DDL to run in the project's SQL editor.

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::HistoryBackend;
use crate::config::validate_table_name;
use crate::error::{ChatError, StorageError};
use crate::models::{Message, Role};
use crate::Result;

const SELECT_COLUMNS: &str = "message_type,content,created_at";
const ORDER: &str = "created_at.asc,seq.asc";
/// Matches the default PostgREST `max_rows`; a shorter page is the last one.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Reusable PostgREST client (connection-pooled)
pub struct SupabaseHistory {
    client: Client,
    endpoint: Url,
    api_key: String,
    timeout: Duration,
    page_size: usize,
}

#[derive(Debug, Serialize)]
struct NewRow<'a> {
    id: Uuid,
    session_id: &'a str,
    message_type: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StoredRow {
    message_type: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl StoredRow {
    fn into_message(self) -> std::result::Result<Message, StorageError> {
        let role = Role::from_message_type(&self.message_type).ok_or_else(|| {
            StorageError::InvalidRow(format!("unknown message_type '{}'", self.message_type))
        })?;
        Ok(Message {
            role,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

impl SupabaseHistory {
    pub fn new(project_url: &str, api_key: &str, table: &str, timeout: Duration) -> Result<Self> {
        validate_table_name(table)?;
        if api_key.trim().is_empty() {
            return Err(ChatError::config("Supabase API key must not be empty"));
        }

        let endpoint = table_endpoint(project_url, table)?;

        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(|e| ChatError::config(format!("failed to build HTTP client: {}", e)))?;

        info!(endpoint = %endpoint, "Supabase conversation store ready");

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
            timeout,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Rows requested per GET. Must not exceed the server's `max_rows`.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn fetch_page(&self, session_id: &str, offset: usize) -> Result<Vec<Message>> {
        let request = self.authorized(self.client.get(self.endpoint.clone())).query(&[
            ("select", SELECT_COLUMNS.to_string()),
            ("session_id", Self::session_filter(session_id)),
            ("order", ORDER.to_string()),
            ("limit", self.page_size.to_string()),
            ("offset", offset.to_string()),
        ]);

        let response = request.send().await.map_err(|e| self.transport(e))?;
        let response = self.check(response).await?;
        let body = response.text().await.map_err(|e| self.transport(e))?;

        Ok(parse_rows(&body)?)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn session_filter(session_id: &str) -> String {
        format!("eq.{}", session_id)
    }

    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), body = %body, "Supabase request failed");
        Err(StorageError::Status {
            status: status.as_u16(),
            body,
        }
        .into())
    }

    fn transport(&self, err: reqwest::Error) -> ChatError {
        error!("Supabase transport failure: {}", err);
        StorageError::from_http(err, self.timeout).into()
    }
}

/// `{project_url}/rest/v1/{table}`, tolerating a trailing slash on the project URL.
fn table_endpoint(project_url: &str, table: &str) -> Result<Url> {
    let base = Url::parse(project_url.trim_end_matches('/'))
        .map_err(|e| ChatError::config(format!("invalid SUPABASE_URL '{}': {}", project_url, e)))?;

    if !matches!(base.scheme(), "http" | "https") {
        return Err(ChatError::config(format!(
            "SUPABASE_URL must be http(s): {}",
            project_url
        )));
    }

    let joined = format!("{}/rest/v1/{}", base.as_str().trim_end_matches('/'), table);
    Url::parse(&joined).map_err(|e| ChatError::config(format!("invalid table endpoint: {}", e)))
}

fn parse_rows(body: &str) -> std::result::Result<Vec<Message>, StorageError> {
    let rows: Vec<StoredRow> = serde_json::from_str(body)
        .map_err(|e| StorageError::InvalidRow(format!("undecodable response: {}", e)))?;
    rows.into_iter().map(StoredRow::into_message).collect()
}

#[async_trait::async_trait]
impl HistoryBackend for SupabaseHistory {
    async fn fetch(&self, session_id: &str) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        loop {
            let page = self.fetch_page(session_id, messages.len()).await?;
            let last_page = page.len() < self.page_size;
            messages.extend(page);
            if last_page {
                break;
            }
        }

        debug!(session_id, count = messages.len(), "Fetched session rows");
        Ok(messages)
    }

    async fn insert(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        let row = NewRow {
            id: Uuid::new_v4(),
            session_id,
            message_type: role.message_type(),
            content,
        };

        let request = self
            .authorized(self.client.post(self.endpoint.clone()))
            .header("Prefer", "return=minimal")
            .json(&row);

        let response = request.send().await.map_err(|e| self.transport(e))?;
        self.check(response).await?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let request = self
            .authorized(self.client.delete(self.endpoint.clone()))
            .query(&[("session_id", Self::session_filter(session_id))]);

        let response = request.send().await.map_err(|e| self.transport(e))?;
        self.check(response).await?;
        Ok(())
    }
}
