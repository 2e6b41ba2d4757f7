//! Conversation history store
//!
//! A session-scoped, append-only log of chat messages. The store itself holds
//! no state: it validates input and delegates to a `HistoryBackend`, which is
//! where every message actually lives between calls.

pub mod memory;
pub mod postgres;
pub mod supabase;

pub use memory::InMemoryHistory;
pub use postgres::PostgresHistory;
pub use supabase::SupabaseHistory;

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, StoreConfig};
use crate::error::ChatError;
use crate::models::{Message, Role};
use crate::Result;

/// Storage seam behind the store. Implementations receive validated input.
#[async_trait::async_trait]
pub trait HistoryBackend: Send + Sync {
    /// All messages of the session, oldest first.
    async fn fetch(&self, session_id: &str) -> Result<Vec<Message>>;
    /// Single-row insert; the backend assigns `created_at`.
    async fn insert(&self, session_id: &str, role: Role, content: &str) -> Result<()>;
    /// Remove every message of the session. Deleting nothing is not an error.
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// DDL for the message table. `{table}` is replaced with a validated identifier.
pub(crate) const CREATE_TABLE_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    seq BIGINT GENERATED ALWAYS AS IDENTITY,
    session_id TEXT NOT NULL,
    message_type TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Upgrades tables created without the insertion sequence column.
pub(crate) const ADD_SEQ_TEMPLATE: &str = r#"
ALTER TABLE {table} ADD COLUMN IF NOT EXISTS seq BIGINT GENERATED ALWAYS AS IDENTITY;
"#;

pub(crate) const CREATE_INDEX_TEMPLATE: &str = r#"
CREATE INDEX IF NOT EXISTS idx_{table}_session_id ON {table} (session_id, created_at, seq);
"#;

/// The statements creating the message table and its session index.
pub fn schema_statements(table: &str) -> [String; 3] {
    [
        CREATE_TABLE_TEMPLATE.replace("{table}", table),
        ADD_SEQ_TEMPLATE.replace("{table}", table),
        CREATE_INDEX_TEMPLATE.replace("{table}", table),
    ]
}

/// The message table DDL for `table`, for applying by hand to a hosted database.
///
/// Reads order by `created_at, seq`. A table created without `seq` (id, session_id,
/// message_type, content, created_at only) answers those reads with HTTP 400 until
/// this script has been run against it; the `ALTER TABLE` adds the column in place.
pub fn schema_sql(table: &str) -> String {
    schema_statements(table).join("")
}

#[derive(Clone)]
pub struct ConversationHistoryStore {
    backend: Arc<dyn HistoryBackend>,
}

impl ConversationHistoryStore {
    pub fn new(backend: Arc<dyn HistoryBackend>) -> Self {
        Self { backend }
    }

    /// Store over a fresh in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryHistory::new()))
    }

    /// Build the backend selected by `config`. Remote backends fail here on bad settings.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let backend: Arc<dyn HistoryBackend> = match &config.store {
            StoreConfig::Supabase { url, api_key } => {
                info!("Conversation history backend: supabase");
                Arc::new(SupabaseHistory::new(
                    url,
                    api_key,
                    &config.table,
                    config.request_timeout,
                )?)
            }
            StoreConfig::Postgres { database_url } => {
                info!("Conversation history backend: postgres");
                Arc::new(
                    PostgresHistory::connect(database_url, &config.table, config.request_timeout)
                        .await?,
                )
            }
            StoreConfig::InMemory => {
                warn!("No remote store configured, conversation history will not be persisted");
                Arc::new(InMemoryHistory::new())
            }
        };

        Ok(Self::new(backend))
    }

    /// Messages of the session in creation order; empty for an unknown session.
    pub async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        validate_session_id(session_id)?;
        let messages = self.backend.fetch(session_id).await?;
        debug!(session_id, count = messages.len(), "Loaded conversation history");
        Ok(messages)
    }

    pub async fn append_message(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        validate_session_id(session_id)?;
        validate_content(content)?;
        self.backend.insert(session_id, role, content).await?;
        debug!(session_id, role = %role, "Appended message");
        Ok(())
    }

    /// Append with the role given by name (`user`, `human`, `ai`, ...).
    pub async fn append_tagged(&self, session_id: &str, role: &str, content: &str) -> Result<()> {
        let role: Role = role.parse()?;
        self.append_message(session_id, role, content).await
    }

    pub async fn append_user_message(&self, session_id: &str, content: &str) -> Result<()> {
        self.append_message(session_id, Role::User, content).await
    }

    pub async fn append_ai_message(&self, session_id: &str, content: &str) -> Result<()> {
        self.append_message(session_id, Role::Assistant, content).await
    }

    pub async fn append_system_message(&self, session_id: &str, content: &str) -> Result<()> {
        self.append_message(session_id, Role::System, content).await
    }

    /// Delete every message of the session. Idempotent.
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;
        self.backend.delete_session(session_id).await?;
        info!(session_id, "Cleared conversation history");
        Ok(())
    }
}

fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(ChatError::validation("session id must not be empty"));
    }
    if session_id.contains('\0') {
        return Err(ChatError::validation("session id must not contain NUL characters"));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<()> {
    if content.contains('\0') {
        return Err(ChatError::validation("message content must not contain NUL characters"));
    }
    Ok(())
}
