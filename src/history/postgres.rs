//! Direct Postgres backend
//!
//! Talks to the message table over the Postgres wire protocol. The table and
//! its index are created on connect if they do not exist yet.

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::future::Future;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{schema_statements, HistoryBackend};
use crate::config::validate_table_name;
use crate::error::StorageError;
use crate::models::{Message, Role};
use crate::Result;

pub struct PostgresHistory {
    pool: PgPool,
    table: String,
    timeout: Duration,
}

impl PostgresHistory {
    /// Connect eagerly so bad credentials surface here, then bootstrap the schema.
    pub async fn connect(database_url: &str, table: &str, timeout: Duration) -> Result<Self> {
        validate_table_name(table)?;

        let pool = with_timeout(
            timeout,
            PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(timeout)
                .connect(database_url),
        )
        .await?;

        let history = Self::with_pool(pool, table, timeout);
        history.ensure_schema().await?;

        info!(table = %history.table, "Connected to postgres conversation store");
        Ok(history)
    }

    /// Wrap an existing pool. The table name must already be validated.
    pub fn with_pool(pool: PgPool, table: &str, timeout: Duration) -> Self {
        Self {
            pool,
            table: table.to_string(),
            timeout,
        }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in schema_statements(&self.table) {
            with_timeout(self.timeout, sqlx::query(&statement).execute(&self.pool)).await?;
        }
        Ok(())
    }
}

async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result.map_err(StorageError::from)?),
        Err(_) => Err(StorageError::Timeout(timeout).into()),
    }
}

#[async_trait::async_trait]
impl HistoryBackend for PostgresHistory {
    async fn fetch(&self, session_id: &str) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT message_type, content, created_at FROM {} \
             WHERE session_id = $1 ORDER BY created_at ASC, seq ASC",
            self.table
        );

        let rows = with_timeout(
            self.timeout,
            sqlx::query(&sql).bind(session_id).fetch_all(&self.pool),
        )
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let message_type: String = row.try_get("message_type").map_err(StorageError::from)?;
            let role = Role::from_message_type(&message_type).ok_or_else(|| {
                StorageError::InvalidRow(format!("unknown message_type '{}'", message_type))
            })?;

            messages.push(Message {
                role,
                content: row.try_get("content").map_err(StorageError::from)?,
                created_at: row.try_get("created_at").map_err(StorageError::from)?,
            });
        }

        Ok(messages)
    }

    async fn insert(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, session_id, message_type, content) VALUES ($1, $2, $3, $4)",
            self.table
        );

        with_timeout(
            self.timeout,
            sqlx::query(&sql)
                .bind(Uuid::new_v4())
                .bind(session_id)
                .bind(role.message_type())
                .bind(content)
                .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE session_id = $1", self.table);

        let result = with_timeout(
            self.timeout,
            sqlx::query(&sql).bind(session_id).execute(&self.pool),
        )
        .await?;

        info!(session_id, deleted = result.rows_affected(), "Deleted session rows");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ConversationHistoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_slow_future_maps_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<(), sqlx::Error>(())
        };
        let err = with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(
            err,
            crate::ChatError::Storage(StorageError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_table_before_connecting() {
        let err = PostgresHistory::connect(
            "postgres://localhost/unused",
            "bad table",
            Duration::from_secs(1),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, crate::ChatError::Config(_)));
    }

    /// Needs a reachable database in `DATABASE_URL`.
    #[tokio::test]
    #[ignore]
    async fn test_postgres_round_trip() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let backend = PostgresHistory::connect(&url, "chat_messages_test", Duration::from_secs(10))
            .await
            .unwrap();
        let store = ConversationHistoryStore::new(Arc::new(backend));
        let session = format!("test-{}", Uuid::new_v4());

        store.append_user_message(&session, "hi").await.unwrap();
        store.append_ai_message(&session, "hello").await.unwrap();

        let messages = store.get_messages(&session).await.unwrap();
        let pairs: Vec<(Role, &str)> = messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(pairs, vec![(Role::User, "hi"), (Role::Assistant, "hello")]);

        store.clear(&session).await.unwrap();
        assert!(store.get_messages(&session).await.unwrap().is_empty());
        store.clear(&session).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn test_postgres_rows_without_id_get_default() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let backend = PostgresHistory::connect(&url, "chat_messages_test", Duration::from_secs(10))
            .await
            .unwrap();
        let session = format!("test-{}", Uuid::new_v4());

        let sql = format!(
            "INSERT INTO {} (session_id, message_type, content) VALUES ($1, 'human', 'no id')",
            backend.table
        );
        sqlx::query(&sql).bind(&session).execute(&backend.pool).await.unwrap();

        let messages = backend.fetch(&session).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "no id");
        backend.delete_session(&session).await.unwrap();
    }
}
