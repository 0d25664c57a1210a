//! conversations + messages operations.

use chrono::Utc;
use serde_json::Value;
use sqlx::types::Json;

use rv_domain::{Error, Result};

use crate::records::{ConversationRow, MessageRow};
use crate::{db_err, Store};

impl Store {
    pub async fn create_conversation(&self, user_id: &str) -> Result<ConversationRow> {
        let id = Self::new_id();
        sqlx::query(
            "INSERT INTO conversations (id, user_id, started_at, message_count)
             VALUES (?, ?, ?, 0)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        self.get_conversation(&id)
            .await?
            .ok_or_else(|| Error::Store("conversation vanished after insert".into()))
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Option<ConversationRow>> {
        sqlx::query_as::<_, ConversationRow>("SELECT * FROM conversations WHERE id = ?")
            .bind(conversation_id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)
    }

    /// All of a user's conversations, newest first.
    pub async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationRow>> {
        sqlx::query_as::<_, ConversationRow>(
            "SELECT * FROM conversations WHERE user_id = ? ORDER BY started_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)
    }

    /// Mark a conversation ended and attach its narrative summary.
    pub async fn end_conversation(&self, conversation_id: &str, summary: &str) -> Result<()> {
        sqlx::query("UPDATE conversations SET ended_at = ?, summary = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(summary)
            .bind(conversation_id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Bump the message counter; returns the new count.
    pub async fn increment_message_count(&self, conversation_id: &str) -> Result<i64> {
        sqlx::query("UPDATE conversations SET message_count = message_count + 1 WHERE id = ?")
            .bind(conversation_id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT message_count FROM conversations WHERE id = ?")
                .bind(conversation_id)
                .fetch_one(self.pool())
                .await
                .map_err(db_err)?;
        Ok(count)
    }

    pub async fn append_message(
        &self,
        conversation_id: &str,
        role: &str,
        content: &str,
        tool_calls: Option<&Value>,
        tool_call_id: Option<&str>,
    ) -> Result<String> {
        let id = Self::new_id();
        sqlx::query(
            "INSERT INTO messages
                (id, conversation_id, role, content, tool_calls, tool_call_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(tool_calls.map(Json))
        .bind(tool_call_id)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    /// All messages for a conversation, chronological.
    pub async fn conversation_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)
    }
}
