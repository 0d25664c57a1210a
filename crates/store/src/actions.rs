//! action_log operations.

use chrono::Utc;
use sqlx::types::Json;

use rv_domain::Result;

use crate::records::ActionLogEntry;
use crate::{db_err, Store};

impl Store {
    /// Append one audit-log entry. Every durable mutation a tool performs is
    /// paired with one of these.
    pub async fn log_action(&self, entry: &ActionLogEntry) -> Result<String> {
        let id = Self::new_id();
        sqlx::query(
            "INSERT INTO action_log
                (id, user_id, conversation_id, message_id, action_type, entity_type, entity_id,
                 field_changed, old_value, new_value, trigger_message, confidence,
                 confirmed_by_user, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&entry.user_id)
        .bind(&entry.conversation_id)
        .bind(&entry.message_id)
        .bind(&entry.action_type)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.field_changed)
        .bind(entry.old_value.as_ref().map(Json))
        .bind(entry.new_value.as_ref().map(Json))
        .bind(&entry.trigger_message)
        .bind(entry.confidence)
        .bind(entry.confirmed_by_user)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    /// Number of logged actions for a user (used by tests and diagnostics).
    pub async fn action_count(&self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM action_log WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(self.pool())
                .await
                .map_err(db_err)?;
        Ok(count)
    }
}
