//! user_profiles operations.

use chrono::Utc;
use serde_json::Value;
use sqlx::types::Json;

use rv_domain::{Error, Result};

use crate::records::{ProfileRow, PROFILE_SECTIONS};
use crate::{db_err, Store};

impl Store {
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        sqlx::query_as::<_, ProfileRow>("SELECT * FROM user_profiles WHERE id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)
    }

    /// Create an empty profile row when none exists yet (first-time users).
    pub async fn ensure_profile(&self, user_id: &str) -> Result<ProfileRow> {
        if let Some(existing) = self.get_profile(user_id).await? {
            return Ok(existing);
        }
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO user_profiles (id, created_at, updated_at) VALUES (?, ?, ?)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        self.get_profile(user_id)
            .await?
            .ok_or_else(|| Error::Store("profile vanished after insert".into()))
    }

    /// Patch one JSON section with regenerated summaries. The section data,
    /// its summary, the completed-sections list, and the master summary are
    /// written together so the profile is never observed half-updated.
    pub async fn upsert_profile_section(
        &self,
        user_id: &str,
        section: &str,
        merged: &Value,
        section_summary: &str,
        sections_completed: &[String],
        profile_summary: &str,
    ) -> Result<ProfileRow> {
        if !PROFILE_SECTIONS.contains(&section) {
            return Err(Error::InvalidArgument(format!(
                "unknown profile section: {section}"
            )));
        }
        self.ensure_profile(user_id).await?;

        // Column names come from the fixed PROFILE_SECTIONS vocabulary,
        // never from caller input beyond the check above.
        let sql = format!(
            "UPDATE user_profiles
             SET {section} = ?, {section}_summary = ?,
                 sections_completed = ?, profile_summary = ?, updated_at = ?
             WHERE id = ?"
        );
        sqlx::query(&sql)
            .bind(Json(merged))
            .bind(section_summary)
            .bind(Json(sections_completed))
            .bind(profile_summary)
            .bind(Utc::now())
            .bind(user_id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;

        self.get_profile(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("profile {user_id}")))
    }

    /// Update a scalar profile field (`display_name` or `region`) and the
    /// regenerated master summary.
    pub async fn update_profile_field(
        &self,
        user_id: &str,
        field: &str,
        value: Option<&str>,
        profile_summary: &str,
    ) -> Result<()> {
        if field != "display_name" && field != "region" {
            return Err(Error::InvalidArgument(format!(
                "unknown profile field: {field}"
            )));
        }
        self.ensure_profile(user_id).await?;

        let sql = format!(
            "UPDATE user_profiles SET {field} = ?, profile_summary = ?, updated_at = ? WHERE id = ?"
        );
        sqlx::query(&sql)
            .bind(value)
            .bind(profile_summary)
            .bind(Utc::now())
            .bind(user_id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
