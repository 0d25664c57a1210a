//! analyses + room_features operations, including the atomic persistence of
//! a completed pipeline run (property, portfolio item, analysis, and cached
//! room features commit together or not at all).

use chrono::Utc;
use serde_json::Value;
use sqlx::types::Json;

use rv_domain::Result;

use crate::records::{AnalysisRow, NewProperty, NewRoomFeatures, RoomFeatureRow};
use crate::{db_err, Store};

/// Everything a finished pipeline run writes in one transaction.
#[derive(Debug, Clone)]
pub struct AnalysisPersistRequest {
    pub user_id: String,
    pub property: NewProperty,
    pub result_data: Value,
    pub chat_summary: String,
    pub detail_summary: Option<String>,
    pub index_summary: String,
    pub room_features: Vec<NewRoomFeatures>,
}

/// Ids produced by [`Store::persist_analysis`].
#[derive(Debug, Clone)]
pub struct PersistedAnalysis {
    pub property_id: String,
    pub portfolio_item_id: String,
    pub analysis_id: String,
}

impl Store {
    pub async fn get_latest_analysis(
        &self,
        user_id: &str,
        property_id: &str,
        analysis_type: &str,
    ) -> Result<Option<AnalysisRow>> {
        sqlx::query_as::<_, AnalysisRow>(
            "SELECT * FROM analyses
             WHERE user_id = ? AND property_id = ? AND analysis_type = ?
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(property_id)
        .bind(analysis_type)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)
    }

    pub async fn create_analysis(
        &self,
        user_id: &str,
        property_id: &str,
        portfolio_item_id: Option<&str>,
        result_data: &Value,
        chat_summary: &str,
        detail_summary: Option<&str>,
    ) -> Result<AnalysisRow> {
        let id = Self::new_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO analyses
                (id, user_id, property_id, portfolio_item_id, analysis_type, result_data,
                 chat_summary, detail_summary, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'renovation', ?, ?, ?, 'completed', ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(property_id)
        .bind(portfolio_item_id)
        .bind(Json(result_data))
        .bind(chat_summary)
        .bind(detail_summary)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        sqlx::query_as("SELECT * FROM analyses WHERE id = ?")
            .bind(&id)
            .fetch_one(self.pool())
            .await
            .map_err(db_err)
    }

    /// Rewrite the result data + chat summary of an existing analysis
    /// (cost recalculation path).
    pub async fn update_analysis(
        &self,
        analysis_id: &str,
        result_data: &Value,
        chat_summary: &str,
        preferences_snapshot: &Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE analyses
             SET result_data = ?, chat_summary = ?, preferences_snapshot = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(Json(result_data))
        .bind(chat_summary)
        .bind(Json(preferences_snapshot))
        .bind(Utc::now())
        .bind(analysis_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn get_room_features(&self, property_id: &str) -> Result<Vec<RoomFeatureRow>> {
        sqlx::query_as::<_, RoomFeatureRow>(
            "SELECT * FROM room_features WHERE property_id = ? ORDER BY room_type, room_number",
        )
        .bind(property_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)
    }

    pub async fn save_room_features(
        &self,
        property_id: &str,
        rooms: &[NewRoomFeatures],
    ) -> Result<()> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        Self::save_room_features_tx(&mut tx, property_id, rooms).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn save_room_features_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        property_id: &str,
        rooms: &[NewRoomFeatures],
    ) -> Result<()> {
        // A re-analysis replaces the cached features wholesale.
        sqlx::query("DELETE FROM room_features WHERE property_id = ?")
            .bind(property_id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        for room in rooms {
            sqlx::query(
                "INSERT INTO room_features
                    (id, property_id, room_type, room_number, room_label, features, images,
                     created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Self::new_id())
            .bind(property_id)
            .bind(&room.room_type)
            .bind(room.room_number)
            .bind(&room.room_label)
            .bind(Json(&room.features))
            .bind(Json(&room.images))
            .bind(Utc::now())
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    /// Persist a completed pipeline run atomically: property upsert,
    /// portfolio item (created as `analyzed` if absent), analysis row, and
    /// cached room features. Any failure rolls everything back; a failed
    /// analysis must never leave partial rows behind.
    pub async fn persist_analysis(
        &self,
        req: &AnalysisPersistRequest,
    ) -> Result<PersistedAnalysis> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        let now = Utc::now();

        let property = Self::upsert_property_tx(&mut tx, &req.property).await?;

        let existing_item: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM portfolio_items WHERE user_id = ? AND property_id = ?",
        )
        .bind(&req.user_id)
        .bind(&property.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let portfolio_item_id = match existing_item {
            Some((id,)) => {
                sqlx::query(
                    "UPDATE portfolio_items
                     SET status = 'analyzed', index_summary = ?, updated_at = ?
                     WHERE id = ?",
                )
                .bind(&req.index_summary)
                .bind(now)
                .bind(&id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
                id
            }
            None => {
                let item = Self::create_portfolio_item_tx(
                    &mut tx,
                    &req.user_id,
                    &property.id,
                    None,
                    Some(&req.index_summary),
                )
                .await?;
                sqlx::query("UPDATE portfolio_items SET status = 'analyzed' WHERE id = ?")
                    .bind(&item.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                item.id
            }
        };

        let analysis_id = Self::new_id();
        sqlx::query(
            "INSERT INTO analyses
                (id, user_id, property_id, portfolio_item_id, analysis_type, result_data,
                 chat_summary, detail_summary, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'renovation', ?, ?, ?, 'completed', ?, ?)",
        )
        .bind(&analysis_id)
        .bind(&req.user_id)
        .bind(&property.id)
        .bind(&portfolio_item_id)
        .bind(Json(&req.result_data))
        .bind(&req.chat_summary)
        .bind(&req.detail_summary)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        Self::save_room_features_tx(&mut tx, &property.id, &req.room_features).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(PersistedAnalysis {
            property_id: property.id,
            portfolio_item_id,
            analysis_id,
        })
    }
}
