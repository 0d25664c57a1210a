//! portfolio_items operations.
//!
//! Invariant: at most one item per user has `is_active = 1`. `set_active`
//! holds a transaction over the unset/set pair so the invariant survives
//! concurrent turns.

use chrono::Utc;

use rv_domain::{Error, Result};

use crate::records::{PortfolioItemRow, PortfolioSearchRow};
use crate::{db_err, Store};

impl Store {
    pub async fn get_portfolio_item(
        &self,
        user_id: &str,
        property_id: &str,
    ) -> Result<Option<PortfolioItemRow>> {
        sqlx::query_as::<_, PortfolioItemRow>(
            "SELECT * FROM portfolio_items WHERE user_id = ? AND property_id = ?",
        )
        .bind(user_id)
        .bind(property_id)
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)
    }

    pub async fn create_portfolio_item(
        &self,
        user_id: &str,
        property_id: &str,
        nickname: Option<&str>,
        index_summary: Option<&str>,
    ) -> Result<PortfolioItemRow> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        let row =
            Self::create_portfolio_item_tx(&mut tx, user_id, property_id, nickname, index_summary)
                .await?;
        tx.commit().await.map_err(db_err)?;
        Ok(row)
    }

    pub(crate) async fn create_portfolio_item_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        user_id: &str,
        property_id: &str,
        nickname: Option<&str>,
        index_summary: Option<&str>,
    ) -> Result<PortfolioItemRow> {
        let id = Self::new_id();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO portfolio_items
                (id, user_id, property_id, nickname, index_summary, status, is_active,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 'saved', 0, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(property_id)
        .bind(nickname)
        .bind(index_summary)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        sqlx::query_as("SELECT * FROM portfolio_items WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)
    }

    /// Update status (and implicitly deactivate when archiving).
    pub async fn update_portfolio_item_status(
        &self,
        user_id: &str,
        item_id: &str,
        status: &str,
    ) -> Result<()> {
        let clear_active = status == "archived";
        let result = sqlx::query(
            "UPDATE portfolio_items
             SET status = ?, is_active = CASE WHEN ? THEN 0 ELSE is_active END, updated_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(status)
        .bind(clear_active)
        .bind(Utc::now())
        .bind(item_id)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("portfolio item {item_id}")));
        }
        Ok(())
    }

    pub async fn update_portfolio_item_nickname(
        &self,
        user_id: &str,
        item_id: &str,
        nickname: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE portfolio_items SET nickname = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(nickname)
        .bind(Utc::now())
        .bind(item_id)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Make exactly one item active. Unsets every other item for the user in
    /// the same transaction. Errors with `NotFound` when the property is not
    /// in the (non-archived) portfolio.
    pub async fn set_active(&self, user_id: &str, property_id: &str) -> Result<PortfolioItemRow> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;

        sqlx::query(
            "UPDATE portfolio_items SET is_active = 0, updated_at = ? WHERE user_id = ?",
        )
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let result = sqlx::query(
            "UPDATE portfolio_items SET is_active = 1, updated_at = ?
             WHERE user_id = ? AND property_id = ? AND status != 'archived'",
        )
        .bind(Utc::now())
        .bind(user_id)
        .bind(property_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Err(Error::NotFound(format!(
                "portfolio item for property {property_id}"
            )));
        }

        let row: PortfolioItemRow = sqlx::query_as(
            "SELECT * FROM portfolio_items WHERE user_id = ? AND property_id = ?",
        )
        .bind(user_id)
        .bind(property_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(row)
    }

    /// Non-archived items joined with property columns for keyword search.
    pub async fn search_rows(&self, user_id: &str) -> Result<Vec<PortfolioSearchRow>> {
        sqlx::query_as::<_, PortfolioSearchRow>(
            "SELECT pi.id, pi.property_id, pi.nickname, pi.index_summary, pi.is_active,
                    pi.updated_at, p.location, p.title, p.price, p.num_rooms
             FROM portfolio_items pi
             JOIN properties p ON p.id = pi.property_id
             WHERE pi.user_id = ? AND pi.status != 'archived'
             ORDER BY pi.created_at ASC",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(db_err)
    }

    /// Count of active items for a user (invariant checks in tests).
    pub async fn active_count(&self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM portfolio_items WHERE user_id = ? AND is_active = 1",
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        Ok(count)
    }
}
