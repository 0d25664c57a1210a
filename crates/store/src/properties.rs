//! properties operations.

use chrono::Utc;
use sqlx::types::Json;

use rv_domain::Result;

use crate::records::{NewProperty, PropertyRow};
use crate::{db_err, Store};

impl Store {
    pub async fn get_property(&self, property_id: &str) -> Result<Option<PropertyRow>> {
        sqlx::query_as::<_, PropertyRow>("SELECT * FROM properties WHERE id = ?")
            .bind(property_id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)
    }

    pub async fn get_property_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PropertyRow>> {
        sqlx::query_as::<_, PropertyRow>("SELECT * FROM properties WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)
    }

    /// Insert or refresh a property, deduplicating on `external_id`.
    pub async fn upsert_property(&self, prop: &NewProperty) -> Result<PropertyRow> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        let row = Self::upsert_property_tx(&mut tx, prop).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(row)
    }

    /// Transaction-scoped variant used by atomic analysis persistence.
    pub(crate) async fn upsert_property_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        prop: &NewProperty,
    ) -> Result<PropertyRow> {
        let now = Utc::now();

        let existing: Option<PropertyRow> = match &prop.external_id {
            Some(ext) => {
                sqlx::query_as("SELECT * FROM properties WHERE external_id = ?")
                    .bind(ext)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(db_err)?
            }
            None => {
                sqlx::query_as("SELECT * FROM properties WHERE url = ?")
                    .bind(&prop.url)
                    .fetch_optional(&mut **tx)
                    .await
                    .map_err(db_err)?
            }
        };

        let id = existing
            .as_ref()
            .map(|p| p.id.clone())
            .unwrap_or_else(Self::new_id);

        sqlx::query(
            "INSERT INTO properties
                (id, external_id, url, title, price, area_m2, num_rooms, num_bathrooms,
                 location, description, image_urls, price_per_m2, raw_data,
                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                price = excluded.price,
                area_m2 = excluded.area_m2,
                num_rooms = excluded.num_rooms,
                num_bathrooms = excluded.num_bathrooms,
                location = excluded.location,
                description = excluded.description,
                image_urls = excluded.image_urls,
                price_per_m2 = excluded.price_per_m2,
                raw_data = excluded.raw_data,
                updated_at = excluded.updated_at",
        )
        .bind(&id)
        .bind(&prop.external_id)
        .bind(&prop.url)
        .bind(&prop.title)
        .bind(prop.price)
        .bind(prop.area_m2)
        .bind(prop.num_rooms)
        .bind(prop.num_bathrooms)
        .bind(&prop.location)
        .bind(&prop.description)
        .bind(Json(&prop.image_urls))
        .bind(prop.price_per_m2)
        .bind(Json(&prop.raw_data))
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        sqlx::query_as("SELECT * FROM properties WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err)
    }
}
