//! Row types for the eight tables the orchestrator depends on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;

/// The five JSON profile sections, in canonical order.
pub const PROFILE_SECTIONS: [&str; 5] = ["fiscal", "budget", "renovation", "preferences", "goals"];

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: String,
    pub display_name: Option<String>,
    pub region: Option<String>,
    pub fiscal: Json<Value>,
    pub budget: Json<Value>,
    pub renovation: Json<Value>,
    pub preferences: Json<Value>,
    pub goals: Json<Value>,
    pub fiscal_summary: Option<String>,
    pub budget_summary: Option<String>,
    pub renovation_summary: Option<String>,
    pub preferences_summary: Option<String>,
    pub goals_summary: Option<String>,
    pub profile_summary: Option<String>,
    pub sections_completed: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProfileRow {
    /// Section data by name. Unknown names return `None`.
    pub fn section(&self, name: &str) -> Option<&Value> {
        match name {
            "fiscal" => Some(&self.fiscal.0),
            "budget" => Some(&self.budget.0),
            "renovation" => Some(&self.renovation.0),
            "preferences" => Some(&self.preferences.0),
            "goals" => Some(&self.goals.0),
            _ => None,
        }
    }

    pub fn section_summary(&self, name: &str) -> Option<&str> {
        let summary = match name {
            "fiscal" => &self.fiscal_summary,
            "budget" => &self.budget_summary,
            "renovation" => &self.renovation_summary,
            "preferences" => &self.preferences_summary,
            "goals" => &self.goals_summary,
            _ => return None,
        };
        summary.as_deref()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PropertyRow {
    pub id: String,
    /// Listing id parsed from the source URL; dedupe key for upserts.
    pub external_id: Option<String>,
    pub url: String,
    pub title: Option<String>,
    pub price: Option<i64>,
    pub area_m2: Option<f64>,
    pub num_rooms: Option<i64>,
    pub num_bathrooms: Option<i64>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub image_urls: Json<Vec<String>>,
    pub price_per_m2: Option<f64>,
    pub raw_data: Json<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for `upsert_property`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProperty {
    pub external_id: Option<String>,
    pub url: String,
    pub title: Option<String>,
    pub price: Option<i64>,
    pub area_m2: Option<f64>,
    pub num_rooms: Option<i64>,
    pub num_bathrooms: Option<i64>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
    pub price_per_m2: Option<f64>,
    pub raw_data: Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PortfolioItemRow {
    pub id: String,
    pub user_id: String,
    pub property_id: String,
    pub nickname: Option<String>,
    pub index_summary: Option<String>,
    /// "saved" | "analyzed" | "archived"
    pub status: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Portfolio item joined with the property columns the search tool scores on.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PortfolioSearchRow {
    pub id: String,
    pub property_id: String,
    pub nickname: Option<String>,
    pub index_summary: Option<String>,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
    pub location: Option<String>,
    pub title: Option<String>,
    pub price: Option<i64>,
    pub num_rooms: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisRow {
    pub id: String,
    pub user_id: String,
    pub property_id: String,
    pub portfolio_item_id: Option<String>,
    pub analysis_type: String,
    pub result_data: Json<Value>,
    pub chat_summary: Option<String>,
    pub detail_summary: Option<String>,
    pub status: String,
    pub preferences_snapshot: Json<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomFeatureRow {
    pub id: String,
    pub property_id: String,
    pub room_type: String,
    pub room_number: i64,
    pub room_label: String,
    pub features: Json<Value>,
    pub images: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `save_room_features`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoomFeatures {
    pub room_type: String,
    pub room_number: i64,
    pub room_label: String,
    pub features: Value,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub message_count: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub tool_calls: Option<Json<Value>>,
    pub tool_call_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One audit-log entry. Written by every tool that mutates durable state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub message_id: Option<String>,
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub field_changed: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub trigger_message: Option<String>,
    pub confidence: Option<f64>,
    pub confirmed_by_user: bool,
}

/// Result of the fast hydration query (≤3 round trips).
#[derive(Debug, Clone)]
pub struct HydratedContext {
    pub profile: Option<ProfileRow>,
    pub portfolio: Vec<PortfolioItemRow>,
    pub last_session_summary: Option<String>,
}
