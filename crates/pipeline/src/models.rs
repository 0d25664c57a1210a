//! Data model for the analysis pipeline: property records, per-image
//! classifications, room clusters, per-room analyses, and the final
//! renovation estimate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Room taxonomy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Room types identified in listing photos. Serialized as the Portuguese
/// value strings used in stored analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RoomType {
    #[serde(rename = "cozinha")]
    Kitchen,
    #[serde(rename = "sala")]
    LivingRoom,
    #[serde(rename = "quarto")]
    Bedroom,
    #[serde(rename = "casa_de_banho")]
    Bathroom,
    #[serde(rename = "corredor")]
    Hallway,
    #[serde(rename = "varanda")]
    Balcony,
    #[serde(rename = "exterior")]
    Exterior,
    #[serde(rename = "garagem")]
    Garage,
    #[serde(rename = "arrecadacao")]
    Storage,
    #[serde(rename = "planta")]
    FloorPlan,
    #[serde(rename = "outro")]
    Other,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Kitchen => "cozinha",
            RoomType::LivingRoom => "sala",
            RoomType::Bedroom => "quarto",
            RoomType::Bathroom => "casa_de_banho",
            RoomType::Hallway => "corredor",
            RoomType::Balcony => "varanda",
            RoomType::Exterior => "exterior",
            RoomType::Garage => "garagem",
            RoomType::Storage => "arrecadacao",
            RoomType::FloorPlan => "planta",
            RoomType::Other => "outro",
        }
    }

    /// Human label (Portuguese).
    pub fn label(&self) -> &'static str {
        match self {
            RoomType::Kitchen => "Cozinha",
            RoomType::LivingRoom => "Sala",
            RoomType::Bedroom => "Quarto",
            RoomType::Bathroom => "Casa de Banho",
            RoomType::Hallway => "Corredor",
            RoomType::Balcony => "Varanda",
            RoomType::Exterior => "Exterior",
            RoomType::Garage => "Garagem",
            RoomType::Storage => "Arrecadação",
            RoomType::FloorPlan => "Planta",
            RoomType::Other => "Outro",
        }
    }

    /// Types that can have multiple physical instances in one property.
    pub fn is_multi_instance(&self) -> bool {
        matches!(self, RoomType::Bedroom | RoomType::Bathroom)
    }

    /// Types the estimate stage produces costs for.
    pub fn is_estimable(&self) -> bool {
        !matches!(self, RoomType::Exterior | RoomType::Other | RoomType::FloorPlan)
    }
}

/// Label for a specific room instance (`"Quarto 2"`, `"Cozinha"`).
pub fn room_label(room_type: RoomType, room_number: u32) -> String {
    if room_type.is_multi_instance() && room_number > 0 {
        format!("{} {}", room_type.label(), room_number)
    } else {
        room_type.label().to_string()
    }
}

/// Condition levels for room assessment, worst-first severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomCondition {
    #[serde(rename = "excelente")]
    Excellent,
    #[serde(rename = "bom")]
    Good,
    #[serde(rename = "razoavel")]
    Fair,
    #[serde(rename = "mau")]
    Poor,
    #[serde(rename = "necessita_remodelacao_total")]
    NeedsFullRenovation,
}

impl RoomCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomCondition::Excellent => "excelente",
            RoomCondition::Good => "bom",
            RoomCondition::Fair => "razoavel",
            RoomCondition::Poor => "mau",
            RoomCondition::NeedsFullRenovation => "necessita_remodelacao_total",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RoomCondition::Excellent => "Excelente",
            RoomCondition::Good => "Bom",
            RoomCondition::Fair => "Razoável",
            RoomCondition::Poor => "Mau",
            RoomCondition::NeedsFullRenovation => "Remodelação total",
        }
    }

    /// 0 = worst. Used to sort priority rooms.
    pub fn severity(&self) -> u8 {
        match self {
            RoomCondition::NeedsFullRenovation => 0,
            RoomCondition::Poor => 1,
            RoomCondition::Fair => 2,
            RoomCondition::Good => 3,
            RoomCondition::Excellent => 4,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scrape output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Scraped property data from a listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyData {
    pub url: String,
    /// Listing id extracted from the URL.
    pub external_id: Option<String>,
    pub title: String,
    pub price: f64,
    pub area_m2: f64,
    pub num_rooms: u32,
    pub num_bathrooms: u32,
    pub location: String,
    pub description: String,
    pub image_urls: Vec<String>,
    /// Image URL → room tag attached by the scraper (free classification).
    #[serde(default)]
    pub image_tags: BTreeMap<String, String>,
    pub price_per_m2: f64,
    #[serde(default)]
    pub raw_data: Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification / grouping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of classifying a single listing photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageClassification {
    pub image_url: String,
    pub room_type: RoomType,
    pub room_number: u32,
    pub confidence: f64,
}

/// One physical room inferred from a batch of same-type photos.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCluster {
    pub room_number: u32,
    /// 0-based indices into the clustered image list.
    pub image_indices: Vec<usize>,
    pub confidence: f64,
    #[serde(default)]
    pub visual_cues: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Estimation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A specific renovation item for a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenovationItem {
    pub item: String,
    pub cost_min: f64,
    pub cost_max: f64,
    /// "alta" | "media" | "baixa"
    #[serde(default = "d_priority")]
    pub priority: String,
    #[serde(default)]
    pub notes: String,
}

fn d_priority() -> String {
    "media".into()
}

/// Complete analysis of a single room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomAnalysis {
    pub room_type: RoomType,
    pub room_number: u32,
    pub room_label: String,
    pub images: Vec<String>,
    pub condition: RoomCondition,
    #[serde(default)]
    pub condition_notes: String,
    #[serde(default)]
    pub renovation_items: Vec<RenovationItem>,
    pub cost_min: f64,
    pub cost_max: f64,
    pub confidence: f64,
    /// Structured features cached for later recalculation without vision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<RoomFeatures>,
}

/// Structured features extracted from room photos; the unit of the
/// room_features cache consumed by cost recalculation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_m2: Option<f64>,
    /// Category name ("flooring", "walls", ...) → observed feature.
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryFeature>,
}

/// Observed state of one renovation category in a room.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryFeature {
    /// 1 = needs full replacement ... 5 = excellent.
    pub condition_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    /// Unit count for per-unit categories (windows, doors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Final renovation estimate for a property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenovationEstimate {
    pub property_url: String,
    pub property_data: Option<PropertyData>,
    pub room_analyses: Vec<RoomAnalysis>,
    pub total_cost_min: f64,
    pub total_cost_max: f64,
    pub overall_confidence: f64,
    pub summary: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Progress event collected while the pipeline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// "status" | "progress" | "error" | "result"
    pub kind: String,
    pub message: String,
    pub step: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const PIPELINE_TOTAL_STEPS: u8 = 5;

/// State flowing through the five stages. Each stage checks `error` before
/// running and passes through when a previous stage failed.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub url: String,
    pub property_data: Option<PropertyData>,
    pub image_urls: Vec<String>,
    pub classifications: Vec<ImageClassification>,
    /// room key ("quarto_2") → classifications for that physical room.
    pub grouped: BTreeMap<String, Vec<ImageClassification>>,
    pub floor_plan_urls: Vec<String>,
    pub room_analyses: Vec<RoomAnalysis>,
    pub estimate: Option<RenovationEstimate>,
    pub summary: String,
    pub events: Vec<StageEvent>,
    pub error: Option<String>,
    pub stage: &'static str,
}

impl PipelineState {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            stage: "starting",
            ..Default::default()
        }
    }

    pub fn status(&mut self, step: u8, message: impl Into<String>) {
        self.events.push(StageEvent {
            kind: "status".into(),
            message: message.into(),
            step,
            data: None,
        });
    }

    pub fn progress(&mut self, step: u8, message: impl Into<String>, data: Option<Value>) {
        self.events.push(StageEvent {
            kind: "progress".into(),
            message: message.into(),
            step,
            data,
        });
    }

    pub fn fail(&mut self, step: u8, stage: &'static str, message: impl Into<String>) {
        let message = message.into();
        self.events.push(StageEvent {
            kind: "error".into(),
            message: message.clone(),
            step,
            data: None,
        });
        self.error = Some(message);
        self.stage = stage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_labels_number_multi_instance_types() {
        assert_eq!(room_label(RoomType::Bedroom, 2), "Quarto 2");
        assert_eq!(room_label(RoomType::Kitchen, 3), "Cozinha");
    }

    #[test]
    fn condition_severity_orders_worst_first() {
        assert!(
            RoomCondition::NeedsFullRenovation.severity() < RoomCondition::Poor.severity()
        );
        assert!(RoomCondition::Poor.severity() < RoomCondition::Excellent.severity());
    }

    #[test]
    fn room_type_serializes_to_portuguese_values() {
        let json = serde_json::to_string(&RoomType::Bathroom).unwrap();
        assert_eq!(json, "\"casa_de_banho\"");
        let back: RoomType = serde_json::from_str("\"cozinha\"").unwrap();
        assert_eq!(back, RoomType::Kitchen);
    }
}
