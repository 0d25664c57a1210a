//! Business constants: tag maps, confidence thresholds, fallback costs,
//! cost tables and multipliers (EUR, Portugal market 2024/2025).

use crate::models::{RoomCondition, RoomType};

// --- Confidence thresholds ---
pub const TAG_CLASSIFICATION_CONFIDENCE: f64 = 0.9;
pub const FALLBACK_CONFIDENCE: f64 = 0.3;
pub const IMAGE_BOOST_PER_IMAGE: f64 = 0.05;
pub const IMAGE_BOOST_MAX: f64 = 0.2;

/// Scraper tag (English) → room type. Unknown tags fall back to the vision
/// classifier.
pub fn room_type_from_tag(tag: &str) -> Option<RoomType> {
    let room_type = match tag.trim().to_lowercase().as_str() {
        "kitchen" => RoomType::Kitchen,
        "bedroom" | "office" => RoomType::Bedroom,
        "bathroom" => RoomType::Bathroom,
        "livingroom" | "living_room" | "living-room" | "lounge" | "dining" | "diningroom" => {
            RoomType::LivingRoom
        }
        "terrace" | "balcony" => RoomType::Balcony,
        "exterior" | "facade" | "garden" | "pool" => RoomType::Exterior,
        "garage" => RoomType::Garage,
        "storage" | "laundry" => RoomType::Storage,
        "hallway" | "hall" | "corridor" => RoomType::Hallway,
        "planta" | "floor_plan" | "floorplan" | "floor-plan" | "plan" | "plans" | "planimetria" => {
            RoomType::FloorPlan
        }
        _ => return None,
    };
    Some(room_type)
}

/// Model response string → room type (the vision classifier answers in
/// Portuguese but occasionally slips into English).
pub fn room_type_from_model(raw: &str) -> Option<RoomType> {
    let room_type = match raw.trim().to_lowercase().as_str() {
        "cozinha" | "kitchen" => RoomType::Kitchen,
        "sala" | "living_room" | "living room" | "sala de estar" => RoomType::LivingRoom,
        "quarto" | "bedroom" => RoomType::Bedroom,
        "casa_de_banho" | "casa de banho" | "bathroom" | "wc" => RoomType::Bathroom,
        "corredor" | "hallway" | "hall" => RoomType::Hallway,
        "varanda" | "balcony" | "terraço" | "terrace" => RoomType::Balcony,
        "exterior" | "fachada" => RoomType::Exterior,
        "garagem" | "garage" => RoomType::Garage,
        "arrecadacao" | "storage" | "despensa" => RoomType::Storage,
        "planta" | "floor_plan" | "floor plan" | "floorplan" => RoomType::FloorPlan,
        "outro" | "other" => RoomType::Other,
        _ => return None,
    };
    Some(room_type)
}

/// Condition string from a model response → enum. Defaults to `Fair`.
pub fn condition_from_model(raw: &str) -> RoomCondition {
    match raw.trim().to_lowercase().as_str() {
        "excelente" | "excellent" => RoomCondition::Excellent,
        "bom" | "good" => RoomCondition::Good,
        "mau" | "poor" => RoomCondition::Poor,
        "necessita_remodelacao_total" | "needs_full_renovation" => {
            RoomCondition::NeedsFullRenovation
        }
        _ => RoomCondition::Fair,
    }
}

/// Conservative (min, max) fallback renovation costs in EUR per room type,
/// used when the vision estimate fails.
pub fn fallback_cost(room_type: RoomType) -> (f64, f64) {
    match room_type {
        RoomType::Kitchen => (5000.0, 15000.0),
        RoomType::Bathroom => (3000.0, 8000.0),
        RoomType::Bedroom => (1000.0, 3000.0),
        RoomType::LivingRoom => (1500.0, 5000.0),
        RoomType::Hallway => (500.0, 1500.0),
        RoomType::Balcony => (500.0, 2000.0),
        RoomType::Exterior | RoomType::FloorPlan => (0.0, 0.0),
        RoomType::Garage => (500.0, 2000.0),
        RoomType::Storage => (200.0, 800.0),
        RoomType::Other => (500.0, 2000.0),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cost recalculation tables
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pricing unit for a cost-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostUnit {
    PerM2,
    PerUnit,
    PerRoom,
}

/// A (min, max, unit) price range.
#[derive(Debug, Clone, Copy)]
pub struct CostRange {
    pub min: f64,
    pub max: f64,
    pub unit: CostUnit,
}

const fn per_m2(min: f64, max: f64) -> CostRange {
    CostRange { min, max, unit: CostUnit::PerM2 }
}
const fn per_unit(min: f64, max: f64) -> CostRange {
    CostRange { min, max, unit: CostUnit::PerUnit }
}
const fn per_room(min: f64, max: f64) -> CostRange {
    CostRange { min, max, unit: CostUnit::PerRoom }
}

/// Replacement cost for a category, keyed by (category, material).
/// Material is matched loosely; `None`/unknown falls back to the category
/// default.
pub fn replace_cost(category: &str, material: Option<&str>) -> Option<CostRange> {
    let range = match category {
        "flooring" => match material.unwrap_or("") {
            "hardwood" => per_m2(50.0, 80.0),
            "laminate" => per_m2(20.0, 35.0),
            "ceramic_tile" => per_m2(25.0, 50.0),
            "vinyl" => per_m2(15.0, 30.0),
            "marble" => per_m2(80.0, 150.0),
            _ => per_m2(20.0, 50.0),
        },
        "walls" => per_m2(25.0, 45.0),
        "ceiling" => per_m2(25.0, 45.0),
        "windows" => match material.unwrap_or("") {
            "aluminum_single" => per_unit(300.0, 600.0),
            "aluminum_double" => per_unit(400.0, 700.0),
            "pvc_double" => per_unit(400.0, 800.0),
            "wood" => per_unit(500.0, 1000.0),
            _ => per_unit(350.0, 700.0),
        },
        "doors" => per_unit(150.0, 400.0),
        "kitchen" => per_room(3000.0, 15000.0),
        "bathroom" => per_room(3000.0, 8000.0),
        "electrical" => per_room(300.0, 800.0),
        "plumbing" => per_room(500.0, 2000.0),
        _ => return None,
    };
    Some(range)
}

/// Repair/refurbish cost for a category.
pub fn repair_cost(category: &str) -> Option<CostRange> {
    let range = match category {
        "flooring" => per_m2(5.0, 15.0),
        "walls" => per_m2(8.0, 15.0),
        "ceiling" => per_m2(6.0, 12.0),
        "windows" => per_unit(50.0, 150.0),
        "doors" => per_unit(30.0, 80.0),
        "kitchen" => per_room(800.0, 2500.0),
        "bathroom" => per_room(500.0, 2000.0),
        "electrical" => per_unit(50.0, 150.0),
        "plumbing" => per_room(100.0, 500.0),
        _ => return None,
    };
    Some(range)
}

/// Fraction of a category's cost that is labor. When the user can DIY the
/// category, the labor fraction is stripped from the estimate.
pub fn labor_ratio(category: &str) -> f64 {
    match category {
        "flooring" => 0.50,
        "walls" | "ceiling" => 0.60,
        "windows" | "doors" => 0.40,
        "kitchen" => 0.35,
        "bathroom" => 0.50,
        "electrical" => 0.65,
        "plumbing" => 0.70,
        _ => 0.5,
    }
}

/// Finish-level multiplier applied to material-driven costs.
pub fn finish_level_multiplier(level: &str) -> f64 {
    match level {
        "economico" => 0.7,
        "premium" => 1.5,
        _ => 1.0,
    }
}

/// Fraction of total usable area a room of this type typically occupies.
/// Used to estimate room area when photos don't tell us.
pub fn room_area_weight(room_type: RoomType) -> f64 {
    match room_type {
        RoomType::Kitchen => 0.14,
        RoomType::LivingRoom => 0.25,
        RoomType::Bedroom => 0.16,
        RoomType::Bathroom => 0.07,
        RoomType::Hallway => 0.08,
        RoomType::Balcony => 0.06,
        RoomType::Garage => 0.15,
        RoomType::Storage => 0.05,
        _ => 0.10,
    }
}

pub const DEFAULT_ROOM_AREA_M2: f64 = 10.0;

/// Condition score thresholds: score ≤ 2 → replace, score 3 → repair,
/// score ≥ 4 → keep.
pub const CONDITION_REPLACE_THRESHOLD: u8 = 2;
pub const CONDITION_REPAIR_THRESHOLD: u8 = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_map_covers_common_scraper_tags() {
        assert_eq!(room_type_from_tag("kitchen"), Some(RoomType::Kitchen));
        assert_eq!(room_type_from_tag(" Bedroom "), Some(RoomType::Bedroom));
        assert_eq!(room_type_from_tag("floorplan"), Some(RoomType::FloorPlan));
        assert_eq!(room_type_from_tag("holodeck"), None);
    }

    #[test]
    fn model_condition_defaults_to_fair() {
        assert_eq!(condition_from_model("mau"), RoomCondition::Poor);
        assert_eq!(condition_from_model("???"), RoomCondition::Fair);
    }

    #[test]
    fn fallback_costs_are_zero_for_non_estimable_types() {
        assert_eq!(fallback_cost(RoomType::Exterior), (0.0, 0.0));
        assert!(fallback_cost(RoomType::Kitchen).0 > 0.0);
    }
}
