//! Cost recalculation from cached room features.
//!
//! No vision calls: the estimate stage caches per-room structured features
//! (condition scores, materials, counts) and this module reprices them with
//! the user's current preferences (finish level, DIY skills).

use crate::constants::{
    finish_level_multiplier, labor_ratio, repair_cost, replace_cost, room_area_weight,
    CostRange, CostUnit, CONDITION_REPAIR_THRESHOLD, CONDITION_REPLACE_THRESHOLD,
    DEFAULT_ROOM_AREA_M2,
};
use crate::models::{CategoryFeature, RenovationItem, RoomAnalysis, RoomCondition, RoomFeatures, RoomType};

/// Preferences applied during recalculation.
#[derive(Debug, Clone, Default)]
pub struct RenovationPrefs {
    /// "economico" | "standard" | "premium"
    pub finish_level: String,
    /// Categories the user can do themselves; labor is stripped from these.
    pub diy_skills: Vec<String>,
}

/// One cached room as read back from the room_features table.
#[derive(Debug, Clone)]
pub struct CachedRoom {
    pub room_type: RoomType,
    pub room_number: u32,
    pub room_label: String,
    pub features: RoomFeatures,
    pub images: Vec<String>,
}

/// Reprice every cached room. `property_area_m2` feeds the per-type area
/// weights when a room's own area was not observed.
pub fn recalculate_from_features(
    rooms: &[CachedRoom],
    prefs: &RenovationPrefs,
    property_area_m2: Option<f64>,
) -> Vec<RoomAnalysis> {
    rooms
        .iter()
        .map(|room| recalculate_room(room, prefs, property_area_m2))
        .collect()
}

fn recalculate_room(
    room: &CachedRoom,
    prefs: &RenovationPrefs,
    property_area_m2: Option<f64>,
) -> RoomAnalysis {
    let area = resolve_area(room, property_area_m2);
    let finish = finish_level_multiplier(&prefs.finish_level);

    let mut items = Vec::new();
    let mut cost_min = 0.0;
    let mut cost_max = 0.0;
    let mut score_sum = 0u32;
    let mut score_count = 0u32;

    for (category, feature) in &room.features.categories {
        score_sum += u32::from(feature.condition_score.clamp(1, 5));
        score_count += 1;

        let Some((range, action)) = action_for(category, feature) else {
            continue;
        };

        let quantity = match range.unit {
            CostUnit::PerM2 => area,
            CostUnit::PerUnit => f64::from(feature.count.unwrap_or(1).max(1)),
            CostUnit::PerRoom => 1.0,
        };

        // Finish level scales material-driven replacements only.
        let finish_factor = if action == Action::Replace { finish } else { 1.0 };
        // DIY strips the labor fraction for categories the user can handle.
        let diy_factor = if prefs.diy_skills.iter().any(|s| s == category) {
            1.0 - labor_ratio(category)
        } else {
            1.0
        };

        let item_min = range.min * quantity * finish_factor * diy_factor;
        let item_max = range.max * quantity * finish_factor * diy_factor;
        cost_min += item_min;
        cost_max += item_max;

        items.push(RenovationItem {
            item: item_description(category, action),
            cost_min: item_min.round(),
            cost_max: item_max.round(),
            priority: if feature.condition_score <= CONDITION_REPLACE_THRESHOLD {
                "alta".into()
            } else {
                "media".into()
            },
            notes: String::new(),
        });
    }

    let condition = if score_count == 0 {
        RoomCondition::Fair
    } else {
        condition_from_avg(score_sum as f64 / f64::from(score_count))
    };

    RoomAnalysis {
        room_type: room.room_type,
        room_number: room.room_number,
        room_label: room.room_label.clone(),
        images: room.images.clone(),
        condition,
        condition_notes: String::new(),
        renovation_items: items,
        cost_min: cost_min.round(),
        cost_max: cost_max.round(),
        // Features came from a real visual pass; repricing keeps a solid
        // but not vision-fresh confidence.
        confidence: 0.7,
        features: Some(room.features.clone()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Replace,
    Repair,
}

fn action_for(category: &str, feature: &CategoryFeature) -> Option<(CostRange, Action)> {
    let score = feature.condition_score.clamp(1, 5);
    if score <= CONDITION_REPLACE_THRESHOLD {
        replace_cost(category, feature.material.as_deref()).map(|r| (r, Action::Replace))
    } else if score == CONDITION_REPAIR_THRESHOLD {
        repair_cost(category).map(|r| (r, Action::Repair))
    } else {
        None
    }
}

fn resolve_area(room: &CachedRoom, property_area_m2: Option<f64>) -> f64 {
    if let Some(area) = room.features.area_m2.filter(|a| *a > 0.0) {
        return area;
    }
    match property_area_m2.filter(|a| *a > 0.0) {
        Some(total) => total * room_area_weight(room.room_type),
        None => DEFAULT_ROOM_AREA_M2,
    }
}

fn condition_from_avg(avg: f64) -> RoomCondition {
    if avg <= 1.5 {
        RoomCondition::NeedsFullRenovation
    } else if avg <= 2.5 {
        RoomCondition::Poor
    } else if avg <= 3.5 {
        RoomCondition::Fair
    } else if avg <= 4.5 {
        RoomCondition::Good
    } else {
        RoomCondition::Excellent
    }
}

fn item_description(category: &str, action: Action) -> String {
    let text = match (category, action) {
        ("flooring", Action::Replace) => "Substituir pavimento",
        ("flooring", Action::Repair) => "Reparar pavimento",
        ("walls", Action::Replace) => "Reboco e pintura de paredes",
        ("walls", Action::Repair) => "Pintura de paredes",
        ("ceiling", Action::Replace) => "Reparação completa do teto",
        ("ceiling", Action::Repair) => "Pintura do teto",
        ("windows", Action::Replace) => "Substituir janelas",
        ("windows", Action::Repair) => "Reparar janelas",
        ("doors", Action::Replace) => "Substituir portas",
        ("doors", Action::Repair) => "Reparar e pintar portas",
        ("kitchen", Action::Replace) => "Remodelação completa da cozinha",
        ("kitchen", Action::Repair) => "Renovação parcial da cozinha",
        ("bathroom", Action::Replace) => "Remodelação completa da casa de banho",
        ("bathroom", Action::Repair) => "Renovação parcial da casa de banho",
        ("electrical", Action::Replace) => "Renovar instalação elétrica",
        ("electrical", Action::Repair) => "Atualizar tomadas e interruptores",
        ("plumbing", Action::Replace) => "Substituir canalização",
        ("plumbing", Action::Repair) => "Reparar canalização visível",
        (other, Action::Replace) => return format!("Substituir {other}"),
        (other, Action::Repair) => return format!("Reparar {other}"),
    };
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn cached_kitchen(score: u8) -> CachedRoom {
        let mut categories = BTreeMap::new();
        categories.insert(
            "kitchen".to_string(),
            CategoryFeature {
                condition_score: score,
                material: None,
                count: None,
            },
        );
        CachedRoom {
            room_type: RoomType::Kitchen,
            room_number: 1,
            room_label: "Cozinha".into(),
            features: RoomFeatures {
                area_m2: Some(10.0),
                categories,
            },
            images: vec![],
        }
    }

    #[test]
    fn poor_condition_prices_a_replacement() {
        let rooms = recalculate_from_features(&[cached_kitchen(2)], &RenovationPrefs::default(), None);
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].cost_min, 3000.0);
        assert_eq!(rooms[0].cost_max, 15000.0);
        assert_eq!(rooms[0].condition, RoomCondition::Poor);
        assert_eq!(rooms[0].renovation_items[0].priority, "alta");
    }

    #[test]
    fn good_condition_costs_nothing() {
        let rooms = recalculate_from_features(&[cached_kitchen(5)], &RenovationPrefs::default(), None);
        assert_eq!(rooms[0].cost_min, 0.0);
        assert_eq!(rooms[0].cost_max, 0.0);
        assert!(rooms[0].renovation_items.is_empty());
    }

    #[test]
    fn finish_level_scales_replacements() {
        let prefs = RenovationPrefs {
            finish_level: "premium".into(),
            diy_skills: vec![],
        };
        let rooms = recalculate_from_features(&[cached_kitchen(2)], &prefs, None);
        assert_eq!(rooms[0].cost_max, 22500.0); // 15000 * 1.5
    }

    #[test]
    fn diy_strips_labor_share() {
        let prefs = RenovationPrefs {
            finish_level: "standard".into(),
            diy_skills: vec!["kitchen".into()],
        };
        let rooms = recalculate_from_features(&[cached_kitchen(2)], &prefs, None);
        // kitchen labor ratio 0.35 → 65% remains.
        assert_eq!(rooms[0].cost_max, 9750.0);
    }

    #[test]
    fn per_m2_categories_use_room_area() {
        let mut categories = BTreeMap::new();
        categories.insert(
            "walls".to_string(),
            CategoryFeature {
                condition_score: 3,
                material: None,
                count: None,
            },
        );
        let room = CachedRoom {
            room_type: RoomType::Bedroom,
            room_number: 1,
            room_label: "Quarto 1".into(),
            features: RoomFeatures {
                area_m2: None,
                categories,
            },
            images: vec![],
        };
        // 75m² * bedroom weight 0.16 = 12m²; repaint 8-15€/m².
        let rooms = recalculate_from_features(
            &[room],
            &RenovationPrefs::default(),
            Some(75.0),
        );
        assert_eq!(rooms[0].cost_min, 96.0);
        assert_eq!(rooms[0].cost_max, 180.0);
    }
}
