//! Totals, overall confidence, and the final narrative summary.

use std::sync::Arc;

use rv_domain::chat::Message;
use rv_providers::{ChatRequest, LlmProvider};

use crate::models::{PropertyData, RenovationEstimate, RoomAnalysis};
use crate::prompts::SUMMARY_PROMPT;

/// Overall confidence: weighted mean of per-room confidence by `cost_max`,
/// so expensive rooms dominate. Falls back to the plain mean when the total
/// max is zero; zero rooms yield zero.
pub fn overall_confidence(room_analyses: &[RoomAnalysis]) -> f64 {
    if room_analyses.is_empty() {
        return 0.0;
    }
    let total_max: f64 = room_analyses.iter().map(|r| r.cost_max).sum();
    let confidence = if total_max > 0.0 {
        room_analyses
            .iter()
            .map(|r| r.confidence * r.cost_max)
            .sum::<f64>()
            / total_max
    } else {
        room_analyses.iter().map(|r| r.confidence).sum::<f64>() / room_analyses.len() as f64
    };
    confidence.min(1.0)
}

/// Assemble the final estimate from room analyses.
pub fn create_estimate(
    property_url: &str,
    property_data: Option<PropertyData>,
    room_analyses: Vec<RoomAnalysis>,
    summary: String,
) -> RenovationEstimate {
    let total_cost_min = room_analyses.iter().map(|r| r.cost_min).sum();
    let total_cost_max = room_analyses.iter().map(|r| r.cost_max).sum();
    let confidence = overall_confidence(&room_analyses);

    RenovationEstimate {
        property_url: property_url.to_string(),
        property_data,
        room_analyses,
        total_cost_min,
        total_cost_max,
        overall_confidence: confidence,
        summary,
    }
}

/// Deterministic summary used when the narrative call fails.
pub fn template_summary(room_count: usize, total_min: f64, total_max: f64) -> String {
    format!(
        "Estimativa total de remodelação: {:.0}€ - {:.0}€. Analisadas {} divisões.",
        total_min, total_max, room_count
    )
}

/// Generate the narrative summary via the LLM, degrading to the template.
pub async fn generate_summary(
    llm: &Arc<dyn LlmProvider>,
    model: &str,
    property_data: Option<&PropertyData>,
    room_analyses: &[RoomAnalysis],
    total_min: f64,
    total_max: f64,
) -> String {
    let room_summaries: Vec<String> = room_analyses
        .iter()
        .map(|r| {
            format!(
                "- {}: Estado {}, custo estimado {:.0}€ - {:.0}€",
                r.room_label,
                r.condition.as_str(),
                r.cost_min,
                r.cost_max
            )
        })
        .collect();

    let prompt = SUMMARY_PROMPT
        .replace(
            "{price}",
            &property_data.map_or("N/A".into(), |p| format!("{:.0}", p.price)),
        )
        .replace(
            "{area_m2}",
            &property_data.map_or("N/A".into(), |p| format!("{:.0}", p.area_m2)),
        )
        .replace(
            "{location}",
            property_data.map_or("N/A", |p| p.location.as_str()),
        )
        .replace("{room_summaries}", &room_summaries.join("\n"))
        .replace("{total_min}", &format!("{total_min:.0}"))
        .replace("{total_max}", &format!("{total_max:.0}"));

    let req = ChatRequest {
        messages: vec![Message::user(prompt)],
        max_tokens: Some(500),
        model: Some(model.to_string()),
        ..Default::default()
    };

    match llm.chat(req).await {
        Ok(resp) if !resp.content.trim().is_empty() => resp.content.trim().to_string(),
        Ok(_) | Err(_) => {
            tracing::warn!("summary generation failed, using template");
            template_summary(room_analyses.len(), total_min, total_max)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RoomCondition, RoomType};

    fn room(cost_max: f64, confidence: f64) -> RoomAnalysis {
        RoomAnalysis {
            room_type: RoomType::Kitchen,
            room_number: 1,
            room_label: "Cozinha".into(),
            images: vec![],
            condition: RoomCondition::Fair,
            condition_notes: String::new(),
            renovation_items: vec![],
            cost_min: cost_max / 2.0,
            cost_max,
            confidence,
            features: None,
        }
    }

    #[test]
    fn confidence_is_cost_weighted() {
        // The expensive room (0.9) dominates the cheap one (0.1).
        let rooms = vec![room(9000.0, 0.9), room(1000.0, 0.1)];
        let c = overall_confidence(&rooms);
        assert!((c - 0.82).abs() < 1e-9);
    }

    #[test]
    fn confidence_stays_within_per_room_bounds() {
        let rooms = vec![room(5000.0, 0.4), room(2000.0, 0.8)];
        let c = overall_confidence(&rooms);
        assert!(c >= 0.4 && c <= 0.8);
    }

    #[test]
    fn zero_rooms_zero_confidence_zero_range() {
        assert_eq!(overall_confidence(&[]), 0.0);
        let estimate = create_estimate("u", None, vec![], "".into());
        assert_eq!(estimate.total_cost_min, 0.0);
        assert_eq!(estimate.total_cost_max, 0.0);
        assert_eq!(estimate.overall_confidence, 0.0);
    }

    #[test]
    fn zero_cost_rooms_use_plain_mean() {
        let rooms = vec![room(0.0, 0.4), room(0.0, 0.6)];
        assert!((overall_confidence(&rooms) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn totals_are_sums() {
        let estimate = create_estimate(
            "u",
            None,
            vec![room(10000.0, 0.5), room(4000.0, 0.5)],
            "resumo".into(),
        );
        assert_eq!(estimate.total_cost_min, 7000.0);
        assert_eq!(estimate.total_cost_max, 14000.0);
    }
}
