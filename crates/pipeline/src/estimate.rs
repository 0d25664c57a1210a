//! Per-room renovation estimation.
//!
//! One vision call per physical room (all of its photos together, capped),
//! fanned out under a semaphore. A failed call degrades to a conservative
//! per-type cost table at low confidence — the pipeline never loses a room.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use rv_domain::chat::{ContentPart, Message};
use rv_providers::{ChatRequest, LlmProvider};

use crate::constants::{
    condition_from_model, fallback_cost, FALLBACK_CONFIDENCE, IMAGE_BOOST_MAX,
    IMAGE_BOOST_PER_IMAGE,
};
use crate::models::{
    room_label, ImageClassification, RenovationItem, RoomAnalysis, RoomCondition, RoomFeatures,
    RoomType,
};
use crate::prompts::ROOM_ANALYSIS_PROMPT;

pub struct RoomEstimator {
    llm: Arc<dyn LlmProvider>,
    model: String,
    semaphore: Arc<Semaphore>,
    images_per_room: usize,
}

impl RoomEstimator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        model: String,
        max_concurrent: usize,
        images_per_room: usize,
    ) -> Self {
        Self {
            llm,
            model,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            images_per_room: images_per_room.max(1),
        }
    }

    /// Analyze every grouped room concurrently. Results are keyed by room,
    /// not by completion order.
    pub async fn analyze_all_rooms(
        &self,
        grouped: &BTreeMap<String, Vec<ImageClassification>>,
    ) -> Vec<RoomAnalysis> {
        let futures = grouped.values().filter(|g| !g.is_empty()).map(|group| {
            let room_type = group[0].room_type;
            let room_number = group[0].room_number;
            let urls: Vec<String> = group.iter().map(|c| c.image_url.clone()).collect();
            async move {
                let _permit = self.semaphore.acquire().await.expect("semaphore closed");
                self.analyze_room(room_type, room_number, urls).await
            }
        });
        futures_util::future::join_all(futures).await
    }

    /// Analyze a single room from all of its photos.
    pub async fn analyze_room(
        &self,
        room_type: RoomType,
        room_number: u32,
        image_urls: Vec<String>,
    ) -> RoomAnalysis {
        let label = room_label(room_type, room_number);
        let capped: Vec<&String> = image_urls.iter().take(self.images_per_room).collect();

        let prompt = ROOM_ANALYSIS_PROMPT
            .replace("{room_label}", &label)
            .replace("{num_images}", &capped.len().to_string());

        let mut parts = vec![ContentPart::Text { text: prompt }];
        parts.extend(capped.iter().map(|url| ContentPart::Image {
            url: (*url).clone(),
            detail: Some("high".into()),
        }));

        let req = ChatRequest {
            messages: vec![Message::user_parts(parts)],
            json_mode: true,
            max_tokens: Some(2000),
            model: Some(self.model.clone()),
            ..Default::default()
        };

        match self.llm.chat(req).await {
            Ok(resp) => match parse_room_analysis(
                room_type,
                room_number,
                &label,
                &image_urls,
                &resp.content,
            ) {
                Some(analysis) => analysis,
                None => {
                    tracing::warn!(room = %label, "room analysis response unusable");
                    fallback_analysis(room_type, room_number, &label, &image_urls)
                }
            },
            Err(e) => {
                tracing::error!(room = %label, error = %e, "room analysis call failed");
                fallback_analysis(room_type, room_number, &label, &image_urls)
            }
        }
    }
}

fn parse_room_analysis(
    room_type: RoomType,
    room_number: u32,
    label: &str,
    image_urls: &[String],
    content: &str,
) -> Option<RoomAnalysis> {
    let data: Value = serde_json::from_str(content).ok()?;

    let condition = data
        .get("condition")
        .and_then(Value::as_str)
        .map(condition_from_model)
        .unwrap_or(RoomCondition::Fair);

    let renovation_items: Vec<RenovationItem> = data
        .get("renovation_items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    let features = data
        .get("features")
        .and_then(|f| serde_json::from_value::<RoomFeatures>(f.clone()).ok())
        .filter(|f| !f.categories.is_empty());

    // More photos = more visual evidence = higher confidence.
    let base_confidence = data
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5);
    let boost = (image_urls.len() as f64 * IMAGE_BOOST_PER_IMAGE).min(IMAGE_BOOST_MAX);

    Some(RoomAnalysis {
        room_type,
        room_number,
        room_label: label.to_string(),
        images: image_urls.to_vec(),
        condition,
        condition_notes: data
            .get("condition_notes")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        renovation_items,
        cost_min: data.get("cost_min").and_then(Value::as_f64).unwrap_or(0.0),
        cost_max: data.get("cost_max").and_then(Value::as_f64).unwrap_or(0.0),
        confidence: (base_confidence + boost).min(1.0),
        features,
    })
}

/// Conservative estimate used when the vision call fails.
pub fn fallback_analysis(
    room_type: RoomType,
    room_number: u32,
    label: &str,
    image_urls: &[String],
) -> RoomAnalysis {
    let (cost_min, cost_max) = fallback_cost(room_type);
    RoomAnalysis {
        room_type,
        room_number,
        room_label: label.to_string(),
        images: image_urls.to_vec(),
        condition: RoomCondition::Fair,
        condition_notes: "Não foi possível analisar as imagens em detalhe.".into(),
        renovation_items: vec![RenovationItem {
            item: format!("Remodelação geral da {}", label.to_lowercase()),
            cost_min,
            cost_max,
            priority: "media".into(),
            notes: "Estimativa conservadora devido a falha na análise".into(),
        }],
        cost_min,
        cost_max,
        confidence: FALLBACK_CONFIDENCE,
        features: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_estimate_and_features() {
        let content = r#"{
            "condition": "mau",
            "condition_notes": "Cozinha original dos anos 60",
            "renovation_items": [
                {"item": "Substituir móveis", "cost_min": 4000, "cost_max": 9000,
                 "priority": "alta", "notes": ""}
            ],
            "cost_min": 5000,
            "cost_max": 12000,
            "confidence": 0.7,
            "features": {
                "area_m2": 9,
                "categories": { "kitchen": {"condition_score": 2} }
            }
        }"#;
        let urls = vec!["a".to_string(), "b".to_string()];
        let analysis =
            parse_room_analysis(RoomType::Kitchen, 1, "Cozinha", &urls, content).unwrap();
        assert_eq!(analysis.condition, RoomCondition::Poor);
        assert_eq!(analysis.renovation_items.len(), 1);
        // 0.7 base + 2 * 0.05 image boost.
        assert!((analysis.confidence - 0.8).abs() < 1e-9);
        assert!(analysis.features.is_some());
    }

    #[test]
    fn image_boost_is_capped() {
        let urls: Vec<String> = (0..10).map(|i| format!("u{i}")).collect();
        let analysis = parse_room_analysis(
            RoomType::Bedroom,
            1,
            "Quarto 1",
            &urls,
            r#"{"condition": "bom", "cost_min": 0, "cost_max": 500, "confidence": 0.9}"#,
        )
        .unwrap();
        assert!((analysis.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn fallback_uses_conservative_table() {
        let analysis = fallback_analysis(RoomType::Bathroom, 2, "Casa de Banho 2", &[]);
        assert_eq!(analysis.cost_min, 3000.0);
        assert_eq!(analysis.cost_max, 8000.0);
        assert!((analysis.confidence - FALLBACK_CONFIDENCE).abs() < 1e-9);
        assert_eq!(analysis.condition, RoomCondition::Fair);
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(parse_room_analysis(RoomType::Kitchen, 1, "Cozinha", &[], "oops").is_none());
    }
}
