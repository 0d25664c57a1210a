//! Image classification: which room does each listing photo show?
//!
//! Two-phase, cheapest first:
//! 1. Tag phase (free) — the scraper attaches a room tag to most images;
//!    a known tag classifies instantly at 0.9 confidence.
//! 2. Vision phase (paid) — untagged images go to the fast vision model,
//!    fanned out under a semaphore.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use rv_domain::chat::{ContentPart, Message};
use rv_providers::{ChatRequest, LlmProvider};

use crate::constants::{room_type_from_model, room_type_from_tag, TAG_CLASSIFICATION_CONFIDENCE};
use crate::models::{ImageClassification, RoomType};
use crate::prompts::IMAGE_CLASSIFICATION_PROMPT;

/// Classify one image from its scraper tag, without any model call.
/// Returns `None` for unknown tags — the caller falls back to vision.
pub fn classify_from_tag(image_url: &str, tag: &str) -> Option<ImageClassification> {
    room_type_from_tag(tag).map(|room_type| ImageClassification {
        image_url: image_url.to_string(),
        room_type,
        // Tags carry no instance information; grouping sorts that out.
        room_number: 1,
        confidence: TAG_CLASSIFICATION_CONFIDENCE,
    })
}

pub struct ImageClassifier {
    llm: Arc<dyn LlmProvider>,
    model: String,
    semaphore: Arc<Semaphore>,
}

impl ImageClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, model: String, max_concurrent: usize) -> Self {
        Self {
            llm,
            model,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Classify all images. Order of the result matches tag-phase images
    /// first, then vision-phase completions.
    pub async fn classify_images(
        &self,
        image_urls: &[String],
        image_tags: &BTreeMap<String, String>,
    ) -> Vec<ImageClassification> {
        let mut classifications = Vec::with_capacity(image_urls.len());
        let mut untagged: Vec<&String> = Vec::new();

        for url in image_urls {
            match image_tags.get(url).and_then(|tag| classify_from_tag(url, tag)) {
                Some(c) => classifications.push(c),
                None => untagged.push(url),
            }
        }

        tracing::info!(
            tagged = classifications.len(),
            vision = untagged.len(),
            total = image_urls.len(),
            "classification strategy chosen"
        );

        let vision_results = futures_util::future::join_all(
            untagged.iter().map(|url| self.classify_single(url)),
        )
        .await;
        classifications.extend(vision_results);

        classifications
    }

    /// One vision call for one image. Never fails: unparseable or refused
    /// responses degrade to `Other` with zero confidence.
    async fn classify_single(&self, image_url: &str) -> ImageClassification {
        let _permit = self.semaphore.acquire().await.expect("semaphore closed");

        let req = ChatRequest {
            messages: vec![Message::user_parts(vec![
                ContentPart::Text {
                    text: IMAGE_CLASSIFICATION_PROMPT.to_string(),
                },
                ContentPart::Image {
                    url: image_url.to_string(),
                    detail: Some("low".into()),
                },
            ])],
            json_mode: true,
            max_tokens: Some(200),
            model: Some(self.model.clone()),
            ..Default::default()
        };

        match self.llm.chat(req).await {
            Ok(resp) => parse_classification(image_url, &resp.content),
            Err(e) => {
                tracing::error!(image_url, error = %e, "classification call failed");
                unknown_classification(image_url)
            }
        }
    }
}

fn parse_classification(image_url: &str, content: &str) -> ImageClassification {
    let Ok(data) = serde_json::from_str::<Value>(content) else {
        tracing::warn!(image_url, "classification response is not valid JSON");
        return unknown_classification(image_url);
    };

    let room_type = data
        .get("room_type")
        .and_then(Value::as_str)
        .and_then(room_type_from_model)
        .unwrap_or(RoomType::Other);

    ImageClassification {
        image_url: image_url.to_string(),
        room_type,
        room_number: data
            .get("room_number")
            .and_then(Value::as_u64)
            .map(|n| n.max(1) as u32)
            .unwrap_or(1),
        confidence: data
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0),
    }
}

fn unknown_classification(image_url: &str) -> ImageClassification {
    ImageClassification {
        image_url: image_url.to_string(),
        room_type: RoomType::Other,
        room_number: 1,
        confidence: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_classification_skips_the_model() {
        let c = classify_from_tag("https://img.test/1.jpg", "kitchen").unwrap();
        assert_eq!(c.room_type, RoomType::Kitchen);
        assert!((c.confidence - 0.9).abs() < 1e-9);
        assert!(classify_from_tag("https://img.test/1.jpg", "spaceship").is_none());
    }

    #[test]
    fn parse_accepts_well_formed_response() {
        let c = parse_classification(
            "u",
            r#"{"room_type": "quarto", "room_number": 2, "confidence": 0.85}"#,
        );
        assert_eq!(c.room_type, RoomType::Bedroom);
        assert_eq!(c.room_number, 2);
    }

    #[test]
    fn parse_degrades_on_garbage() {
        let c = parse_classification("u", "not json at all");
        assert_eq!(c.room_type, RoomType::Other);
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn parse_clamps_zero_room_number() {
        let c = parse_classification(
            "u",
            r#"{"room_type": "cozinha", "room_number": 0, "confidence": 0.7}"#,
        );
        assert_eq!(c.room_number, 1);
    }
}
