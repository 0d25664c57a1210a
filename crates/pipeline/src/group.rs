//! Room grouping: collapse many photos into one entry per physical room.
//!
//! A listing usually carries several photos of the same space; estimating
//! per photo would double-count rooms. Singleton types (kitchen, living
//! room, ...) keep index 1. Multi-instance types (bedroom, bathroom) are
//! clustered by visual similarity in a single batched vision call, with
//! listing metadata (T2 ⇒ 2 bedrooms) as a fallback and a cap.
//! Under-grouping is preferred over over-grouping.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use rv_domain::chat::{ContentPart, Message};
use rv_providers::{ChatRequest, LlmProvider};

use crate::constants::FALLBACK_CONFIDENCE;
use crate::models::{ImageClassification, RoomCluster, RoomType};
use crate::prompts::ROOM_CLUSTERING_PROMPT;

/// Output of the group stage.
#[derive(Debug, Clone, Default)]
pub struct GroupResult {
    /// room key ("quarto_2") → classifications of that physical room.
    pub grouped: BTreeMap<String, Vec<ImageClassification>>,
    /// Floor-plan images split out of the room buckets.
    pub floor_plan_urls: Vec<String>,
}

pub struct RoomGrouper {
    llm: Arc<dyn LlmProvider>,
    model: String,
    semaphore: Arc<Semaphore>,
    max_clustering_images: usize,
}

impl RoomGrouper {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        model: String,
        max_concurrent: usize,
        max_clustering_images: usize,
    ) -> Self {
        Self {
            llm,
            model,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            max_clustering_images: max_clustering_images.max(2),
        }
    }

    /// Group classifications into physical rooms.
    ///
    /// `num_rooms`/`num_bathrooms` come from listing metadata and bound the
    /// cluster count for the matching type.
    pub async fn group_by_room(
        &self,
        classifications: &[ImageClassification],
        num_rooms: Option<u32>,
        num_bathrooms: Option<u32>,
    ) -> GroupResult {
        let mut result = GroupResult::default();
        if classifications.is_empty() {
            return result;
        }

        // Pass 1: bucket by room type, splitting out floor plans and
        // non-estimable types.
        let mut buckets: BTreeMap<RoomType, Vec<ImageClassification>> = BTreeMap::new();
        for c in classifications {
            if c.room_type == RoomType::FloorPlan {
                result.floor_plan_urls.push(c.image_url.clone());
            } else if c.room_type.is_estimable() {
                buckets.entry(c.room_type).or_default().push(c.clone());
            }
        }

        // Pass 2: cluster multi-instance buckets; everything else is one room.
        for (room_type, items) in buckets {
            if !room_type.is_multi_instance() || items.len() <= 1 {
                result
                    .grouped
                    .insert(format!("{}_1", room_type.as_str()), items);
                continue;
            }

            let expected = match room_type {
                RoomType::Bedroom => num_rooms,
                RoomType::Bathroom => num_bathrooms,
                _ => None,
            };

            if expected == Some(1) {
                // Single physical room per metadata; skip the vision call.
                tracing::info!(room_type = room_type.as_str(), photos = items.len(),
                    "clustering skipped, metadata says one room");
                result
                    .grouped
                    .insert(format!("{}_1", room_type.as_str()), items);
                continue;
            }

            let urls: Vec<&str> = items.iter().map(|c| c.image_url.as_str()).collect();
            let clusters = self.cluster_with_overflow(room_type, &urls, expected).await;
            let clusters = match validate_clusters(&clusters, items.len()) {
                Some(valid) => match expected {
                    Some(exp) if exp > 0 && valid.len() > exp as usize => {
                        cap_to_expected_rooms(valid, exp as usize)
                    }
                    _ => valid,
                },
                None => metadata_fallback(items.len(), expected.map(|e| e as usize)),
            };

            for cluster in clusters {
                let key = format!("{}_{}", room_type.as_str(), cluster.room_number);
                let group: Vec<ImageClassification> = cluster
                    .image_indices
                    .iter()
                    .filter_map(|&i| items.get(i).cloned())
                    .collect();
                result.grouped.insert(key, group);
            }
        }

        result
    }

    /// Cluster up to `max_clustering_images` photos in one call; larger
    /// batches get a second pass over the overflow (or round-robin
    /// distribution when the expected count is already reached).
    async fn cluster_with_overflow(
        &self,
        room_type: RoomType,
        urls: &[&str],
        expected: Option<u32>,
    ) -> Vec<RoomCluster> {
        if urls.len() <= self.max_clustering_images {
            return self.cluster_room_images(room_type, urls, expected).await;
        }

        let (first_batch, overflow) = urls.split_at(self.max_clustering_images);
        let mut clusters = self.cluster_room_images(room_type, first_batch, expected).await;
        let overflow_start = first_batch.len();

        match expected {
            Some(exp) if clusters.len() >= exp as usize && !clusters.is_empty() => {
                for (offset, _) in overflow.iter().enumerate() {
                    let target = offset % clusters.len();
                    clusters[target].image_indices.push(overflow_start + offset);
                }
                clusters
            }
            _ => {
                let second = self.cluster_room_images(room_type, overflow, expected).await;
                let number_offset = clusters.len() as u32;
                clusters.extend(second.into_iter().map(|c| RoomCluster {
                    room_number: c.room_number + number_offset,
                    image_indices: c.image_indices.iter().map(|i| i + overflow_start).collect(),
                    confidence: c.confidence,
                    visual_cues: c.visual_cues,
                }));
                clusters
            }
        }
    }

    /// One batched vision call comparing all photos of a type. Failures
    /// return a single all-images cluster at fallback confidence.
    async fn cluster_room_images(
        &self,
        room_type: RoomType,
        urls: &[&str],
        expected: Option<u32>,
    ) -> Vec<RoomCluster> {
        if urls.len() <= 1 {
            return vec![RoomCluster {
                room_number: 1,
                image_indices: (0..urls.len()).collect(),
                confidence: 1.0,
                visual_cues: String::new(),
            }];
        }

        let metadata_hint = match expected {
            Some(n) => format!(
                "INFORMAÇÃO DO ANÚNCIO: segundo os dados do anúncio, este imóvel tem {n} \
                 {}(s). Usa esta informação como referência, mas confia na tua análise \
                 visual se as fotografias sugerirem algo diferente.\n",
                room_type.label()
            ),
            None => String::new(),
        };
        let prompt = ROOM_CLUSTERING_PROMPT
            .replace("{num_images}", &urls.len().to_string())
            .replace("{room_type_label}", room_type.label())
            .replace("{metadata_hint}", &metadata_hint);

        let mut parts = vec![ContentPart::Text { text: prompt }];
        parts.extend(urls.iter().map(|url| ContentPart::Image {
            url: (*url).to_string(),
            detail: Some("low".into()),
        }));

        let req = ChatRequest {
            messages: vec![Message::user_parts(parts)],
            json_mode: true,
            max_tokens: Some(1000),
            model: Some(self.model.clone()),
            ..Default::default()
        };

        let single_fallback = || {
            vec![RoomCluster {
                room_number: 1,
                image_indices: (0..urls.len()).collect(),
                confidence: FALLBACK_CONFIDENCE,
                visual_cues: String::new(),
            }]
        };

        let resp = {
            let _permit = self.semaphore.acquire().await.expect("semaphore closed");
            self.llm.chat(req).await
        };
        match resp {
            Ok(resp) => match parse_clusters(&resp.content) {
                Some(clusters) if !clusters.is_empty() => clusters,
                _ => {
                    tracing::warn!(room_type = room_type.as_str(),
                        "clustering response unusable, falling back to single group");
                    single_fallback()
                }
            },
            Err(e) => {
                tracing::error!(room_type = room_type.as_str(), error = %e,
                    "clustering call failed");
                single_fallback()
            }
        }
    }
}

fn parse_clusters(content: &str) -> Option<Vec<RoomCluster>> {
    let data: Value = serde_json::from_str(content).ok()?;
    let raw = data.get("clusters")?.as_array()?;
    Some(
        raw.iter()
            .map(|c| RoomCluster {
                room_number: c.get("room_number").and_then(Value::as_u64).unwrap_or(1) as u32,
                image_indices: c
                    .get("image_indices")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_i64)
                            .map(|i| i.max(0) as usize)
                            .collect()
                    })
                    .unwrap_or_default(),
                confidence: c.get("confidence").and_then(Value::as_f64).unwrap_or(0.5),
                visual_cues: c
                    .get("visual_cues")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect(),
    )
}

/// Validate and normalize model clustering output.
///
/// - duplicate or out-of-range indices → `None` (caller falls back)
/// - missing indices → appended as singleton clusters
/// - room numbers re-sequenced 1..N
pub fn validate_clusters(clusters: &[RoomCluster], num_images: usize) -> Option<Vec<RoomCluster>> {
    if clusters.is_empty() {
        return None;
    }

    let mut seen = vec![false; num_images];
    for cluster in clusters {
        for &idx in &cluster.image_indices {
            if idx >= num_images || seen[idx] {
                return None;
            }
            seen[idx] = true;
        }
    }

    let mut result: Vec<RoomCluster> = clusters.to_vec();
    for (missing_idx, covered) in seen.iter().enumerate() {
        if !covered {
            result.push(RoomCluster {
                room_number: result.len() as u32 + 1,
                image_indices: vec![missing_idx],
                confidence: 0.5,
                visual_cues: String::new(),
            });
        }
    }

    for (i, cluster) in result.iter_mut().enumerate() {
        cluster.room_number = i as u32 + 1;
    }
    Some(result)
}

/// Safe clustering when the model is unavailable: distribute images evenly
/// across the expected room count, or one image per room when unknown
/// (maximum under-grouping of cost impact).
pub fn metadata_fallback(num_images: usize, expected_rooms: Option<usize>) -> Vec<RoomCluster> {
    if num_images == 0 {
        return Vec::new();
    }

    let Some(expected) = expected_rooms.filter(|&e| e > 0) else {
        return (0..num_images)
            .map(|i| RoomCluster {
                room_number: i as u32 + 1,
                image_indices: vec![i],
                confidence: FALLBACK_CONFIDENCE,
                visual_cues: String::new(),
            })
            .collect();
    };

    let base = num_images / expected;
    let remainder = num_images % expected;
    let mut clusters = Vec::with_capacity(expected);
    let mut idx = 0;
    for room_num in 1..=expected {
        let size = base + usize::from(room_num <= remainder);
        clusters.push(RoomCluster {
            room_number: room_num as u32,
            image_indices: (idx..idx + size).collect(),
            confidence: FALLBACK_CONFIDENCE,
            visual_cues: String::new(),
        });
        idx += size;
    }
    clusters
}

/// Merge excess clusters down to `expected` when the model over-clusters.
/// Highest-confidence clusters survive; extras distribute round-robin.
pub fn cap_to_expected_rooms(mut clusters: Vec<RoomCluster>, expected: usize) -> Vec<RoomCluster> {
    if clusters.len() <= expected || expected == 0 {
        return clusters;
    }

    clusters.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let extras: Vec<RoomCluster> = clusters.split_off(expected);
    for (i, extra) in extras.into_iter().enumerate() {
        clusters[i % expected].image_indices.extend(extra.image_indices);
    }
    for (i, cluster) in clusters.iter_mut().enumerate() {
        cluster.room_number = i as u32 + 1;
    }
    clusters
}
