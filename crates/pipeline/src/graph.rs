//! The linear 5-stage analysis pipeline:
//!
//! ```text
//! scrape → classify → group → estimate → summarize
//! ```
//!
//! Each stage checks the state's `error` field before running and passes
//! through when an earlier stage failed; the caller decides what to commit
//! (on error: nothing).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use rv_domain::config::{LlmConfig, PipelineConfig};
use rv_domain::Result;
use rv_providers::LlmProvider;

use crate::classify::ImageClassifier;
use crate::estimate::RoomEstimator;
use crate::group::RoomGrouper;
use crate::models::{PipelineState, RoomType};
use crate::scrape::ScrapeClient;
use crate::summarize::{create_estimate, generate_summary};

pub struct AnalysisPipeline {
    scraper: ScrapeClient,
    classifier: ImageClassifier,
    grouper: RoomGrouper,
    estimator: RoomEstimator,
    llm: Arc<dyn LlmProvider>,
    summary_model: String,
}

impl AnalysisPipeline {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        llm_cfg: &LlmConfig,
        pipe_cfg: &PipelineConfig,
    ) -> Result<Self> {
        let scraper = ScrapeClient::from_config(pipe_cfg)?;
        Ok(Self::with_scraper(scraper, llm, llm_cfg, pipe_cfg))
    }

    /// Assemble with a pre-built scraper (fixture mode in tests and dev).
    pub fn with_scraper(
        scraper: ScrapeClient,
        llm: Arc<dyn LlmProvider>,
        llm_cfg: &LlmConfig,
        pipe_cfg: &PipelineConfig,
    ) -> Self {
        let classifier = ImageClassifier::new(
            llm.clone(),
            llm_cfg.classification_model.clone(),
            pipe_cfg.max_concurrent_classifications,
        );
        let grouper = RoomGrouper::new(
            llm.clone(),
            llm_cfg.classification_model.clone(),
            pipe_cfg.max_concurrent_classifications,
            pipe_cfg.max_clustering_images,
        );
        let estimator = RoomEstimator::new(
            llm.clone(),
            llm_cfg.vision_model.clone(),
            pipe_cfg.max_concurrent_estimations,
            pipe_cfg.images_per_room_analysis,
        );
        Self {
            scraper,
            classifier,
            grouper,
            estimator,
            summary_model: llm_cfg.vision_model.clone(),
            llm,
        }
    }

    /// Run the full pipeline. The returned state either carries a complete
    /// `estimate` or an `error` plus the events leading up to it.
    pub async fn run(&self, url: &str) -> PipelineState {
        let mut state = PipelineState::new(url);
        self.scrape_stage(&mut state).await;
        self.classify_stage(&mut state).await;
        self.group_stage(&mut state).await;
        self.estimate_stage(&mut state).await;
        self.summarize_stage(&mut state).await;
        state
    }

    async fn scrape_stage(&self, state: &mut PipelineState) {
        if state.error.is_some() {
            return;
        }
        state.status(1, "A obter dados do anúncio...");

        match self.scraper.scrape(&state.url).await {
            Ok(property) => {
                state.status(
                    1,
                    format!("Encontradas {} fotografias", property.image_urls.len()),
                );
                state.image_urls = property.image_urls.clone();
                state.property_data = Some(property);
                state.stage = "scraped";
            }
            Err(e) => {
                tracing::error!(url = %state.url, error = %e, "scrape failed");
                state.fail(1, "scrape", format!("Erro ao obter dados: {e}"));
            }
        }
    }

    async fn classify_stage(&self, state: &mut PipelineState) {
        if state.error.is_some() {
            return;
        }
        state.status(2, format!("A classificar {} fotografias...", state.image_urls.len()));

        let tags = state
            .property_data
            .as_ref()
            .map(|p| p.image_tags.clone())
            .unwrap_or_default();
        let classifications = self.classifier.classify_images(&state.image_urls, &tags).await;

        // Compact per-type counts for the progress line.
        let mut counts: BTreeMap<RoomType, usize> = BTreeMap::new();
        for c in &classifications {
            *counts.entry(c.room_type).or_default() += 1;
        }
        let summary: Vec<String> = counts
            .iter()
            .filter(|(t, _)| t.is_estimable())
            .map(|(t, n)| format!("{n}x {}", t.as_str()))
            .collect();
        state.status(2, format!("Divisões identificadas: {}", summary.join(", ")));

        state.classifications = classifications;
        state.stage = "classified";
    }

    async fn group_stage(&self, state: &mut PipelineState) {
        if state.error.is_some() {
            return;
        }
        state.status(3, "A agrupar fotografias por divisão...");

        let (num_rooms, num_bathrooms) = state
            .property_data
            .as_ref()
            .map(|p| {
                (
                    (p.num_rooms > 0).then_some(p.num_rooms),
                    (p.num_bathrooms > 0).then_some(p.num_bathrooms),
                )
            })
            .unwrap_or((None, None));

        let result = self
            .grouper
            .group_by_room(&state.classifications, num_rooms, num_bathrooms)
            .await;

        let photo_count: usize = result.grouped.values().map(Vec::len).sum();
        state.status(
            3,
            format!(
                "Agrupadas {photo_count} fotos em {} divisões",
                result.grouped.len()
            ),
        );
        state.grouped = result.grouped;
        state.floor_plan_urls = result.floor_plan_urls;
        state.stage = "grouped";
    }

    async fn estimate_stage(&self, state: &mut PipelineState) {
        if state.error.is_some() {
            return;
        }
        state.status(4, format!("A analisar estado de {} divisões...", state.grouped.len()));

        let analyses = self.estimator.analyze_all_rooms(&state.grouped).await;
        for analysis in &analyses {
            state.progress(
                4,
                format!(
                    "{}: estado {}, custo {:.0}€ - {:.0}€",
                    analysis.room_label,
                    analysis.condition.as_str(),
                    analysis.cost_min,
                    analysis.cost_max
                ),
                Some(json!({
                    "room": analysis.room_label,
                    "condition": analysis.condition.as_str(),
                    "cost_min": analysis.cost_min,
                    "cost_max": analysis.cost_max,
                })),
            );
        }
        state.room_analyses = analyses;
        state.stage = "estimated";
    }

    async fn summarize_stage(&self, state: &mut PipelineState) {
        if state.error.is_some() {
            return;
        }
        state.status(5, "A calcular custos finais...");

        let total_min: f64 = state.room_analyses.iter().map(|r| r.cost_min).sum();
        let total_max: f64 = state.room_analyses.iter().map(|r| r.cost_max).sum();

        let summary = generate_summary(
            &self.llm,
            &self.summary_model,
            state.property_data.as_ref(),
            &state.room_analyses,
            total_min,
            total_max,
        )
        .await;

        let estimate = create_estimate(
            &state.url,
            state.property_data.clone(),
            state.room_analyses.clone(),
            summary.clone(),
        );

        state.events.push(crate::models::StageEvent {
            kind: "result".into(),
            message: format!("Estimativa completa: {total_min:.0}€ - {total_max:.0}€"),
            step: 5,
            data: None,
        });
        state.summary = summary;
        state.estimate = Some(estimate);
        state.stage = "completed";
    }
}
