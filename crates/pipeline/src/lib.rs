//! Property renovation analysis pipeline.
//!
//! A linear five-stage flow (scrape → classify → group → estimate →
//! summarize) plus cost recalculation from cached room features. Invoked by
//! the orchestrator's `trigger_property_analysis` and `recalculate_costs`
//! tools; isolated from the rest of the system behind [`AnalysisPipeline`].

pub mod classify;
pub mod constants;
pub mod costs;
pub mod estimate;
pub mod graph;
pub mod group;
pub mod models;
pub mod prompts;
pub mod scrape;
pub mod summarize;

pub use graph::AnalysisPipeline;
pub use models::{
    ImageClassification, PipelineState, PropertyData, RenovationEstimate, RoomAnalysis,
    RoomCondition, RoomFeatures, RoomType, StageEvent,
};
pub use scrape::ScrapeClient;
