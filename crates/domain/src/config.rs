//! Application configuration.
//!
//! Loaded from `config.toml` (path override via the `RV_CONFIG` env var).
//! Every section defaults so a missing file yields a runnable dev config.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// Origins allowed by the CORS layer.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            cors_origins: Vec::new(),
        }
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_port() -> u16 {
    8080
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Upstream identity-provider endpoint used to verify bearer tokens
    /// (GET with `Authorization: Bearer <token>` returning `{id, email}`).
    /// Empty = auth service unavailable; requests are rejected with 503.
    #[serde(default)]
    pub verify_url: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL.
    #[serde(default = "d_llm_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "d_llm_api_key_env")]
    pub api_key_env: String,
    /// Orchestrator agent model (tool-capable).
    #[serde(default = "d_llm_model")]
    pub model: String,
    /// Fast vision model for image classification and clustering.
    #[serde(default = "d_llm_classification_model")]
    pub classification_model: String,
    /// Vision model for per-room cost estimation.
    #[serde(default = "d_llm_model")]
    pub vision_model: String,
    /// Cheap model for conversation-end narrative summaries.
    #[serde(default = "d_llm_classification_model")]
    pub summary_model: String,
    /// Per-call timeout in seconds.
    #[serde(default = "d_llm_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_llm_base_url(),
            api_key_env: d_llm_api_key_env(),
            model: d_llm_model(),
            classification_model: d_llm_classification_model(),
            vision_model: d_llm_model(),
            summary_model: d_llm_classification_model(),
            request_timeout_secs: d_llm_timeout(),
            temperature: 0.0,
        }
    }
}

fn d_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_llm_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn d_llm_model() -> String {
    "gpt-4o".into()
}
fn d_llm_classification_model() -> String {
    "gpt-4o-mini".into()
}
fn d_llm_timeout() -> u64 {
    60
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_database_url")]
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: d_database_url(),
        }
    }
}

fn d_database_url() -> String {
    "sqlite://renova.db?mode=rwc".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard ceiling on agent/reflect cycles per turn.
    #[serde(default = "d_max_agent_cycles")]
    pub max_agent_cycles: u32,
    /// Entries below this many lines are always loaded fully.
    #[serde(default = "d_min_lines_partial")]
    pub min_lines_for_partial_read: usize,
    /// Per-tool timeout in seconds.
    #[serde(default = "d_tool_timeout")]
    pub tool_timeout_secs: u64,
    /// Extended timeout for `trigger_property_analysis`.
    #[serde(default = "d_analysis_tool_timeout")]
    pub analysis_tool_timeout_secs: u64,
    /// Messages in a conversation before the session summary is generated
    /// and the conversation is closed.
    #[serde(default = "d_summary_trigger")]
    pub summary_trigger_message_count: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_agent_cycles: d_max_agent_cycles(),
            min_lines_for_partial_read: d_min_lines_partial(),
            tool_timeout_secs: d_tool_timeout(),
            analysis_tool_timeout_secs: d_analysis_tool_timeout(),
            summary_trigger_message_count: d_summary_trigger(),
        }
    }
}

fn d_max_agent_cycles() -> u32 {
    12
}
fn d_min_lines_partial() -> usize {
    20
}
fn d_tool_timeout() -> u64 {
    120
}
fn d_analysis_tool_timeout() -> u64 {
    600
}
fn d_summary_trigger() -> i64 {
    20
}

impl OrchestratorConfig {
    /// Per-turn ceiling: the worst case is every cycle spending one full
    /// LLM call, so the budget scales with the per-call timeout.
    pub fn turn_timeout_secs(&self, llm_timeout_secs: u64) -> u64 {
        llm_timeout_secs * u64::from(self.max_agent_cycles.max(1))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analysis pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scraper adapter base URL.
    #[serde(default = "d_scraper_base_url")]
    pub scraper_base_url: String,
    /// Environment variable holding the scraper token.
    /// When the variable is unset the scraper is disabled and the fixture
    /// listing is returned instead.
    #[serde(default = "d_scraper_token_env")]
    pub scraper_token_env: String,
    #[serde(default = "d_scrape_retries")]
    pub max_retries: u32,
    #[serde(default = "d_scrape_base_delay")]
    pub retry_base_delay_secs: u64,
    #[serde(default = "d_scrape_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "d_max_classifications")]
    pub max_concurrent_classifications: usize,
    #[serde(default = "d_max_estimations")]
    pub max_concurrent_estimations: usize,
    /// Maximum images per clustering vision call.
    #[serde(default = "d_max_clustering_images")]
    pub max_clustering_images: usize,
    /// Images sent per room-analysis vision call.
    #[serde(default = "d_images_per_room")]
    pub images_per_room_analysis: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scraper_base_url: d_scraper_base_url(),
            scraper_token_env: d_scraper_token_env(),
            max_retries: d_scrape_retries(),
            retry_base_delay_secs: d_scrape_base_delay(),
            request_timeout_secs: d_scrape_timeout(),
            max_concurrent_classifications: d_max_classifications(),
            max_concurrent_estimations: d_max_estimations(),
            max_clustering_images: d_max_clustering_images(),
            images_per_room_analysis: d_images_per_room(),
        }
    }
}

fn d_scraper_base_url() -> String {
    "https://api.apify.com/v2".into()
}
fn d_scraper_token_env() -> String {
    "SCRAPER_API_TOKEN".into()
}
fn d_scrape_retries() -> u32 {
    3
}
fn d_scrape_base_delay() -> u64 {
    2
}
fn d_scrape_timeout() -> u64 {
    120
}
fn d_max_classifications() -> usize {
    5
}
fn d_max_estimations() -> usize {
    3
}
fn d_max_clustering_images() -> usize {
    10
}
fn d_images_per_room() -> usize {
    4
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loading
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Parse a config from TOML text.
    pub fn from_toml(raw: &str) -> crate::Result<Self> {
        toml::from_str(raw).map_err(|e| crate::Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.orchestrator.max_agent_cycles, 12);
        assert_eq!(cfg.orchestrator.min_lines_for_partial_read, 20);
        assert_eq!(cfg.pipeline.max_concurrent_classifications, 5);
        assert_eq!(cfg.pipeline.max_concurrent_estimations, 3);
        assert_eq!(cfg.llm.request_timeout_secs, 60);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = Config::from_toml(
            r#"
            [server]
            port = 9000

            [orchestrator]
            max_agent_cycles = 6
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.orchestrator.max_agent_cycles, 6);
        assert_eq!(cfg.orchestrator.tool_timeout_secs, 120);
    }

    #[test]
    fn turn_timeout_scales_with_cycles() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.turn_timeout_secs(60), 720);
    }
}
