use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use rv_domain::config::Config;
use rv_gateway::api::auth::HttpAuthVerifier;
use rv_gateway::api::router::build_router;
use rv_gateway::runtime::cancel::CancelMap;
use rv_gateway::runtime::session_lock::SessionLockMap;
use rv_gateway::state::AppState;
use rv_pipeline::AnalysisPipeline;
use rv_providers::{LlmProvider, OpenAiProvider};
use rv_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ──────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rv_gateway=debug")),
        )
        .json()
        .init();

    tracing::info!("Renova gateway starting");

    // ── Config ───────────────────────────────────────────────────────
    let config_path = std::env::var("RV_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config: Config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {config_path}"))?;
        Config::from_toml(&raw).with_context(|| format!("parsing {config_path}"))?
    } else {
        tracing::warn!(path = %config_path, "config file not found, using defaults");
        Config::default()
    };
    let config = Arc::new(config);

    // ── Durable store ────────────────────────────────────────────────
    let store = Store::connect(&config.store.database_url)
        .await
        .context("connecting to the store")?;

    // ── LLM provider ─────────────────────────────────────────────────
    let llm: Arc<dyn LlmProvider> = Arc::new(
        OpenAiProvider::from_config(&config.llm).context("initializing the LLM provider")?,
    );
    tracing::info!(model = %config.llm.model, "LLM provider ready");

    // ── Analysis pipeline ────────────────────────────────────────────
    let pipeline = Arc::new(
        AnalysisPipeline::new(llm.clone(), &config.llm, &config.pipeline)
            .context("initializing the analysis pipeline")?,
    );

    // ── Auth ─────────────────────────────────────────────────────────
    let auth = Arc::new(HttpAuthVerifier::from_config(&config.auth));
    if config.auth.verify_url.is_empty() {
        tracing::warn!("auth.verify_url not configured — all requests will be rejected");
    }

    let state = AppState {
        config: config.clone(),
        store: store.clone(),
        llm,
        pipeline,
        auth,
        session_locks: Arc::new(SessionLockMap::new()),
        cancel_map: Arc::new(CancelMap::new()),
    };

    // ── Serve ────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, build_router(state))
        .await
        .context("serving")?;

    store.close().await;
    Ok(())
}
