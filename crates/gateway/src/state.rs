use std::sync::Arc;

use rv_domain::config::Config;
use rv_pipeline::AnalysisPipeline;
use rv_providers::LlmProvider;
use rv_store::Store;

use crate::api::auth::AuthVerifier;
use crate::runtime::cancel::CancelMap;
use crate::runtime::session_lock::SessionLockMap;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub llm: Arc<dyn LlmProvider>,
    pub pipeline: Arc<AnalysisPipeline>,
    pub auth: Arc<dyn AuthVerifier>,
    pub session_locks: Arc<SessionLockMap>,
    pub cancel_map: Arc<CancelMap>,
}

/// The service bundle injected into every node and tool. No globals: tools
/// only ever see what a turn hands them.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub store: Store,
    pub llm: Arc<dyn LlmProvider>,
    pub pipeline: Arc<AnalysisPipeline>,
}

impl AppState {
    pub fn services(&self) -> Services {
        Services {
            config: self.config.clone(),
            store: self.store.clone(),
            llm: self.llm.clone(),
            pipeline: self.pipeline.clone(),
        }
    }
}
