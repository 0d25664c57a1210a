//! End-to-end turn scenarios: scripted agent LLM, fixture scraper,
//! in-memory store. No network.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use rv_domain::chat::{ContentPart, MessageContent, ToolCall};
use rv_domain::config::Config;
use rv_domain::Result;
use rv_gateway::api::auth::{AuthVerifier, AuthenticatedUser};
use rv_gateway::runtime::cancel::{CancelMap, CancelToken};
use rv_gateway::runtime::session_lock::SessionLockMap;
use rv_gateway::runtime::{run_turn, TurnEvent, TurnInput};
use rv_gateway::state::AppState;
use rv_pipeline::{AnalysisPipeline, ScrapeClient};
use rv_providers::{ChatRequest, ChatResponse, LlmProvider};
use rv_store::Store;

const FIXTURE_URL: &str = "https://www.idealista.pt/imovel/12345678/";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Test doubles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Agent calls (requests with tool definitions) pop scripted responses;
/// pipeline/summary calls are answered from the prompt text.
struct ScriptedProvider {
    agent_responses: Mutex<VecDeque<ChatResponse>>,
    /// When the queue runs dry, replay this response forever (loop tests).
    on_empty: Option<ChatResponse>,
}

fn text_response(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.into(),
        tool_calls: vec![],
        usage: None,
        model: "scripted".into(),
        finish_reason: Some("stop".into()),
    }
}

fn tool_response(name: &str, args: serde_json::Value) -> ChatResponse {
    ChatResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            call_id: format!("call_{name}"),
            tool_name: name.into(),
            arguments: args,
        }],
        usage: None,
        model: "scripted".into(),
        finish_reason: Some("tool_calls".into()),
    }
}

impl ScriptedProvider {
    fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self {
            agent_responses: Mutex::new(responses.into()),
            on_empty: None,
        })
    }

    fn looping(response: ChatResponse) -> Arc<Self> {
        Arc::new(Self {
            agent_responses: Mutex::new(VecDeque::new()),
            on_empty: Some(response),
        })
    }

    fn prompt_text(req: &ChatRequest) -> String {
        req.messages
            .iter()
            .filter_map(|m| match &m.content {
                MessageContent::Text(t) => Some(t.clone()),
                MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    _ => None,
                }),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        if !req.tools.is_empty() {
            let popped = self.agent_responses.lock().pop_front();
            return Ok(popped
                .or_else(|| self.on_empty.clone())
                .unwrap_or_else(|| text_response("Sem mais respostas.")));
        }

        // Pipeline vision/summary calls.
        let prompt = Self::prompt_text(&req);
        let content = if prompt.contains("fotografias do mesmo tipo") {
            r#"{"clusters": [
                {"room_number": 1, "image_indices": [0], "confidence": 0.9, "visual_cues": ""},
                {"room_number": 2, "image_indices": [1], "confidence": 0.8, "visual_cues": ""}
            ], "total_rooms": 2}"#
                .to_string()
        } else if prompt.contains("especialista em remodelações") {
            r#"{
                "condition": "mau",
                "condition_notes": "Precisa de obras",
                "renovation_items": [
                    {"item": "Remodelação", "cost_min": 2000, "cost_max": 5000,
                     "priority": "alta", "notes": ""}
                ],
                "cost_min": 2000,
                "cost_max": 5000,
                "confidence": 0.8,
                "features": {"area_m2": 10, "categories": {"walls": {"condition_score": 2}}}
            }"#
            .to_string()
        } else if prompt.contains("resumo executivo") {
            "O imóvel precisa de obras relevantes na cozinha.".to_string()
        } else if prompt.contains("Resume esta conversa") {
            "Discutimos um T2 em Arroios.".to_string()
        } else {
            r#"{"room_type": "outro", "room_number": 1, "confidence": 0.1}"#.to_string()
        };
        Ok(text_response(&content))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

struct StaticAuth;

#[async_trait::async_trait]
impl AuthVerifier for StaticAuth {
    async fn verify(&self, token: &str) -> Result<AuthenticatedUser> {
        Ok(AuthenticatedUser {
            id: token.to_string(),
            email: None,
        })
    }
}

async fn test_state(llm: Arc<ScriptedProvider>, max_cycles: u32) -> AppState {
    let mut config = Config::default();
    config.orchestrator.max_agent_cycles = max_cycles;
    let config = Arc::new(config);

    let store = Store::in_memory().await.unwrap();
    let llm_dyn: Arc<dyn LlmProvider> = llm;
    let scraper = ScrapeClient::disabled(&config.pipeline).unwrap();
    let pipeline = Arc::new(AnalysisPipeline::with_scraper(
        scraper,
        llm_dyn.clone(),
        &config.llm,
        &config.pipeline,
    ));

    AppState {
        config,
        store,
        llm: llm_dyn,
        pipeline,
        auth: Arc::new(StaticAuth),
        session_locks: Arc::new(SessionLockMap::new()),
        cancel_map: Arc::new(CancelMap::new()),
    }
}

/// Same services, different scripted agent (multi-turn scenarios).
fn with_llm(state: &AppState, llm: Arc<dyn LlmProvider>) -> AppState {
    AppState {
        llm,
        ..state.clone()
    }
}

async fn run_and_collect(state: &AppState, user_id: &str, message: &str) -> Vec<TurnEvent> {
    let mut rx = run_turn(
        state.clone(),
        TurnInput {
            user_id: user_id.into(),
            conversation_id: None,
            message: message.into(),
        },
        CancelToken::new(),
    );
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn final_message(events: &[TurnEvent]) -> Option<&str> {
    events.iter().rev().find_map(|e| match e {
        TurnEvent::MessageEvent { content, done: true } => Some(content.as_str()),
        _ => None,
    })
}

fn error_events(events: &[TurnEvent]) -> Vec<(&str, Option<&str>)> {
    events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::ErrorEvent { message, code } => {
                Some((message.as_str(), code.as_deref()))
            }
            _ => None,
        })
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 1: new user greeting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn new_user_greeting_persists_both_turns_and_logs_nothing() {
    let llm = ScriptedProvider::new(vec![text_response("Olá! Como posso ajudar?")]);
    let state = test_state(llm, 12).await;

    let events = run_and_collect(&state, "u1", "Olá").await;

    assert!(matches!(events.first(), Some(TurnEvent::Thinking { .. })));
    assert_eq!(final_message(&events), Some("Olá! Como posso ajudar?"));
    assert!(error_events(&events).is_empty());

    // The hydrate auto-created a profile for the first-time user.
    assert!(state.store.get_profile("u1").await.unwrap().is_some());

    // One conversation with the user + assistant turns persisted, in order.
    let ctx = state.store.hydrate("u1").await.unwrap();
    assert!(ctx.portfolio.is_empty());

    let conversations = state.store.conversations_for_user("u1").await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].message_count, 2);
    let messages = state
        .store
        .conversation_messages(&conversations[0].id)
        .await
        .unwrap();
    let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant"]);
    assert_eq!(messages[0].content, "Olá");

    assert_eq!(state.store.action_count("u1").await.unwrap(), 0);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 2: trigger property analysis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn analysis_turn_creates_rows_and_emits_one_action_event() {
    let llm = ScriptedProvider::new(vec![
        tool_response("trigger_property_analysis", json!({ "url": FIXTURE_URL })),
        text_response("Análise pronta: a cozinha precisa de obras."),
    ]);
    let state = test_state(llm, 12).await;

    let events = run_and_collect(&state, "u1", &format!("Analisa {FIXTURE_URL}")).await;

    // Tool call surfaced.
    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::ToolCall { tool, .. } if tool == "trigger_property_analysis"
    )));
    // Exactly one action event, typed analysis_trigger.
    let actions: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::Action { action_type, .. } => Some(action_type.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(actions, vec!["analysis_trigger"]);
    assert!(final_message(&events).is_some());

    // Property, portfolio item and analysis rows exist.
    let property = state
        .store
        .get_property_by_external_id("12345678")
        .await
        .unwrap()
        .expect("property row");
    let item = state
        .store
        .get_portfolio_item("u1", &property.id)
        .await
        .unwrap()
        .expect("portfolio item");
    assert_eq!(item.status, "analyzed");
    let analysis = state
        .store
        .get_latest_analysis("u1", &property.id, "renovation")
        .await
        .unwrap()
        .expect("analysis row");
    assert!(analysis.chat_summary.unwrap().contains("Renovação"));
    assert!(!state
        .store
        .get_room_features(&property.id)
        .await
        .unwrap()
        .is_empty());

    // Hydrating again shows one portfolio item with its index line.
    let ctx = state.store.hydrate("u1").await.unwrap();
    assert_eq!(ctx.portfolio.len(), 1);
    assert!(ctx.portfolio[0].index_summary.as_deref().unwrap().contains("T2"));

    assert_eq!(state.store.action_count("u1").await.unwrap(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 3: read the detailed analysis, no mutation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn reading_the_analysis_logs_no_action() {
    let llm = ScriptedProvider::new(vec![
        tool_response("trigger_property_analysis", json!({ "url": FIXTURE_URL })),
        text_response("Análise pronta."),
    ]);
    let state = test_state(llm, 12).await;
    run_and_collect(&state, "u1", "Analisa o imóvel").await;

    let property = state
        .store
        .get_property_by_external_id("12345678")
        .await
        .unwrap()
        .unwrap();
    let actions_before = state.store.action_count("u1").await.unwrap();

    // Second turn: the agent reads the per-room breakdown.
    let llm2 = ScriptedProvider::new(vec![
        tool_response(
            "read_context",
            json!({ "key": format!("portfolio/{}/analise", property.id) }),
        ),
        text_response("A cozinha está em mau estado."),
    ]);
    let state2 = with_llm(&state, llm2);
    let events = run_and_collect(&state2, "u1", "esse imóvel tem um quarto mau?").await;

    assert_eq!(
        final_message(&events),
        Some("A cozinha está em mau estado.")
    );
    assert!(!events.iter().any(|e| matches!(e, TurnEvent::Action { .. })));
    assert_eq!(
        state.store.action_count("u1").await.unwrap(),
        actions_before
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 4: search then archive with confirmation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn archive_flow_requires_confirmation_then_archives() {
    let llm = ScriptedProvider::new(vec![
        tool_response("trigger_property_analysis", json!({ "url": FIXTURE_URL })),
        text_response("Análise pronta."),
    ]);
    let state = test_state(llm, 12).await;
    run_and_collect(&state, "u1", "Analisa o imóvel").await;
    let property = state
        .store
        .get_property_by_external_id("12345678")
        .await
        .unwrap()
        .unwrap();

    // Turn A: resolve the reference; the agent asks for confirmation.
    let llm_a = ScriptedProvider::new(vec![
        tool_response("search_portfolio", json!({ "query": "Arroios" })),
        text_response("Encontrei o T2 em Arroios. Confirmas a remoção?"),
    ]);
    let state_a = with_llm(&state, llm_a);
    let events = run_and_collect(&state_a, "u1", "esquece o de Arroios").await;
    assert!(final_message(&events).unwrap().contains("Confirmas"));

    // No mutation yet.
    let item = state
        .store
        .get_portfolio_item("u1", &property.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, "analyzed");

    // Turn B: the user confirmed; the agent archives.
    let llm_b = ScriptedProvider::new(vec![
        tool_response(
            "remove_from_portfolio",
            json!({ "property_id": property.id, "confirmed": true }),
        ),
        text_response("Feito, removi o imóvel do portfólio."),
    ]);
    let state_b = with_llm(&state, llm_b);
    let events = run_and_collect(&state_b, "u1", "sim").await;
    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::Action { action_type, .. } if action_type == "portfolio_remove"
    )));

    let item = state
        .store
        .get_portfolio_item("u1", &property.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, "archived");
    assert!(!item.is_active);

    // Archived items disappear from hydration (and hence from the index).
    let ctx = state.store.hydrate("u1").await.unwrap();
    assert!(ctx.portfolio.is_empty());
}

#[tokio::test]
async fn remove_without_confirmation_is_rejected() {
    let llm = ScriptedProvider::new(vec![
        tool_response("trigger_property_analysis", json!({ "url": FIXTURE_URL })),
        text_response("Análise pronta."),
    ]);
    let state = test_state(llm, 12).await;
    run_and_collect(&state, "u1", "Analisa o imóvel").await;
    let property = state
        .store
        .get_property_by_external_id("12345678")
        .await
        .unwrap()
        .unwrap();

    let llm2 = ScriptedProvider::new(vec![
        tool_response(
            "remove_from_portfolio",
            json!({ "property_id": property.id }),
        ),
        text_response("Preciso da tua confirmação primeiro."),
    ]);
    let state2 = with_llm(&state, llm2);
    run_and_collect(&state2, "u1", "esquece o imóvel").await;

    // Still there: the tool refused without the confirmation signal.
    let item = state
        .store
        .get_portfolio_item("u1", &property.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, "analyzed");
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 5: pipeline failure is a tool error, not an infra error
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn pipeline_failure_commits_nothing_and_is_not_an_error_event() {
    let bad_url = "https://www.idealista.pt/arrendar/";
    let llm = ScriptedProvider::new(vec![
        tool_response("trigger_property_analysis", json!({ "url": bad_url })),
        text_response("Desculpa, não consegui analisar esse anúncio."),
    ]);
    let state = test_state(llm, 12).await;

    let events = run_and_collect(&state, "u1", "Analisa isto").await;

    // Tool-level failure: the agent apologises; no `error` SSE frame.
    assert!(error_events(&events).is_empty());
    assert!(final_message(&events).unwrap().contains("Desculpa"));
    assert!(!events.iter().any(|e| matches!(e, TurnEvent::Action { .. })));

    // Nothing was committed.
    let ctx = state.store.hydrate("u1").await.unwrap();
    assert!(ctx.portfolio.is_empty());
    assert_eq!(state.store.action_count("u1").await.unwrap(), 0);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 6: turn budget exceeded
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn turn_budget_exceeded_emits_one_coded_error() {
    // The agent never stops calling tools.
    let llm = ScriptedProvider::looping(tool_response("manage_todos", json!({ "action": "list" })));
    let state = test_state(llm, 3).await;

    let events = run_and_collect(&state, "u1", "loop").await;

    let errors = error_events(&events);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].1, Some("turn_budget_exceeded"));
    assert!(final_message(&events).is_none());

    // Only the user turn was persisted and counted.
    let conversations = state.store.conversations_for_user("u1").await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].message_count, 1);
    let messages = state
        .store
        .conversation_messages(&conversations[0].id)
        .await
        .unwrap();
    let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user"]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Hydration boundaries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn empty_portfolio_hydrates_with_empty_state_sentinels() {
    let llm = ScriptedProvider::new(vec![]);
    let state = test_state(llm, 12).await;
    let services = state.services();

    let turn = rv_gateway::runtime::hydrate::hydrate(&services, "u9", None, "Olá")
        .await
        .unwrap();

    let kb = &turn.knowledge;
    assert!(kb.contains("user/profile"));
    assert!(kb.contains("portfolio/index"));
    assert!(kb.contains("session/resumo_anterior"));
    assert_eq!(kb.get("portfolio/index").unwrap().summary, "Portfólio vazio");
    // No per-property keys for an empty portfolio.
    assert!(!kb
        .keys()
        .any(|k| k.starts_with("portfolio/") && k != "portfolio/index"));

    let rendered = kb.render(&turn.todos, turn.current_focus.as_ref());
    assert!(rendered.contains("portfolio/index [loaded] — Portfólio vazio"));
    assert!(rendered.contains("session/resumo_anterior [available] — Primeira sessão"));

    // system prompt + context block + incoming user message.
    assert_eq!(turn.messages.len(), 3);
}

#[tokio::test]
async fn switching_active_property_is_exclusive_and_loads_its_summary() {
    let llm = ScriptedProvider::new(vec![
        tool_response("trigger_property_analysis", json!({ "url": FIXTURE_URL })),
        text_response("Análise pronta."),
    ]);
    let state = test_state(llm, 12).await;
    run_and_collect(&state, "u1", "Analisa o imóvel").await;
    let property = state
        .store
        .get_property_by_external_id("12345678")
        .await
        .unwrap()
        .unwrap();

    let llm2 = ScriptedProvider::new(vec![
        tool_response(
            "switch_active_property",
            json!({ "property_id": property.id }),
        ),
        text_response("Estamos agora a falar do T2 de Arroios."),
    ]);
    let state2 = with_llm(&state, llm2);
    let events = run_and_collect(&state2, "u1", "muda para o T2").await;

    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::Action { action_type, .. } if action_type == "property_switch"
    )));
    assert_eq!(state.store.active_count("u1").await.unwrap(), 1);

    // Next hydrate treats the active property's summary as always-present.
    let turn = rv_gateway::runtime::hydrate::hydrate(&state.services(), "u1", None, "ok")
        .await
        .unwrap();
    let resumo_key = format!("portfolio/{}/resumo", property.id);
    let entry = turn.knowledge.get(&resumo_key).unwrap();
    assert!(entry.is_loaded());
    assert!(turn.knowledge.protected_keys().contains(&resumo_key));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Profile and recalculation turns
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn profile_update_persists_and_logs_an_action() {
    let llm = ScriptedProvider::new(vec![
        tool_response(
            "update_user_profile",
            json!({
                "section": "budget",
                "updates": { "budget_min": 150000, "budget_max": 220000 }
            }),
        ),
        text_response("Anotei o teu orçamento de 150.000€–220.000€."),
    ]);
    let state = test_state(llm, 12).await;

    let events = run_and_collect(&state, "u1", "o meu orçamento é 150 a 220 mil").await;

    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::Action { action_type, .. } if action_type == "profile_update"
    )));

    let profile = state.store.get_profile("u1").await.unwrap().unwrap();
    assert_eq!(profile.budget.0["budget_max"], 220000);
    assert_eq!(
        profile.budget_summary.as_deref(),
        Some("Orçamento: 150.000€–220.000€")
    );
    assert_eq!(profile.sections_completed.0, vec!["budget".to_string()]);
    assert_eq!(state.store.action_count("u1").await.unwrap(), 1);
}

#[tokio::test]
async fn recalculate_costs_reprices_without_vision_calls() {
    let llm = ScriptedProvider::new(vec![
        tool_response("trigger_property_analysis", json!({ "url": FIXTURE_URL })),
        text_response("Análise pronta."),
    ]);
    let state = test_state(llm, 12).await;
    run_and_collect(&state, "u1", "Analisa o imóvel").await;
    let property = state
        .store
        .get_property_by_external_id("12345678")
        .await
        .unwrap()
        .unwrap();
    let analysis_before = state
        .store
        .get_latest_analysis("u1", &property.id, "renovation")
        .await
        .unwrap()
        .unwrap();

    let llm2 = ScriptedProvider::new(vec![
        tool_response(
            "recalculate_costs",
            json!({
                "property_id": property.id,
                "preferences": { "finish_level": "economico" }
            }),
        ),
        text_response("Com acabamento económico fica mais barato."),
    ]);
    let state2 = with_llm(&state, llm2);
    let events = run_and_collect(&state2, "u1", "e com acabamento económico?").await;

    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::Action { action_type, .. } if action_type == "cost_recalculate"
    )));

    let analysis_after = state
        .store
        .get_latest_analysis("u1", &property.id, "renovation")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(analysis_before.id, analysis_after.id);
    assert_eq!(
        analysis_after.preferences_snapshot.0["finish_level"],
        "economico"
    );
    assert!(analysis_after.updated_at >= analysis_before.updated_at);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence order
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn persisted_messages_match_the_rendered_sequence() {
    let llm = ScriptedProvider::new(vec![
        tool_response("manage_todos", json!({ "action": "add", "task": "comparar" })),
        text_response("Adicionei a tarefa."),
    ]);
    let state = test_state(llm, 12).await;

    let events = run_and_collect(&state, "u1", "adiciona uma tarefa").await;
    assert!(final_message(&events).is_some());
    assert!(events
        .iter()
        .any(|e| matches!(e, TurnEvent::TodoUpdate { todos } if todos.len() == 1)));

    let conversations = state.store.conversations_for_user("u1").await.unwrap();
    let messages = state
        .store
        .conversation_messages(&conversations[0].id)
        .await
        .unwrap();
    let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
    // user turn, assistant tool-call turn, tool result, final assistant —
    // exactly the sequence the client saw, minus reflective system messages.
    assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
    assert!(messages.iter().all(|m| m.role != "system"));
    assert!(messages[1].tool_calls.is_some());
    assert_eq!(messages[3].content, "Adicionei a tarefa.");
}

#[tokio::test]
async fn continuing_a_conversation_reuses_its_row() {
    let llm = ScriptedProvider::new(vec![text_response("Olá outra vez.")]);
    let state = test_state(llm, 12).await;
    let conv = state.store.create_conversation("u2").await.unwrap();

    let mut rx = run_turn(
        state.clone(),
        TurnInput {
            user_id: "u2".into(),
            conversation_id: Some(conv.id.clone()),
            message: "Olá".into(),
        },
        CancelToken::new(),
    );
    while rx.recv().await.is_some() {}

    let conversations = state.store.conversations_for_user("u2").await.unwrap();
    assert_eq!(conversations.len(), 1);
    let refreshed = state.store.get_conversation(&conv.id).await.unwrap().unwrap();
    assert_eq!(refreshed.message_count, 2);
}
