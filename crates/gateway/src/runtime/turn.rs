//! The turn loop: hydrate → agent ⟷ [tools → reflect] → post_process.
//!
//! Entry point: [`run_turn`] spawns the loop and returns a channel of
//! [`TurnEvent`]s the SSE handler drains. The agent must produce a final
//! text within a bounded number of cycles; exhausting the budget surfaces
//! exactly one `error` event with the budget-exceeded code.

use std::time::Duration;

use tokio::sync::mpsc;

use rv_domain::chat::{Message, Role};
use rv_domain::{Error, Result};
use rv_providers::ChatRequest;
use rv_store::ActionLogEntry;

use crate::knowledge::CONTEXT_MESSAGE_TAG;
use crate::state::{AppState, Services};
use crate::summaries::conversation_summary;
use crate::tools;

use super::cancel::CancelToken;
use super::hydrate::hydrate;
use super::state::{Command, TurnEvent, TurnState};

/// Input to a single turn.
pub struct TurnInput {
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub message: String,
}

/// Run one turn in the background. The caller streams the returned events;
/// the channel closes when the turn is over.
pub fn run_turn(
    state: AppState,
    input: TurnInput,
    cancel: CancelToken,
) -> mpsc::Receiver<TurnEvent> {
    let (tx, rx) = mpsc::channel::<TurnEvent>(64);

    tokio::spawn(async move {
        let services = state.services();
        let llm_timeout = services.config.llm.request_timeout_secs;
        let turn_budget = services
            .config
            .orchestrator
            .turn_timeout_secs(llm_timeout);

        let result = tokio::time::timeout(
            Duration::from_secs(turn_budget),
            run_turn_inner(&services, &input, &tx, &cancel),
        )
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(Error::TurnBudgetExceeded { cycles })) => {
                tracing::error!(user_id = %input.user_id, cycles, "turn budget exceeded");
                let _ = tx
                    .send(TurnEvent::ErrorEvent {
                        message: format!(
                            "O agente não terminou dentro do limite de {cycles} ciclos."
                        ),
                        code: Some("turn_budget_exceeded".into()),
                    })
                    .await;
            }
            Ok(Err(e)) => {
                tracing::error!(user_id = %input.user_id, error = %e, "turn failed");
                let _ = tx
                    .send(TurnEvent::ErrorEvent {
                        message: "Erro inesperado. Tenta novamente.".into(),
                        code: None,
                    })
                    .await;
            }
            Err(_) => {
                tracing::error!(user_id = %input.user_id, turn_budget, "turn timed out");
                let _ = tx
                    .send(TurnEvent::ErrorEvent {
                        message: "O pedido excedeu o tempo limite.".into(),
                        code: Some("turn_timeout".into()),
                    })
                    .await;
            }
        }
    });

    rx
}

async fn run_turn_inner(
    services: &Services,
    input: &TurnInput,
    tx: &mpsc::Sender<TurnEvent>,
    cancel: &CancelToken,
) -> Result<()> {
    let _ = tx
        .send(TurnEvent::Thinking {
            message: "A processar...".into(),
        })
        .await;

    let mut turn = hydrate(
        services,
        &input.user_id,
        input.conversation_id.as_deref(),
        &input.message,
    )
    .await?;

    let tool_defs = tools::definitions();
    let orch = &services.config.orchestrator;
    let llm_timeout = Duration::from_secs(services.config.llm.request_timeout_secs);

    for cycle in 0..orch.max_agent_cycles {
        // ── Check cancellation before each LLM call ──────────────
        if cancel.is_cancelled() {
            tracing::info!(cycle, "turn cancelled before agent call");
            return Ok(());
        }

        // ── Agent node: one tool-capable LLM call ────────────────
        let req = ChatRequest {
            messages: turn.messages.clone(),
            tools: tool_defs.clone(),
            temperature: Some(services.config.llm.temperature),
            ..Default::default()
        };
        let resp = tokio::time::timeout(llm_timeout, services.llm.chat(req))
            .await
            .map_err(|_| Error::Timeout("agent LLM call".into()))??;

        // Final text: stream it, run post-process, end the turn.
        if resp.tool_calls.is_empty() {
            turn.messages.push(Message::assistant(&resp.content));
            let _ = tx
                .send(TurnEvent::MessageEvent {
                    content: resp.content,
                    done: true,
                })
                .await;
            post_process(services, &mut turn).await;
            return Ok(());
        }

        turn.messages.push(Message::assistant_with_tools(
            resp.content.clone(),
            resp.tool_calls.clone(),
        ));

        // ── Tools node: sequential, in emission order ────────────
        for call in &resp.tool_calls {
            if cancel.is_cancelled() {
                tracing::info!(tool = %call.tool_name, "turn cancelled before tool dispatch");
                return Ok(());
            }

            let _ = tx
                .send(TurnEvent::ToolCall {
                    tool: call.tool_name.clone(),
                    args: call.arguments.clone(),
                })
                .await;
            if let Some(key) = tools::referenced_key_of(&call.arguments) {
                turn.referenced_keys.insert(key);
            }

            let tool_timeout = if call.tool_name == "trigger_property_analysis" {
                orch.analysis_tool_timeout_secs
            } else {
                orch.tool_timeout_secs
            };
            let command = match tokio::time::timeout(
                Duration::from_secs(tool_timeout),
                tools::dispatch(services, &turn, call),
            )
            .await
            {
                Ok(command) => command,
                Err(_) => Command::error(format!(
                    "A ferramenta '{}' excedeu o tempo limite.",
                    call.tool_name
                )),
            };

            match command {
                Command::Ok { text, updates } => {
                    for event in turn.apply_updates(updates) {
                        let _ = tx.send(event).await;
                    }
                    turn.messages
                        .push(Message::tool_result(&call.call_id, &text, false));
                }
                Command::Err { text } => {
                    tracing::warn!(tool = %call.tool_name, "tool returned error: {text}");
                    turn.messages
                        .push(Message::tool_result(&call.call_id, &text, true));
                }
            }
        }

        // ── Reflect node: rebuild the context block ──────────────
        reflect(&mut turn);
    }

    Err(Error::TurnBudgetExceeded {
        cycles: orch.max_agent_cycles,
    })
}

/// Pure transformation: regenerate the context block from the current
/// knowledge, todos and focus, replacing the previous one. At most one
/// context-refresh message exists at any time. No LLM call.
pub fn reflect(turn: &mut TurnState) {
    let block = turn
        .knowledge
        .render(&turn.todos, turn.current_focus.as_ref());
    turn.messages
        .retain(|m| m.tag.as_deref() != Some(CONTEXT_MESSAGE_TAG));
    turn.messages
        .push(Message::system_tagged(CONTEXT_MESSAGE_TAG, block));
}

/// Post-process: persist the turn's messages, write the action log, demote
/// stale knowledge, and close the conversation when it got long enough.
async fn post_process(services: &Services, turn: &mut TurnState) {
    persist_turn_messages(services, turn).await;

    // Each durable mutation gets its audit entry. A failed write queues a
    // single delayed retry; the turn itself never fails on logging.
    for action in std::mem::take(&mut turn.executed_actions) {
        let entry = ActionLogEntry {
            user_id: turn.user_id.clone(),
            conversation_id: (!turn.conversation_id.is_empty())
                .then(|| turn.conversation_id.clone()),
            message_id: None,
            action_type: action.action_type,
            entity_type: action.entity_type,
            entity_id: action.entity_id,
            field_changed: action.field_changed,
            old_value: action.old_value,
            new_value: action.new_value,
            trigger_message: None,
            confidence: None,
            confirmed_by_user: action.confirmed_by_user,
        };
        if let Err(e) = services.store.log_action(&entry).await {
            tracing::warn!(error = %e, action_type = %entry.action_type,
                "action log write failed, queuing retry");
            let store = services.store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                if let Err(e) = store.log_action(&entry).await {
                    tracing::error!(error = %e, "action log retry failed, entry dropped");
                }
            });
        }
    }

    let referenced = turn.referenced_keys.clone();
    turn.knowledge.demote_stale(&referenced);

    maybe_end_conversation(services, turn).await;
}

/// Persist the turn's messages in rendered order. The incoming user
/// message was persisted at hydrate; reflective system messages are never
/// persisted. The message counter bumps once for the assistant turn.
async fn persist_turn_messages(services: &Services, turn: &TurnState) {
    if turn.conversation_id.is_empty() {
        return;
    }

    let mut user_seen = false;
    for msg in &turn.messages {
        match msg.role {
            Role::System => continue,
            Role::User => {
                // Only the already-persisted incoming turn; skip it.
                user_seen = true;
                continue;
            }
            Role::Assistant | Role::Tool => {}
        }
        if !user_seen {
            continue;
        }

        let content = msg.content.text().unwrap_or_default();
        let tool_calls = (!msg.tool_calls.is_empty())
            .then(|| serde_json::to_value(&msg.tool_calls).ok())
            .flatten();

        if let Err(e) = services
            .store
            .append_message(
                &turn.conversation_id,
                msg.role.as_str(),
                content,
                tool_calls.as_ref(),
                msg.tool_call_id(),
            )
            .await
        {
            tracing::error!(error = %e, "persisting turn message failed");
            return;
        }
    }

    if let Err(e) = services
        .store
        .increment_message_count(&turn.conversation_id)
        .await
    {
        tracing::warn!(error = %e, "incrementing message count failed");
    }
}

/// When the conversation crosses the summary threshold, generate the
/// narrative in the background and mark it ended. The summary surfaces in
/// the next session as `session/resumo_anterior`.
async fn maybe_end_conversation(services: &Services, turn: &TurnState) {
    if turn.conversation_id.is_empty() {
        return;
    }
    let threshold = services.config.orchestrator.summary_trigger_message_count;

    let conversation = match services.store.get_conversation(&turn.conversation_id).await {
        Ok(Some(conv)) => conv,
        _ => return,
    };
    if conversation.ended_at.is_some() || conversation.message_count < threshold {
        return;
    }

    let store = services.store.clone();
    let llm = services.llm.clone();
    let model = services.config.llm.summary_model.clone();
    let conversation_id = turn.conversation_id.clone();
    tokio::spawn(async move {
        let messages = match store.conversation_messages(&conversation_id).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "loading messages for session summary failed");
                return;
            }
        };
        let summary = conversation_summary(&llm, &model, &messages).await;
        if let Err(e) = store.end_conversation(&conversation_id, &summary).await {
            tracing::warn!(error = %e, "ending conversation failed");
        } else {
            tracing::info!(conversation_id = %conversation_id, "conversation summarized and ended");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{KnowledgeBase, KnowledgeSource};

    #[test]
    fn reflect_keeps_exactly_one_context_message_at_the_end() {
        let mut kb = KnowledgeBase::new();
        kb.write("user/profile", Some("Ana".into()), Some("Nome: Ana".into()), KnowledgeSource::Store);
        kb.set_always_present(vec!["user/profile".into()]);

        let mut turn = TurnState {
            knowledge: kb,
            ..Default::default()
        };
        turn.messages.push(Message::system("prompt"));
        turn.messages
            .push(Message::system_tagged(CONTEXT_MESSAGE_TAG, "old block"));
        turn.messages.push(Message::user("olá"));

        reflect(&mut turn);
        reflect(&mut turn);

        let context_messages: Vec<&Message> = turn
            .messages
            .iter()
            .filter(|m| m.tag.as_deref() == Some(CONTEXT_MESSAGE_TAG))
            .collect();
        assert_eq!(context_messages.len(), 1);
        // The refreshed block is the most recent message.
        assert_eq!(
            turn.messages.last().unwrap().tag.as_deref(),
            Some(CONTEXT_MESSAGE_TAG)
        );
        assert!(context_messages[0]
            .content
            .text()
            .unwrap()
            .contains("user/profile [loaded]"));
    }
}
