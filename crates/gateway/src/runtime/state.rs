//! Per-turn orchestrator state and the tool command types.
//!
//! One [`TurnState`] flows through every node of a turn. It is
//! reconstituted from the durable store on each request; nothing survives
//! in process memory between turns.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use rv_domain::chat::Message;

use crate::knowledge::KnowledgeBase;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Building blocks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TodoStatus {
    Pending,
    Done,
}

/// One task in the agent's list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub task: String,
    pub status: TodoStatus,
}

/// The property/topic the conversation is currently centered on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Focus {
    pub property_id: String,
    pub topic: String,
    pub depth: u32,
}

/// A durable mutation performed by a tool in this turn. Persisted to the
/// action log at post-process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_type: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub field_changed: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    /// Short human line for the `action` stream event.
    pub summary: String,
    pub confirmed_by_user: bool,
}

impl ActionRecord {
    pub fn new(
        action_type: impl Into<String>,
        entity_type: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            entity_type: entity_type.into(),
            entity_id: None,
            field_changed: None,
            old_value: None,
            new_value: None,
            summary: summary.into(),
            confirmed_by_user: false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Events streamed to the client during a turn. The wire `type` strings
/// are stable.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    #[serde(rename = "thinking")]
    Thinking { message: String },

    #[serde(rename = "tool_call")]
    ToolCall { tool: String, args: Value },

    /// A durable mutation happened (profile update, portfolio change, ...).
    #[serde(rename = "action")]
    Action {
        action_type: String,
        summary: String,
    },

    /// Assistant text. The final message of a turn carries `done = true`.
    #[serde(rename = "message")]
    MessageEvent { content: String, done: bool },

    #[serde(rename = "todo_update")]
    TodoUpdate { todos: Vec<TodoItem> },

    #[serde(rename = "error")]
    ErrorEvent {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The single record flowing through hydrate → agent ⟷ [tools → reflect]
/// → post_process.
#[derive(Debug, Clone, Default)]
pub struct TurnState {
    pub user_id: String,
    /// Empty when the conversation row could not be created; persistence is
    /// skipped in that case rather than violating foreign keys.
    pub conversation_id: String,
    /// Chat history for this turn. Append-only, except that the single
    /// context-refresh system message is replaced in place.
    pub messages: Vec<Message>,
    pub knowledge: KnowledgeBase,
    pub todos: Vec<TodoItem>,
    pub current_focus: Option<Focus>,
    /// Actions accumulated this turn; written to the action log and reset
    /// at post-process.
    pub executed_actions: Vec<ActionRecord>,
    /// Knowledge keys touched this turn (tool args, loads and writes);
    /// everything else demotes at post-process.
    pub referenced_keys: BTreeSet<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State deltas carried by a successful tool command. `None` = untouched.
#[derive(Debug, Clone, Default)]
pub struct StateUpdates {
    pub knowledge: Option<KnowledgeBase>,
    pub todos: Option<Vec<TodoItem>>,
    /// `Some(None)` clears the focus; `None` leaves it untouched.
    pub current_focus: Option<Option<Focus>>,
    pub events: Vec<TurnEvent>,
    pub actions: Vec<ActionRecord>,
    /// Knowledge keys this tool loaded or wrote; spared from demotion.
    pub referenced_keys: Vec<String>,
}

/// A tool's return value: the message shown to the LLM plus the state and
/// durable effects it produced. Errors become ordinary tool messages so
/// the agent can react and recover in the next cycle.
#[derive(Debug, Clone)]
pub enum Command {
    Ok { text: String, updates: StateUpdates },
    Err { text: String },
}

impl Command {
    pub fn ok(text: impl Into<String>) -> Self {
        Command::Ok {
            text: text.into(),
            updates: StateUpdates::default(),
        }
    }

    pub fn ok_with(text: impl Into<String>, updates: StateUpdates) -> Self {
        Command::Ok {
            text: text.into(),
            updates,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Command::Err {
            text: format!("Erro: {}", text.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Command::Err { .. })
    }
}

impl TurnState {
    /// Apply a successful command's updates. Returns the events to emit.
    pub fn apply_updates(&mut self, updates: StateUpdates) -> Vec<TurnEvent> {
        if let Some(knowledge) = updates.knowledge {
            self.knowledge = knowledge;
        }
        if let Some(todos) = updates.todos {
            self.todos = todos;
        }
        if let Some(focus) = updates.current_focus {
            self.current_focus = focus;
        }
        self.referenced_keys.extend(updates.referenced_keys);

        let mut events = updates.events;
        for action in &updates.actions {
            events.push(TurnEvent::Action {
                action_type: action.action_type.clone(),
                summary: action.summary.clone(),
            });
        }
        self.executed_actions.extend(updates.actions);
        events
    }
}
