//! Task management tool.

use serde::Deserialize;

use crate::runtime::state::{Command, StateUpdates, TodoItem, TodoStatus, TurnEvent, TurnState};

#[derive(Debug, Deserialize)]
pub struct ManageTodosArgs {
    pub action: String,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
}

pub fn manage_todos(turn: &TurnState, args: ManageTodosArgs) -> Command {
    let mut todos = turn.todos.clone();

    match args.action.as_str() {
        "add" => {
            let Some(task) = args.task.filter(|t| !t.trim().is_empty()) else {
                return Command::error("Parâmetro 'task' é obrigatório para 'add'.");
            };
            let id: String = uuid::Uuid::new_v4().to_string()[..8].to_string();
            todos.push(TodoItem {
                id: id.clone(),
                task: task.clone(),
                status: TodoStatus::Pending,
            });
            let event = TurnEvent::TodoUpdate {
                todos: todos.clone(),
            };
            Command::ok_with(
                format!("Tarefa adicionada: [{id}] {task}"),
                StateUpdates {
                    todos: Some(todos),
                    events: vec![event],
                    ..Default::default()
                },
            )
        }
        "complete" => {
            let Some(task_id) = args.task_id else {
                return Command::error("Parâmetro 'task_id' é obrigatório para 'complete'.");
            };
            let Some(todo) = todos.iter_mut().find(|t| t.id == task_id) else {
                return Command::error(format!("Tarefa '{task_id}' não encontrada."));
            };
            todo.status = TodoStatus::Done;
            let event = TurnEvent::TodoUpdate {
                todos: todos.clone(),
            };
            Command::ok_with(
                format!("Tarefa [{task_id}] marcada como concluída."),
                StateUpdates {
                    todos: Some(todos),
                    events: vec![event],
                    ..Default::default()
                },
            )
        }
        "list" => {
            if todos.is_empty() {
                return Command::ok("Sem tarefas pendentes.");
            }
            let lines: Vec<String> = todos
                .iter()
                .map(|t| {
                    let status = match t.status {
                        TodoStatus::Pending => "pending",
                        TodoStatus::Done => "done",
                    };
                    format!("[{}] {status}: {}", t.id, t.task)
                })
                .collect();
            Command::ok(lines.join("\n"))
        }
        other => Command::error(format!(
            "Ação desconhecida: '{other}'. Usa 'add', 'complete' ou 'list'."
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn_with_todo(id: &str) -> TurnState {
        TurnState {
            todos: vec![TodoItem {
                id: id.into(),
                task: "comparar imóveis".into(),
                status: TodoStatus::Pending,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn add_creates_a_pending_todo_and_emits_an_update() {
        let turn = TurnState::default();
        let cmd = manage_todos(
            &turn,
            ManageTodosArgs {
                action: "add".into(),
                task: Some("analisar T2".into()),
                task_id: None,
            },
        );
        let Command::Ok { updates, .. } = cmd else {
            panic!("expected success")
        };
        let todos = updates.todos.unwrap();
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].status, TodoStatus::Pending);
        assert_eq!(todos[0].id.len(), 8);
        assert!(matches!(updates.events[0], TurnEvent::TodoUpdate { .. }));
    }

    #[test]
    fn complete_unknown_id_errors_and_leaves_list_unchanged() {
        let turn = turn_with_todo("ab12cd34");
        let cmd = manage_todos(
            &turn,
            ManageTodosArgs {
                action: "complete".into(),
                task: None,
                task_id: Some("missing0".into()),
            },
        );
        assert!(cmd.is_error());
        assert_eq!(turn.todos[0].status, TodoStatus::Pending);
    }

    #[test]
    fn complete_marks_done() {
        let turn = turn_with_todo("ab12cd34");
        let cmd = manage_todos(
            &turn,
            ManageTodosArgs {
                action: "complete".into(),
                task: None,
                task_id: Some("ab12cd34".into()),
            },
        );
        let Command::Ok { updates, .. } = cmd else {
            panic!("expected success")
        };
        assert_eq!(updates.todos.unwrap()[0].status, TodoStatus::Done);
    }

    #[test]
    fn list_shows_all_tasks() {
        let turn = turn_with_todo("ab12cd34");
        let cmd = manage_todos(
            &turn,
            ManageTodosArgs {
                action: "list".into(),
                task: None,
                task_id: None,
            },
        );
        let Command::Ok { text, .. } = cmd else {
            panic!("expected success")
        };
        assert!(text.contains("[ab12cd34] pending: comparar imóveis"));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let cmd = manage_todos(
            &TurnState::default(),
            ManageTodosArgs {
                action: "purge".into(),
                task: None,
                task_id: None,
            },
        );
        assert!(cmd.is_error());
    }
}
