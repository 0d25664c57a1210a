//! The tool registry: eleven tools, each a `{name, schema, handler}` record.
//!
//! Definitions are what the LLM sees; dispatch validates the arguments
//! against the schema's required shape (via serde) and invokes the handler
//! with the injected [`Services`] bundle. Handlers return a [`Command`]
//! describing the tool message plus state and durable effects; invalid
//! arguments and handler failures become error commands, never panics.

pub mod analysis;
pub mod context;
pub mod portfolio;
pub mod profile;
pub mod todos;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use rv_domain::chat::{ToolCall, ToolDefinition};
use rv_domain::Error;

use crate::runtime::state::{Command, TurnState};
use crate::state::Services;

/// Build the definitions exposed to the LLM.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "read_context".into(),
            description: "Lê conteúdo da base de conhecimento. Entradas pequenas carregam \
                          por inteiro; usa start_line/num_lines para leituras parciais de \
                          entradas grandes."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string", "description": "Chave, ex: 'user/fiscal'" },
                    "start_line": { "type": "integer", "description": "Primeira linha (0-based)" },
                    "num_lines": { "type": "integer", "description": "Número de linhas a ler" }
                },
                "required": ["key"]
            }),
        },
        ToolDefinition {
            name: "write_context".into(),
            description: "Escreve ou atualiza uma entrada derivada na base de conhecimento \
                          com um resumo de uma linha."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string", "description": "Chave, ex: 'notes/comparacao'" },
                    "content": { "type": "string", "description": "Conteúdo a guardar" },
                    "summary": { "type": "string", "description": "Resumo de uma linha" }
                },
                "required": ["key", "content", "summary"]
            }),
        },
        ToolDefinition {
            name: "remove_context".into(),
            description: "Remove uma entrada da base de conhecimento quando já não é relevante."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "key": { "type": "string", "description": "Chave a remover" }
                },
                "required": ["key"]
            }),
        },
        ToolDefinition {
            name: "manage_todos".into(),
            description: "Gere a lista de tarefas para pedidos de múltiplos passos. \
                          Ações: 'add' (requer task), 'complete' (requer task_id), 'list'."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["add", "complete", "list"] },
                    "task": { "type": "string", "description": "Descrição da tarefa (add)" },
                    "task_id": { "type": "string", "description": "Id da tarefa (complete)" }
                },
                "required": ["action"]
            }),
        },
        ToolDefinition {
            name: "update_user_profile".into(),
            description: "Atualiza uma secção do perfil do utilizador \
                          (fiscal|budget|renovation|preferences|goals|display_name|region). \
                          Persiste e regenera os resumos."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "section": { "type": "string", "description": "Secção a atualizar" },
                    "updates": { "type": "object", "description": "Campos a alterar" }
                },
                "required": ["section", "updates"]
            }),
        },
        ToolDefinition {
            name: "save_to_portfolio".into(),
            description: "Guarda um imóvel já analisado no portfólio, com alcunha opcional."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "property_id": { "type": "string" },
                    "nickname": { "type": "string", "description": "Alcunha opcional" }
                },
                "required": ["property_id"]
            }),
        },
        ToolDefinition {
            name: "remove_from_portfolio".into(),
            description: "Arquiva um imóvel do portfólio. Pede sempre confirmação ao \
                          utilizador antes de chamar; só chama com confirmed=true."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "property_id": { "type": "string" },
                    "confirmed": {
                        "type": "boolean",
                        "description": "true apenas depois de o utilizador confirmar"
                    }
                },
                "required": ["property_id"]
            }),
        },
        ToolDefinition {
            name: "switch_active_property".into(),
            description: "Muda o imóvel ativo (em foco), carregando o resumo da sua análise."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "property_id": { "type": "string" }
                },
                "required": ["property_id"]
            }),
        },
        ToolDefinition {
            name: "search_portfolio".into(),
            description: "Resolve uma referência natural ('o de Alfama', 'o T2') para o id \
                          de um imóvel do portfólio. Apenas leitura."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Referência em linguagem natural" }
                },
                "required": ["query"]
            }),
        },
        ToolDefinition {
            name: "trigger_property_analysis".into(),
            description: "Analisa um imóvel a partir de um URL do Idealista: corre o \
                          pipeline completo de remodelação e guarda o resultado no portfólio."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "URL do anúncio" }
                },
                "required": ["url"]
            }),
        },
        ToolDefinition {
            name: "recalculate_costs".into(),
            description: "Recalcula custos de remodelação a partir das características \
                          guardadas, com as preferências atuais. Sem nova análise visual."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "property_id": { "type": "string" },
                    "preferences": {
                        "type": "object",
                        "description": "Overrides, ex: {\"finish_level\": \"premium\", \
                                        \"diy_skills\": [\"walls\"]}"
                    }
                },
                "required": ["property_id"]
            }),
        },
    ]
}

/// Execute one tool call against the current state.
pub async fn dispatch(services: &Services, turn: &TurnState, call: &ToolCall) -> Command {
    match call.tool_name.as_str() {
        "read_context" => match parse(call) {
            Ok(args) => context::read_context(services, turn, args).await,
            Err(cmd) => cmd,
        },
        "write_context" => match parse(call) {
            Ok(args) => context::write_context(turn, args),
            Err(cmd) => cmd,
        },
        "remove_context" => match parse(call) {
            Ok(args) => context::remove_context(turn, args),
            Err(cmd) => cmd,
        },
        "manage_todos" => match parse(call) {
            Ok(args) => todos::manage_todos(turn, args),
            Err(cmd) => cmd,
        },
        "update_user_profile" => match parse(call) {
            Ok(args) => profile::update_user_profile(services, turn, args).await,
            Err(cmd) => cmd,
        },
        "save_to_portfolio" => match parse(call) {
            Ok(args) => portfolio::save_to_portfolio(services, turn, args).await,
            Err(cmd) => cmd,
        },
        "remove_from_portfolio" => match parse(call) {
            Ok(args) => portfolio::remove_from_portfolio(services, turn, args).await,
            Err(cmd) => cmd,
        },
        "switch_active_property" => match parse(call) {
            Ok(args) => portfolio::switch_active_property(services, turn, args).await,
            Err(cmd) => cmd,
        },
        "search_portfolio" => match parse(call) {
            Ok(args) => portfolio::search_portfolio(services, turn, args).await,
            Err(cmd) => cmd,
        },
        "trigger_property_analysis" => match parse(call) {
            Ok(args) => analysis::trigger_property_analysis(services, turn, args).await,
            Err(cmd) => cmd,
        },
        "recalculate_costs" => match parse(call) {
            Ok(args) => analysis::recalculate_costs(services, turn, args).await,
            Err(cmd) => cmd,
        },
        other => Command::error(format!("Ferramenta desconhecida: '{other}'.")),
    }
}

/// Deserialize tool arguments; schema violations become error commands.
fn parse<T: DeserializeOwned>(call: &ToolCall) -> Result<T, Command> {
    serde_json::from_value(call.arguments.clone()).map_err(|e| {
        Command::error(format!(
            "Argumentos inválidos para '{}': {e}",
            call.tool_name
        ))
    })
}

/// Map a store failure to a tool error command (the agent sees a normal
/// tool message and can react; infrastructure detail stays in the logs).
pub(crate) fn store_error(e: Error) -> Command {
    tracing::error!(error = %e, "tool store operation failed");
    Command::error("Base de dados não disponível.")
}

/// The "key" argument of a call, for referenced-key tracking.
pub fn referenced_key_of(args: &Value) -> Option<String> {
    args.get("key").and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_eleven_tools() {
        let defs = definitions();
        assert_eq!(defs.len(), 11);
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        for expected in [
            "read_context",
            "write_context",
            "remove_context",
            "manage_todos",
            "update_user_profile",
            "save_to_portfolio",
            "remove_from_portfolio",
            "switch_active_property",
            "search_portfolio",
            "trigger_property_analysis",
            "recalculate_costs",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        // Every schema is an object with a properties map.
        for def in &defs {
            assert_eq!(def.parameters["type"], "object");
            assert!(def.parameters["properties"].is_object());
        }
    }
}
