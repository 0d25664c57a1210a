//! Context navigation tools: read, write and remove knowledge entries.

use serde::Deserialize;

use rv_domain::{Error, Result};

use crate::knowledge::KnowledgeSource;
use crate::runtime::state::{Command, StateUpdates, TurnState};
use crate::state::Services;

#[derive(Debug, Deserialize)]
pub struct ReadContextArgs {
    pub key: String,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub num_lines: Option<usize>,
}

pub async fn read_context(
    services: &Services,
    turn: &TurnState,
    args: ReadContextArgs,
) -> Command {
    let Some(entry) = turn.knowledge.get(&args.key) else {
        return Command::error(format!(
            "Chave '{}' não encontrada na base de conhecimento.",
            args.key
        ));
    };

    // Use in-memory content when it is complete; otherwise (re)fetch from
    // the entry's backing source.
    let in_memory = entry
        .is_fully_loaded()
        .then(|| entry.content.clone())
        .flatten();
    let full_content = match in_memory {
        Some(content) => content,
        None => match fetch_entry_content(services, &turn.user_id, &args.key).await {
            Ok(Some(content)) => content,
            Ok(None) => {
                return Command::error(format!(
                    "Não foi possível carregar '{}' da base de dados.",
                    args.key
                ));
            }
            Err(e) => return super::store_error(e),
        },
    };

    let mut knowledge = turn.knowledge.clone();
    let min_lines = services.config.orchestrator.min_lines_for_partial_read;
    let shown = match knowledge.apply_loaded_content(
        &args.key,
        &full_content,
        args.start_line,
        args.num_lines,
        min_lines,
    ) {
        Ok(shown) => shown,
        Err(e) => return Command::error(e.to_string()),
    };

    let total_lines = full_content.lines().count().max(1);
    let lines_info = if total_lines > 1 {
        format!(" ({total_lines} linha(s))")
    } else {
        String::new()
    };

    Command::ok_with(
        format!("[{}]{lines_info}\n{shown}", args.key),
        StateUpdates {
            knowledge: Some(knowledge),
            referenced_keys: vec![args.key],
            ..Default::default()
        },
    )
}

#[derive(Debug, Deserialize)]
pub struct WriteContextArgs {
    pub key: String,
    pub content: String,
    pub summary: String,
}

pub fn write_context(turn: &TurnState, args: WriteContextArgs) -> Command {
    let mut knowledge = turn.knowledge.clone();
    knowledge.write(
        &args.key,
        Some(args.summary),
        Some(args.content),
        KnowledgeSource::Tool,
    );
    Command::ok_with(
        format!("'{}' guardado na base de conhecimento.", args.key),
        StateUpdates {
            knowledge: Some(knowledge),
            referenced_keys: vec![args.key],
            ..Default::default()
        },
    )
}

#[derive(Debug, Deserialize)]
pub struct RemoveContextArgs {
    pub key: String,
}

pub fn remove_context(turn: &TurnState, args: RemoveContextArgs) -> Command {
    let mut knowledge = turn.knowledge.clone();
    match knowledge.remove(&args.key) {
        Ok(()) => Command::ok_with(
            format!("'{}' removido da base de conhecimento.", args.key),
            StateUpdates {
                knowledge: Some(knowledge),
                ..Default::default()
            },
        ),
        Err(Error::ProtectedKey(key)) => Command::error(format!(
            "'{key}' é uma chave protegida e não pode ser removida."
        )),
        Err(_) => Command::error(format!(
            "Chave '{}' não existe na base de conhecimento.",
            args.key
        )),
    }
}

/// Load backing content for a knowledge key from the durable store.
///
/// Key patterns: `user/{section}`, `portfolio/{id}/resumo`,
/// `portfolio/{id}/analise`. Anything else has no backing source.
async fn fetch_entry_content(
    services: &Services,
    user_id: &str,
    key: &str,
) -> Result<Option<String>> {
    let parts: Vec<&str> = key.split('/').collect();

    match parts.as_slice() {
        ["user", section]
            if ["fiscal", "budget", "renovation", "preferences", "goals"].contains(section) =>
        {
            let Some(profile) = services.store.get_profile(user_id).await? else {
                return Ok(None);
            };
            let data = profile.section(section).cloned().unwrap_or_default();
            let lines: Vec<String> = data
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .filter(|(_, v)| !v.is_null())
                        .map(|(k, v)| format!("{k}: {v}"))
                        .collect()
                })
                .unwrap_or_default();
            if lines.is_empty() {
                Ok(Some(format!("Secção '{section}' ainda não preenchida.")))
            } else {
                Ok(Some(lines.join("\n")))
            }
        }
        ["portfolio", property_id, "analise"] => {
            let analysis = services
                .store
                .get_latest_analysis(user_id, property_id, "renovation")
                .await?;
            Ok(Some(match analysis {
                Some(a) => a
                    .detail_summary
                    .or(a.chat_summary)
                    .unwrap_or_else(|| "Análise sem resumo detalhado.".to_string()),
                None => "Análise não disponível.".to_string(),
            }))
        }
        ["portfolio", property_id, "resumo"] => {
            let analysis = services
                .store
                .get_latest_analysis(user_id, property_id, "renovation")
                .await?;
            Ok(Some(match analysis {
                Some(a) => a
                    .chat_summary
                    .unwrap_or_else(|| "Imóvel sem análise.".to_string()),
                None => "Análise não disponível para este imóvel.".to_string(),
            }))
        }
        _ => Ok(None),
    }
}
