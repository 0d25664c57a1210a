//! Portfolio tools: save, archive, switch the active property, and resolve
//! natural-language references.

use serde::Deserialize;
use serde_json::{json, Value};

use rv_domain::Error;
use rv_store::PortfolioSearchRow;

use crate::knowledge::KnowledgeSource;
use crate::runtime::state::{ActionRecord, Command, Focus, StateUpdates, TurnState};
use crate::state::Services;
use crate::summaries::portfolio_index_line;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// save_to_portfolio
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SaveToPortfolioArgs {
    pub property_id: String,
    #[serde(default)]
    pub nickname: Option<String>,
}

pub async fn save_to_portfolio(
    services: &Services,
    turn: &TurnState,
    args: SaveToPortfolioArgs,
) -> Command {
    match services
        .store
        .get_portfolio_item(&turn.user_id, &args.property_id)
        .await
    {
        Ok(Some(_)) => return Command::ok("Imóvel já está no portfólio."),
        Ok(None) => {}
        Err(e) => return super::store_error(e),
    }

    // Saving requires a prior analysis; the index line carries its totals.
    let analysis = match services
        .store
        .get_latest_analysis(&turn.user_id, &args.property_id, "renovation")
        .await
    {
        Ok(Some(analysis)) => analysis,
        Ok(None) => {
            return Command::error(
                "O imóvel ainda não foi analisado. Usa trigger_property_analysis primeiro.",
            );
        }
        Err(e) => return super::store_error(e),
    };

    let property = match services.store.get_property(&args.property_id).await {
        Ok(Some(property)) => property,
        Ok(None) => return Command::error("Imóvel não encontrado."),
        Err(e) => return super::store_error(e),
    };

    let totals = analysis_totals(&analysis.result_data.0);
    let index_line = portfolio_index_line(
        property.num_rooms,
        property.location.as_deref(),
        property.price.map(|p| p as f64),
        totals,
    );

    let item = match services
        .store
        .create_portfolio_item(
            &turn.user_id,
            &args.property_id,
            args.nickname.as_deref(),
            Some(&index_line),
        )
        .await
    {
        Ok(item) => item,
        Err(e) => return super::store_error(e),
    };

    let mut action = ActionRecord::new(
        "portfolio_add",
        "portfolio_item",
        format!("Imóvel guardado no portfólio: {index_line}"),
    );
    action.entity_id = Some(item.id.clone());
    action.new_value = Some(json!({
        "property_id": args.property_id,
        "nickname": args.nickname,
    }));

    // Append to the portfolio index and register the new summary entry.
    let mut knowledge = turn.knowledge.clone();
    let nickname_str = args
        .nickname
        .as_deref()
        .map(|n| format!(" \"{n}\""))
        .unwrap_or_default();
    let existing = knowledge
        .get("portfolio/index")
        .and_then(|e| e.content.clone())
        .unwrap_or_default();
    let mut lines: Vec<String> = existing
        .lines()
        .filter(|l| l.starts_with("- "))
        .map(str::to_string)
        .collect();
    lines.push(format!("- {}{nickname_str}: {index_line}", item.id));
    knowledge.write(
        "portfolio/index",
        Some(format!("{} imóvel(is) no portfólio", lines.len())),
        Some(lines.join("\n")),
        KnowledgeSource::Store,
    );
    knowledge.insert_summary(
        format!("portfolio/{}/resumo", args.property_id),
        index_line,
        KnowledgeSource::Store,
    );

    Command::ok_with(
        format!("Imóvel guardado no portfólio{nickname_str}."),
        StateUpdates {
            knowledge: Some(knowledge),
            actions: vec![action],
            referenced_keys: vec!["portfolio/index".into()],
            ..Default::default()
        },
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// remove_from_portfolio
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RemoveFromPortfolioArgs {
    pub property_id: String,
    #[serde(default)]
    pub confirmed: bool,
}

pub async fn remove_from_portfolio(
    services: &Services,
    turn: &TurnState,
    args: RemoveFromPortfolioArgs,
) -> Command {
    if !args.confirmed {
        return Command::error(
            "A remoção requer confirmação explícita do utilizador. \
             Confirma primeiro e chama de novo com confirmed=true.",
        );
    }

    let item = match services
        .store
        .get_portfolio_item(&turn.user_id, &args.property_id)
        .await
    {
        Ok(Some(item)) => item,
        Ok(None) => return Command::error("Imóvel não encontrado no portfólio."),
        Err(e) => return super::store_error(e),
    };

    if let Err(e) = services
        .store
        .update_portfolio_item_status(&turn.user_id, &item.id, "archived")
        .await
    {
        return super::store_error(e);
    }

    let mut action = ActionRecord::new(
        "portfolio_remove",
        "portfolio_item",
        "Imóvel removido do portfólio",
    );
    action.entity_id = Some(item.id.clone());
    action.old_value = Some(json!({ "status": item.status }));
    action.new_value = Some(json!({ "status": "archived" }));
    action.confirmed_by_user = true;

    // Drop the property's entries and its index line. The active
    // property's resumo is turn-protected; it stays and demotes next turn.
    let mut knowledge = turn.knowledge.clone();
    let _ = knowledge.remove(&format!("portfolio/{}/resumo", args.property_id));
    let _ = knowledge.remove(&format!("portfolio/{}/analise", args.property_id));

    let remaining: Vec<String> = knowledge
        .get("portfolio/index")
        .and_then(|e| e.content.clone())
        .unwrap_or_default()
        .lines()
        .filter(|l| l.starts_with("- ") && !l.starts_with(&format!("- {}", item.id)))
        .map(str::to_string)
        .collect();
    if remaining.is_empty() {
        knowledge.write(
            "portfolio/index",
            Some("Portfólio vazio".into()),
            Some("Nenhum imóvel adicionado ainda.".into()),
            KnowledgeSource::Store,
        );
    } else {
        knowledge.write(
            "portfolio/index",
            Some(format!("{} imóvel(is) no portfólio", remaining.len())),
            Some(remaining.join("\n")),
            KnowledgeSource::Store,
        );
    }

    Command::ok_with(
        "Imóvel removido do portfólio.",
        StateUpdates {
            knowledge: Some(knowledge),
            actions: vec![action],
            referenced_keys: vec!["portfolio/index".into()],
            ..Default::default()
        },
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// switch_active_property
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SwitchActiveArgs {
    pub property_id: String,
}

pub async fn switch_active_property(
    services: &Services,
    turn: &TurnState,
    args: SwitchActiveArgs,
) -> Command {
    let item = match services
        .store
        .set_active(&turn.user_id, &args.property_id)
        .await
    {
        Ok(item) => item,
        Err(Error::NotFound(_)) => {
            return Command::error("Imóvel não encontrado no portfólio.");
        }
        Err(e) => return super::store_error(e),
    };

    let mut knowledge = turn.knowledge.clone();
    let mut referenced_keys = Vec::new();
    if let Ok(Some(analysis)) = services
        .store
        .get_latest_analysis(&turn.user_id, &args.property_id, "renovation")
        .await
    {
        if let Some(chat_summary) = analysis.chat_summary {
            let key = format!("portfolio/{}/resumo", args.property_id);
            let summary: String = chat_summary.chars().take(80).collect();
            knowledge.write(
                &key,
                Some(summary),
                Some(chat_summary),
                KnowledgeSource::Store,
            );
            referenced_keys.push(key);
        }
    }

    let mut action = ActionRecord::new(
        "property_switch",
        "portfolio_item",
        format!("Imóvel ativo: {}", args.property_id),
    );
    action.entity_id = Some(item.id);
    action.new_value = Some(json!({ "property_id": args.property_id, "is_active": true }));

    Command::ok_with(
        format!("Imóvel activo alterado para {}.", args.property_id),
        StateUpdates {
            knowledge: Some(knowledge),
            current_focus: Some(Some(Focus {
                property_id: args.property_id,
                topic: "geral".into(),
                depth: 0,
            })),
            actions: vec![action],
            referenced_keys,
            ..Default::default()
        },
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// search_portfolio
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct SearchPortfolioArgs {
    pub query: String,
}

pub async fn search_portfolio(
    services: &Services,
    turn: &TurnState,
    args: SearchPortfolioArgs,
) -> Command {
    let rows = match services.store.search_rows(&turn.user_id).await {
        Ok(rows) => rows,
        Err(e) => return super::store_error(e),
    };
    if rows.is_empty() {
        return Command::ok("Portfólio vazio.");
    }

    let mut matches = score_rows(&args.query, &rows);
    if matches.is_empty() {
        let all: Vec<String> = rows
            .iter()
            .map(|r| {
                format!(
                    "ID: {} — {}",
                    r.property_id,
                    r.index_summary.as_deref().unwrap_or("sem resumo")
                )
            })
            .collect();
        return Command::ok(format!(
            "Nenhuma correspondência para '{}'. Imóveis disponíveis:\n{}",
            args.query,
            all.join("\n")
        ));
    }

    // Keyword count, then most recently active, then store order.
    matches.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(b.1.is_active.cmp(&a.1.is_active))
            .then(b.1.updated_at.cmp(&a.1.updated_at))
    });

    let decisive = matches.len() == 1 || matches[0].0 > matches[1].0;
    if decisive {
        let best = matches[0].1;
        return Command::ok(format!(
            "Imóvel encontrado: ID={} — {}",
            best.property_id,
            best.index_summary.as_deref().unwrap_or_default()
        ));
    }

    // Low confidence: hand back the candidates instead of guessing.
    let options: Vec<String> = matches
        .iter()
        .take(3)
        .map(|(_, r)| {
            format!(
                "ID: {} — {}",
                r.property_id,
                r.index_summary.as_deref().unwrap_or_default()
            )
        })
        .collect();
    Command::ok(format!(
        "Múltiplas correspondências para '{}':\n{}",
        args.query,
        options.join("\n")
    ))
}

fn score_rows<'a>(query: &str, rows: &'a [PortfolioSearchRow]) -> Vec<(usize, &'a PortfolioSearchRow)> {
    let query = query.to_lowercase();
    let words: Vec<&str> = query.split_whitespace().collect();

    rows.iter()
        .filter_map(|row| {
            let searchable = format!(
                "{} {} {} {} {} t{}",
                row.nickname.as_deref().unwrap_or_default(),
                row.index_summary.as_deref().unwrap_or_default(),
                row.location.as_deref().unwrap_or_default(),
                row.title.as_deref().unwrap_or_default(),
                row.price.map(|p| p.to_string()).unwrap_or_default(),
                row.num_rooms.unwrap_or_default(),
            )
            .to_lowercase();

            let score = words.iter().filter(|w| searchable.contains(*w)).count();
            (score > 0).then_some((score, row))
        })
        .collect()
}

fn analysis_totals(result_data: &Value) -> Option<(f64, f64)> {
    let min = result_data.get("total_cost_min").and_then(Value::as_f64)?;
    let max = result_data.get("total_cost_max").and_then(Value::as_f64)?;
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(
        property_id: &str,
        summary: &str,
        location: &str,
        num_rooms: i64,
    ) -> PortfolioSearchRow {
        PortfolioSearchRow {
            id: format!("item-{property_id}"),
            property_id: property_id.into(),
            nickname: None,
            index_summary: Some(summary.into()),
            is_active: false,
            updated_at: Utc::now(),
            location: Some(location.into()),
            title: Some("Apartamento".into()),
            price: Some(180_000),
            num_rooms: Some(num_rooms),
        }
    }

    #[test]
    fn scoring_ranks_location_and_typology_hits_highest() {
        let rows = vec![
            row("p1", "T2 Alfama, 180k€", "Lisboa, Alfama", 2),
            row("p2", "T3 Graça, 250k€", "Lisboa, Graça", 3),
        ];

        // Filler words match loosely everywhere; the distinctive keyword
        // must still put the right property on top.
        let matches = score_rows("o de alfama", &rows);
        let p1 = matches.iter().find(|(_, r)| r.property_id == "p1").unwrap();
        let p2_score = matches
            .iter()
            .find(|(_, r)| r.property_id == "p2")
            .map(|(s, _)| *s)
            .unwrap_or(0);
        assert!(p1.0 > p2_score);

        let t3 = score_rows("o t3", &rows);
        let best = t3.iter().max_by_key(|(s, _)| *s).unwrap();
        assert_eq!(best.1.property_id, "p2");
    }

    #[test]
    fn no_match_yields_empty() {
        let rows = vec![row("p1", "T2 Alfama", "Lisboa, Alfama", 2)];
        assert!(score_rows("penthouse cascais", &rows).is_empty());
    }
}
