//! Analysis tools: run the renovation pipeline and reprice cached features.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use rv_pipeline::costs::{recalculate_from_features, CachedRoom, RenovationPrefs};
use rv_pipeline::{RoomFeatures, RoomType};
use rv_store::{AnalysisPersistRequest, NewProperty, NewRoomFeatures};

use crate::knowledge::KnowledgeSource;
use crate::runtime::state::{ActionRecord, Command, Focus, StateUpdates, TurnEvent, TurnState};
use crate::state::Services;
use crate::summaries::{
    analysis_chat_summary, analysis_detail_summary, portfolio_index_line, AnalysisFacts,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// trigger_property_analysis
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct TriggerAnalysisArgs {
    pub url: String,
}

pub async fn trigger_property_analysis(
    services: &Services,
    turn: &TurnState,
    args: TriggerAnalysisArgs,
) -> Command {
    let mut events = vec![TurnEvent::Thinking {
        message: "A analisar imóvel...".into(),
    }];

    let state = services.pipeline.run(&args.url).await;

    if let Some(error) = state.error {
        return Command::error(format!("Falha na análise: {error}"));
    }
    let Some(estimate) = state.estimate else {
        return Command::error("Análise não produziu resultados.");
    };

    let facts = AnalysisFacts::from(&estimate);
    let chat_summary = analysis_chat_summary(&facts);
    let detail_summary = analysis_detail_summary(&facts);
    let property_data = estimate.property_data.clone().unwrap_or_default();
    let index_line = portfolio_index_line(
        (property_data.num_rooms > 0).then_some(property_data.num_rooms as i64),
        (!property_data.location.is_empty()).then_some(property_data.location.as_str()),
        (property_data.price > 0.0).then_some(property_data.price),
        Some((estimate.total_cost_min, estimate.total_cost_max)),
    );

    let room_features: Vec<NewRoomFeatures> = estimate
        .room_analyses
        .iter()
        .filter_map(|room| {
            let features = room.features.as_ref()?;
            Some(NewRoomFeatures {
                room_type: room.room_type.as_str().to_string(),
                room_number: i64::from(room.room_number),
                room_label: room.room_label.clone(),
                features: serde_json::to_value(features).ok()?,
                images: room.images.clone(),
            })
        })
        .collect();

    let result_data = match serde_json::to_value(&estimate) {
        Ok(value) => value,
        Err(e) => return Command::error(format!("Erro ao serializar a análise: {e}")),
    };

    let persist_req = AnalysisPersistRequest {
        user_id: turn.user_id.clone(),
        property: NewProperty {
            external_id: property_data.external_id.clone(),
            url: args.url.clone(),
            title: Some(property_data.title.clone()),
            price: (property_data.price > 0.0).then_some(property_data.price as i64),
            area_m2: (property_data.area_m2 > 0.0).then_some(property_data.area_m2),
            num_rooms: (property_data.num_rooms > 0).then_some(property_data.num_rooms as i64),
            num_bathrooms: (property_data.num_bathrooms > 0)
                .then_some(property_data.num_bathrooms as i64),
            location: Some(property_data.location.clone()),
            description: Some(property_data.description.clone()),
            image_urls: property_data.image_urls.clone(),
            price_per_m2: (property_data.price_per_m2 > 0.0).then_some(property_data.price_per_m2),
            raw_data: property_data.raw_data.clone(),
        },
        result_data,
        chat_summary: chat_summary.clone(),
        detail_summary: Some(detail_summary),
        index_summary: index_line.clone(),
        room_features,
    };

    // All four tables commit together; any failure leaves the store
    // untouched and surfaces as a tool error.
    let persisted = match services.store.persist_analysis(&persist_req).await {
        Ok(persisted) => persisted,
        Err(e) => {
            tracing::error!(url = %args.url, error = %e, "persisting analysis failed");
            return Command::error(
                "Erro ao guardar dados na base de dados. A análise não foi guardada.",
            );
        }
    };

    let mut action = ActionRecord::new(
        "analysis_trigger",
        "analysis",
        format!("Análise concluída: {index_line}"),
    );
    action.entity_id = Some(persisted.analysis_id.clone());
    action.new_value = Some(json!({ "url": args.url, "chat_summary": chat_summary }));

    let resumo_key = format!("portfolio/{}/resumo", persisted.property_id);
    let analise_key = format!("portfolio/{}/analise", persisted.property_id);
    let mut knowledge = turn.knowledge.clone();
    knowledge.write(
        &resumo_key,
        Some(index_line.clone()),
        Some(chat_summary.clone()),
        KnowledgeSource::Pipeline,
    );
    knowledge.insert_summary(
        &analise_key,
        format!("Análise detalhada: {index_line}"),
        KnowledgeSource::Pipeline,
    );

    events.push(TurnEvent::Thinking {
        message: "Análise concluída.".into(),
    });

    Command::ok_with(
        format!("Análise concluída.\n\n{chat_summary}"),
        StateUpdates {
            knowledge: Some(knowledge),
            current_focus: Some(Some(Focus {
                property_id: persisted.property_id,
                topic: "renovação".into(),
                depth: 0,
            })),
            events,
            actions: vec![action],
            referenced_keys: vec![resumo_key, analise_key],
            ..Default::default()
        },
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// recalculate_costs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct RecalculateCostsArgs {
    pub property_id: String,
    #[serde(default)]
    pub preferences: Option<Map<String, Value>>,
}

pub async fn recalculate_costs(
    services: &Services,
    turn: &TurnState,
    args: RecalculateCostsArgs,
) -> Command {
    let feature_rows = match services.store.get_room_features(&args.property_id).await {
        Ok(rows) => rows,
        Err(e) => return super::store_error(e),
    };
    if feature_rows.is_empty() {
        return Command::error(
            "Funcionalidades de divisão não encontradas. \
             É necessário analisar o imóvel primeiro.",
        );
    }

    let cached: Vec<CachedRoom> = feature_rows
        .iter()
        .filter_map(|row| {
            let room_type: RoomType =
                serde_json::from_value(Value::String(row.room_type.clone())).ok()?;
            let features: RoomFeatures = serde_json::from_value(row.features.0.clone()).ok()?;
            Some(CachedRoom {
                room_type,
                room_number: row.room_number.max(1) as u32,
                room_label: row.room_label.clone(),
                features,
                images: row.images.0.clone(),
            })
        })
        .collect();
    if cached.is_empty() {
        return Command::error("As funcionalidades guardadas estão corrompidas.");
    }

    // Profile renovation preferences, overridden by explicit arguments.
    let profile = match services.store.get_profile(&turn.user_id).await {
        Ok(profile) => profile,
        Err(e) => return super::store_error(e),
    };
    let renovation = profile
        .as_ref()
        .and_then(|p| p.section("renovation").cloned())
        .unwrap_or_default();

    let mut prefs = RenovationPrefs {
        finish_level: renovation
            .get("finish_level")
            .and_then(Value::as_str)
            .unwrap_or("standard")
            .to_string(),
        diy_skills: renovation
            .get("diy_skills")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
    };
    let mut prefs_snapshot = renovation.as_object().cloned().unwrap_or_default();
    if let Some(overrides) = &args.preferences {
        if let Some(finish) = overrides.get("finish_level").and_then(Value::as_str) {
            prefs.finish_level = finish.to_string();
        }
        if let Some(skills) = overrides.get("diy_skills").and_then(Value::as_array) {
            prefs.diy_skills = skills
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        for (key, value) in overrides {
            prefs_snapshot.insert(key.clone(), value.clone());
        }
    }

    let property_area = match services.store.get_property(&args.property_id).await {
        Ok(property) => property.and_then(|p| p.area_m2),
        Err(e) => return super::store_error(e),
    };

    let rooms = recalculate_from_features(&cached, &prefs, property_area);
    let total_min: f64 = rooms.iter().map(|r| r.cost_min).sum();
    let total_max: f64 = rooms.iter().map(|r| r.cost_max).sum();

    let facts = AnalysisFacts {
        total_min: Some(total_min),
        total_max: Some(total_max),
        rooms: &rooms,
        ..Default::default()
    };
    let chat_summary = analysis_chat_summary(&facts);

    // Persist onto the latest analysis when one exists.
    let mut actions = Vec::new();
    match services
        .store
        .get_latest_analysis(&turn.user_id, &args.property_id, "renovation")
        .await
    {
        Ok(Some(latest)) => {
            let mut result_data = latest.result_data.0.clone();
            if !result_data.is_object() {
                result_data = json!({});
            }
            result_data["room_analyses"] = serde_json::to_value(&rooms).unwrap_or_default();
            result_data["total_cost_min"] = json!(total_min);
            result_data["total_cost_max"] = json!(total_max);

            if let Err(e) = services
                .store
                .update_analysis(
                    &latest.id,
                    &result_data,
                    &chat_summary,
                    &Value::Object(prefs_snapshot.clone()),
                )
                .await
            {
                return super::store_error(e);
            }

            let mut action = ActionRecord::new(
                "cost_recalculate",
                "analysis",
                format!("Custos recalculados: {}", crate::summaries::fmt_range_short(total_min, total_max)),
            );
            action.entity_id = Some(latest.id);
            action.new_value = Some(json!({
                "finish_level": prefs.finish_level,
                "diy_skills": prefs.diy_skills,
                "total_min": total_min,
                "total_max": total_max,
            }));
            actions.push(action);
        }
        Ok(None) => {}
        Err(e) => return super::store_error(e),
    }

    let resumo_key = format!("portfolio/{}/resumo", args.property_id);
    let mut knowledge = turn.knowledge.clone();
    let first_line = chat_summary
        .lines()
        .next()
        .unwrap_or("Custos recalculados")
        .to_string();
    knowledge.write(
        &resumo_key,
        Some(first_line),
        Some(chat_summary.clone()),
        KnowledgeSource::Tool,
    );

    Command::ok_with(
        format!("Custos recalculados.\n\n{chat_summary}"),
        StateUpdates {
            knowledge: Some(knowledge),
            actions,
            referenced_keys: vec![resumo_key],
            ..Default::default()
        },
    )
}
