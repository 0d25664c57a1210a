//! User profile tool: patch one section, regenerate summaries, persist,
//! and refresh the knowledge base.

use serde::Deserialize;
use serde_json::{Map, Value};

use rv_store::records::PROFILE_SECTIONS;

use crate::knowledge::KnowledgeSource;
use crate::runtime::state::{ActionRecord, Command, StateUpdates, TurnState};
use crate::state::Services;
use crate::summaries::{master_profile_summary, profile_section_summary};

#[derive(Debug, Deserialize)]
pub struct UpdateProfileArgs {
    pub section: String,
    pub updates: Map<String, Value>,
}

pub async fn update_user_profile(
    services: &Services,
    turn: &TurnState,
    args: UpdateProfileArgs,
) -> Command {
    let section = args.section.as_str();
    let is_json_section = PROFILE_SECTIONS.contains(&section);
    if !is_json_section && section != "display_name" && section != "region" {
        return Command::error(format!(
            "Secção inválida: '{section}'. Válidas: {}.",
            PROFILE_SECTIONS.join(", ")
        ));
    }

    let profile = match services.store.ensure_profile(&turn.user_id).await {
        Ok(profile) => profile,
        Err(e) => return super::store_error(e),
    };

    // ── Scalar fields (display_name, region) ───────────────────────
    if !is_json_section {
        let new_value = args
            .updates
            .get(section)
            .and_then(Value::as_str)
            .map(str::to_string);
        let old_value = match section {
            "display_name" => profile.display_name.clone(),
            _ => profile.region.clone(),
        };

        let (name, region) = match section {
            "display_name" => (new_value.clone(), profile.region.clone()),
            _ => (profile.display_name.clone(), new_value.clone()),
        };
        let master = master_profile_summary(
            name.as_deref(),
            region.as_deref(),
            &profile.sections_completed.0,
        );

        if let Err(e) = services
            .store
            .update_profile_field(&turn.user_id, section, new_value.as_deref(), &master)
            .await
        {
            return super::store_error(e);
        }

        let mut action = ActionRecord::new(
            "profile_update",
            "user_profile",
            format!("Perfil atualizado: {section}"),
        );
        action.field_changed = Some(section.to_string());
        action.old_value = old_value.map(Value::String);
        action.new_value = new_value.map(Value::String);

        let knowledge = refreshed_profile_entry(turn, &master, name, region, &profile.sections_completed.0);
        return Command::ok_with(
            format!("Perfil actualizado: {section}."),
            StateUpdates {
                knowledge: Some(knowledge),
                actions: vec![action],
                referenced_keys: vec!["user/profile".into()],
                ..Default::default()
            },
        );
    }

    // ── JSON sections: merge, summarize, persist ───────────────────
    let existing = profile.section(section).cloned().unwrap_or(Value::Object(Map::new()));
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    for (key, value) in &args.updates {
        merged.insert(key.clone(), value.clone());
    }
    let merged = Value::Object(merged);

    let section_summary = profile_section_summary(section, &merged);

    let mut sections_completed = profile.sections_completed.0.clone();
    if !sections_completed.iter().any(|s| s == section) {
        sections_completed.push(section.to_string());
    }

    let master = master_profile_summary(
        profile.display_name.as_deref(),
        profile.region.as_deref(),
        &sections_completed,
    );

    if let Err(e) = services
        .store
        .upsert_profile_section(
            &turn.user_id,
            section,
            &merged,
            &section_summary,
            &sections_completed,
            &master,
        )
        .await
    {
        return super::store_error(e);
    }

    let mut action = ActionRecord::new(
        "profile_update",
        "user_profile",
        format!("Perfil atualizado: secção {section}"),
    );
    action.field_changed = Some(section.to_string());
    action.old_value = Some(existing);
    action.new_value = Some(merged.clone());

    // Refresh both the section entry and the master profile entry.
    let mut knowledge = turn.knowledge.clone();
    let section_content: Vec<String> = merged
        .as_object()
        .map(|obj| obj.iter().map(|(k, v)| format!("{k}: {v}")).collect())
        .unwrap_or_default();
    knowledge.write(
        format!("user/{section}"),
        Some(section_summary),
        Some(section_content.join("\n")),
        KnowledgeSource::Store,
    );
    write_profile_entry(
        &mut knowledge,
        &master,
        profile.display_name.clone(),
        profile.region.clone(),
        &sections_completed,
    );

    Command::ok_with(
        format!("Perfil actualizado: secção '{section}'."),
        StateUpdates {
            knowledge: Some(knowledge),
            actions: vec![action],
            referenced_keys: vec![format!("user/{section}"), "user/profile".into()],
            ..Default::default()
        },
    )
}

fn refreshed_profile_entry(
    turn: &TurnState,
    master: &str,
    name: Option<String>,
    region: Option<String>,
    sections: &[String],
) -> crate::knowledge::KnowledgeBase {
    let mut knowledge = turn.knowledge.clone();
    write_profile_entry(&mut knowledge, master, name, region, sections);
    knowledge
}

fn write_profile_entry(
    knowledge: &mut crate::knowledge::KnowledgeBase,
    master: &str,
    name: Option<String>,
    region: Option<String>,
    sections: &[String],
) {
    let sections_str = if sections.is_empty() {
        "nenhuma".to_string()
    } else {
        sections.join(", ")
    };
    knowledge.write(
        "user/profile",
        Some(master.to_string()),
        Some(format!(
            "Nome: {}\nRegião: {}\nSecções completas: {sections_str}\nResumo: {master}",
            name.unwrap_or_else(|| "Utilizador".into()),
            region.unwrap_or_else(|| "não especificada".into()),
        )),
        KnowledgeSource::Store,
    );
}
