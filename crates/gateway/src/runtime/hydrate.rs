//! The hydrate node: reconstitute turn state from the durable store.
//!
//! Runs once at turn start. Loads profile, portfolio and the prior session
//! summary (one fast hydration call), builds the knowledge base with the
//! always-present tier populated, creates the conversation row when needed,
//! and seeds the message list with the system prompt, the first context
//! block, and the incoming user message.

use rv_domain::chat::Message;
use rv_domain::Result;
use rv_store::records::PROFILE_SECTIONS;
use rv_store::{HydratedContext, PortfolioItemRow};

use crate::knowledge::{KnowledgeBase, KnowledgeSource, CONTEXT_MESSAGE_TAG};
use crate::prompts::build_system_prompt;
use crate::state::Services;
use crate::runtime::state::TurnState;

pub async fn hydrate(
    services: &Services,
    user_id: &str,
    conversation_id: Option<&str>,
    user_message: &str,
) -> Result<TurnState> {
    let mut ctx = services.store.hydrate(user_id).await?;

    // First-time users get a minimal profile row so later tool writes have
    // something to patch.
    if ctx.profile.is_none() {
        match services.store.ensure_profile(user_id).await {
            Ok(profile) => ctx.profile = Some(profile),
            Err(e) => tracing::error!(user_id, error = %e, "auto-creating profile failed"),
        }
    }

    let knowledge = build_knowledge_base(services, user_id, &ctx).await;

    // Resolve or create the conversation row. A failed creation leaves the
    // id empty and message persistence is skipped for the turn.
    let conversation_id = match conversation_id {
        Some(id) if !id.is_empty() => match services.store.get_conversation(id).await? {
            Some(conv) if conv.user_id == user_id => conv.id,
            _ => create_conversation(services, user_id).await,
        },
        _ => create_conversation(services, user_id).await,
    };

    let mut turn = TurnState {
        user_id: user_id.to_string(),
        conversation_id,
        knowledge,
        ..Default::default()
    };

    let context_block = turn.knowledge.render(&turn.todos, turn.current_focus.as_ref());
    turn.messages.push(Message::system(build_system_prompt()));
    turn.messages
        .push(Message::system_tagged(CONTEXT_MESSAGE_TAG, context_block));
    turn.messages.push(Message::user(user_message));

    // The user turn persists immediately so it survives even a turn that
    // blows its budget before post-process.
    if !turn.conversation_id.is_empty() {
        if let Err(e) = services
            .store
            .append_message(&turn.conversation_id, "user", user_message, None, None)
            .await
        {
            tracing::error!(error = %e, "persisting user message failed");
        } else if let Err(e) = services
            .store
            .increment_message_count(&turn.conversation_id)
            .await
        {
            tracing::warn!(error = %e, "incrementing message count failed");
        }
    }

    tracing::info!(
        user_id,
        conversation_id = %turn.conversation_id,
        knowledge_keys = turn.knowledge.len(),
        "turn hydrated"
    );
    Ok(turn)
}

async fn create_conversation(services: &Services, user_id: &str) -> String {
    match services.store.create_conversation(user_id).await {
        Ok(conv) => conv.id,
        Err(e) => {
            tracing::error!(user_id, error = %e, "creating conversation failed");
            String::new()
        }
    }
}

/// Build the knowledge base for a turn.
///
/// Always-present (loaded): `user/profile`, `portfolio/index`, the active
/// property's `resumo`, `session/resumo_anterior`. Available (summary
/// only): the five profile sections, non-active property summaries, and
/// the active property's detailed `analise`.
async fn build_knowledge_base(
    services: &Services,
    user_id: &str,
    ctx: &HydratedContext,
) -> KnowledgeBase {
    let mut kb = KnowledgeBase::new();
    let mut always_present = vec!["user/profile".to_string(), "portfolio/index".to_string()];

    // --- user/profile ---
    let profile = ctx.profile.as_ref();
    let profile_summary = profile
        .and_then(|p| p.profile_summary.clone())
        .unwrap_or_else(|| "Perfil não configurado".to_string());
    let name = profile
        .and_then(|p| p.display_name.clone())
        .unwrap_or_else(|| "Utilizador".to_string());
    let region = profile
        .and_then(|p| p.region.clone())
        .unwrap_or_else(|| "não especificada".to_string());
    let sections = profile
        .map(|p| p.sections_completed.0.clone())
        .unwrap_or_default();
    let sections_str = if sections.is_empty() {
        "nenhuma".to_string()
    } else {
        sections.join(", ")
    };
    kb.write(
        "user/profile",
        Some(profile_summary.clone()),
        Some(format!(
            "Nome: {name}\nRegião: {region}\nSecções completas: {sections_str}\nResumo: {profile_summary}"
        )),
        KnowledgeSource::Store,
    );

    // --- profile sections (available only) ---
    for section in PROFILE_SECTIONS {
        let summary = profile
            .and_then(|p| p.section_summary(section))
            .unwrap_or("Não preenchido");
        kb.insert_summary(format!("user/{section}"), summary, KnowledgeSource::Store);
    }

    // --- portfolio/index ---
    if ctx.portfolio.is_empty() {
        kb.write(
            "portfolio/index",
            Some("Portfólio vazio".into()),
            Some("Nenhum imóvel adicionado ainda.".into()),
            KnowledgeSource::Store,
        );
    } else {
        let index_content = render_portfolio_index(&ctx.portfolio);
        kb.write(
            "portfolio/index",
            Some(format!("{} imóvel(is) no portfólio", ctx.portfolio.len())),
            Some(index_content),
            KnowledgeSource::Store,
        );
    }

    // --- per-property summaries; the active one loads its analysis ---
    for item in &ctx.portfolio {
        let item_summary = item
            .index_summary
            .clone()
            .unwrap_or_else(|| "sem resumo".to_string());
        let resumo_key = format!("portfolio/{}/resumo", item.property_id);

        if item.is_active {
            let analysis = services
                .store
                .get_latest_analysis(user_id, &item.property_id, "renovation")
                .await
                .unwrap_or_else(|e| {
                    tracing::error!(property_id = %item.property_id, error = %e,
                        "loading active analysis failed");
                    None
                });

            match analysis {
                Some(analysis) => {
                    let chat_summary = analysis
                        .chat_summary
                        .clone()
                        .unwrap_or_else(|| "Imóvel sem análise.".to_string());
                    kb.write(
                        &resumo_key,
                        Some(item_summary.clone()),
                        Some(chat_summary),
                        KnowledgeSource::Store,
                    );
                }
                None => kb.write(
                    &resumo_key,
                    Some(item_summary.clone()),
                    Some("Análise não disponível para este imóvel.".into()),
                    KnowledgeSource::Store,
                ),
            }
            always_present.push(resumo_key);
        } else {
            kb.insert_summary(resumo_key, item_summary.clone(), KnowledgeSource::Store);
        }

        // The detailed breakdown is indexed for every item; content loads
        // on demand from the latest analysis row.
        kb.insert_summary(
            format!("portfolio/{}/analise", item.property_id),
            format!("Análise detalhada: {item_summary}"),
            KnowledgeSource::Store,
        );
    }

    // --- session/resumo_anterior ---
    match &ctx.last_session_summary {
        Some(summary) => kb.write(
            "session/resumo_anterior",
            Some("Resumo da sessão anterior".into()),
            Some(summary.clone()),
            KnowledgeSource::Store,
        ),
        None => kb.insert_summary("session/resumo_anterior", "Primeira sessão", KnowledgeSource::Store),
    }
    always_present.push("session/resumo_anterior".to_string());

    kb.set_always_present(always_present);
    kb
}

/// One line per portfolio item, the format tools append to.
pub fn render_portfolio_index(items: &[PortfolioItemRow]) -> String {
    items
        .iter()
        .map(|item| {
            let nickname = item
                .nickname
                .as_deref()
                .map(|n| format!(" \"{n}\""))
                .unwrap_or_default();
            let active = if item.is_active { " [ativo]" } else { "" };
            let summary = item.index_summary.as_deref().unwrap_or("sem resumo");
            format!("- {}{nickname}{active}: {summary}", item.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
