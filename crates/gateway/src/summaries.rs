//! Summary generation: deterministic templates for analyses, portfolio
//! index lines and profile sections, plus the one LLM-backed narrative for
//! conversation end.
//!
//! Template formats (stable):
//!
//! ```text
//! Preço: 180.000€ | Área: 65m² | €/m²: 2.769€
//! Confiança: 72%
//! Renovação: 15.200€–24.800€
//! Prioridades: Cozinha (mau, 5-8k€), Casa de Banho (razoável, 3-5k€)
//! ```
//!
//! Portfolio index line: `T2 Alfama, 180k€, reno 15-25k€`

use std::sync::Arc;

use serde_json::Value;

use rv_domain::chat::Message;
use rv_pipeline::{RenovationEstimate, RoomAnalysis};
use rv_providers::{ChatRequest, LlmProvider};
use rv_store::MessageRow;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analysis summaries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input for the analysis summary templates.
#[derive(Debug, Clone, Default)]
pub struct AnalysisFacts<'a> {
    pub price: Option<f64>,
    pub area_m2: Option<f64>,
    pub price_per_m2: Option<f64>,
    pub confidence: Option<f64>,
    pub total_min: Option<f64>,
    pub total_max: Option<f64>,
    pub rooms: &'a [RoomAnalysis],
}

impl<'a> From<&'a RenovationEstimate> for AnalysisFacts<'a> {
    fn from(estimate: &'a RenovationEstimate) -> Self {
        let prop = estimate.property_data.as_ref();
        Self {
            price: prop.map(|p| p.price).filter(|v| *v > 0.0),
            area_m2: prop.map(|p| p.area_m2).filter(|v| *v > 0.0),
            price_per_m2: prop.map(|p| p.price_per_m2).filter(|v| *v > 0.0),
            confidence: Some(estimate.overall_confidence),
            total_min: Some(estimate.total_cost_min),
            total_max: Some(estimate.total_cost_max),
            rooms: &estimate.room_analyses,
        }
    }
}

/// Compact scannable summary shown in chat and stored as `chat_summary`.
pub fn analysis_chat_summary(facts: &AnalysisFacts) -> String {
    let mut lines: Vec<String> = Vec::new();

    let mut header = Vec::new();
    if let Some(price) = facts.price {
        header.push(format!("Preço: {}", fmt_euros(price)));
    }
    if let Some(area) = facts.area_m2 {
        header.push(format!("Área: {area:.0}m²"));
    }
    if let Some(ppm2) = facts.price_per_m2 {
        header.push(format!("€/m²: {}", fmt_euros(ppm2)));
    }
    if !header.is_empty() {
        lines.push(header.join(" | "));
    }

    if let Some(confidence) = facts.confidence {
        lines.push(format!("Confiança: {:.0}%", confidence * 100.0));
    }

    if facts.total_min.is_some() || facts.total_max.is_some() {
        lines.push(format!(
            "Renovação: {}",
            fmt_range(facts.total_min, facts.total_max)
        ));
    }

    let priorities = priority_rooms(facts.rooms, 3);
    if !priorities.is_empty() {
        lines.push(format!("Prioridades: {priorities}"));
    }

    if lines.is_empty() {
        "Análise concluída".to_string()
    } else {
        lines.join("\n")
    }
}

/// Medium-length summary: the chat summary plus one line per room.
pub fn analysis_detail_summary(facts: &AnalysisFacts) -> String {
    let chat = analysis_chat_summary(facts);
    if facts.rooms.is_empty() {
        return chat;
    }

    let mut lines = vec![chat, String::new(), "Detalhes por divisão:".to_string()];
    for room in facts.rooms {
        let issues: Vec<&str> = room
            .renovation_items
            .iter()
            .take(2)
            .map(|i| i.item.as_str())
            .collect();
        let issue_str = if issues.is_empty() {
            String::new()
        } else {
            format!(" — {}", issues.join(", "))
        };
        lines.push(format!(
            "  {}: {}, {}{issue_str}",
            room.room_label,
            room.condition.label(),
            fmt_range(Some(room.cost_min), Some(room.cost_max)),
        ));
    }
    lines.join("\n")
}

/// One-liner for `portfolio_items.index_summary`:
/// `"T2 Alfama, 180k€, reno 15-25k€"`.
pub fn portfolio_index_line(
    num_rooms: Option<i64>,
    location: Option<&str>,
    price: Option<f64>,
    reno_range: Option<(f64, f64)>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    let location_short = location
        .unwrap_or_default()
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    match (num_rooms, location_short.is_empty()) {
        (Some(n), false) => parts.push(format!("T{n} {location_short}")),
        (Some(n), true) => parts.push(format!("T{n}")),
        (None, false) => parts.push(location_short),
        (None, true) => {}
    }

    if let Some(price) = price.filter(|p| *p > 0.0) {
        parts.push(fmt_euros_short(price));
    }

    if let Some((min, max)) = reno_range {
        parts.push(format!("reno {}", fmt_range_short(min, max)));
    }

    if parts.is_empty() {
        "Imóvel sem dados".to_string()
    } else {
        parts.join(", ")
    }
}

/// Worst rooms first (condition severity, then cost), capped.
fn priority_rooms(rooms: &[RoomAnalysis], max_rooms: usize) -> String {
    if rooms.is_empty() {
        return String::new();
    }
    let mut sorted: Vec<&RoomAnalysis> = rooms.iter().collect();
    sorted.sort_by(|a, b| {
        a.condition
            .severity()
            .cmp(&b.condition.severity())
            .then(b.cost_max.total_cmp(&a.cost_max))
    });

    sorted
        .iter()
        .take(max_rooms)
        .map(|room| {
            format!(
                "{} ({}, {})",
                room.room_label,
                room.condition.label().to_lowercase(),
                fmt_range_short(room.cost_min, room.cost_max)
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Profile summaries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Short summary for one profile section's JSON data.
pub fn profile_section_summary(section: &str, data: &Value) -> String {
    let empty = data.as_object().map_or(true, |o| o.is_empty());
    if empty {
        return "Não preenchido".to_string();
    }

    match section {
        "fiscal" => {
            let mut parts = Vec::new();
            if let Some(regime) = data.get("tax_regime").and_then(Value::as_str) {
                parts.push(regime.to_string());
            }
            if let Some(first_time) = data.get("first_time_buyer").and_then(Value::as_bool) {
                parts.push(if first_time { "1ª habitação" } else { "não 1ª habitação" }.into());
            }
            join_or(parts, "Fiscal preenchido")
        }
        "budget" => {
            let min = data.get("budget_min").and_then(Value::as_f64);
            let max = data.get("budget_max").and_then(Value::as_f64);
            if min.is_some() || max.is_some() {
                format!("Orçamento: {}", fmt_range(min, max))
            } else {
                "Orçamento definido".to_string()
            }
        }
        "renovation" => {
            let mut parts = Vec::new();
            if let Some(finish) = data.get("finish_level").and_then(Value::as_str) {
                parts.push(format!("acabamento {finish}"));
            }
            if let Some(skills) = data.get("diy_skills").and_then(Value::as_array) {
                if !skills.is_empty() {
                    parts.push(format!("{} skill(s) DIY", skills.len()));
                }
            }
            join_or(parts, "Renovação preenchida")
        }
        "preferences" => {
            let mut parts = Vec::new();
            if let Some(locations) = data.get("preferred_locations").and_then(Value::as_array) {
                let names: Vec<&str> =
                    locations.iter().filter_map(Value::as_str).take(2).collect();
                if !names.is_empty() {
                    parts.push(format!("zonas: {}", names.join(", ")));
                }
            }
            let min_area = data.get("min_area").and_then(Value::as_f64);
            let max_area = data.get("max_area").and_then(Value::as_f64);
            if min_area.is_some() || max_area.is_some() {
                parts.push(format!(
                    "área: {}-{}m²",
                    min_area.map_or("?".into(), |v| format!("{v:.0}")),
                    max_area.map_or("?".into(), |v| format!("{v:.0}")),
                ));
            }
            join_or(parts, "Preferências preenchidas")
        }
        "goals" => {
            let parts: Vec<String> = ["buying_reason", "investment_horizon"]
                .iter()
                .filter_map(|k| data.get(k).and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            join_or(parts, "Objetivos preenchidos")
        }
        _ => "Preenchido".to_string(),
    }
}

/// The master `profile_summary` shown in the always-present context:
/// `"Ana | Lisboa | 2/5 secções completas"`.
pub fn master_profile_summary(
    display_name: Option<&str>,
    region: Option<&str>,
    sections_completed: &[String],
) -> String {
    let mut parts = vec![display_name.unwrap_or("Utilizador").to_string()];
    if let Some(region) = region.filter(|r| !r.is_empty()) {
        parts.push(region.to_string());
    }
    if !sections_completed.is_empty() {
        parts.push(format!("{}/5 secções completas", sections_completed.len()));
    }
    parts.join(" | ")
}

fn join_or(parts: Vec<String>, fallback: &str) -> String {
    if parts.is_empty() {
        fallback.to_string()
    } else {
        parts.join(" | ")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation narrative (LLM-backed)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// 2-3 sentence narrative of a session, stored on the conversation row and
/// surfaced next session as `session/resumo_anterior`. Degrades to a fixed
/// string when the call fails.
pub async fn conversation_summary(
    llm: &Arc<dyn LlmProvider>,
    model: &str,
    messages: &[MessageRow],
) -> String {
    let transcript: Vec<String> = messages
        .iter()
        .filter(|m| (m.role == "user" || m.role == "assistant") && !m.content.is_empty())
        .map(|m| {
            let label = if m.role == "user" { "Utilizador" } else { "Assistente" };
            let content: String = m.content.chars().take(300).collect();
            format!("{label}: {content}")
        })
        .collect();

    if transcript.is_empty() {
        return "Sessão sem mensagens relevantes.".to_string();
    }

    let prompt = format!(
        "Resume esta conversa em 2-3 frases em Português de Portugal. \
         Foca nos imóveis discutidos, decisões tomadas e próximos passos. \
         Sê conciso e objetivo.\n\nConversa:\n{}",
        transcript.join("\n")
    );

    let req = ChatRequest {
        messages: vec![Message::user(prompt)],
        max_tokens: Some(150),
        temperature: Some(0.3),
        model: Some(model.to_string()),
        ..Default::default()
    };

    match llm.chat(req).await {
        Ok(resp) if !resp.content.trim().is_empty() => resp.content.trim().to_string(),
        Ok(_) | Err(_) => {
            tracing::warn!("conversation summary generation failed");
            "Resumo indisponível.".to_string()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Euro formatting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `180000` → `"180.000€"` (Portuguese thousands separator).
pub fn fmt_euros(value: f64) -> String {
    let raw = format!("{:.0}", value.abs());
    let mut grouped = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, c) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}€")
}

/// `180000` → `"180k€"`, `1200000` → `"1.2M€"`.
pub fn fmt_euros_short(value: f64) -> String {
    let v = value as i64;
    if v >= 1_000_000 {
        format!("{:.1}M€", value / 1_000_000.0)
    } else if v >= 1_000 {
        format!("{}k€", v / 1_000)
    } else {
        format!("{v}€")
    }
}

/// `"15.000€–25.000€"`; open ranges degrade gracefully.
pub fn fmt_range(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{}–{}", fmt_euros(min), fmt_euros(max)),
        (Some(min), None) => format!("a partir de {}", fmt_euros(min)),
        (None, Some(max)) => format!("até {}", fmt_euros(max)),
        (None, None) => "valor não calculado".to_string(),
    }
}

/// `"15-25k€"`.
pub fn fmt_range_short(min: f64, max: f64) -> String {
    let min_k = (min / 1000.0) as i64;
    let max_k = (max / 1000.0) as i64;
    if min_k == max_k {
        format!("{max_k}k€")
    } else {
        format!("{min_k}-{max_k}k€")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_pipeline::{RoomCondition, RoomType};
    use serde_json::json;

    fn room(label: &str, condition: RoomCondition, min: f64, max: f64) -> RoomAnalysis {
        RoomAnalysis {
            room_type: RoomType::Kitchen,
            room_number: 1,
            room_label: label.into(),
            images: vec![],
            condition,
            condition_notes: String::new(),
            renovation_items: vec![],
            cost_min: min,
            cost_max: max,
            confidence: 0.7,
            features: None,
        }
    }

    #[test]
    fn euro_formatting() {
        assert_eq!(fmt_euros(180_000.0), "180.000€");
        assert_eq!(fmt_euros(999.0), "999€");
        assert_eq!(fmt_euros(1_234_567.0), "1.234.567€");
        assert_eq!(fmt_euros_short(180_000.0), "180k€");
        assert_eq!(fmt_euros_short(1_200_000.0), "1.2M€");
        assert_eq!(fmt_euros_short(950.0), "950€");
        assert_eq!(fmt_range(Some(15_000.0), Some(25_000.0)), "15.000€–25.000€");
        assert_eq!(fmt_range_short(15_000.0, 25_000.0), "15-25k€");
        assert_eq!(fmt_range_short(5_000.0, 5_900.0), "5k€");
    }

    #[test]
    fn chat_summary_has_the_scannable_shape() {
        let rooms = vec![
            room("Cozinha", RoomCondition::Poor, 5000.0, 8000.0),
            room("Quarto 1", RoomCondition::Good, 500.0, 1000.0),
        ];
        let facts = AnalysisFacts {
            price: Some(180_000.0),
            area_m2: Some(65.0),
            price_per_m2: Some(2769.0),
            confidence: Some(0.72),
            total_min: Some(15_200.0),
            total_max: Some(24_800.0),
            rooms: &rooms,
        };
        let summary = analysis_chat_summary(&facts);
        assert!(summary.contains("Preço: 180.000€ | Área: 65m² | €/m²: 2.769€"));
        assert!(summary.contains("Confiança: 72%"));
        assert!(summary.contains("Renovação: 15.200€–24.800€"));
        assert!(summary.contains("Prioridades: Cozinha (mau, 5-8k€)"));
    }

    #[test]
    fn priority_rooms_sort_worst_condition_then_cost() {
        let rooms = vec![
            room("Quarto 1", RoomCondition::Good, 500.0, 1000.0),
            room("Cozinha", RoomCondition::Poor, 5000.0, 8000.0),
            room("Sala", RoomCondition::Poor, 6000.0, 9000.0),
        ];
        let priorities = priority_rooms(&rooms, 2);
        // Both Poor rooms outrank Good; higher cost first among equals.
        assert!(priorities.starts_with("Sala"));
        assert!(priorities.contains("Cozinha"));
        assert!(!priorities.contains("Quarto"));
    }

    #[test]
    fn empty_facts_fall_back_to_generic_line() {
        let facts = AnalysisFacts::default();
        assert_eq!(analysis_chat_summary(&facts), "Análise concluída");
    }

    #[test]
    fn index_line_formats() {
        assert_eq!(
            portfolio_index_line(
                Some(2),
                Some("Alfama, Lisboa"),
                Some(180_000.0),
                Some((15_000.0, 25_000.0)),
            ),
            "T2 Alfama, 180k€, reno 15-25k€"
        );
        assert_eq!(portfolio_index_line(None, None, None, None), "Imóvel sem dados");
    }

    #[test]
    fn profile_section_summaries() {
        assert_eq!(profile_section_summary("fiscal", &json!({})), "Não preenchido");
        assert_eq!(
            profile_section_summary(
                "fiscal",
                &json!({ "tax_regime": "conjunto", "first_time_buyer": true })
            ),
            "conjunto | 1ª habitação"
        );
        assert_eq!(
            profile_section_summary(
                "budget",
                &json!({ "budget_min": 150000, "budget_max": 220000 })
            ),
            "Orçamento: 150.000€–220.000€"
        );
        assert_eq!(
            profile_section_summary(
                "renovation",
                &json!({ "finish_level": "standard", "diy_skills": ["walls"] })
            ),
            "acabamento standard | 1 skill(s) DIY"
        );
    }

    #[test]
    fn master_summary_counts_sections() {
        assert_eq!(
            master_profile_summary(Some("Ana"), Some("Lisboa"), &["fiscal".into(), "budget".into()]),
            "Ana | Lisboa | 2/5 secções completas"
        );
        assert_eq!(master_profile_summary(None, None, &[]), "Utilizador");
    }
}
