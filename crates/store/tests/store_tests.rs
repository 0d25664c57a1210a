//! Integration tests against an in-memory SQLite database.

use serde_json::json;

use rv_store::{ActionLogEntry, AnalysisPersistRequest, NewProperty, NewRoomFeatures, Store};

fn sample_property(external_id: &str) -> NewProperty {
    NewProperty {
        external_id: Some(external_id.to_string()),
        url: format!("https://example.test/p/{external_id}"),
        title: Some("Apartamento T2".into()),
        price: Some(185_000),
        area_m2: Some(75.0),
        num_rooms: Some(2),
        num_bathrooms: Some(1),
        location: Some("Lisboa, Arroios".into()),
        description: None,
        image_urls: vec!["https://img.test/1.jpg".into()],
        price_per_m2: Some(2466.0),
        raw_data: json!({}),
    }
}

#[tokio::test]
async fn profile_lifecycle() {
    let store = Store::in_memory().await.unwrap();

    assert!(store.get_profile("u1").await.unwrap().is_none());
    store.ensure_profile("u1").await.unwrap();

    let profile = store
        .upsert_profile_section(
            "u1",
            "budget",
            &json!({ "budget_min": 150000, "budget_max": 220000 }),
            "Orçamento: 150.000€–220.000€",
            &["budget".to_string()],
            "Utilizador | 1/5 secções completas",
        )
        .await
        .unwrap();

    assert_eq!(profile.budget.0["budget_max"], 220000);
    assert_eq!(
        profile.budget_summary.as_deref(),
        Some("Orçamento: 150.000€–220.000€")
    );
    assert_eq!(profile.sections_completed.0, vec!["budget".to_string()]);
}

#[tokio::test]
async fn unknown_profile_section_is_rejected() {
    let store = Store::in_memory().await.unwrap();
    let err = store
        .upsert_profile_section("u1", "nonsense", &json!({}), "", &[], "")
        .await
        .unwrap_err();
    assert!(matches!(err, rv_domain::Error::InvalidArgument(_)));
}

#[tokio::test]
async fn property_upsert_dedupes_on_external_id() {
    let store = Store::in_memory().await.unwrap();

    let first = store.upsert_property(&sample_property("123")).await.unwrap();
    let mut updated = sample_property("123");
    updated.price = Some(179_000);
    let second = store.upsert_property(&updated).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.price, Some(179_000));
    assert!(store
        .get_property_by_external_id("123")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn set_active_is_exclusive() {
    let store = Store::in_memory().await.unwrap();
    let p1 = store.upsert_property(&sample_property("1")).await.unwrap();
    let p2 = store.upsert_property(&sample_property("2")).await.unwrap();
    store
        .create_portfolio_item("u1", &p1.id, None, Some("T2 Alfama"))
        .await
        .unwrap();
    store
        .create_portfolio_item("u1", &p2.id, None, Some("T3 Graça"))
        .await
        .unwrap();

    store.set_active("u1", &p1.id).await.unwrap();
    assert_eq!(store.active_count("u1").await.unwrap(), 1);

    let item = store.set_active("u1", &p2.id).await.unwrap();
    assert!(item.is_active);
    assert_eq!(store.active_count("u1").await.unwrap(), 1);

    let p1_item = store.get_portfolio_item("u1", &p1.id).await.unwrap().unwrap();
    assert!(!p1_item.is_active);
}

#[tokio::test]
async fn set_active_missing_property_rolls_back() {
    let store = Store::in_memory().await.unwrap();
    let p1 = store.upsert_property(&sample_property("1")).await.unwrap();
    store
        .create_portfolio_item("u1", &p1.id, None, None)
        .await
        .unwrap();
    store.set_active("u1", &p1.id).await.unwrap();

    let err = store.set_active("u1", "ghost").await.unwrap_err();
    assert!(matches!(err, rv_domain::Error::NotFound(_)));
    // The unset half of the transaction must not survive the rollback.
    assert_eq!(store.active_count("u1").await.unwrap(), 1);
}

#[tokio::test]
async fn archive_clears_active_flag() {
    let store = Store::in_memory().await.unwrap();
    let p1 = store.upsert_property(&sample_property("1")).await.unwrap();
    let item = store
        .create_portfolio_item("u1", &p1.id, None, None)
        .await
        .unwrap();
    store.set_active("u1", &p1.id).await.unwrap();

    store
        .update_portfolio_item_status("u1", &item.id, "archived")
        .await
        .unwrap();
    assert_eq!(store.active_count("u1").await.unwrap(), 0);

    // Archived items no longer hydrate.
    let ctx = store.hydrate("u1").await.unwrap();
    assert!(ctx.portfolio.is_empty());
}

#[tokio::test]
async fn persist_analysis_commits_all_four_tables() {
    let store = Store::in_memory().await.unwrap();
    let req = AnalysisPersistRequest {
        user_id: "u1".into(),
        property: sample_property("9"),
        result_data: json!({ "total_cost_min": 15000, "total_cost_max": 25000 }),
        chat_summary: "Renovação: 15.000€–25.000€".into(),
        detail_summary: None,
        index_summary: "T2 Arroios, 185k€, reno 15-25k€".into(),
        room_features: vec![NewRoomFeatures {
            room_type: "cozinha".into(),
            room_number: 1,
            room_label: "Cozinha".into(),
            features: json!({ "walls": { "condition_score": 2 } }),
            images: vec!["https://img.test/1.jpg".into()],
        }],
    };

    let persisted = store.persist_analysis(&req).await.unwrap();

    let item = store
        .get_portfolio_item("u1", &persisted.property_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.status, "analyzed");
    assert_eq!(item.index_summary.as_deref(), Some("T2 Arroios, 185k€, reno 15-25k€"));

    let analysis = store
        .get_latest_analysis("u1", &persisted.property_id, "renovation")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(analysis.chat_summary.as_deref(), Some("Renovação: 15.000€–25.000€"));

    let features = store.get_room_features(&persisted.property_id).await.unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].room_label, "Cozinha");
}

#[tokio::test]
async fn hydrate_returns_profile_portfolio_and_last_summary() {
    let store = Store::in_memory().await.unwrap();
    store.ensure_profile("u1").await.unwrap();
    let p1 = store.upsert_property(&sample_property("1")).await.unwrap();
    store
        .create_portfolio_item("u1", &p1.id, Some("alfama"), Some("T2 Alfama"))
        .await
        .unwrap();

    let conv = store.create_conversation("u1").await.unwrap();
    store
        .end_conversation(&conv.id, "Discutimos o T2 de Alfama.")
        .await
        .unwrap();

    let ctx = store.hydrate("u1").await.unwrap();
    assert!(ctx.profile.is_some());
    assert_eq!(ctx.portfolio.len(), 1);
    assert_eq!(
        ctx.last_session_summary.as_deref(),
        Some("Discutimos o T2 de Alfama.")
    );
}

#[tokio::test]
async fn hydrate_is_scoped_to_the_user() {
    let store = Store::in_memory().await.unwrap();
    let p1 = store.upsert_property(&sample_property("1")).await.unwrap();
    store
        .create_portfolio_item("other-user", &p1.id, None, None)
        .await
        .unwrap();

    let ctx = store.hydrate("u1").await.unwrap();
    assert!(ctx.portfolio.is_empty());
}

#[tokio::test]
async fn messages_and_count() {
    let store = Store::in_memory().await.unwrap();
    let conv = store.create_conversation("u1").await.unwrap();

    store
        .append_message(&conv.id, "user", "Olá", None, None)
        .await
        .unwrap();
    store
        .append_message(&conv.id, "assistant", "Olá! Como posso ajudar?", None, None)
        .await
        .unwrap();

    let messages = store.conversation_messages(&conv.id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "user");
    assert_eq!(messages[1].role, "assistant");

    assert_eq!(store.increment_message_count(&conv.id).await.unwrap(), 1);
    assert_eq!(store.increment_message_count(&conv.id).await.unwrap(), 2);
}

#[tokio::test]
async fn action_log_round_trip() {
    let store = Store::in_memory().await.unwrap();
    let entry = ActionLogEntry {
        user_id: "u1".into(),
        action_type: "profile_update".into(),
        entity_type: "user_profile".into(),
        field_changed: Some("budget".into()),
        old_value: Some(json!({})),
        new_value: Some(json!({ "budget_max": 200000 })),
        ..Default::default()
    };
    store.log_action(&entry).await.unwrap();
    assert_eq!(store.action_count("u1").await.unwrap(), 1);
}
