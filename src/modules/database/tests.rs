use std::sync::Arc;

use native_db::Builder;

use crate::modules::database::{
    batch_upsert_impl, count_primary_filter_impl, list_all_impl, scan_primary_filter_impl,
    USER_MODELS,
};
use crate::modules::email::entity::{
    AgeCategory, EmailCategory, EmailIndex, GmailCategory, ImportanceLevel, SizeCategory,
};

fn in_memory_db() -> Arc<native_db::Database<'static>> {
    Arc::new(Builder::new().create_in_memory(&USER_MODELS).unwrap())
}

fn analyzed_email(id: &str) -> EmailIndex {
    EmailIndex {
        email_id: id.to_string(),
        thread_id: "t1".into(),
        subject: "Quarterly review".into(),
        sender: "alice@example.com".into(),
        recipients: vec!["bob@example.com".into()],
        date: Some(1_700_000_000_000),
        year: Some(2023),
        size: Some(123_456),
        has_attachments: true,
        labels: vec!["INBOX".into(), "IMPORTANT".into()],
        snippet: "please review the attached".into(),
        importance_score: Some(12.5),
        importance_level: Some(ImportanceLevel::High),
        importance_matched_rules: vec!["Urgent Keywords".into()],
        importance_confidence: Some(0.75),
        age_category: Some(AgeCategory::Old),
        size_category: Some(SizeCategory::Medium),
        recency_score: Some(0.0),
        size_penalty: Some(0.01),
        gmail_category: Some(GmailCategory::Important),
        spam_score: Some(0.0),
        promotional_score: Some(0.1),
        social_score: Some(0.0),
        spam_indicators: vec![],
        promotional_indicators: vec!["snippet:unsubscribe".into()],
        social_indicators: vec![],
        analysis_timestamp: Some(1_700_000_100_000),
        analysis_version: Some("3.0.0".into()),
        category: Some(EmailCategory::High),
        ..Default::default()
    }
}

#[tokio::test]
async fn bulk_upsert_is_idempotent() {
    let db = in_memory_db();
    let rows = vec![analyzed_email("e1"), analyzed_email("e2")];

    batch_upsert_impl(&db, rows.clone()).await.unwrap();
    batch_upsert_impl(&db, rows).await.unwrap();

    let all: Vec<EmailIndex> = list_all_impl(&db).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn analyzer_fields_round_trip() {
    let db = in_memory_db();
    let original = analyzed_email("e1");
    batch_upsert_impl(&db, vec![original.clone()]).await.unwrap();

    let reloaded: Vec<EmailIndex> = list_all_impl(&db).await.unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0], original);
}

#[tokio::test]
async fn scan_filters_run_inside_the_transaction() {
    let db = in_memory_db();
    let mut low = analyzed_email("e-low");
    low.category = Some(EmailCategory::Low);
    batch_upsert_impl(&db, vec![analyzed_email("e-high"), low])
        .await
        .unwrap();

    let highs = scan_primary_filter_impl::<EmailIndex>(&db, |email| {
        email.category == Some(EmailCategory::High)
    })
    .await
    .unwrap();
    assert_eq!(highs.len(), 1);
    assert_eq!(highs[0].email_id, "e-high");

    let count = count_primary_filter_impl::<EmailIndex>(&db, |email| email.has_attachments)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn separate_user_databases_are_isolated() {
    let user_a = in_memory_db();
    let user_b = in_memory_db();

    batch_upsert_impl(&user_a, vec![analyzed_email("e-a-1")])
        .await
        .unwrap();

    let b_rows: Vec<EmailIndex> = list_all_impl(&user_b).await.unwrap();
    assert!(b_rows.is_empty());
    let a_rows: Vec<EmailIndex> = list_all_impl(&user_a).await.unwrap();
    assert_eq!(a_rows.len(), 1);
}
