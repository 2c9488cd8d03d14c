use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        access::entity::AccessSummaryEntity,
        database::list_all_impl,
        email::entity::{EmailCategory, EmailIndex},
        error::MailSweepResult,
        user::scope::UserScope,
    },
    utc_now,
};

const DAY_MS: i64 = 86_400_000;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct CleanupRecommendation {
    pub title: String,
    pub description: String,
    pub estimated_emails: u64,
    pub estimated_bytes: u64,
}

/// Heuristic suggestions derived from the index: pockets of mail a cleanup
/// policy would reclaim the most from.
pub async fn get_cleanup_recommendations(
    scope: &UserScope,
) -> MailSweepResult<Vec<CleanupRecommendation>> {
    let emails = EmailIndex::list_all(scope).await?;
    let summaries: std::collections::HashMap<String, AccessSummaryEntity> =
        list_all_impl::<AccessSummaryEntity>(&scope.db)
            .await?
            .into_iter()
            .map(|summary| (summary.email_id.clone(), summary))
            .collect();
    let now = utc_now!();

    let mut recommendations = Vec::new();

    let bucket = |predicate: &dyn Fn(&EmailIndex) -> bool| -> (u64, u64) {
        let mut count = 0u64;
        let mut bytes = 0u64;
        for email in &emails {
            if !email.archived && predicate(email) {
                count += 1;
                bytes += email.size.unwrap_or(0);
            }
        }
        (count, bytes)
    };

    let (count, bytes) = bucket(&|email| {
        email.promotional_score.unwrap_or(0.0) >= 0.5
            && email
                .date
                .map(|date| now - date > 180 * DAY_MS)
                .unwrap_or(false)
    });
    if count > 0 {
        recommendations.push(CleanupRecommendation {
            title: "Stale promotional mail".into(),
            description: "Promotional emails older than six months; an archive policy with promotional_score_min=0.5 and age_days_min=180 would match these".into(),
            estimated_emails: count,
            estimated_bytes: bytes,
        });
    }

    let (count, bytes) = bucket(&|email| email.spam_score.unwrap_or(0.0) >= 0.7);
    if count > 0 {
        recommendations.push(CleanupRecommendation {
            title: "Likely spam".into(),
            description: "Emails with a spam score of 0.7 or higher; a delete policy with spam_score_min=0.7 would match these".into(),
            estimated_emails: count,
            estimated_bytes: bytes,
        });
    }

    let (count, bytes) = bucket(&|email| {
        email.size.unwrap_or(0) > 5 * 1024 * 1024
            && email
                .date
                .map(|date| now - date > 365 * DAY_MS)
                .unwrap_or(false)
    });
    if count > 0 {
        recommendations.push(CleanupRecommendation {
            title: "Large year-old attachments".into(),
            description: "Emails over 5MB that are more than a year old; archiving them with an export policy frees the most storage per message".into(),
            estimated_emails: count,
            estimated_bytes: bytes,
        });
    }

    let (count, bytes) = bucket(&|email| {
        email.category == Some(EmailCategory::Low)
            && summaries
                .get(&email.email_id)
                .map(|summary| summary.access_score <= 0.05)
                .unwrap_or(true)
            && email
                .date
                .map(|date| now - date > 365 * DAY_MS)
                .unwrap_or(false)
    });
    if count > 0 {
        recommendations.push(CleanupRecommendation {
            title: "Untouched low-value mail".into(),
            description: "Low-category emails older than a year that have never been accessed; safe candidates for a delete policy with access_score_max=0.05".into(),
            estimated_emails: count,
            estimated_bytes: bytes,
        });
    }

    recommendations.sort_by(|a, b| b.estimated_bytes.cmp(&a.estimated_bytes));
    Ok(recommendations)
}
