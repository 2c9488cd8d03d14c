// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::LazyLock;

use dashmap::DashMap;
use tracing::warn;

use crate::{
    id,
    modules::{
        access::entity::{AccessEventEntity, AccessEventEntityKey, AccessSummaryEntity, AccessType},
        database::{
            async_find_impl, filter_by_secondary_key_impl, insert_impl, manager::DB_MANAGER,
            upsert_impl,
        },
        error::MailSweepResult,
        user::scope::UserScope,
    },
    utc_now,
};

pub mod entity;

/// Summaries are recomputed in bounded batches; one failing id does not
/// abort the rest of the batch.
pub const SUMMARY_BATCH_SIZE: usize = 50;

const HALF_LIFE_DAYS: f64 = 30.0;
const FREQUENCY_SATURATION: f64 = 20.0;
const MS_PER_DAY: f64 = 86_400_000.0;

static PENDING_SUMMARIES: LazyLock<DashMap<String, Vec<String>>> = LazyLock::new(DashMap::new);

#[derive(Clone, Debug)]
pub struct AccessEvent {
    pub email_id: String,
    pub access_type: AccessType,
    pub timestamp: Option<i64>,
    pub search_query: Option<String>,
    pub user_context: Option<String>,
}

/// Appends one access event and schedules a summary recompute for the
/// touched message. Recomputes are batched per user and flushed either when
/// the batch fills or by the periodic flusher.
pub async fn log_access(scope: &UserScope, event: AccessEvent) -> MailSweepResult<()> {
    let entity = AccessEventEntity {
        id: id!(64),
        email_id: event.email_id.clone(),
        access_type: event.access_type,
        timestamp: event.timestamp.unwrap_or_else(|| utc_now!()),
        search_query: event.search_query,
        user_context: event.user_context,
    };
    insert_impl(&scope.db, entity).await?;

    let should_flush = {
        let mut pending = PENDING_SUMMARIES
            .entry(scope.user_id.clone())
            .or_default();
        if !pending.contains(&event.email_id) {
            pending.push(event.email_id);
        }
        pending.len() >= SUMMARY_BATCH_SIZE
    };
    if should_flush {
        flush_user_summaries(&scope.user_id).await;
    }
    Ok(())
}

/// Recomputes summaries for every pending id of one user. Called from
/// `log_access` when a batch fills and from the periodic flush task.
pub async fn flush_user_summaries(user_id: &str) {
    let Some((_, email_ids)) = PENDING_SUMMARIES.remove(user_id) else {
        return;
    };
    let scope = match DB_MANAGER.user_db(user_id).await {
        Ok(db) => UserScope {
            user_id: user_id.to_string(),
            db,
            cancel: Default::default(),
        },
        Err(e) => {
            warn!("Skipping access summary flush for '{user_id}': {e:?}");
            return;
        }
    };
    for email_id in email_ids {
        if let Err(e) = recompute_summary(&scope, &email_id).await {
            warn!(
                "Failed to recompute access summary for '{}': {:?}",
                email_id, e
            );
        }
    }
}

pub fn pending_users() -> Vec<String> {
    PENDING_SUMMARIES
        .iter()
        .map(|entry| entry.key().clone())
        .collect()
}

pub async fn recompute_summary(
    scope: &UserScope,
    email_id: &str,
) -> MailSweepResult<AccessSummaryEntity> {
    let events = filter_by_secondary_key_impl::<AccessEventEntity>(
        &scope.db,
        AccessEventEntityKey::email_id,
        email_id.to_string(),
    )
    .await?;

    let total_accesses = events.len() as u64;
    let last_accessed = events.iter().map(|e| e.timestamp).max();
    let search_appearances = events
        .iter()
        .filter(|e| e.access_type == AccessType::SearchResult)
        .count() as u64;
    let search_interactions = events
        .iter()
        .filter(|e| {
            e.access_type == AccessType::DirectView && e.search_query.is_some()
                || e.access_type == AccessType::ThreadView && e.search_query.is_some()
        })
        .count() as u64;

    let summary = AccessSummaryEntity {
        email_id: email_id.to_string(),
        total_accesses,
        last_accessed,
        search_appearances,
        search_interactions,
        access_score: access_score(
            total_accesses,
            last_accessed,
            search_appearances,
            search_interactions,
            utc_now!(),
        ),
        updated_at: utc_now!(),
    };
    upsert_impl(&scope.db, summary.clone()).await?;
    Ok(summary)
}

pub async fn get_access_summary(
    scope: &UserScope,
    email_id: &str,
) -> MailSweepResult<Option<AccessSummaryEntity>> {
    async_find_impl::<AccessSummaryEntity>(&scope.db, email_id.to_string()).await
}

/// Normalized access score in [0,1]: recency decays with a ~30 day
/// half-life, frequency saturates around 20 accesses, and opening messages
/// out of search results earns an interaction bonus.
pub fn access_score(
    total_accesses: u64,
    last_accessed: Option<i64>,
    search_appearances: u64,
    search_interactions: u64,
    now: i64,
) -> f64 {
    if total_accesses == 0 {
        return 0.0;
    }
    let recency = match last_accessed {
        Some(ts) => {
            let days = ((now - ts).max(0)) as f64 / MS_PER_DAY;
            0.5_f64.powf(days / HALF_LIFE_DAYS)
        }
        None => 0.0,
    };
    let frequency = (total_accesses as f64 / FREQUENCY_SATURATION).min(1.0);
    let interaction_ratio = if search_appearances > 0 {
        (search_interactions as f64 / search_appearances as f64).min(1.0)
    } else {
        0.0
    };

    (0.5 * recency + 0.35 * frequency + 0.15 * interaction_ratio).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 86_400_000;

    #[test]
    fn no_accesses_scores_zero() {
        assert_eq!(access_score(0, None, 0, 0, 0), 0.0);
    }

    #[test]
    fn fresh_frequent_access_scores_high() {
        let now = 100 * DAY_MS;
        let score = access_score(25, Some(now), 10, 8, now);
        assert!(score > 0.8, "score was {score}");
    }

    #[test]
    fn recency_halves_every_thirty_days() {
        let now = 400 * DAY_MS;
        let fresh = access_score(1, Some(now), 0, 0, now);
        let stale = access_score(1, Some(now - 30 * DAY_MS), 0, 0, now);
        // Only the recency term differs; it carries weight 0.5.
        let delta = fresh - stale;
        assert!((delta - 0.125).abs() < 1e-9, "delta was {delta}");
    }

    #[test]
    fn score_is_clamped_to_unit_interval() {
        let now = DAY_MS;
        let score = access_score(1000, Some(now), 1, 1, now);
        assert!((0.0..=1.0).contains(&score));
    }
}
