// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;

use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        access::{self, entity::AccessSummaryEntity},
        cleanup::budget::{deletion_budget, DeletionBudget},
        database::list_all_impl,
        email::entity::EmailIndex,
        error::MailSweepResult,
        policy::{
            entity::{CleanupActionType, CleanupPolicy},
            safety::{evaluate_gates, SafetyContext, SafetyVerdict},
        },
        staleness::{StalenessEvaluation, StalenessRecommendation, StalenessScorer, StalenessWeightsEntity},
        user::scope::UserScope,
    },
    utc_now,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyCandidate {
    pub email: EmailIndex,
    pub verdict: SafetyVerdict,
    pub staleness: StalenessEvaluation,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct SkippedEmail {
    pub email_id: String,
    pub reason: String,
}

/// Output of `evaluate_batch`: candidates cleared for action, candidates
/// deferred to confirmation, protected emails with their reasons, and a
/// truncation marker when any cap shrank the clear set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    pub policy_id: u64,
    pub clear: Vec<PolicyCandidate>,
    pub requires_confirmation: Vec<PolicyCandidate>,
    pub skipped: Vec<SkippedEmail>,
    pub truncated: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailEvaluation {
    pub matched_policy: Option<u64>,
    pub verdict: Option<SafetyVerdict>,
    /// Why higher-priority policies passed on this email
    pub reasons: Vec<String>,
}

/// Cross-email statistics the safety gates consume, computed from one scan
/// of the index.
struct BatchStatistics {
    sender_mean_sizes: HashMap<String, f64>,
    thread_recent_counts: HashMap<String, u32>,
    summaries: HashMap<String, AccessSummaryEntity>,
}

impl BatchStatistics {
    async fn collect(
        scope: &UserScope,
        all_emails: &[EmailIndex],
        recent_reply_days: i64,
        now: i64,
    ) -> MailSweepResult<Self> {
        let mut sender_totals: HashMap<String, (u64, u64)> = HashMap::new();
        let mut thread_recent_counts: HashMap<String, u32> = HashMap::new();
        let reply_window_ms = recent_reply_days * 86_400_000;

        for email in all_emails {
            let sender = email.sender.to_ascii_lowercase();
            let entry = sender_totals.entry(sender).or_insert((0, 0));
            entry.0 += email.size.unwrap_or(0);
            entry.1 += 1;

            if !email.thread_id.is_empty() {
                if let Some(date) = email.date {
                    if now - date <= reply_window_ms {
                        *thread_recent_counts
                            .entry(email.thread_id.clone())
                            .or_default() += 1;
                    }
                }
            }
        }

        let summaries = list_all_impl::<AccessSummaryEntity>(&scope.db)
            .await?
            .into_iter()
            .map(|summary| (summary.email_id.clone(), summary))
            .collect();

        Ok(Self {
            sender_mean_sizes: sender_totals
                .into_iter()
                .map(|(sender, (total, count))| (sender, total as f64 / count.max(1) as f64))
                .collect(),
            thread_recent_counts,
            summaries,
        })
    }

    fn context_for(&self, email: &EmailIndex, now: i64) -> SafetyContext {
        SafetyContext {
            access: self.summaries.get(&email.email_id).cloned(),
            sender_mean_size: self
                .sender_mean_sizes
                .get(&email.sender.to_ascii_lowercase())
                .copied(),
            thread_recent_messages: self
                .thread_recent_counts
                .get(&email.thread_id)
                .copied()
                .unwrap_or(0),
            now,
        }
    }
}

/// Evaluates one email against a policy list in priority order. The first
/// policy whose criteria match and whose gates clear wins; protected
/// matches are recorded and evaluation moves on.
pub async fn evaluate_email(
    scope: &UserScope,
    email: &EmailIndex,
    policies: &[CleanupPolicy],
) -> MailSweepResult<EmailEvaluation> {
    let now = utc_now!();
    let all_emails = EmailIndex::list_all(scope).await?;
    let weights = StalenessWeightsEntity::load(scope).await?;
    let scorer = StalenessScorer::new(weights);
    let summary = access::get_access_summary(scope, &email.email_id).await?;

    let mut evaluation = EmailEvaluation::default();
    for policy in policies {
        if !policy.enabled {
            continue;
        }
        if !policy.criteria.matches(email, summary.as_ref(), now) {
            continue;
        }
        let statistics =
            BatchStatistics::collect(scope, &all_emails, policy.safety.recent_reply_days, now)
                .await?;
        let verdict = evaluate_gates(&policy.safety, email, &statistics.context_for(email, now));
        match verdict {
            SafetyVerdict::Protected { reason } => {
                evaluation
                    .reasons
                    .push(format!("{}: {}", policy.name, reason));
            }
            cleared => {
                // Past the gates, a delete policy still needs staleness to
                // agree the email is disposable.
                let staleness = scorer.evaluate_at(email, summary.as_ref(), now);
                if policy.action.action_type == CleanupActionType::Delete
                    && staleness.recommendation == StalenessRecommendation::Keep
                {
                    evaluation
                        .reasons
                        .push(format!("{}: staleness_keep", policy.name));
                    continue;
                }
                evaluation.matched_policy = Some(policy.id);
                evaluation.verdict = Some(cleared);
                return Ok(evaluation);
            }
        }
    }
    Ok(evaluation)
}

/// Builds the candidate set for one policy run. Applies criteria, the
/// staleness requirement, gates 1–8 per email, then the batch-level caps:
/// max_emails, the rolling deletion budget (gate 9, truncating) and the
/// bulk-confirmation threshold. `restrict_ids` narrows consideration to an
/// explicit id set (the manual tools pass their search results here).
pub async fn evaluate_batch(
    scope: &UserScope,
    policy: &CleanupPolicy,
    max_emails: Option<u32>,
    restrict_ids: Option<&std::collections::HashSet<String>>,
) -> MailSweepResult<CandidateSet> {
    let now = utc_now!();
    let all_emails = EmailIndex::list_all(scope).await?;
    let statistics =
        BatchStatistics::collect(scope, &all_emails, policy.safety.recent_reply_days, now).await?;
    let weights = StalenessWeightsEntity::load(scope).await?;
    let scorer = StalenessScorer::new(weights);

    let mut set = CandidateSet {
        policy_id: policy.id,
        ..Default::default()
    };

    for email in all_emails {
        scope.cancel.check()?;
        if let Some(restrict) = restrict_ids {
            if !restrict.contains(&email.email_id) {
                continue;
            }
        }
        if policy.action.action_type == CleanupActionType::Archive && email.archived {
            continue;
        }
        let summary = statistics.summaries.get(&email.email_id);
        if !policy.criteria.matches(&email, summary, now) {
            continue;
        }

        // Gates first: a protection reason always wins over the staleness
        // filters in the reported outcome.
        let verdict = evaluate_gates(&policy.safety, &email, &statistics.context_for(&email, now));
        if let SafetyVerdict::Protected { reason } = &verdict {
            set.skipped.push(SkippedEmail {
                email_id: email.email_id,
                reason: reason.clone(),
            });
            continue;
        }

        let staleness = scorer.evaluate_at(&email, summary, now);
        if let Some(min) = policy.safety.min_staleness_score {
            if staleness.total_score < min {
                set.skipped.push(SkippedEmail {
                    email_id: email.email_id,
                    reason: "below_min_staleness".into(),
                });
                continue;
            }
        }
        if policy.action.action_type == CleanupActionType::Delete
            && staleness.recommendation == StalenessRecommendation::Keep
        {
            set.skipped.push(SkippedEmail {
                email_id: email.email_id,
                reason: "staleness_keep".into(),
            });
            continue;
        }

        match verdict {
            SafetyVerdict::Clear => set.clear.push(PolicyCandidate {
                email,
                verdict: SafetyVerdict::Clear,
                staleness,
            }),
            SafetyVerdict::RequiresConfirmation { reason } => {
                set.requires_confirmation.push(PolicyCandidate {
                    email,
                    verdict: SafetyVerdict::RequiresConfirmation { reason },
                    staleness,
                })
            }
            SafetyVerdict::Protected { .. } => {}
        }
    }

    // Most stale first so caps cut the least valuable candidates last.
    set.clear.sort_by(|a, b| {
        b.staleness
            .total_score
            .partial_cmp(&a.staleness.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if let Some(max) = max_emails {
        if set.clear.len() > max as usize {
            set.clear.truncate(max as usize);
            set.truncated = true;
        }
    }

    if policy.action.action_type == CleanupActionType::Delete {
        let budget: DeletionBudget = deletion_budget(scope, &policy.safety, Some(policy.id)).await?;
        if let Some(remaining) = budget.remaining {
            if set.clear.len() as u64 > remaining {
                let overflow = set.clear.split_off(remaining as usize);
                for mut candidate in overflow {
                    candidate.verdict = SafetyVerdict::RequiresConfirmation {
                        reason: "deletion_budget".into(),
                    };
                    set.requires_confirmation.push(candidate);
                }
                set.truncated = true;
            }
        }
    }

    if let Some(bulk) = policy.safety.bulk_threshold {
        if set.clear.len() > bulk as usize {
            let overflow = set.clear.split_off(bulk as usize);
            for mut candidate in overflow {
                candidate.verdict = SafetyVerdict::RequiresConfirmation {
                    reason: "bulk_threshold".into(),
                };
                set.requires_confirmation.push(candidate);
            }
            set.truncated = true;
        }
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use native_db::Builder;

    use super::*;
    use crate::modules::database::{batch_upsert_impl, USER_MODELS};
    use crate::modules::email::entity::EmailCategory;
    use crate::modules::policy::entity::{
        CleanupAction, CleanupActionType, CleanupMethod, SafetyConfig,
    };

    const DAY_MS: i64 = 86_400_000;

    fn test_scope() -> UserScope {
        let db = Arc::new(Builder::new().create_in_memory(&USER_MODELS).unwrap());
        UserScope::for_test("u-test", db)
    }

    fn stale_spam_email(id: &str) -> EmailIndex {
        EmailIndex {
            email_id: id.to_string(),
            sender: format!("{id}@suspicious.example"),
            subject: "You won a million".into(),
            snippet: "claim your prize".into(),
            labels: vec!["SPAM".into()],
            date: Some(utc_now!() - 400 * DAY_MS),
            size: Some(2_000),
            spam_score: Some(0.9),
            ..Default::default()
        }
    }

    fn delete_policy(safety: SafetyConfig) -> CleanupPolicy {
        CleanupPolicy {
            id: 7,
            name: "purge-spam".into(),
            enabled: true,
            priority: 50,
            action: CleanupAction {
                action_type: CleanupActionType::Delete,
                method: CleanupMethod::Gmail,
                export_format: None,
            },
            safety,
            created_at: 1,
            updated_at: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn preserve_important_blocks_deletion_with_reason() {
        let scope = test_scope();
        let mut protected = stale_spam_email("e-protected");
        protected.category = Some(EmailCategory::High);
        protected.analysis_timestamp = Some(1);
        protected.analysis_version = Some("test".into());
        batch_upsert_impl(&scope.db, vec![protected]).await.unwrap();

        let set = evaluate_batch(&scope, &delete_policy(SafetyConfig::default()), None, None)
            .await
            .unwrap();
        assert!(set.clear.is_empty());
        assert_eq!(set.skipped.len(), 1);
        assert_eq!(set.skipped[0].email_id, "e-protected");
        assert_eq!(set.skipped[0].reason, "preserve_important");
    }

    #[tokio::test]
    async fn removing_a_protection_expands_the_candidate_set() {
        let scope = test_scope();
        let mut email = stale_spam_email("e-1");
        email.category = Some(EmailCategory::High);
        email.analysis_timestamp = Some(1);
        email.analysis_version = Some("test".into());
        batch_upsert_impl(&scope.db, vec![email]).await.unwrap();

        let guarded = evaluate_batch(&scope, &delete_policy(SafetyConfig::default()), None, None)
            .await
            .unwrap();
        assert!(guarded.clear.is_empty());

        let mut relaxed = SafetyConfig::default();
        relaxed.preserve_important = false;
        let open = evaluate_batch(&scope, &delete_policy(relaxed), None, None)
            .await
            .unwrap();
        assert_eq!(open.clear.len(), 1);
    }

    #[tokio::test]
    async fn deletion_budget_truncates_and_defers_the_rest() {
        let scope = test_scope();
        batch_upsert_impl(
            &scope.db,
            vec![
                stale_spam_email("e-1"),
                stale_spam_email("e-2"),
                stale_spam_email("e-3"),
            ],
        )
        .await
        .unwrap();

        let mut safety = SafetyConfig::default();
        safety.max_deletions_per_hour = Some(1);
        let set = evaluate_batch(&scope, &delete_policy(safety), None, None)
            .await
            .unwrap();
        assert_eq!(set.clear.len(), 1);
        assert_eq!(set.requires_confirmation.len(), 2);
        assert!(set.truncated);
        assert!(set
            .requires_confirmation
            .iter()
            .all(|candidate| candidate.verdict.reason() == Some("deletion_budget")));
    }

    #[tokio::test]
    async fn restrict_ids_limits_consideration() {
        let scope = test_scope();
        batch_upsert_impl(
            &scope.db,
            vec![stale_spam_email("e-1"), stale_spam_email("e-2")],
        )
        .await
        .unwrap();

        let restrict: std::collections::HashSet<String> = ["e-2".to_string()].into_iter().collect();
        let set = evaluate_batch(
            &scope,
            &delete_policy(SafetyConfig::default()),
            None,
            Some(&restrict),
        )
        .await
        .unwrap();
        assert_eq!(set.clear.len(), 1);
        assert_eq!(set.clear[0].email.email_id, "e-2");
    }

    #[tokio::test]
    async fn max_emails_caps_the_clear_set() {
        let scope = test_scope();
        batch_upsert_impl(
            &scope.db,
            vec![
                stale_spam_email("e-1"),
                stale_spam_email("e-2"),
                stale_spam_email("e-3"),
            ],
        )
        .await
        .unwrap();

        let set = evaluate_batch(&scope, &delete_policy(SafetyConfig::default()), Some(2), None)
            .await
            .unwrap();
        assert_eq!(set.clear.len(), 2);
        assert!(set.truncated);
    }
}
