// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use poem_openapi::Object;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    modules::{
        analyzer::{
            config::AutomationConfigEntity,
            date_size::DateSizeAnalyzer,
            importance::ImportanceAnalyzer,
            label::LabelClassifier,
            EmailAnalysisContext,
        },
        cache::ANALYSIS_CACHE,
        categorize::insights::{
            AgeDistribution, AnalyzerInsights, CategoryCounts, EnhancedCategorizationResult,
            RuleHit, SizeDistribution,
        },
        common::parallel::run_with_limit,
        database::scan_primary_filter_impl,
        email::entity::{
            AgeCategory, EmailCategory, EmailIndex, GmailCategory, ImportanceLevel, SizeCategory,
        },
        error::MailSweepResult,
        user::scope::{cleanup_lock, UserScope},
        utils,
    },
    utc_now,
};

pub mod insights;
pub mod task;

/// Stamped into `analysis_version` of every row this orchestrator writes.
pub const ANALYSIS_VERSION: &str = "3.0.0";

const CACHE_NAMESPACE: &str = "analysis";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct CategorizeRequest {
    /// Re-analyze rows that already carry a category
    pub force_refresh: bool,
    /// Restrict the run to one mailbox year
    pub year: Option<i32>,
}

/// Per-email analysis output, cache-friendly.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct AnalysisSnapshot {
    importance_score: f64,
    importance_level: ImportanceLevel,
    importance_matched_rules: Vec<String>,
    importance_confidence: f64,
    age_category: AgeCategory,
    size_category: SizeCategory,
    recency_score: f64,
    size_penalty: f64,
    gmail_category: GmailCategory,
    spam_score: f64,
    promotional_score: f64,
    social_score: f64,
    spam_indicators: Vec<String>,
    promotional_indicators: Vec<String>,
    social_indicators: Vec<String>,
}

enum AnalysisOutcome {
    Analyzed(Box<EmailIndex>),
    Failed { email_id: String, reason: String },
}

/// Coordinates the three analyzers over a candidate set, fuses their
/// results into the final category and persists everything back to the
/// per-user store.
pub struct CategorizationPipeline {
    config: Arc<AutomationConfigEntity>,
}

impl CategorizationPipeline {
    pub fn new(config: AutomationConfigEntity) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn for_user(scope: &UserScope) -> MailSweepResult<Self> {
        Ok(Self::new(AutomationConfigEntity::load(scope).await?))
    }

    pub async fn categorize(
        &self,
        scope: &UserScope,
        request: CategorizeRequest,
        progress: Option<&(dyn Fn(u8) + Send + Sync)>,
    ) -> MailSweepResult<EnhancedCategorizationResult> {
        let candidates = self.select_candidates(scope, &request).await?;
        if candidates.is_empty() {
            return Ok(EnhancedCategorizationResult::default());
        }

        let total = candidates.len();
        let mut analyzed: Vec<EmailIndex> = Vec::with_capacity(total);
        let mut errors = 0u64;
        let mut done = 0usize;

        for chunk in candidates.chunks(self.config.categorization.batch_size.max(1) as usize) {
            scope.cancel.check()?;
            let outcomes = self.analyze_batch(scope, chunk.to_vec()).await?;
            for outcome in outcomes {
                match outcome {
                    AnalysisOutcome::Analyzed(row) => analyzed.push(*row),
                    AnalysisOutcome::Failed { email_id, reason } => {
                        warn!("Skipping email '{email_id}': {reason}");
                        errors += 1;
                    }
                }
            }
            done += chunk.len();
            if let Some(report) = progress {
                report(((done * 100) / total).min(100) as u8);
            }
        }

        errors += self.persist(scope, &mut analyzed).await?;
        let insights = self.build_insights(&analyzed);
        let mut categories = CategoryCounts::default();
        for email in &analyzed {
            match email.category {
                Some(EmailCategory::High) => categories.high += 1,
                Some(EmailCategory::Medium) => categories.medium += 1,
                Some(EmailCategory::Low) => categories.low += 1,
                None => {}
            }
        }

        Ok(EnhancedCategorizationResult {
            processed: analyzed.len() as u64,
            errors,
            categories,
            emails: analyzed,
            analyzer_insights: insights,
        })
    }

    async fn select_candidates(
        &self,
        scope: &UserScope,
        request: &CategorizeRequest,
    ) -> MailSweepResult<Vec<EmailIndex>> {
        let force_refresh = request.force_refresh;
        let year = request.year;
        scan_primary_filter_impl::<EmailIndex>(&scope.db, move |email| {
            if !force_refresh && email.category.is_some() {
                return false;
            }
            if let Some(year) = year {
                if email.year != Some(year) {
                    return false;
                }
            }
            true
        })
        .await
    }

    async fn analyze_batch(
        &self,
        scope: &UserScope,
        batch: Vec<EmailIndex>,
    ) -> MailSweepResult<Vec<AnalysisOutcome>> {
        let config = self.config.clone();
        let user_id = scope.user_id.clone();
        let timeout = Duration::from_millis(config.categorization.timeout_ms);

        if config.categorization.enable_parallel_processing {
            let concurrency = config.categorization.max_parallelism.max(1) as usize;
            run_with_limit(concurrency, batch, move |email| {
                let config = config.clone();
                let user_id = user_id.clone();
                async move { Ok(analyze_one(&config, &user_id, email, timeout).await) }
            })
            .await
        } else {
            let mut outcomes = Vec::with_capacity(batch.len());
            for email in batch {
                outcomes.push(analyze_one(&config, &user_id, email, timeout).await);
            }
            Ok(outcomes)
        }
    }

    /// Bulk persist, falling back to row-at-a-time when the batch write
    /// fails so one poisoned row only costs itself. Analyzer writes take
    /// the read half of the user cleanup lock.
    async fn persist(
        &self,
        scope: &UserScope,
        analyzed: &mut Vec<EmailIndex>,
    ) -> MailSweepResult<u64> {
        if analyzed.is_empty() {
            return Ok(0);
        }
        let lock = cleanup_lock(&scope.user_id);
        let _guard = lock.read().await;

        if EmailIndex::bulk_upsert(scope, analyzed.clone()).await.is_ok() {
            return Ok(0);
        }

        let mut errors = 0u64;
        let mut persisted = Vec::with_capacity(analyzed.len());
        for row in analyzed.drain(..) {
            match EmailIndex::upsert(scope, row.clone()).await {
                Ok(()) => persisted.push(row),
                Err(e) => {
                    warn!("Failed to persist analysis for '{}': {:?}", row.email_id, e);
                    errors += 1;
                }
            }
        }
        *analyzed = persisted;
        Ok(errors)
    }

    fn build_insights(&self, analyzed: &[EmailIndex]) -> AnalyzerInsights {
        let mut insights = AnalyzerInsights::default();
        if analyzed.is_empty() {
            return insights;
        }

        let mut rule_hits: HashMap<String, u64> = HashMap::new();
        let mut confidence_sum = 0.0;
        let mut spam_hits = 0u64;
        for email in analyzed {
            for rule in &email.importance_matched_rules {
                *rule_hits.entry(rule.clone()).or_default() += 1;
            }
            confidence_sum += email.importance_confidence.unwrap_or(0.0);
            if email.spam_score.unwrap_or(0.0) >= self.config.fusion.spam_threshold {
                spam_hits += 1;
            }
            match email.age_category {
                Some(AgeCategory::Recent) => insights.age_distribution.recent += 1,
                Some(AgeCategory::Moderate) | None => insights.age_distribution.moderate += 1,
                Some(AgeCategory::Old) => insights.age_distribution.old += 1,
            }
            match email.size_category {
                Some(SizeCategory::Small) | None => insights.size_distribution.small += 1,
                Some(SizeCategory::Medium) => insights.size_distribution.medium += 1,
                Some(SizeCategory::Large) => insights.size_distribution.large += 1,
            }
        }

        let mut top: Vec<RuleHit> = rule_hits
            .into_iter()
            .map(|(name, count)| RuleHit { name, count })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then(a.name.cmp(&b.name)));
        top.truncate(5);

        insights.top_importance_rules = top;
        insights.spam_detection_rate = spam_hits as f64 / analyzed.len() as f64;
        insights.avg_confidence = confidence_sum / analyzed.len() as f64;
        insights
    }
}

/// Cache key for one email's analysis: changes whenever the envelope
/// fields an analyzer can see change, or the orchestrator version moves.
fn analysis_fingerprint(email: &EmailIndex) -> String {
    let composed = format!(
        "{}|{:?}|{:?}|{}|{}|{}",
        email.email_id,
        email.date,
        email.size,
        email.labels.join(","),
        email.snippet.len(),
        ANALYSIS_VERSION
    );
    format!("{:x}", utils::hash(&composed))
}

async fn analyze_one(
    config: &AutomationConfigEntity,
    user_id: &str,
    email: EmailIndex,
    timeout: Duration,
) -> AnalysisOutcome {
    let email_id = email.email_id.clone();
    let fingerprint = analysis_fingerprint(&email);

    if config.cache.enabled {
        if let Some(snapshot) =
            ANALYSIS_CACHE.get::<AnalysisSnapshot>(user_id, CACHE_NAMESPACE, &fingerprint)
        {
            debug!("Analysis cache hit for '{email_id}'");
            return AnalysisOutcome::Analyzed(Box::new(apply_snapshot(
                email,
                snapshot,
                &config.fusion,
            )));
        }
    }

    let run_analysis = || {
        let config = config.clone();
        let email = email.clone();
        async move {
            let context = EmailAnalysisContext::new(email);
            let importance = ImportanceAnalyzer::new(config.importance.clone()).analyze(&context);
            let date_size = DateSizeAnalyzer::new(config.date_size.clone()).analyze(&context);
            let labels = LabelClassifier::new(config.labels.clone()).analyze(&context);
            AnalysisSnapshot {
                importance_score: importance.score,
                importance_level: importance.level,
                importance_matched_rules: importance.matched_rules,
                importance_confidence: importance.confidence,
                age_category: date_size.age_category,
                size_category: date_size.size_category,
                recency_score: date_size.recency_score,
                size_penalty: date_size.size_penalty,
                gmail_category: labels.gmail_category,
                spam_score: labels.spam_score,
                promotional_score: labels.promotional_score,
                social_score: labels.social_score,
                spam_indicators: labels.spam_indicators,
                promotional_indicators: labels.promotional_indicators,
                social_indicators: labels.social_indicators,
            }
        }
    };

    // A stalled analysis is retried up to the configured attempts before
    // the email is skipped and counted as an error.
    let attempts = config.categorization.retry_attempts + 1;
    for attempt in 0..attempts {
        match tokio::time::timeout(timeout, run_analysis()).await {
            Ok(snapshot) => {
                if config.cache.enabled {
                    ANALYSIS_CACHE.set(
                        user_id,
                        CACHE_NAMESPACE,
                        &fingerprint,
                        &snapshot,
                        config.cache.ttl_seconds,
                    );
                }
                return AnalysisOutcome::Analyzed(Box::new(apply_snapshot(
                    email,
                    snapshot,
                    &config.fusion,
                )));
            }
            Err(_) if attempt + 1 < attempts => continue,
            Err(_) => break,
        }
    }
    AnalysisOutcome::Failed {
        email_id,
        reason: format!("analysis timed out after {:?}", timeout),
    }
}

fn apply_snapshot(
    mut email: EmailIndex,
    snapshot: AnalysisSnapshot,
    fusion: &crate::modules::analyzer::config::FusionThresholds,
) -> EmailIndex {
    email.importance_score = Some(snapshot.importance_score);
    email.importance_level = Some(snapshot.importance_level);
    email.importance_matched_rules = snapshot.importance_matched_rules;
    email.importance_confidence = Some(snapshot.importance_confidence);
    email.age_category = Some(snapshot.age_category);
    email.size_category = Some(snapshot.size_category);
    email.recency_score = Some(snapshot.recency_score);
    email.size_penalty = Some(snapshot.size_penalty);
    email.gmail_category = Some(snapshot.gmail_category);
    email.spam_score = Some(snapshot.spam_score);
    email.promotional_score = Some(snapshot.promotional_score);
    email.social_score = Some(snapshot.social_score);
    email.spam_indicators = snapshot.spam_indicators;
    email.promotional_indicators = snapshot.promotional_indicators;
    email.social_indicators = snapshot.social_indicators;

    email.category = Some(fuse_category(
        snapshot.importance_level,
        snapshot.gmail_category,
        snapshot.spam_score,
        snapshot.promotional_score,
        snapshot.size_penalty,
        fusion,
    ));
    email.analysis_timestamp = Some(utc_now!());
    email.analysis_version = Some(ANALYSIS_VERSION.to_string());
    email
}

/// Fusion order: importance dominates; spam/promotional signals demote only
/// when importance does not already pull the email high.
pub fn fuse_category(
    importance: ImportanceLevel,
    gmail_category: GmailCategory,
    spam_score: f64,
    promotional_score: f64,
    size_penalty: f64,
    thresholds: &crate::modules::analyzer::config::FusionThresholds,
) -> EmailCategory {
    if importance == ImportanceLevel::High || gmail_category == GmailCategory::Important {
        return EmailCategory::High;
    }
    if importance == ImportanceLevel::Low
        && (spam_score >= thresholds.spam_threshold
            || promotional_score >= thresholds.promotional_threshold
            || size_penalty >= 0.9)
    {
        return EmailCategory::Low;
    }
    EmailCategory::Medium
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::analyzer::config::FusionThresholds;

    #[test]
    fn importance_high_wins_over_spam_signals() {
        let category = fuse_category(
            ImportanceLevel::High,
            GmailCategory::Spam,
            1.0,
            1.0,
            1.0,
            &FusionThresholds::default(),
        );
        assert_eq!(category, EmailCategory::High);
    }

    #[test]
    fn gmail_important_also_escalates() {
        let category = fuse_category(
            ImportanceLevel::Medium,
            GmailCategory::Important,
            0.0,
            0.0,
            0.0,
            &FusionThresholds::default(),
        );
        assert_eq!(category, EmailCategory::High);
    }

    #[test]
    fn spam_demotes_only_low_importance() {
        let thresholds = FusionThresholds::default();
        assert_eq!(
            fuse_category(
                ImportanceLevel::Low,
                GmailCategory::Spam,
                0.9,
                0.0,
                0.0,
                &thresholds
            ),
            EmailCategory::Low
        );
        assert_eq!(
            fuse_category(
                ImportanceLevel::Medium,
                GmailCategory::Spam,
                0.9,
                0.0,
                0.0,
                &thresholds
            ),
            EmailCategory::Medium
        );
    }

    #[test]
    fn heavy_size_penalty_demotes_low_importance() {
        assert_eq!(
            fuse_category(
                ImportanceLevel::Low,
                GmailCategory::Primary,
                0.0,
                0.0,
                0.95,
                &FusionThresholds::default()
            ),
            EmailCategory::Low
        );
    }

    #[test]
    fn everything_else_is_medium() {
        assert_eq!(
            fuse_category(
                ImportanceLevel::Low,
                GmailCategory::Primary,
                0.1,
                0.1,
                0.0,
                &FusionThresholds::default()
            ),
            EmailCategory::Medium
        );
    }
}
