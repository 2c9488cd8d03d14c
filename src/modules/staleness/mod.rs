// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        access::entity::AccessSummaryEntity,
        analyzer::date_size::size_penalty,
        database::{async_find_impl, upsert_impl},
        email::entity::{EmailIndex, ImportanceLevel},
        error::{code::ErrorCode, MailSweepResult},
        user::scope::UserScope,
    },
    raise_error, utc_now,
};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Emails younger than this never get a delete/archive recommendation.
const RECENT_KEEP_DAYS: i64 = 7;
const KEEP_THRESHOLD: f64 = 0.4;
const DELETE_THRESHOLD: f64 = 0.8;

/// When no access summary exists the access factor defaults to this rather
/// than a full 1.0; absence of data is not proof of abandonment.
const MISSING_ACCESS_FACTOR: f64 = 0.8;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum StalenessRecommendation {
    Keep,
    Archive,
    Delete,
}

/// The per-factor weights are the only public tuning knob of the scorer;
/// they must sum to 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct StalenessWeights {
    pub age: f64,
    pub importance: f64,
    pub size: f64,
    pub spam: f64,
    pub access: f64,
}

impl Default for StalenessWeights {
    fn default() -> Self {
        Self {
            age: 0.25,
            importance: 0.25,
            size: 0.15,
            spam: 0.15,
            access: 0.20,
        }
    }
}

impl StalenessWeights {
    pub fn validate(&self) -> MailSweepResult<()> {
        let values = [self.age, self.importance, self.size, self.spam, self.access];
        if values.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(raise_error!(
                "Staleness weights must each be within [0,1]".into(),
                ErrorCode::InvalidParameter
            ));
        }
        let sum: f64 = values.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(raise_error!(
                format!("Staleness weights must sum to 1.0 (got {sum})"),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 19, version = 1)]
#[native_db]
pub struct StalenessWeightsEntity {
    #[primary_key]
    pub key: String,
    pub weights: StalenessWeights,
    pub updated_at: i64,
}

const WEIGHTS_KEY: &str = "weights";

impl StalenessWeightsEntity {
    pub async fn load(scope: &UserScope) -> MailSweepResult<StalenessWeights> {
        Ok(
            async_find_impl::<StalenessWeightsEntity>(&scope.db, WEIGHTS_KEY.to_string())
                .await?
                .map(|entity| entity.weights)
                .unwrap_or_default(),
        )
    }

    /// Rejects any update whose weights do not sum to 1.
    pub async fn store(scope: &UserScope, weights: StalenessWeights) -> MailSweepResult<()> {
        weights.validate()?;
        upsert_impl(
            &scope.db,
            StalenessWeightsEntity {
                key: WEIGHTS_KEY.into(),
                weights,
                updated_at: utc_now!(),
            },
        )
        .await
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct StalenessFactors {
    pub age_score: f64,
    pub importance_score: f64,
    pub size_penalty: f64,
    pub spam_score: f64,
    pub access_score: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct StalenessEvaluation {
    pub total_score: f64,
    pub factors: StalenessFactors,
    pub recommendation: StalenessRecommendation,
    pub confidence: f64,
}

pub struct StalenessScorer {
    weights: StalenessWeights,
}

impl StalenessScorer {
    pub fn new(weights: StalenessWeights) -> Self {
        Self { weights }
    }

    pub fn evaluate(
        &self,
        email: &EmailIndex,
        access: Option<&AccessSummaryEntity>,
    ) -> StalenessEvaluation {
        self.evaluate_at(email, access, utc_now!())
    }

    pub fn evaluate_at(
        &self,
        email: &EmailIndex,
        access: Option<&AccessSummaryEntity>,
        now: i64,
    ) -> StalenessEvaluation {
        let age_days = email.date.map(|date| ((now - date).max(0)) as f64 / MS_PER_DAY);
        let factors = StalenessFactors {
            age_score: age_factor(age_days),
            importance_score: importance_factor(email.importance_level, email.importance_score),
            size_penalty: email.size_penalty.unwrap_or_else(|| {
                email
                    .size
                    .map(|size| size_penalty(size as f64 / (1024.0 * 1024.0)))
                    .unwrap_or(0.0)
            }),
            spam_score: spam_factor(email.spam_score, email.promotional_score),
            access_score: match access {
                Some(summary) => (1.0 - summary.access_score).clamp(0.0, 1.0),
                None => MISSING_ACCESS_FACTOR,
            },
        };

        let total_score = self.weights.age * factors.age_score
            + self.weights.importance * factors.importance_score
            + self.weights.size * factors.size_penalty
            + self.weights.spam * factors.spam_score
            + self.weights.access * factors.access_score;

        let keep = email.importance_level == Some(ImportanceLevel::High)
            || age_days.map(|age| age <= RECENT_KEEP_DAYS as f64).unwrap_or(false)
            || total_score < KEEP_THRESHOLD;
        let recommendation = if keep {
            StalenessRecommendation::Keep
        } else if total_score >= DELETE_THRESHOLD {
            StalenessRecommendation::Delete
        } else {
            StalenessRecommendation::Archive
        };

        StalenessEvaluation {
            total_score,
            confidence: confidence(&factors),
            factors,
            recommendation,
        }
    }
}

/// Monotone in age, saturating after a year.
fn age_factor(age_days: Option<f64>) -> f64 {
    match age_days {
        Some(age) => (age / 365.0).min(1.0),
        None => 0.5,
    }
}

/// Higher for lower importance; a strongly positive rule score shaves a
/// little off, a strongly negative one adds.
fn importance_factor(level: Option<ImportanceLevel>, score: Option<f64>) -> f64 {
    let base = match level {
        Some(ImportanceLevel::High) => 0.0,
        Some(ImportanceLevel::Medium) => 0.5,
        Some(ImportanceLevel::Low) => 1.0,
        None => 0.5,
    };
    let adjustment = score.map(|s| (s / 50.0).clamp(-0.2, 0.2)).unwrap_or(0.0);
    (base - adjustment).clamp(0.0, 1.0)
}

fn spam_factor(spam_score: Option<f64>, promotional_score: Option<f64>) -> f64 {
    let spam = spam_score.unwrap_or(0.0);
    let promo = promotional_score.unwrap_or(0.0);
    spam.max(promo * 0.8).clamp(0.0, 1.0)
}

/// Variance-based agreement: identical factors give confidence 1, maximal
/// disagreement approaches 0.
fn confidence(factors: &StalenessFactors) -> f64 {
    let values = [
        factors.age_score,
        factors.importance_score,
        factors.size_penalty,
        factors.spam_score,
        factors.access_score,
    ];
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    // Variance of values in [0,1] tops out at 0.25.
    (1.0 - 4.0 * variance).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::email::entity::EmailCategory;

    const DAY_MS: i64 = 86_400_000;
    const NOW: i64 = 2_000 * DAY_MS;

    fn stale_email() -> EmailIndex {
        EmailIndex {
            email_id: "e-stale".into(),
            date: Some(NOW - 400 * DAY_MS),
            size: Some(100 * 1024 * 1024),
            category: Some(EmailCategory::Low),
            importance_level: Some(ImportanceLevel::Low),
            spam_score: Some(0.9),
            analysis_timestamp: Some(NOW),
            analysis_version: Some("test".into()),
            ..Default::default()
        }
    }

    #[test]
    fn old_large_spammy_unread_email_recommends_delete() {
        let access = AccessSummaryEntity {
            email_id: "e-stale".into(),
            access_score: 0.0,
            ..Default::default()
        };
        let evaluation = StalenessScorer::new(Default::default())
            .evaluate_at(&stale_email(), Some(&access), NOW);
        assert!(evaluation.total_score > 0.8, "score {}", evaluation.total_score);
        assert_eq!(evaluation.recommendation, StalenessRecommendation::Delete);
        assert!(evaluation.confidence > 0.5);
    }

    #[test]
    fn high_importance_always_keeps() {
        let mut email = stale_email();
        email.importance_level = Some(ImportanceLevel::High);
        let evaluation =
            StalenessScorer::new(Default::default()).evaluate_at(&email, None, NOW);
        assert_eq!(evaluation.recommendation, StalenessRecommendation::Keep);
    }

    #[test]
    fn recent_email_keeps_regardless_of_factors() {
        let mut email = stale_email();
        email.date = Some(NOW - 2 * DAY_MS);
        let evaluation =
            StalenessScorer::new(Default::default()).evaluate_at(&email, None, NOW);
        assert_eq!(evaluation.recommendation, StalenessRecommendation::Keep);
    }

    #[test]
    fn middling_total_archives() {
        let email = EmailIndex {
            email_id: "e-mid".into(),
            date: Some(NOW - 200 * DAY_MS),
            size: Some(3 * 1024 * 1024),
            importance_level: Some(ImportanceLevel::Medium),
            spam_score: Some(0.4),
            ..Default::default()
        };
        let evaluation =
            StalenessScorer::new(Default::default()).evaluate_at(&email, None, NOW);
        assert_eq!(evaluation.recommendation, StalenessRecommendation::Archive);
    }

    #[test]
    fn missing_access_summary_uses_default_factor() {
        let evaluation =
            StalenessScorer::new(Default::default()).evaluate_at(&stale_email(), None, NOW);
        assert_eq!(evaluation.factors.access_score, 0.8);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let mut weights = StalenessWeights::default();
        weights.age = 0.9;
        assert!(weights.validate().is_err());
        assert!(StalenessWeights::default().validate().is_ok());
    }
}
