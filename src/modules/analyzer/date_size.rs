// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::{
    analyzer::{config::DateSizeConfig, EmailAnalysisContext},
    email::entity::{AgeCategory, SizeCategory},
};

#[derive(Clone, Debug, PartialEq)]
pub struct DateSizeAnalysis {
    pub age_days: Option<i64>,
    pub age_category: AgeCategory,
    pub size_category: SizeCategory,
    pub recency_score: f64,
    pub size_penalty: f64,
}

/// Pure date/size scoring. Missing envelope date falls back to a moderate
/// age with a neutral recency score; missing size reads as small with no
/// penalty.
pub struct DateSizeAnalyzer {
    config: DateSizeConfig,
}

impl DateSizeAnalyzer {
    pub fn new(config: DateSizeConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, context: &EmailAnalysisContext) -> DateSizeAnalysis {
        let age_category = match context.age_days {
            None => AgeCategory::Moderate,
            Some(age) if age <= self.config.recent_days => AgeCategory::Recent,
            Some(age) if age <= self.config.moderate_days => AgeCategory::Moderate,
            Some(_) => AgeCategory::Old,
        };

        let recency_score = match context.age_days {
            None => 0.5,
            Some(age) => recency_score(age),
        };

        let size_category = match context.email.size {
            None => SizeCategory::Small,
            Some(size) if size <= self.config.small_max_bytes => SizeCategory::Small,
            Some(size) if size <= self.config.medium_max_bytes => SizeCategory::Medium,
            Some(_) => SizeCategory::Large,
        };

        let size_penalty = match context.size_mb {
            None => 0.0,
            Some(mb) => size_penalty(mb),
        };

        DateSizeAnalysis {
            age_days: context.age_days,
            age_category,
            size_category,
            recency_score,
            size_penalty,
        }
    }
}

/// Piecewise recency curve: linear decay over the first week, a steeper
/// drop through day 30, then a slow tail that bottoms out at zero.
pub fn recency_score(age_days: i64) -> f64 {
    let age = age_days.max(0) as f64;
    if age <= 7.0 {
        1.0 - age / 14.0
    } else if age <= 30.0 {
        0.5 - (age - 7.0) / 46.0
    } else {
        (0.2 - (age - 30.0) / 365.0).max(0.0)
    }
}

/// Size penalty in megabytes: free below 1MB, linear to 0.9 at 10MB, then a
/// capped crawl to 1.0.
pub fn size_penalty(size_mb: f64) -> f64 {
    if size_mb < 1.0 {
        0.0
    } else if size_mb <= 10.0 {
        (size_mb - 1.0) * 0.1
    } else {
        0.9 + ((size_mb - 10.0) * 0.01).min(0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::email::entity::EmailIndex;

    const DAY_MS: i64 = 86_400_000;
    const NOW: i64 = 1_000 * DAY_MS;

    fn analyze(date: Option<i64>, size: Option<u64>) -> DateSizeAnalysis {
        let context = EmailAnalysisContext::at(
            EmailIndex {
                email_id: "e1".into(),
                date,
                size,
                ..Default::default()
            },
            NOW,
        );
        DateSizeAnalyzer::new(DateSizeConfig::default()).analyze(&context)
    }

    #[test]
    fn recency_curve_segments() {
        assert_eq!(recency_score(0), 1.0);
        assert!((recency_score(7) - 0.5).abs() < 1e-9);
        assert!((recency_score(30) - 0.0).abs() < 1e-9);
        assert!((recency_score(31) - (0.2 - 1.0 / 365.0)).abs() < 1e-9);
        assert_eq!(recency_score(1000), 0.0);
    }

    #[test]
    fn size_penalty_curve_segments() {
        assert_eq!(size_penalty(0.5), 0.0);
        assert!((size_penalty(5.0) - 0.4).abs() < 1e-9);
        assert!((size_penalty(10.0) - 0.9).abs() < 1e-9);
        assert!((size_penalty(15.0) - 0.95).abs() < 1e-9);
        assert_eq!(size_penalty(500.0), 1.0);
    }

    #[test]
    fn age_categories_follow_thresholds() {
        assert_eq!(
            analyze(Some(NOW - 2 * DAY_MS), None).age_category,
            AgeCategory::Recent
        );
        assert_eq!(
            analyze(Some(NOW - 30 * DAY_MS), None).age_category,
            AgeCategory::Moderate
        );
        assert_eq!(
            analyze(Some(NOW - 365 * DAY_MS), None).age_category,
            AgeCategory::Old
        );
    }

    #[test]
    fn missing_fields_take_documented_defaults() {
        let analysis = analyze(None, None);
        assert_eq!(analysis.age_category, AgeCategory::Moderate);
        assert_eq!(analysis.recency_score, 0.5);
        assert_eq!(analysis.size_category, SizeCategory::Small);
        assert_eq!(analysis.size_penalty, 0.0);
    }

    #[test]
    fn large_email_lands_in_large_bucket_with_penalty() {
        let analysis = analyze(Some(NOW), Some(20 * 1024 * 1024));
        assert_eq!(analysis.size_category, SizeCategory::Large);
        assert!(analysis.size_penalty > 0.9);
    }
}
