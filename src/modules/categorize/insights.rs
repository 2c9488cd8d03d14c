use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::modules::email::entity::EmailIndex;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct CategoryCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct RuleHit {
    pub name: String,
    pub count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct AgeDistribution {
    pub recent: u64,
    pub moderate: u64,
    pub old: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct SizeDistribution {
    pub small: u64,
    pub medium: u64,
    pub large: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct AnalyzerInsights {
    /// Most frequently matched importance rules, descending
    pub top_importance_rules: Vec<RuleHit>,
    /// Fraction of processed emails whose spam score cleared the fusion
    /// threshold
    pub spam_detection_rate: f64,
    pub avg_confidence: f64,
    pub age_distribution: AgeDistribution,
    pub size_distribution: SizeDistribution,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct EnhancedCategorizationResult {
    pub processed: u64,
    pub errors: u64,
    pub categories: CategoryCounts,
    pub emails: Vec<EmailIndex>,
    pub analyzer_insights: AnalyzerInsights,
}
