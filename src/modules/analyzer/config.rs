// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        database::{async_find_impl, upsert_impl},
        error::{code::ErrorCode, MailSweepResult},
        user::scope::UserScope,
    },
    raise_error, utc_now,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum RuleKind {
    Keyword,
    Domain,
    Label,
    NoReply,
    LargeAttachment,
}

/// One importance rule. Rules are evaluated in descending priority (ties by
/// id ascending) and every applicable rule contributes its weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct ImportanceRule {
    pub id: String,
    pub name: String,
    pub kind: RuleKind,
    pub priority: i32,
    pub weight: f64,
    pub keywords: Vec<String>,
    pub domains: Vec<String>,
    pub labels: Vec<String>,
    pub min_size: Option<u64>,
}

impl ImportanceRule {
    fn simple(id: &str, name: &str, kind: RuleKind, priority: i32, weight: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            priority,
            weight,
            keywords: Vec::new(),
            domains: Vec::new(),
            labels: Vec::new(),
            min_size: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct ImportanceConfig {
    pub rules: Vec<ImportanceRule>,
    pub high_threshold: f64,
    pub low_threshold: f64,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        let mut urgent = ImportanceRule::simple("urgent-keywords", "Urgent Keywords", RuleKind::Keyword, 100, 10.0);
        urgent.keywords = vec![
            "urgent".into(),
            "critical".into(),
            "asap".into(),
            "deadline".into(),
        ];
        let mut action = ImportanceRule::simple("action-keywords", "Action Keywords", RuleKind::Keyword, 90, 5.0);
        action.keywords = vec![
            "action required".into(),
            "please review".into(),
            "approval needed".into(),
        ];
        let mut important_labels =
            ImportanceRule::simple("important-labels", "Important Labels", RuleKind::Label, 80, 6.0);
        important_labels.labels = vec!["IMPORTANT".into(), "STARRED".into()];
        let no_reply =
            ImportanceRule::simple("no-reply-sender", "No-Reply Sender", RuleKind::NoReply, 50, -5.0);
        let mut large_attachment = ImportanceRule::simple(
            "large-attachment",
            "Large Attachment",
            RuleKind::LargeAttachment,
            40,
            2.0,
        );
        large_attachment.min_size = Some(5 * 1024 * 1024);

        Self {
            rules: vec![urgent, action, important_labels, no_reply, large_attachment],
            high_threshold: 8.0,
            low_threshold: -2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct DateSizeConfig {
    /// Upper bound in days for the `recent` age category
    pub recent_days: i64,
    /// Upper bound in days for the `moderate` age category
    pub moderate_days: i64,
    /// Upper bound in bytes for the `small` size category
    pub small_max_bytes: u64,
    /// Upper bound in bytes for the `medium` size category
    pub medium_max_bytes: u64,
}

impl Default for DateSizeConfig {
    fn default() -> Self {
        Self {
            recent_days: 7,
            moderate_days: 90,
            small_max_bytes: 100 * 1024,
            medium_max_bytes: 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct LabelClassifierConfig {
    pub important_labels: Vec<String>,
    pub promotional_labels: Vec<String>,
    pub social_labels: Vec<String>,
    pub updates_labels: Vec<String>,
    pub forums_labels: Vec<String>,
    pub spam_labels: Vec<String>,
    pub spam_threshold: f64,
    pub promotional_threshold: f64,
    pub social_threshold: f64,
}

impl Default for LabelClassifierConfig {
    fn default() -> Self {
        Self {
            important_labels: vec!["IMPORTANT".into(), "STARRED".into()],
            promotional_labels: vec!["CATEGORY_PROMOTIONS".into(), "PROMOTIONS".into()],
            social_labels: vec!["CATEGORY_SOCIAL".into(), "SOCIAL".into()],
            updates_labels: vec!["CATEGORY_UPDATES".into(), "UPDATES".into()],
            forums_labels: vec!["CATEGORY_FORUMS".into(), "FORUMS".into()],
            spam_labels: vec!["SPAM".into(), "JUNK".into()],
            spam_threshold: 0.5,
            promotional_threshold: 0.5,
            social_threshold: 0.5,
        }
    }
}

/// Thresholds used by the orchestrator when fusing analyzer results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct FusionThresholds {
    pub spam_threshold: f64,
    pub promotional_threshold: f64,
}

impl Default for FusionThresholds {
    fn default() -> Self {
        Self {
            spam_threshold: 0.6,
            promotional_threshold: 0.6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct CategorizationOptions {
    pub enable_parallel_processing: bool,
    pub batch_size: u32,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub max_parallelism: u32,
}

impl Default for CategorizationOptions {
    fn default() -> Self {
        Self {
            enable_parallel_processing: true,
            batch_size: 200,
            timeout_ms: 5_000,
            retry_attempts: 1,
            max_parallelism: 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct CacheOptions {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct CleanupAutomationOptions {
    pub enabled: bool,
    /// Cleanup batch size B
    pub batch_size: u32,
    /// Base sleep between batches; grows under health pressure
    pub inter_batch_delay_ms: u64,
    pub max_emails_per_run: u32,
}

impl Default for CleanupAutomationOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 100,
            inter_batch_delay_ms: 200,
            max_emails_per_run: 5_000,
        }
    }
}

/// All per-user tuning in one row: analyzer configs, orchestration options
/// and cleanup automation knobs.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 18, version = 1)]
#[native_db]
pub struct AutomationConfigEntity {
    #[primary_key]
    pub key: String,
    pub importance: ImportanceConfig,
    pub date_size: DateSizeConfig,
    pub labels: LabelClassifierConfig,
    pub fusion: FusionThresholds,
    pub categorization: CategorizationOptions,
    pub cache: CacheOptions,
    pub cleanup: CleanupAutomationOptions,
    pub updated_at: i64,
}

const CONFIG_KEY: &str = "config";

impl AutomationConfigEntity {
    pub fn with_defaults() -> Self {
        Self {
            key: CONFIG_KEY.into(),
            importance: Default::default(),
            date_size: Default::default(),
            labels: Default::default(),
            fusion: Default::default(),
            categorization: Default::default(),
            cache: Default::default(),
            cleanup: Default::default(),
            updated_at: utc_now!(),
        }
    }

    pub fn validate(&self) -> MailSweepResult<()> {
        if self.categorization.batch_size < 1 {
            return Err(raise_error!(
                "categorization.batch_size must be at least 1".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.categorization.timeout_ms < 1000 {
            return Err(raise_error!(
                "categorization.timeout_ms must be at least 1000".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.categorization.max_parallelism < 1 {
            return Err(raise_error!(
                "categorization.max_parallelism must be at least 1".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.importance.high_threshold <= self.importance.low_threshold {
            return Err(raise_error!(
                "importance.high_threshold must exceed importance.low_threshold".into(),
                ErrorCode::InvalidParameter
            ));
        }
        for threshold in [
            self.labels.spam_threshold,
            self.labels.promotional_threshold,
            self.labels.social_threshold,
            self.fusion.spam_threshold,
            self.fusion.promotional_threshold,
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(raise_error!(
                    "classifier thresholds must be within [0,1]".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        if self.cleanup.batch_size < 1 {
            return Err(raise_error!(
                "cleanup.batch_size must be at least 1".into(),
                ErrorCode::InvalidParameter
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for rule in &self.importance.rules {
            if !seen.insert(rule.id.clone()) {
                return Err(raise_error!(
                    format!("duplicate importance rule id '{}'", rule.id),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        Ok(())
    }

    pub async fn load(scope: &UserScope) -> MailSweepResult<AutomationConfigEntity> {
        Ok(
            async_find_impl::<AutomationConfigEntity>(&scope.db, CONFIG_KEY.to_string())
                .await?
                .unwrap_or_else(Self::with_defaults),
        )
    }

    pub async fn store(scope: &UserScope, mut config: AutomationConfigEntity) -> MailSweepResult<()> {
        config.key = CONFIG_KEY.into();
        config.updated_at = utc_now!();
        config.validate()?;
        upsert_impl(&scope.db, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AutomationConfigEntity::with_defaults().validate().unwrap();
    }

    #[test]
    fn short_timeouts_are_rejected() {
        let mut config = AutomationConfigEntity::with_defaults();
        config.categorization.timeout_ms = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_rule_ids_are_rejected() {
        let mut config = AutomationConfigEntity::with_defaults();
        let duplicate = config.importance.rules[0].clone();
        config.importance.rules.push(duplicate);
        assert!(config.validate().is_err());
    }
}
