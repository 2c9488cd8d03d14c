// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::{
    id,
    modules::{
        access::entity::AccessSummaryEntity,
        database::{async_find_impl, delete_impl, insert_impl, list_all_impl, update_impl},
        email::entity::{EmailIndex, ImportanceLevel},
        error::{code::ErrorCode, MailSweepResult},
        trigger::entity::ScheduleSpec,
        user::scope::UserScope,
        utils::sender_domain,
    },
    raise_error, utc_now,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum CleanupActionType {
    #[default]
    Archive,
    Delete,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum CleanupMethod {
    #[default]
    Gmail,
    Export,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct CleanupAction {
    pub action_type: CleanupActionType,
    pub method: CleanupMethod,
    pub export_format: Option<String>,
}

/// Declarative candidate filter of a policy. All bounds are optional; unset
/// bounds do not constrain.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct PolicyCriteria {
    /// Only emails at least this old qualify
    pub age_days_min: Option<i64>,
    /// Only emails at or below this importance level qualify
    pub importance_level_max: Option<ImportanceLevel>,
    pub spam_score_min: Option<f64>,
    pub promotional_score_min: Option<f64>,
    pub access_score_max: Option<f64>,
    /// Only emails at least this large (bytes) qualify
    pub size_min: Option<u64>,
    pub label_include: Vec<String>,
    pub label_exclude: Vec<String>,
    pub sender_domain_include: Vec<String>,
    pub sender_domain_exclude: Vec<String>,
}

fn importance_rank(level: ImportanceLevel) -> u8 {
    match level {
        ImportanceLevel::Low => 0,
        ImportanceLevel::Medium => 1,
        ImportanceLevel::High => 2,
    }
}

impl PolicyCriteria {
    pub fn matches(
        &self,
        email: &EmailIndex,
        access: Option<&AccessSummaryEntity>,
        now: i64,
    ) -> bool {
        if let Some(min_age) = self.age_days_min {
            match email.date {
                Some(date) if (now - date) / 86_400_000 >= min_age => {}
                _ => return false,
            }
        }
        if let Some(max_level) = self.importance_level_max {
            let level = email.importance_level.unwrap_or(ImportanceLevel::Medium);
            if importance_rank(level) > importance_rank(max_level) {
                return false;
            }
        }
        if let Some(min) = self.spam_score_min {
            if email.spam_score.unwrap_or(0.0) < min {
                return false;
            }
        }
        if let Some(min) = self.promotional_score_min {
            if email.promotional_score.unwrap_or(0.0) < min {
                return false;
            }
        }
        if let Some(max) = self.access_score_max {
            let score = access.map(|summary| summary.access_score).unwrap_or(0.0);
            if score > max {
                return false;
            }
        }
        if let Some(min_size) = self.size_min {
            if email.size.unwrap_or(0) < min_size {
                return false;
            }
        }
        let labels: Vec<String> = email
            .labels
            .iter()
            .map(|label| label.to_ascii_uppercase())
            .collect();
        if !self.label_include.is_empty()
            && !self
                .label_include
                .iter()
                .any(|wanted| labels.contains(&wanted.to_ascii_uppercase()))
        {
            return false;
        }
        if self
            .label_exclude
            .iter()
            .any(|unwanted| labels.contains(&unwanted.to_ascii_uppercase()))
        {
            return false;
        }
        let domain = sender_domain(&email.sender);
        if !self.sender_domain_include.is_empty() {
            match &domain {
                Some(domain)
                    if self
                        .sender_domain_include
                        .iter()
                        .any(|candidate| candidate.eq_ignore_ascii_case(domain)) => {}
                _ => return false,
            }
        }
        if let Some(domain) = &domain {
            if self
                .sender_domain_exclude
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(domain))
            {
                return false;
            }
        }
        true
    }
}

/// Safety configuration of a policy. Each gate carries an explicit enable
/// flag; there are no sentinel thresholds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct SafetyConfig {
    /// Gate 1: never touch emails fused into the high category
    pub preserve_important: bool,
    /// Gate 1: a rule score at or above this is protected even before a
    /// fresh fusion lands; None disables the check
    pub importance_score_threshold: Option<f64>,
    /// Gate 2
    pub domain_protection: bool,
    pub vip_domains: Vec<String>,
    pub trusted_domains: Vec<String>,
    pub whitelist_domains: Vec<String>,
    /// Gate 3
    pub attachment_protection: bool,
    pub critical_attachment_types: Vec<String>,
    /// Gate 4
    pub label_protection: bool,
    pub protected_labels: Vec<String>,
    /// Gate 5
    pub legal_protection: bool,
    pub legal_keywords: Vec<String>,
    /// Gate 6
    pub access_protection: bool,
    pub max_access_score: f64,
    pub recent_access_days: i64,
    /// Gate 7
    pub active_thread_protection: bool,
    pub recent_reply_days: i64,
    pub min_thread_messages: u32,
    /// Gate 8
    pub unusual_size_check: bool,
    pub large_email_threshold: u64,
    pub unusual_size_multiplier: f64,
    /// Gate 9 (rolling budgets; None disables the window)
    pub max_deletions_per_hour: Option<u32>,
    pub max_deletions_per_day: Option<u32>,
    pub max_deletions_per_run: Option<u32>,
    /// Candidate sets larger than this defer to confirmation
    pub bulk_threshold: Option<u32>,
    pub require_confirmation: bool,
    /// Candidates below this staleness are skipped entirely
    pub min_staleness_score: Option<f64>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            preserve_important: true,
            importance_score_threshold: Some(8.0),
            domain_protection: true,
            vip_domains: Vec::new(),
            trusted_domains: Vec::new(),
            whitelist_domains: Vec::new(),
            attachment_protection: true,
            critical_attachment_types: vec![
                "pdf".into(),
                "doc".into(),
                "docx".into(),
                "xls".into(),
                "xlsx".into(),
            ],
            label_protection: true,
            protected_labels: vec!["STARRED".into()],
            legal_protection: true,
            legal_keywords: vec![
                "contract".into(),
                "legal".into(),
                "compliance".into(),
                "regulatory".into(),
                "subpoena".into(),
            ],
            access_protection: true,
            max_access_score: 0.3,
            recent_access_days: 30,
            active_thread_protection: true,
            recent_reply_days: 7,
            min_thread_messages: 3,
            unusual_size_check: true,
            large_email_threshold: 25 * 1024 * 1024,
            unusual_size_multiplier: 3.0,
            max_deletions_per_hour: Some(500),
            max_deletions_per_day: Some(2_000),
            max_deletions_per_run: Some(1_000),
            bulk_threshold: Some(500),
            require_confirmation: false,
            min_staleness_score: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 11, version = 1)]
#[native_db]
pub struct CleanupPolicy {
    #[primary_key]
    pub id: u64,
    #[secondary_key(unique)]
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    /// 0..=100; higher priority policies are evaluated first
    pub priority: u8,
    pub criteria: PolicyCriteria,
    pub action: CleanupAction,
    pub safety: SafetyConfig,
    pub schedule: Option<ScheduleSpec>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_run_at: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct CleanupPolicyRequest {
    pub name: String,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub priority: Option<u8>,
    pub criteria: Option<PolicyCriteria>,
    pub action: CleanupAction,
    pub safety: Option<SafetyConfig>,
    pub schedule: Option<ScheduleSpec>,
}

impl CleanupPolicy {
    fn validate(&self) -> MailSweepResult<()> {
        if self.name.trim().is_empty() {
            return Err(raise_error!(
                "Policy name must not be empty".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.priority > 100 {
            return Err(raise_error!(
                "Policy priority must be within [0,100]".into(),
                ErrorCode::InvalidParameter
            ));
        }
        for threshold in [
            self.criteria.spam_score_min,
            self.criteria.promotional_score_min,
            self.criteria.access_score_max,
            self.safety.min_staleness_score,
        ]
        .into_iter()
        .flatten()
        {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(raise_error!(
                    "Score thresholds must be within [0,1]".into(),
                    ErrorCode::InvalidParameter
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.safety.max_access_score) {
            return Err(raise_error!(
                "safety.max_access_score must be within [0,1]".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.safety.unusual_size_multiplier < 1.0 {
            return Err(raise_error!(
                "safety.unusual_size_multiplier must be at least 1.0".into(),
                ErrorCode::InvalidParameter
            ));
        }
        // An unguarded delete policy is rejected outright: deletion needs
        // either preserve_important or a per-run ceiling.
        if self.action.action_type == CleanupActionType::Delete
            && !self.safety.preserve_important
            && self.safety.max_deletions_per_run.is_none()
        {
            return Err(raise_error!(
                "A delete policy must keep preserve_important or set max_deletions_per_run".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.action.method == CleanupMethod::Export && self.action.export_format.is_none() {
            return Err(raise_error!(
                "An export action requires export_format".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if let Some(spec) = &self.schedule {
            spec.validate()?;
        }
        Ok(())
    }

    pub async fn create(
        scope: &UserScope,
        request: CleanupPolicyRequest,
    ) -> MailSweepResult<CleanupPolicy> {
        let policy = CleanupPolicy {
            id: id!(64),
            name: request.name,
            description: request.description,
            enabled: request.enabled.unwrap_or(true),
            priority: request.priority.unwrap_or(50),
            criteria: request.criteria.unwrap_or_default(),
            action: request.action,
            safety: request.safety.unwrap_or_default(),
            schedule: request.schedule,
            created_at: utc_now!(),
            updated_at: utc_now!(),
            last_run_at: None,
        };
        policy.validate()?;
        if Self::find_by_name(scope, &policy.name).await?.is_some() {
            return Err(raise_error!(
                format!("A policy named '{}' already exists", policy.name),
                ErrorCode::AlreadyExists
            ));
        }
        insert_impl(&scope.db, policy.clone()).await?;
        Ok(policy)
    }

    pub async fn update(
        scope: &UserScope,
        policy_id: u64,
        request: CleanupPolicyRequest,
    ) -> MailSweepResult<CleanupPolicy> {
        if let Some(existing) = Self::find_by_name(scope, &request.name).await? {
            if existing.id != policy_id {
                return Err(raise_error!(
                    format!("A policy named '{}' already exists", request.name),
                    ErrorCode::Conflict
                ));
            }
        }
        update_impl(
            &scope.db,
            move |rw| {
                rw.get()
                    .primary::<CleanupPolicy>(policy_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Policy '{policy_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let updated = CleanupPolicy {
                    id: current.id,
                    name: request.name.clone(),
                    description: request.description.clone(),
                    enabled: request.enabled.unwrap_or(current.enabled),
                    priority: request.priority.unwrap_or(current.priority),
                    criteria: request.criteria.clone().unwrap_or(current.criteria.clone()),
                    action: request.action.clone(),
                    safety: request.safety.clone().unwrap_or(current.safety.clone()),
                    schedule: request.schedule.clone(),
                    created_at: current.created_at,
                    updated_at: utc_now!(),
                    last_run_at: current.last_run_at,
                };
                updated.validate()?;
                Ok(updated)
            },
        )
        .await
    }

    pub async fn delete(scope: &UserScope, policy_id: u64) -> MailSweepResult<()> {
        delete_impl(&scope.db, move |rw| {
            rw.get()
                .primary::<CleanupPolicy>(policy_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .ok_or_else(|| {
                    raise_error!(
                        format!("Policy '{policy_id}' not found"),
                        ErrorCode::ResourceNotFound
                    )
                })
        })
        .await
    }

    pub async fn get(scope: &UserScope, policy_id: u64) -> MailSweepResult<CleanupPolicy> {
        async_find_impl::<CleanupPolicy>(&scope.db, policy_id)
            .await?
            .ok_or_else(|| {
                raise_error!(
                    format!("Policy '{policy_id}' not found"),
                    ErrorCode::ResourceNotFound
                )
            })
    }

    pub async fn find_by_name(
        scope: &UserScope,
        name: &str,
    ) -> MailSweepResult<Option<CleanupPolicy>> {
        let policies = list_all_impl::<CleanupPolicy>(&scope.db).await?;
        Ok(policies.into_iter().find(|policy| policy.name == name))
    }

    pub async fn list(scope: &UserScope) -> MailSweepResult<Vec<CleanupPolicy>> {
        let mut policies = list_all_impl::<CleanupPolicy>(&scope.db).await?;
        policies.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        Ok(policies)
    }

    /// Enabled policies, highest priority first.
    pub async fn get_active(scope: &UserScope) -> MailSweepResult<Vec<CleanupPolicy>> {
        let mut policies = Self::list(scope).await?;
        policies.retain(|policy| policy.enabled);
        Ok(policies)
    }

    pub async fn touch_last_run(scope: &UserScope, policy_id: u64) -> MailSweepResult<()> {
        update_impl(
            &scope.db,
            move |rw| {
                rw.get()
                    .primary::<CleanupPolicy>(policy_id)
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            format!("Policy '{policy_id}' not found"),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            |current| {
                let mut updated = current.clone();
                updated.last_run_at = Some(utc_now!());
                updated.updated_at = utc_now!();
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delete_policy() -> CleanupPolicy {
        CleanupPolicy {
            id: 1,
            name: "purge-old".into(),
            enabled: true,
            priority: 50,
            action: CleanupAction {
                action_type: CleanupActionType::Delete,
                method: CleanupMethod::Gmail,
                export_format: None,
            },
            safety: SafetyConfig::default(),
            created_at: 1,
            updated_at: 1,
            ..Default::default()
        }
    }

    #[test]
    fn unguarded_delete_policy_is_rejected() {
        let mut policy = delete_policy();
        policy.safety.preserve_important = false;
        policy.safety.max_deletions_per_run = None;
        assert!(policy.validate().is_err());
        policy.safety.max_deletions_per_run = Some(100);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn priority_beyond_range_is_rejected() {
        let mut policy = delete_policy();
        policy.priority = 101;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn export_action_requires_format() {
        let mut policy = delete_policy();
        policy.action.method = CleanupMethod::Export;
        assert!(policy.validate().is_err());
        policy.action.export_format = Some("json".into());
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn criteria_age_and_labels() {
        let criteria = PolicyCriteria {
            age_days_min: Some(30),
            label_exclude: vec!["IMPORTANT".into()],
            ..Default::default()
        };
        let now = 100 * 86_400_000;
        let mut email = EmailIndex {
            email_id: "e1".into(),
            date: Some(now - 60 * 86_400_000),
            labels: vec!["INBOX".into()],
            ..Default::default()
        };
        assert!(criteria.matches(&email, None, now));
        email.labels.push("IMPORTANT".into());
        assert!(!criteria.matches(&email, None, now));
        email.labels = vec!["INBOX".into()];
        email.date = Some(now - 86_400_000);
        assert!(!criteria.matches(&email, None, now));
    }

    #[test]
    fn criteria_importance_cap() {
        let criteria = PolicyCriteria {
            importance_level_max: Some(ImportanceLevel::Medium),
            ..Default::default()
        };
        let mut email = EmailIndex {
            email_id: "e1".into(),
            importance_level: Some(ImportanceLevel::High),
            ..Default::default()
        };
        assert!(!criteria.matches(&email, None, 0));
        email.importance_level = Some(ImportanceLevel::Low);
        assert!(criteria.matches(&email, None, 0));
    }
}
