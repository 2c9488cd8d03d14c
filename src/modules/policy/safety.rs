// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::modules::{
    access::entity::AccessSummaryEntity,
    email::entity::{EmailCategory, EmailIndex},
    policy::entity::SafetyConfig,
    utils::sender_domain,
};

/// Tagged outcome of the safety gates: never expressed through errors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyVerdict {
    Clear,
    Protected { reason: String },
    RequiresConfirmation { reason: String },
}

impl SafetyVerdict {
    pub fn is_clear(&self) -> bool {
        matches!(self, SafetyVerdict::Clear)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SafetyVerdict::Clear => None,
            SafetyVerdict::Protected { reason } => Some(reason),
            SafetyVerdict::RequiresConfirmation { reason } => Some(reason),
        }
    }
}

/// Per-email inputs the gates need beyond the row itself; precomputed once
/// per batch so gate evaluation stays pure.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct SafetyContext {
    pub access: Option<AccessSummaryEntity>,
    /// Mean size of messages from the same sender, when known
    pub sender_mean_size: Option<f64>,
    /// Messages in this thread newer than `recent_reply_days`
    pub thread_recent_messages: u32,
    pub now: i64,
}

/// Applies gates 1–8 in the documented order; the first blocker wins. The
/// rolling deletion budget (gate 9) is enforced at batch level where the
/// remaining budget is known.
pub fn evaluate_gates(
    safety: &SafetyConfig,
    email: &EmailIndex,
    context: &SafetyContext,
) -> SafetyVerdict {
    // Gate 1: fused-high emails are untouchable, and a rule score above
    // the configured threshold protects an email whose fused category is
    // stale or missing.
    if safety.preserve_important && email.category == Some(EmailCategory::High) {
        return SafetyVerdict::Protected {
            reason: "preserve_important".into(),
        };
    }
    if let Some(threshold) = safety.importance_score_threshold {
        if email
            .importance_score
            .map(|score| score >= threshold)
            .unwrap_or(false)
        {
            return SafetyVerdict::Protected {
                reason: "importance_score".into(),
            };
        }
    }

    // Gate 2: sender domain protection.
    if safety.domain_protection {
        if let Some(domain) = sender_domain(&email.sender) {
            let protected = safety
                .vip_domains
                .iter()
                .chain(safety.trusted_domains.iter())
                .chain(safety.whitelist_domains.iter())
                .any(|candidate| candidate.eq_ignore_ascii_case(&domain));
            if protected {
                return SafetyVerdict::Protected {
                    reason: format!("protected_domain:{domain}"),
                };
            }
        }
    }

    // Gate 3: critical attachment types. The index stores no attachment
    // manifest, so extensions are matched against the subject and snippet
    // where Gmail surfaces attachment names.
    if safety.attachment_protection && email.has_attachments {
        let haystack = format!("{} {}", email.subject, email.snippet).to_ascii_lowercase();
        for extension in &safety.critical_attachment_types {
            if haystack.contains(&format!(".{}", extension.to_ascii_lowercase())) {
                return SafetyVerdict::Protected {
                    reason: format!("critical_attachment:{extension}"),
                };
            }
        }
    }

    // Gate 4: protected labels.
    if safety.label_protection {
        let labels: Vec<String> = email
            .labels
            .iter()
            .map(|label| label.to_ascii_uppercase())
            .collect();
        for protected in &safety.protected_labels {
            if labels.contains(&protected.to_ascii_uppercase()) {
                return SafetyVerdict::Protected {
                    reason: format!("protected_label:{protected}"),
                };
            }
        }
    }

    // Gate 5: legal/compliance keywords.
    if safety.legal_protection {
        let haystack = format!("{} {}", email.subject, email.snippet).to_ascii_lowercase();
        for keyword in &safety.legal_keywords {
            if haystack.contains(&keyword.to_ascii_lowercase()) {
                return SafetyVerdict::Protected {
                    reason: format!("legal_keyword:{keyword}"),
                };
            }
        }
    }

    // Gate 6: recently or frequently accessed.
    if safety.access_protection {
        if let Some(access) = &context.access {
            if access.access_score > safety.max_access_score {
                return SafetyVerdict::Protected {
                    reason: "access_score".into(),
                };
            }
            if let Some(last) = access.last_accessed {
                let window_ms = safety.recent_access_days * 86_400_000;
                if context.now - last <= window_ms {
                    return SafetyVerdict::Protected {
                        reason: "recent_access".into(),
                    };
                }
            }
        }
    }

    // Gate 7: active conversation threads.
    if safety.active_thread_protection
        && context.thread_recent_messages >= safety.min_thread_messages
    {
        return SafetyVerdict::Protected {
            reason: "active_thread".into(),
        };
    }

    // Gate 8: unusually large messages defer to a human.
    if safety.unusual_size_check {
        let size = email.size.unwrap_or(0);
        if size > safety.large_email_threshold {
            return SafetyVerdict::RequiresConfirmation {
                reason: "large_email".into(),
            };
        }
        if let Some(mean) = context.sender_mean_size {
            if mean > 0.0 && size as f64 > mean * safety.unusual_size_multiplier {
                return SafetyVerdict::RequiresConfirmation {
                    reason: "unusual_size".into(),
                };
            }
        }
    }

    if safety.require_confirmation {
        return SafetyVerdict::RequiresConfirmation {
            reason: "confirmation_required".into(),
        };
    }

    SafetyVerdict::Clear
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 86_400_000;

    fn email() -> EmailIndex {
        EmailIndex {
            email_id: "e1".into(),
            sender: "newsletter@deals.example".into(),
            subject: "Weekly deals".into(),
            snippet: "so many deals".into(),
            labels: vec!["INBOX".into()],
            size: Some(50_000),
            ..Default::default()
        }
    }

    fn context() -> SafetyContext {
        SafetyContext {
            now: 1_000 * DAY_MS,
            ..Default::default()
        }
    }

    #[test]
    fn clean_email_clears_all_gates() {
        let verdict = evaluate_gates(&SafetyConfig::default(), &email(), &context());
        assert_eq!(verdict, SafetyVerdict::Clear);
    }

    #[test]
    fn preserve_important_blocks_high_category() {
        let mut e = email();
        e.category = Some(EmailCategory::High);
        e.analysis_timestamp = Some(1);
        e.analysis_version = Some("test".into());
        let verdict = evaluate_gates(&SafetyConfig::default(), &e, &context());
        assert_eq!(
            verdict,
            SafetyVerdict::Protected {
                reason: "preserve_important".into()
            }
        );
    }

    #[test]
    fn disabling_a_gate_expands_the_candidate_set() {
        let mut e = email();
        e.category = Some(EmailCategory::High);
        e.analysis_timestamp = Some(1);
        e.analysis_version = Some("test".into());
        let mut safety = SafetyConfig::default();
        safety.preserve_important = false;
        let verdict = evaluate_gates(&safety, &e, &context());
        assert_eq!(verdict, SafetyVerdict::Clear);
    }

    #[test]
    fn importance_score_threshold_protects_without_a_category() {
        let mut e = email();
        e.importance_score = Some(9.5);
        let verdict = evaluate_gates(&SafetyConfig::default(), &e, &context());
        assert_eq!(
            verdict,
            SafetyVerdict::Protected {
                reason: "importance_score".into()
            }
        );

        let mut safety = SafetyConfig::default();
        safety.importance_score_threshold = None;
        let verdict = evaluate_gates(&safety, &e, &context());
        assert_eq!(verdict, SafetyVerdict::Clear);
    }

    #[test]
    fn vip_domain_protects() {
        let mut safety = SafetyConfig::default();
        safety.vip_domains = vec!["deals.example".into()];
        let verdict = evaluate_gates(&safety, &email(), &context());
        assert_eq!(
            verdict,
            SafetyVerdict::Protected {
                reason: "protected_domain:deals.example".into()
            }
        );
    }

    #[test]
    fn gate_order_puts_domain_before_labels() {
        let mut safety = SafetyConfig::default();
        safety.vip_domains = vec!["deals.example".into()];
        safety.protected_labels = vec!["INBOX".into()];
        let verdict = evaluate_gates(&safety, &email(), &context());
        assert!(verdict.reason().unwrap().starts_with("protected_domain"));
    }

    #[test]
    fn legal_keyword_protects() {
        let mut e = email();
        e.subject = "Your contract renewal".into();
        let verdict = evaluate_gates(&SafetyConfig::default(), &e, &context());
        assert_eq!(
            verdict,
            SafetyVerdict::Protected {
                reason: "legal_keyword:contract".into()
            }
        );
    }

    #[test]
    fn recent_access_protects() {
        let mut ctx = context();
        ctx.access = Some(AccessSummaryEntity {
            email_id: "e1".into(),
            access_score: 0.1,
            last_accessed: Some(ctx.now - 2 * DAY_MS),
            ..Default::default()
        });
        let verdict = evaluate_gates(&SafetyConfig::default(), &email(), &ctx);
        assert_eq!(
            verdict,
            SafetyVerdict::Protected {
                reason: "recent_access".into()
            }
        );
    }

    #[test]
    fn active_thread_protects() {
        let mut ctx = context();
        ctx.thread_recent_messages = 5;
        let verdict = evaluate_gates(&SafetyConfig::default(), &email(), &ctx);
        assert_eq!(
            verdict,
            SafetyVerdict::Protected {
                reason: "active_thread".into()
            }
        );
    }

    #[test]
    fn oversized_email_requires_confirmation() {
        let mut e = email();
        e.size = Some(30 * 1024 * 1024);
        let verdict = evaluate_gates(&SafetyConfig::default(), &e, &context());
        assert_eq!(
            verdict,
            SafetyVerdict::RequiresConfirmation {
                reason: "large_email".into()
            }
        );
    }

    #[test]
    fn unusual_size_versus_sender_mean_requires_confirmation() {
        let mut e = email();
        e.size = Some(1_000_000);
        let mut ctx = context();
        ctx.sender_mean_size = Some(100_000.0);
        let verdict = evaluate_gates(&SafetyConfig::default(), &e, &ctx);
        assert_eq!(
            verdict,
            SafetyVerdict::RequiresConfirmation {
                reason: "unusual_size".into()
            }
        );
    }
}
