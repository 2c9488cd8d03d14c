// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::modules::{
    analyzer::{
        config::{ImportanceConfig, ImportanceRule, RuleKind},
        EmailAnalysisContext,
    },
    email::entity::ImportanceLevel,
};

static NO_REPLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(no-?reply|donotreply)").unwrap());

#[derive(Clone, Debug, PartialEq)]
pub struct ImportanceAnalysis {
    pub score: f64,
    pub level: ImportanceLevel,
    pub matched_rules: Vec<String>,
    pub confidence: f64,
}

/// Rule-based importance scoring. Rules run in descending priority (ties by
/// id ascending); there is no short-circuit, every applicable rule adds its
/// weight. A rule that fails to evaluate is skipped without aborting the
/// analysis.
pub struct ImportanceAnalyzer {
    config: ImportanceConfig,
}

impl ImportanceAnalyzer {
    pub fn new(config: ImportanceConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, context: &EmailAnalysisContext) -> ImportanceAnalysis {
        let mut rules: Vec<&ImportanceRule> = self.config.rules.iter().collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

        let mut score = 0.0;
        let mut matched_rules = Vec::new();
        for rule in rules {
            match Self::rule_matches(rule, context) {
                Ok(true) => {
                    score += rule.weight;
                    matched_rules.push(rule.name.clone());
                }
                Ok(false) => {}
                Err(reason) => {
                    debug!("Importance rule '{}' skipped: {reason}", rule.id);
                }
            }
        }

        let level = if score >= self.config.high_threshold {
            ImportanceLevel::High
        } else if score <= self.config.low_threshold {
            ImportanceLevel::Low
        } else {
            ImportanceLevel::Medium
        };

        let confidence = if matched_rules.is_empty() {
            0.0
        } else {
            (matched_rules.len() as f64 * 0.25 + score.abs() / 10.0).min(1.0)
        };

        ImportanceAnalysis {
            score,
            level,
            matched_rules,
            confidence,
        }
    }

    fn rule_matches(rule: &ImportanceRule, context: &EmailAnalysisContext) -> Result<bool, String> {
        match rule.kind {
            RuleKind::Keyword => {
                let haystack = format!("{} {}", context.email.subject, context.email.snippet);
                for keyword in &rule.keywords {
                    let pattern = format!(r"(?i)\b{}\b", regex::escape(keyword));
                    let re = Regex::new(&pattern).map_err(|e| e.to_string())?;
                    if re.is_match(&haystack) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            RuleKind::Domain => {
                let Some(domain) = &context.sender_domain else {
                    return Ok(false);
                };
                Ok(rule
                    .domains
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(domain)))
            }
            RuleKind::Label => {
                let labels = context.label_set();
                Ok(rule
                    .labels
                    .iter()
                    .any(|candidate| labels.contains(&candidate.to_ascii_uppercase())))
            }
            RuleKind::NoReply => {
                let Some(local) = &context.sender_local_part else {
                    return Ok(false);
                };
                Ok(NO_REPLY_RE.is_match(local))
            }
            RuleKind::LargeAttachment => {
                let min_size = rule
                    .min_size
                    .ok_or_else(|| "largeAttachment rule missing min_size".to_string())?;
                Ok(context.email.has_attachments
                    && context.email.size.unwrap_or(0) >= min_size)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::email::entity::EmailIndex;

    fn context(subject: &str, sender: &str, labels: Vec<&str>) -> EmailAnalysisContext {
        EmailAnalysisContext::at(
            EmailIndex {
                email_id: "e1".into(),
                subject: subject.into(),
                sender: sender.into(),
                labels: labels.into_iter().map(String::from).collect(),
                size: Some(50_000),
                ..Default::default()
            },
            1_700_000_000_000,
        )
    }

    fn analyzer() -> ImportanceAnalyzer {
        ImportanceAnalyzer::new(ImportanceConfig::default())
    }

    #[test]
    fn urgent_keyword_escalates_to_high() {
        let analysis = analyzer().analyze(&context(
            "URGENT: Please review",
            "boss@company.com",
            vec!["INBOX"],
        ));
        assert_eq!(analysis.level, ImportanceLevel::High);
        assert!(analysis
            .matched_rules
            .contains(&"Urgent Keywords".to_string()));
        assert!(analysis.confidence > 0.0);
    }

    #[test]
    fn keyword_matching_requires_whole_words() {
        // "urgently" must not match the whole-word keyword "urgent".
        let analysis = analyzer().analyze(&context(
            "We urgently-ish discussed nothing",
            "peer@company.com",
            vec!["INBOX"],
        ));
        assert!(!analysis
            .matched_rules
            .contains(&"Urgent Keywords".to_string()));
    }

    #[test]
    fn no_reply_sender_pushes_low() {
        let analysis = analyzer().analyze(&context(
            "Your receipt",
            "no-reply@shop.example",
            vec!["INBOX"],
        ));
        assert_eq!(analysis.level, ImportanceLevel::Low);
        assert!(analysis.score < 0.0);
    }

    #[test]
    fn unmatched_email_is_medium_with_zero_confidence() {
        let analysis = analyzer().analyze(&context(
            "Lunch tomorrow?",
            "friend@personal.example",
            vec!["INBOX"],
        ));
        assert_eq!(analysis.level, ImportanceLevel::Medium);
        assert_eq!(analysis.score, 0.0);
        assert_eq!(analysis.confidence, 0.0);
    }

    #[test]
    fn all_applicable_rules_contribute() {
        // IMPORTANT label (+6) and urgent keyword (+10) both count.
        let analysis = analyzer().analyze(&context(
            "urgent deadline",
            "boss@company.com",
            vec!["IMPORTANT"],
        ));
        assert_eq!(analysis.score, 16.0);
        assert_eq!(analysis.matched_rules.len(), 2);
    }

    #[test]
    fn broken_rule_does_not_abort_analysis() {
        let mut config = ImportanceConfig::default();
        // largeAttachment without min_size fails evaluation.
        config.rules.push(ImportanceRule {
            id: "broken".into(),
            name: "Broken".into(),
            kind: RuleKind::LargeAttachment,
            priority: 999,
            weight: 50.0,
            keywords: vec![],
            domains: vec![],
            labels: vec![],
            min_size: None,
        });
        let analysis = ImportanceAnalyzer::new(config).analyze(&context(
            "URGENT: Please review",
            "boss@company.com",
            vec!["INBOX"],
        ));
        assert!(analysis
            .matched_rules
            .contains(&"Urgent Keywords".to_string()));
        assert!(!analysis.matched_rules.contains(&"Broken".to_string()));
    }
}
