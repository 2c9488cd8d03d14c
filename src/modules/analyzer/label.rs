// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::LazyLock;

use regex::Regex;

use crate::modules::{
    analyzer::{config::LabelClassifierConfig, EmailAnalysisContext},
    email::entity::GmailCategory,
};

static NO_REPLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(no-?reply|donotreply)").unwrap());

#[derive(Clone, Debug, PartialEq)]
pub struct LabelAnalysis {
    pub gmail_category: GmailCategory,
    pub spam_score: f64,
    pub promotional_score: f64,
    pub social_score: f64,
    pub spam_indicators: Vec<String>,
    pub promotional_indicators: Vec<String>,
    pub social_indicators: Vec<String>,
}

/// Maps Gmail labels to a category and derives spam/promotional/social
/// scores with human-readable indicators.
pub struct LabelClassifier {
    config: LabelClassifierConfig,
}

impl LabelClassifier {
    pub fn new(config: LabelClassifierConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, context: &EmailAnalysisContext) -> LabelAnalysis {
        let labels = context.label_set();

        let matched = |set: &[String]| -> Vec<String> {
            set.iter()
                .filter(|candidate| labels.contains(&candidate.to_ascii_uppercase()))
                .cloned()
                .collect()
        };

        let spam_labels = matched(&self.config.spam_labels);
        let promo_labels = matched(&self.config.promotional_labels);
        let social_labels = matched(&self.config.social_labels);

        let mut spam_indicators: Vec<String> =
            spam_labels.iter().map(|l| format!("label:{l}")).collect();
        let mut spam_score = saturating_label_score(spam_labels.len());
        if let Some(local) = &context.sender_local_part {
            if NO_REPLY_RE.is_match(local) {
                spam_score = (spam_score + 0.2).min(1.0);
                spam_indicators.push("sender:no-reply".into());
            }
        }

        let mut promotional_indicators: Vec<String> =
            promo_labels.iter().map(|l| format!("label:{l}")).collect();
        let mut promotional_score = saturating_label_score(promo_labels.len());
        if context
            .email
            .snippet
            .to_ascii_lowercase()
            .contains("unsubscribe")
        {
            promotional_score = (promotional_score + 0.2).min(1.0);
            promotional_indicators.push("snippet:unsubscribe".into());
        }

        let social_indicators: Vec<String> =
            social_labels.iter().map(|l| format!("label:{l}")).collect();
        let social_score = saturating_label_score(social_labels.len());

        let gmail_category = self.pick_category(
            &labels,
            spam_score,
            promotional_score,
            social_score,
        );

        LabelAnalysis {
            gmail_category,
            spam_score,
            promotional_score,
            social_score,
            spam_indicators,
            promotional_indicators,
            social_indicators,
        }
    }

    /// Important labels dominate; otherwise the highest score above its
    /// threshold wins; otherwise the plain updates/forums label sets; else
    /// primary.
    fn pick_category(
        &self,
        labels: &[String],
        spam_score: f64,
        promotional_score: f64,
        social_score: f64,
    ) -> GmailCategory {
        let has = |set: &[String]| {
            set.iter()
                .any(|candidate| labels.contains(&candidate.to_ascii_uppercase()))
        };
        if has(&self.config.important_labels) {
            return GmailCategory::Important;
        }

        let mut best: Option<(GmailCategory, f64)> = None;
        for (category, score, threshold) in [
            (GmailCategory::Spam, spam_score, self.config.spam_threshold),
            (
                GmailCategory::Promotions,
                promotional_score,
                self.config.promotional_threshold,
            ),
            (
                GmailCategory::Social,
                social_score,
                self.config.social_threshold,
            ),
        ] {
            if score >= threshold && best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((category, score));
            }
        }
        if let Some((category, _)) = best {
            return category;
        }

        if has(&self.config.updates_labels) {
            return GmailCategory::Updates;
        }
        if has(&self.config.forums_labels) {
            return GmailCategory::Forums;
        }
        GmailCategory::Primary
    }
}

/// 0 for no matches, then saturating toward 1 as more labels agree.
fn saturating_label_score(match_count: usize) -> f64 {
    if match_count == 0 {
        0.0
    } else {
        1.0 - 0.5_f64.powi(match_count as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::email::entity::EmailIndex;

    fn analyze(sender: &str, snippet: &str, labels: Vec<&str>) -> LabelAnalysis {
        let context = EmailAnalysisContext::at(
            EmailIndex {
                email_id: "e1".into(),
                sender: sender.into(),
                snippet: snippet.into(),
                labels: labels.into_iter().map(String::from).collect(),
                ..Default::default()
            },
            1_700_000_000_000,
        );
        LabelClassifier::new(LabelClassifierConfig::default()).analyze(&context)
    }

    #[test]
    fn spam_labels_and_noreply_sender_stack() {
        let analysis = analyze("noreply@suspicious.com", "", vec!["SPAM", "JUNK"]);
        assert_eq!(analysis.gmail_category, GmailCategory::Spam);
        assert!(analysis.spam_score > 0.9);
        assert!(analysis
            .spam_indicators
            .contains(&"sender:no-reply".to_string()));
    }

    #[test]
    fn important_label_dominates_other_signals() {
        let analysis = analyze("noreply@deals.example", "unsubscribe here", vec![
            "IMPORTANT",
            "CATEGORY_PROMOTIONS",
        ]);
        assert_eq!(analysis.gmail_category, GmailCategory::Important);
    }

    #[test]
    fn unsubscribe_hint_boosts_promotional_score() {
        let plain = analyze("deals@shop.example", "", vec!["CATEGORY_PROMOTIONS"]);
        let hinted = analyze(
            "deals@shop.example",
            "Click to unsubscribe",
            vec!["CATEGORY_PROMOTIONS"],
        );
        assert!(hinted.promotional_score > plain.promotional_score);
        assert_eq!(hinted.gmail_category, GmailCategory::Promotions);
    }

    #[test]
    fn unlabeled_mail_is_primary() {
        let analysis = analyze("friend@personal.example", "hi", vec!["INBOX"]);
        assert_eq!(analysis.gmail_category, GmailCategory::Primary);
        assert_eq!(analysis.spam_score, 0.0);
    }

    #[test]
    fn updates_label_falls_through_scored_classes() {
        let analysis = analyze("ci@builds.example", "", vec!["CATEGORY_UPDATES"]);
        assert_eq!(analysis.gmail_category, GmailCategory::Updates);
    }
}
