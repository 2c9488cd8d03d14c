// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::modules::{
    database::{count_primary_filter_impl, scan_primary_filter_impl},
    email::entity::{EmailCategory, EmailIndex},
    error::MailSweepResult,
    user::scope::UserScope,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct SizeRange {
    /// Inclusive lower bound in bytes
    pub min: Option<u64>,
    /// Inclusive upper bound in bytes
    pub max: Option<u64>,
}

/// Declarative filter over the email index. Every field is optional; unset
/// fields do not constrain the result. The predicate runs inside the store
/// scan so whole tables never cross the async boundary.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct SearchCriteria {
    pub category: Option<EmailCategory>,
    pub year: Option<i32>,
    pub year_range: Option<YearRange>,
    pub size_range: Option<SizeRange>,
    pub archived: Option<bool>,
    /// Case-insensitive substring match on the sender address
    pub sender: Option<String>,
    /// Every listed label must be present (case-insensitive)
    pub labels: Option<Vec<String>>,
    pub has_attachments: Option<bool>,
    /// Case-insensitive substring match on subject or snippet
    pub text: Option<String>,
}

impl SearchCriteria {
    pub fn matches(&self, email: &EmailIndex) -> bool {
        if let Some(category) = self.category {
            if email.category != Some(category) {
                return false;
            }
        }
        if let Some(year) = self.year {
            if email.year != Some(year) {
                return false;
            }
        }
        if let Some(range) = &self.year_range {
            match email.year {
                Some(year) if year >= range.start && year <= range.end => {}
                _ => return false,
            }
        }
        if let Some(range) = &self.size_range {
            let size = email.size.unwrap_or(0);
            if let Some(min) = range.min {
                if size < min {
                    return false;
                }
            }
            if let Some(max) = range.max {
                if size > max {
                    return false;
                }
            }
        }
        if let Some(archived) = self.archived {
            if email.archived != archived {
                return false;
            }
        }
        if let Some(sender) = &self.sender {
            if !email
                .sender
                .to_ascii_lowercase()
                .contains(&sender.to_ascii_lowercase())
            {
                return false;
            }
        }
        if let Some(labels) = &self.labels {
            let have: Vec<String> = email
                .labels
                .iter()
                .map(|l| l.to_ascii_lowercase())
                .collect();
            if !labels
                .iter()
                .all(|wanted| have.contains(&wanted.to_ascii_lowercase()))
            {
                return false;
            }
        }
        if let Some(has_attachments) = self.has_attachments {
            if email.has_attachments != has_attachments {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_ascii_lowercase();
            if !email.subject.to_ascii_lowercase().contains(&needle)
                && !email.snippet.to_ascii_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

pub async fn search_emails(
    scope: &UserScope,
    criteria: &SearchCriteria,
    limit: Option<usize>,
    offset: Option<usize>,
) -> MailSweepResult<Vec<EmailIndex>> {
    let criteria = criteria.clone();
    let mut matches =
        scan_primary_filter_impl::<EmailIndex>(&scope.db, move |email| criteria.matches(email))
            .await?;
    matches.sort_by(|a, b| b.date.cmp(&a.date));
    let offset = offset.unwrap_or(0);
    let matches: Vec<EmailIndex> = matches
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    Ok(matches)
}

pub async fn count_emails(scope: &UserScope, criteria: &SearchCriteria) -> MailSweepResult<usize> {
    let criteria = criteria.clone();
    count_primary_filter_impl::<EmailIndex>(&scope.db, move |email| criteria.matches(email)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(id: &str) -> EmailIndex {
        EmailIndex {
            email_id: id.to_string(),
            subject: "Quarterly report".into(),
            sender: "Alice <alice@example.com>".into(),
            snippet: "please find attached".into(),
            labels: vec!["INBOX".into(), "IMPORTANT".into()],
            size: Some(2048),
            year: Some(2024),
            has_attachments: true,
            ..Default::default()
        }
    }

    #[test]
    fn empty_criteria_match_everything() {
        assert!(SearchCriteria::default().matches(&email("e1")));
    }

    #[test]
    fn sender_match_is_case_insensitive_substring() {
        let criteria = SearchCriteria {
            sender: Some("ALICE@".into()),
            ..Default::default()
        };
        assert!(criteria.matches(&email("e1")));
    }

    #[test]
    fn labels_require_subset() {
        let mut criteria = SearchCriteria {
            labels: Some(vec!["inbox".into(), "important".into()]),
            ..Default::default()
        };
        assert!(criteria.matches(&email("e1")));
        criteria.labels = Some(vec!["inbox".into(), "spam".into()]);
        assert!(!criteria.matches(&email("e1")));
    }

    #[test]
    fn text_matches_subject_or_snippet() {
        let criteria = SearchCriteria {
            text: Some("attached".into()),
            ..Default::default()
        };
        assert!(criteria.matches(&email("e1")));
        let criteria = SearchCriteria {
            text: Some("nowhere".into()),
            ..Default::default()
        };
        assert!(!criteria.matches(&email("e1")));
    }

    #[test]
    fn year_range_and_size_range_bound_matches() {
        let criteria = SearchCriteria {
            year_range: Some(YearRange {
                start: 2023,
                end: 2024,
            }),
            size_range: Some(SizeRange {
                min: Some(1024),
                max: Some(4096),
            }),
            ..Default::default()
        };
        assert!(criteria.matches(&email("e1")));
        let criteria = SearchCriteria {
            size_range: Some(SizeRange {
                min: Some(10_000),
                max: None,
            }),
            ..Default::default()
        };
        assert!(!criteria.matches(&email("e1")));
    }
}
