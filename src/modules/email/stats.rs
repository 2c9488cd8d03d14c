// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;

use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::modules::{
    email::entity::{EmailIndex, SizeCategory},
    error::MailSweepResult,
    user::scope::UserScope,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Enum)]
pub enum StatsGroupBy {
    #[default]
    Category,
    Year,
    Sender,
    Size,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct StatsBucket {
    pub key: String,
    pub count: u64,
    pub size: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct EmailStats {
    pub total: u64,
    pub total_size: u64,
    pub archived: u64,
    pub analyzed: u64,
    pub group_by: StatsGroupBy,
    /// Buckets sorted by count descending; sender grouping keeps the top 20
    pub groups: Vec<StatsBucket>,
}

pub async fn get_email_stats(
    scope: &UserScope,
    group_by: StatsGroupBy,
    include_archived: bool,
) -> MailSweepResult<EmailStats> {
    let emails = EmailIndex::list_all(scope).await?;
    let mut stats = EmailStats {
        group_by,
        ..Default::default()
    };
    let mut buckets: HashMap<String, (u64, u64)> = HashMap::new();

    for email in &emails {
        if email.archived {
            stats.archived += 1;
            if !include_archived {
                continue;
            }
        }
        let size = email.size.unwrap_or(0);
        stats.total += 1;
        stats.total_size += size;
        if email.category.is_some() {
            stats.analyzed += 1;
        }

        let key = match group_by {
            StatsGroupBy::Category => email
                .category
                .map(|c| format!("{c:?}").to_ascii_lowercase())
                .unwrap_or_else(|| "uncategorized".into()),
            StatsGroupBy::Year => email
                .year
                .map(|y| y.to_string())
                .unwrap_or_else(|| "unknown".into()),
            StatsGroupBy::Sender => email.sender.to_ascii_lowercase(),
            StatsGroupBy::Size => {
                let category = email.size_category.unwrap_or(match size {
                    0..=102_400 => SizeCategory::Small,
                    102_401..=1_048_576 => SizeCategory::Medium,
                    _ => SizeCategory::Large,
                });
                format!("{category:?}").to_ascii_lowercase()
            }
        };
        let entry = buckets.entry(key).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += size;
    }

    let mut groups: Vec<StatsBucket> = buckets
        .into_iter()
        .map(|(key, (count, size))| StatsBucket { key, count, size })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then(a.key.cmp(&b.key)));
    if matches!(group_by, StatsGroupBy::Sender) {
        groups.truncate(20);
    }
    stats.groups = groups;
    Ok(stats)
}
