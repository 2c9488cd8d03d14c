// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use chrono::{DateTime, Datelike, Utc};
use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        database::{
            async_find_impl, batch_delete_impl, batch_update_impl, batch_upsert_impl,
            insert_impl, list_all_impl,
        },
        error::{code::ErrorCode, MailSweepResult},
        user::scope::UserScope,
    },
    raise_error, utc_now,
};

/// Final fused category of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum EmailCategory {
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum ImportanceLevel {
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum AgeCategory {
    Recent,
    Moderate,
    Old,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, Enum)]
pub enum GmailCategory {
    Important,
    Promotions,
    Social,
    Updates,
    Forums,
    Spam,
    Primary,
}

/// One row per message. Envelope fields come from ingest; analyzer fields
/// stay unset until a categorization job fills them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 10, version = 1)]
#[native_db]
pub struct EmailIndex {
    #[primary_key]
    pub email_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub recipients: Vec<String>,
    /// Envelope date (UNIX epoch milliseconds); absent when the provider
    /// did not report one
    pub date: Option<i64>,
    /// Derived from `date` at upsert time
    pub year: Option<i32>,
    /// Message size in bytes
    pub size: Option<u64>,
    pub has_attachments: bool,
    pub labels: Vec<String>,
    pub snippet: String,

    pub archived: bool,
    pub archive_date: Option<i64>,
    pub archive_location: Option<String>,

    pub importance_score: Option<f64>,
    pub importance_level: Option<ImportanceLevel>,
    pub importance_matched_rules: Vec<String>,
    pub importance_confidence: Option<f64>,
    pub age_category: Option<AgeCategory>,
    pub size_category: Option<SizeCategory>,
    pub recency_score: Option<f64>,
    pub size_penalty: Option<f64>,
    pub gmail_category: Option<GmailCategory>,
    pub spam_score: Option<f64>,
    pub promotional_score: Option<f64>,
    pub social_score: Option<f64>,
    pub spam_indicators: Vec<String>,
    pub promotional_indicators: Vec<String>,
    pub social_indicators: Vec<String>,

    pub analysis_timestamp: Option<i64>,
    pub analysis_version: Option<String>,
    pub category: Option<EmailCategory>,
}

impl EmailIndex {
    /// Row-level invariants checked before every write.
    fn validate(&self) -> MailSweepResult<()> {
        if self.email_id.is_empty() {
            return Err(raise_error!(
                "email_id must not be empty".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if self.category.is_some()
            && (self.analysis_timestamp.is_none() || self.analysis_version.is_none())
        {
            return Err(raise_error!(
                format!(
                    "Email '{}' has a category but no analysis metadata",
                    self.email_id
                ),
                ErrorCode::InvalidParameter
            ));
        }
        if self.archived && self.archive_date.is_none() {
            return Err(raise_error!(
                format!("Email '{}' is archived without an archive date", self.email_id),
                ErrorCode::InvalidParameter
            ));
        }
        Ok(())
    }

    fn with_derived_year(mut self) -> Self {
        if self.year.is_none() {
            self.year = self
                .date
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(|d| d.year());
        }
        self
    }

    pub async fn upsert(scope: &UserScope, row: EmailIndex) -> MailSweepResult<()> {
        Self::bulk_upsert(scope, vec![row]).await
    }

    /// Idempotent by `email_id`: re-ingesting the same rows leaves the
    /// store unchanged.
    pub async fn bulk_upsert(scope: &UserScope, rows: Vec<EmailIndex>) -> MailSweepResult<()> {
        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row.with_derived_year();
            row.validate()?;
            prepared.push(row);
        }
        batch_upsert_impl(&scope.db, prepared).await
    }

    pub async fn get(scope: &UserScope, email_id: &str) -> MailSweepResult<EmailIndex> {
        Self::find(scope, email_id).await?.ok_or_else(|| {
            raise_error!(
                format!("Email '{email_id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn find(scope: &UserScope, email_id: &str) -> MailSweepResult<Option<EmailIndex>> {
        async_find_impl::<EmailIndex>(&scope.db, email_id.to_string()).await
    }

    pub async fn list_all(scope: &UserScope) -> MailSweepResult<Vec<EmailIndex>> {
        list_all_impl::<EmailIndex>(&scope.db).await
    }

    pub async fn mark_archived(
        scope: &UserScope,
        email_ids: &[String],
        location: Option<String>,
    ) -> MailSweepResult<usize> {
        let ids: Vec<String> = email_ids.to_vec();
        let changed = batch_update_impl(
            &scope.db,
            move |rw| {
                let mut targets = Vec::with_capacity(ids.len());
                for id in &ids {
                    if let Some(row) = rw
                        .get()
                        .primary::<EmailIndex>(id.clone())
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    {
                        targets.push(row);
                    }
                }
                Ok(targets)
            },
            move |targets| {
                let now = utc_now!();
                Ok(targets
                    .iter()
                    .map(|row| {
                        let mut updated = row.clone();
                        updated.archived = true;
                        updated.archive_date = Some(now);
                        updated.archive_location = location.clone();
                        (row.clone(), updated)
                    })
                    .collect())
            },
        )
        .await?;
        Ok(changed.len())
    }

    /// Reverses `mark_archived` for restore; archive metadata is cleared.
    pub async fn unmark_archived(
        scope: &UserScope,
        email_ids: &[String],
    ) -> MailSweepResult<usize> {
        let ids: Vec<String> = email_ids.to_vec();
        let changed = batch_update_impl(
            &scope.db,
            move |rw| {
                let mut targets = Vec::with_capacity(ids.len());
                for id in &ids {
                    if let Some(row) = rw
                        .get()
                        .primary::<EmailIndex>(id.clone())
                        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    {
                        targets.push(row);
                    }
                }
                Ok(targets)
            },
            move |targets| {
                Ok(targets
                    .iter()
                    .map(|row| {
                        let mut updated = row.clone();
                        updated.archived = false;
                        updated.archive_date = None;
                        updated.archive_location = None;
                        (row.clone(), updated)
                    })
                    .collect())
            },
        )
        .await?;
        Ok(changed.len())
    }

    pub async fn delete_by_ids(scope: &UserScope, email_ids: &[String]) -> MailSweepResult<usize> {
        let ids: Vec<String> = email_ids.to_vec();
        batch_delete_impl(&scope.db, move |rw| {
            let mut targets = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(row) = rw
                    .get()
                    .primary::<EmailIndex>(id.clone())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                {
                    targets.push(row);
                }
            }
            Ok(targets)
        })
        .await
    }
}

/// A named, persisted search per user.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
#[native_model(id = 17, version = 1)]
#[native_db]
pub struct SavedSearch {
    #[primary_key]
    pub name: String,
    pub criteria: String,
    pub created_at: i64,
}

impl SavedSearch {
    pub async fn save(scope: &UserScope, name: &str, criteria_json: String) -> MailSweepResult<()> {
        if name.trim().is_empty() {
            return Err(raise_error!(
                "Saved search name must not be empty".into(),
                ErrorCode::InvalidParameter
            ));
        }
        if async_find_impl::<SavedSearch>(&scope.db, name.to_string())
            .await?
            .is_some()
        {
            return Err(raise_error!(
                format!("A saved search named '{name}' already exists"),
                ErrorCode::AlreadyExists
            ));
        }
        insert_impl(
            &scope.db,
            SavedSearch {
                name: name.to_string(),
                criteria: criteria_json,
                created_at: utc_now!(),
            },
        )
        .await
    }

    pub async fn list(scope: &UserScope) -> MailSweepResult<Vec<SavedSearch>> {
        let mut all = list_all_impl::<SavedSearch>(&scope.db).await?;
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}
