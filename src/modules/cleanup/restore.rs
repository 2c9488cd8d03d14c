// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem_openapi::Object;
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        cleanup::audit::{ArchiveRecord, AuditAction, AuditRecord},
        email::entity::EmailIndex,
        error::{code::ErrorCode, MailSweepResult},
        gmail::{restore_messages, GmailApi, TRASH_LABEL},
        user::scope::UserScope,
    },
    raise_error,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct RestoreResult {
    pub restored: u64,
    pub archive_id: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct EmptyTrashResult {
    pub deleted: u64,
    pub dry_run: bool,
}

/// Reverses an archive batch: Gmail-side labels come back and the index
/// rows drop their archived flag. Deleted batches are not restorable; the
/// audit trail still records them.
pub async fn restore_archive<G: GmailApi>(
    scope: &UserScope,
    gmail: Option<&G>,
    archive_id: u64,
) -> MailSweepResult<RestoreResult> {
    let record = ArchiveRecord::get(scope, archive_id).await?;
    if !record.restorable {
        return Err(raise_error!(
            format!("Archive record '{archive_id}' is not restorable"),
            ErrorCode::InvalidParameter
        ));
    }

    if record.method == "gmail" {
        let gmail = gmail.ok_or_else(|| {
            raise_error!(
                "A Gmail client is required to restore a gmail-side archive".into(),
                ErrorCode::MissingConfiguration
            )
        })?;
        restore_messages(gmail, &record.email_ids).await?;
    }

    let restored = EmailIndex::unmark_archived(scope, &record.email_ids).await? as u64;
    ArchiveRecord::mark_restored(scope, archive_id).await?;

    let emails: Vec<EmailIndex> = {
        let mut rows = Vec::new();
        for email_id in &record.email_ids {
            if let Some(email) = EmailIndex::find(scope, email_id).await? {
                rows.push(email);
            }
        }
        rows
    };
    AuditRecord::new(None, None, AuditAction::Restore, &emails, "manual", false)
        .append(scope)
        .await?;

    Ok(RestoreResult {
        restored,
        archive_id: Some(archive_id),
    })
}

/// Restores an explicit id list (emails archived outside a record, or a
/// partial undo).
pub async fn restore_emails<G: GmailApi>(
    scope: &UserScope,
    gmail: Option<&G>,
    email_ids: &[String],
) -> MailSweepResult<RestoreResult> {
    if email_ids.is_empty() {
        return Err(raise_error!(
            "restore_emails requires archive_id or a non-empty email_ids list".into(),
            ErrorCode::InvalidParameter
        ));
    }
    if let Some(gmail) = gmail {
        restore_messages(gmail, email_ids).await?;
    }
    let restored = EmailIndex::unmark_archived(scope, email_ids).await? as u64;
    Ok(RestoreResult {
        restored,
        archive_id: None,
    })
}

/// Permanently deletes messages sitting in the provider's trash. Not
/// restorable from this system; audited.
pub async fn empty_trash<G: GmailApi>(
    scope: &UserScope,
    gmail: &G,
    dry_run: bool,
    max_count: Option<u32>,
) -> MailSweepResult<EmptyTrashResult> {
    let ids = gmail
        .list_message_ids(TRASH_LABEL, max_count.unwrap_or(500))
        .await?;
    if dry_run || ids.is_empty() {
        return Ok(EmptyTrashResult {
            deleted: ids.len() as u64,
            dry_run,
        });
    }

    gmail.batch_delete(&ids).await?;
    EmailIndex::delete_by_ids(scope, &ids).await?;

    let emails: Vec<EmailIndex> = ids
        .iter()
        .map(|id| EmailIndex {
            email_id: id.clone(),
            ..Default::default()
        })
        .collect();
    AuditRecord::new(None, None, AuditAction::EmptyTrash, &emails, "manual", false)
        .append(scope)
        .await?;

    Ok(EmptyTrashResult {
        deleted: ids.len() as u64,
        dry_run,
    })
}
