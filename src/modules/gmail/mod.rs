// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::future::Future;

use crate::modules::error::MailSweepResult;

pub mod client;

pub const INBOX_LABEL: &str = "INBOX";
pub const TRASH_LABEL: &str = "TRASH";

/// The provider contract the cleanup core consumes: modify/trash/delete by
/// message id plus a trash listing. Batching inside an implementation is
/// an optimization, not part of the contract.
pub trait GmailApi: Send + Sync {
    fn batch_modify(
        &self,
        ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> impl Future<Output = MailSweepResult<()>> + Send;

    fn batch_trash(&self, ids: &[String]) -> impl Future<Output = MailSweepResult<()>> + Send;

    fn batch_untrash(&self, ids: &[String]) -> impl Future<Output = MailSweepResult<()>> + Send;

    /// Permanent removal; not restorable from this system.
    fn batch_delete(&self, ids: &[String]) -> impl Future<Output = MailSweepResult<()>> + Send;

    fn list_message_ids(
        &self,
        label_id: &str,
        max_results: u32,
    ) -> impl Future<Output = MailSweepResult<Vec<String>>> + Send;
}

/// Archive in Gmail terms: drop the inbox label.
pub async fn archive_messages<G: GmailApi>(gmail: &G, ids: &[String]) -> MailSweepResult<()> {
    gmail
        .batch_modify(ids, &[], &[INBOX_LABEL.to_string()])
        .await
}

/// Restore in Gmail terms: untrash (harmless for archived mail) and put
/// the inbox label back.
pub async fn restore_messages<G: GmailApi>(gmail: &G, ids: &[String]) -> MailSweepResult<()> {
    gmail.batch_untrash(ids).await?;
    gmail
        .batch_modify(ids, &[INBOX_LABEL.to_string()], &[])
        .await
}
