// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, LazyLock,
};

use dashmap::DashMap;
use native_db::Database;
use tokio::sync::RwLock;

use crate::{
    modules::{
        database::manager::DB_MANAGER,
        error::{code::ErrorCode, MailSweepResult},
        user::entity::User,
    },
    raise_error,
};

static CLEANUP_LOCKS: LazyLock<DashMap<String, Arc<RwLock<()>>>> = LazyLock::new(DashMap::new);

/// Cooperative cancellation token shared between a running job and the
/// queue facade; checked at batch boundaries and before I/O.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> MailSweepResult<()> {
        if self.is_cancelled() {
            return Err(raise_error!(
                "Operation was cancelled".into(),
                ErrorCode::Cancelled
            ));
        }
        Ok(())
    }
}

/// Everything a core operation needs to act on behalf of one mailbox: the
/// validated user id, that user's store handle, and a cancel token. Core
/// operations take this as their first parameter so cross-user access has
/// no code path.
#[derive(Clone)]
pub struct UserScope {
    pub user_id: String,
    pub db: Arc<Database<'static>>,
    pub cancel: CancellationFlag,
}

impl UserScope {
    /// Attaches to an active user's store.
    pub async fn attach(user_id: &str) -> MailSweepResult<Self> {
        User::check_active(user_id).await?;
        let db = DB_MANAGER.user_db(user_id).await?;
        Ok(Self {
            user_id: user_id.to_string(),
            db,
            cancel: CancellationFlag::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[cfg(test)]
    pub fn for_test(user_id: &str, db: Arc<Database<'static>>) -> Self {
        Self {
            user_id: user_id.to_string(),
            db,
            cancel: CancellationFlag::new(),
        }
    }
}

/// Per-user lock serializing destructive cleanup against analyzer writes:
/// cleanup holds the write half for its whole run, categorization takes the
/// read half around its bulk upserts.
pub fn cleanup_lock(user_id: &str) -> Arc<RwLock<()>> {
    CLEANUP_LOCKS
        .entry(user_id.to_string())
        .or_insert_with(|| Arc::new(RwLock::new(())))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_flag_trips_once_set() {
        let flag = CancellationFlag::new();
        assert!(flag.check().is_ok());
        flag.cancel();
        assert!(flag.is_cancelled());
        assert!(flag.check().is_err());
    }

    #[test]
    fn cleanup_lock_is_shared_per_user() {
        let a = cleanup_lock("u-one");
        let b = cleanup_lock("u-one");
        let c = cleanup_lock("u-two");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
