use std::time::Duration;

use crate::modules::{
    access, cleanup::audit::DailyCleanupMetrics, database::manager::DB_MANAGER,
    jobs::periodic::PeriodicTask, oauth2::pending::OAuthPendingEntity,
    oauth2::refresh::OAuthRefreshTask, user::scope::UserScope, user::session::Session,
};

/// Long-running maintenance loops started once at boot.
pub struct PeriodicJanitors;

impl PeriodicJanitors {
    pub fn start_background_tasks() {
        OAuthRefreshTask::start();

        PeriodicTask::new("oauth-pending-clean").start(
            || async { OAuthPendingEntity::clean().await },
            Duration::from_secs(60 * 60),
            false,
            false,
        );

        PeriodicTask::new("session-clean").start(
            || async { Session::clean_expired().await },
            Duration::from_secs(30 * 60),
            false,
            false,
        );

        PeriodicTask::new("access-summary-flush").start(
            || async {
                for user_id in access::pending_users() {
                    access::flush_user_summaries(&user_id).await;
                }
                Ok(())
            },
            Duration::from_secs(30),
            false,
            false,
        );

        PeriodicTask::new("cleanup-metrics-retention").start(
            || async {
                for user_id in DB_MANAGER.open_users() {
                    let db = DB_MANAGER.user_db(&user_id).await?;
                    let scope = UserScope {
                        user_id,
                        db,
                        cancel: Default::default(),
                    };
                    DailyCleanupMetrics::clean_old(&scope, 90).await?;
                }
                Ok(())
            },
            Duration::from_secs(24 * 60 * 60),
            false,
            false,
        );
    }
}
