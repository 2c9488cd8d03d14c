// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::Duration;

use tracing::warn;

use crate::modules::{
    error::MailSweepResult,
    jobs::periodic::PeriodicTask,
    oauth2::{flow::refresh_user_token, token::TokenStore},
};

const REFRESH_WINDOW_MS: i64 = 10 * 60 * 1000;

/// Proactively renews access tokens nearing expiry so workers rarely hit a
/// 401 mid-batch.
pub struct OAuthRefreshTask;

impl OAuthRefreshTask {
    pub fn start() {
        PeriodicTask::new("oauth-token-refresh").start(
            || async { refresh_expiring_tokens().await },
            Duration::from_secs(5 * 60),
            false,
            false,
        );
    }
}

async fn refresh_expiring_tokens() -> MailSweepResult<()> {
    for user_id in TokenStore::authorized_users().await? {
        match TokenStore::load(&user_id).await {
            Ok(Some(token)) if token.expires_within_ms(REFRESH_WINDOW_MS) => {
                if token.refresh_token.is_none() {
                    continue;
                }
                if let Err(e) = refresh_user_token(&user_id).await {
                    warn!("Token refresh failed for '{}': {:?}", user_id, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping token refresh for '{}': {:?}", user_id, e),
        }
    }
    Ok(())
}
