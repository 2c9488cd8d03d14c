// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

use crate::{
    generate_token,
    modules::{
        database::{async_find_impl, batch_delete_impl, insert_impl, manager::DB_MANAGER},
        error::{code::ErrorCode, MailSweepResult},
        settings::cli::SETTINGS,
        user::entity::User,
    },
    raise_error, utc_now,
};
use itertools::Itertools;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 2, version = 1)]
#[native_db]
pub struct Session {
    #[primary_key]
    pub session_id: String,
    #[secondary_key]
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Session {
    pub async fn issue(user_id: &str) -> MailSweepResult<Session> {
        let ttl_ms = SETTINGS.mailsweep_session_ttl_minutes as i64 * 60 * 1000;
        let session = Session {
            session_id: format!("s-{}", generate_token!(128).to_lowercase()),
            user_id: user_id.to_string(),
            created_at: utc_now!(),
            expires_at: utc_now!() + ttl_ms,
        };
        insert_impl(DB_MANAGER.meta_db(), session.clone()).await?;
        Ok(session)
    }

    /// Validates a `(user_id, session_id)` pair and returns the active user.
    /// Every authenticated tool call funnels through here.
    pub async fn validate(user_id: &str, session_id: &str) -> MailSweepResult<User> {
        let session = async_find_impl::<Session>(DB_MANAGER.meta_db(), session_id.to_string())
            .await?
            .ok_or_else(|| raise_error!("Unknown session".into(), ErrorCode::Unauthenticated))?;

        if session.user_id != user_id {
            // A valid session presented with the wrong user id is a
            // cross-user access attempt, not a stale login.
            return Err(raise_error!(
                "Session does not belong to the requesting user".into(),
                ErrorCode::PermissionDenied
            ));
        }
        if session.expires_at <= utc_now!() {
            return Err(raise_error!(
                "Session has expired".into(),
                ErrorCode::SessionExpired
            ));
        }
        User::check_active(user_id).await
    }

    pub async fn clean_expired() -> MailSweepResult<()> {
        batch_delete_impl(DB_MANAGER.meta_db(), |rw| {
            let all: Vec<Session> = rw
                .scan()
                .primary()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .all()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .try_collect()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            let now = utc_now!();
            Ok(all
                .into_iter()
                .filter(|session| session.expires_at <= now)
                .collect())
        })
        .await?;
        Ok(())
    }
}
