// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::{
    modules::{
        database::{async_find_impl, batch_delete_impl, insert_impl, manager::DB_MANAGER, update_impl},
        error::{code::ErrorCode, MailSweepResult},
    },
    raise_error, utc_now,
};
use itertools::Itertools;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

const EXPIRATION_DURATION_MS: i64 = 24 * 60 * 60 * 1000;

/// One in-flight OAuth authorization, keyed by the CSRF `state` parameter.
/// The callback completes it with the resolved user context, which the
/// host polls for.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct OAuthPendingEntity {
    /// CSRF protection state parameter used to verify the integrity of the
    /// authorization request
    #[primary_key]
    pub state: String,

    /// PKCE code verifier used in the authorization code exchange
    pub code_verifier: String,

    pub completed: bool,
    pub user_id: Option<String>,
    pub session_id: Option<String>,

    pub created_at: i64,
}

impl OAuthPendingEntity {
    pub fn new(state: String, code_verifier: String) -> Self {
        Self {
            state,
            code_verifier,
            completed: false,
            user_id: None,
            session_id: None,
            created_at: utc_now!(),
        }
    }

    pub async fn save(self) -> MailSweepResult<()> {
        insert_impl(DB_MANAGER.meta_db(), self).await
    }

    pub async fn get(state: &str) -> MailSweepResult<Option<OAuthPendingEntity>> {
        async_find_impl::<OAuthPendingEntity>(DB_MANAGER.meta_db(), state.to_string()).await
    }

    pub async fn complete(
        state: &str,
        user_id: String,
        session_id: String,
    ) -> MailSweepResult<()> {
        let state = state.to_string();
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .primary::<OAuthPendingEntity>(state.clone())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(
                            "Unknown OAuth state".into(),
                            ErrorCode::ResourceNotFound
                        )
                    })
            },
            move |current| {
                let mut updated = current.clone();
                updated.completed = true;
                updated.user_id = Some(user_id.clone());
                updated.session_id = Some(session_id.clone());
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }

    pub async fn clean() -> MailSweepResult<()> {
        batch_delete_impl(DB_MANAGER.meta_db(), |rw| {
            let all: Vec<OAuthPendingEntity> = rw
                .scan()
                .primary()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .all()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .try_collect()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

            let now = utc_now!();
            let to_delete: Vec<OAuthPendingEntity> = all
                .into_iter()
                .filter(|e| now - e.created_at > EXPIRATION_DURATION_MS)
                .collect();
            Ok(to_delete)
        })
        .await?;
        Ok(())
    }
}
