// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use native_db::*;
use native_model::{native_model, Model};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::{
    generate_token,
    modules::{
        database::{
            async_find_impl, insert_impl, list_all_impl, manager::DB_MANAGER, secondary_find_impl,
            update_impl,
        },
        error::{code::ErrorCode, MailSweepResult},
        settings::cli::SETTINGS,
    },
    raise_error, utc_now, validate_email,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Enum)]
pub enum UserRole {
    Admin,
    #[default]
    Member,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, Object)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct User {
    /// Unique mailbox owner identifier; doubles as the per-user storage key
    #[primary_key]
    pub user_id: String,
    /// Gmail address associated with this mailbox
    #[secondary_key(unique)]
    pub email: String,
    /// Display name for the user (optional)
    pub display_name: Option<String>,
    /// Role gate: the first registered user is promoted to admin
    pub role: UserRole,
    /// Inactive users keep their data but cannot authenticate
    pub active: bool,
    /// Fixed UTC offset used to evaluate cron schedules for this mailbox
    pub timezone_offset_minutes: i32,
    /// Creation timestamp (UNIX epoch milliseconds)
    pub created_at: i64,
    /// Last update timestamp (UNIX epoch milliseconds)
    pub updated_at: i64,
    /// Last successful session validation (UNIX epoch milliseconds)
    pub last_login_at: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, Object)]
pub struct RegisterUserRequest {
    pub email: String,
    pub display_name: Option<String>,
    pub role: Option<UserRole>,
    pub timezone_offset_minutes: Option<i32>,
}

impl User {
    /// Registers a new user. The first user on the instance becomes admin;
    /// every later registration requires an admin caller.
    pub async fn register(
        request: RegisterUserRequest,
        caller: Option<&User>,
    ) -> MailSweepResult<User> {
        validate_email!(&request.email)?;

        let existing_count = Self::count().await?;
        if existing_count > 0 {
            if !SETTINGS.mailsweep_multi_user_mode {
                return Err(raise_error!(
                    "This instance runs in single-user mode and already has a registered user"
                        .into(),
                    ErrorCode::PermissionDenied
                ));
            }
            match caller {
                Some(caller) if caller.role == UserRole::Admin => {}
                _ => {
                    return Err(raise_error!(
                        "Only an admin can register additional users".into(),
                        ErrorCode::PermissionDenied
                    ));
                }
            }
        }

        if Self::find_by_email(&request.email).await?.is_some() {
            return Err(raise_error!(
                format!("A user with email '{}' already exists", request.email),
                ErrorCode::AlreadyExists
            ));
        }

        let offset = request.timezone_offset_minutes.unwrap_or(0);
        if !(-14 * 60..=14 * 60).contains(&offset) {
            return Err(raise_error!(
                "timezone_offset_minutes must be within ±14 hours".into(),
                ErrorCode::InvalidParameter
            ));
        }

        let role = if existing_count == 0 {
            UserRole::Admin
        } else {
            request.role.unwrap_or(UserRole::Member)
        };

        let user = User {
            user_id: format!("u-{}", generate_token!(64).to_lowercase()),
            email: request.email,
            display_name: request.display_name,
            role,
            active: true,
            timezone_offset_minutes: offset,
            created_at: utc_now!(),
            updated_at: utc_now!(),
            last_login_at: None,
        };
        insert_impl(DB_MANAGER.meta_db(), user.clone()).await?;
        Ok(user)
    }

    pub async fn get(user_id: &str) -> MailSweepResult<User> {
        Self::find(user_id).await?.ok_or_else(|| {
            raise_error!(
                format!("User '{user_id}' not found"),
                ErrorCode::ResourceNotFound
            )
        })
    }

    pub async fn find(user_id: &str) -> MailSweepResult<Option<User>> {
        async_find_impl::<User>(DB_MANAGER.meta_db(), user_id.to_string()).await
    }

    pub async fn find_by_email(email: &str) -> MailSweepResult<Option<User>> {
        secondary_find_impl::<User>(DB_MANAGER.meta_db(), UserKey::email, email.to_string()).await
    }

    pub async fn check_active(user_id: &str) -> MailSweepResult<User> {
        let user = Self::get(user_id).await?;
        if !user.active {
            return Err(raise_error!(
                format!("User '{user_id}' is disabled"),
                ErrorCode::UserDisabled
            ));
        }
        Ok(user)
    }

    pub async fn list(active_only: bool) -> MailSweepResult<Vec<User>> {
        let mut users = list_all_impl::<User>(DB_MANAGER.meta_db()).await?;
        if active_only {
            users.retain(|user| user.active);
        }
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    pub async fn count() -> MailSweepResult<usize> {
        Ok(list_all_impl::<User>(DB_MANAGER.meta_db()).await?.len())
    }

    pub async fn touch_login(user_id: &str) -> MailSweepResult<()> {
        let key = user_id.to_string();
        update_impl(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get()
                    .primary::<User>(key.clone())
                    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        raise_error!(format!("User '{key}' not found"), ErrorCode::ResourceNotFound)
                    })
            },
            |current| {
                let mut updated = current.clone();
                updated.last_login_at = Some(utc_now!());
                Ok(updated)
            },
        )
        .await?;
        Ok(())
    }
}
