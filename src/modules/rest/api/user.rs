// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem::Request;
use poem_openapi::{param::Query, payload::Json, Object, OpenApi};
use serde::{Deserialize, Serialize};

use crate::modules::common::auth::{UserContext, SESSION_ID_HEADER, USER_ID_HEADER};
use crate::modules::common::paginated::paginate_vec;
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::response::DataPage;
use crate::modules::rest::ApiResult;
use crate::modules::user::entity::{RegisterUserRequest, User, UserRole};
use crate::modules::user::session::Session;

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: UserRole,
    pub active: bool,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            active: user.active,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct SwitchUserRequest {
    pub target_user_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct SwitchUserResponse {
    pub user_id: String,
    pub session_id: String,
}

pub struct UserApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::User")]
impl UserApi {
    /// Register a user. The first registration bootstraps the admin; later
    /// registrations require an admin session.
    #[oai(path = "/register-user", method = "post", operation_id = "register_user")]
    async fn register_user(
        &self,
        payload: Json<RegisterUserRequest>,
        request: &Request,
    ) -> ApiResult<Json<UserProfile>> {
        // The endpoint is outside the session guard so the very first user
        // can register; a caller context is honored when presented.
        let caller = match (
            request.headers().get(USER_ID_HEADER),
            request.headers().get(SESSION_ID_HEADER),
        ) {
            (Some(user_id), Some(session_id)) => {
                let user_id = user_id.to_str().unwrap_or_default().to_string();
                let session_id = session_id.to_str().unwrap_or_default().to_string();
                Some(Session::validate(&user_id, &session_id).await?)
            }
            _ => None,
        };
        let user = User::register(payload.0, caller.as_ref()).await?;
        Ok(Json(user.into()))
    }

    /// Profile of the caller, or of another user for admins
    #[oai(
        path = "/user-profile",
        method = "get",
        operation_id = "get_user_profile"
    )]
    async fn get_user_profile(
        &self,
        target_user_id: Query<Option<String>>,
        context: UserContext,
    ) -> ApiResult<Json<UserProfile>> {
        match target_user_id.0 {
            Some(target) if target != context.user.user_id => {
                context.require_admin()?;
                Ok(Json(User::get(&target).await?.into()))
            }
            _ => Ok(Json(context.user.into())),
        }
    }

    /// Issue a session for another user (admin only)
    #[oai(path = "/switch-user", method = "post", operation_id = "switch_user")]
    async fn switch_user(
        &self,
        payload: Json<SwitchUserRequest>,
        context: UserContext,
    ) -> ApiResult<Json<SwitchUserResponse>> {
        context.require_admin()?;
        let target = User::check_active(&payload.0.target_user_id).await?;
        let session = Session::issue(&target.user_id).await?;
        Ok(Json(SwitchUserResponse {
            user_id: target.user_id,
            session_id: session.session_id,
        }))
    }

    /// List registered users with optional pagination
    #[oai(path = "/list-users", method = "get", operation_id = "list_users")]
    async fn list_users(
        &self,
        active_only: Query<Option<bool>>,
        page: Query<Option<u64>>,
        page_size: Query<Option<u64>>,
    ) -> ApiResult<Json<DataPage<UserProfile>>> {
        let users: Vec<UserProfile> = User::list(active_only.0.unwrap_or(false))
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let page_data = paginate_vec(&users, page.0, page_size.0).map(DataPage::from)?;
        Ok(Json(page_data))
    }
}
