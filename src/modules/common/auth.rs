// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use poem::{Endpoint, FromRequest, Middleware, Request, RequestBody, Result};

use crate::{
    modules::{
        error::{code::ErrorCode, MailSweepResult},
        rest::create_api_error_response,
        user::{
            entity::{User, UserRole},
            session::Session,
        },
    },
    raise_error,
};

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const SESSION_ID_HEADER: &str = "X-Session-Id";

/// Tool paths dispatchable without a validated session.
const PUBLIC_PATHS: &[&str] = &[
    "/api/v1/authenticate",
    "/api/v1/poll-user-context",
    "/api/v1/register-user",
    "/api/v1/system-health",
    "/api/v1/list-users",
];

pub struct ApiGuard;

pub struct ApiGuardEndpoint<E> {
    ep: E,
}

impl<E: Endpoint> Middleware<E> for ApiGuard {
    type Output = ApiGuardEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        ApiGuardEndpoint { ep }
    }
}

impl<E: Endpoint> Endpoint for ApiGuardEndpoint<E> {
    type Output = E::Output;

    async fn call(&self, mut req: Request) -> Result<Self::Output> {
        if PUBLIC_PATHS.contains(&req.uri().path()) {
            return self.ep.call(req).await;
        }
        let context = extract_user_context(&req).await?;
        req.set_data(Arc::new(context));
        self.ep.call(req).await
    }
}

/// The session-validated caller identity attached to every authenticated
/// tool invocation.
#[derive(Clone, Debug)]
pub struct UserContext {
    pub user: User,
    pub session_id: String,
}

impl UserContext {
    pub fn require_admin(&self) -> MailSweepResult<()> {
        if self.user.role == UserRole::Admin {
            Ok(())
        } else {
            Err(raise_error!(
                "Admin role required".into(),
                ErrorCode::PermissionDenied
            ))
        }
    }
}

impl<'a> FromRequest<'a> for UserContext {
    async fn from_request(req: &'a Request, _body: &mut RequestBody) -> Result<Self> {
        if let Some(context) = req.data::<Arc<UserContext>>() {
            return Ok(context.as_ref().clone());
        }
        extract_user_context(req).await
    }
}

async fn extract_user_context(req: &Request) -> Result<UserContext> {
    let user_id = header_value(req, USER_ID_HEADER);
    let session_id = header_value(req, SESSION_ID_HEADER);

    let (user_id, session_id) = match (user_id, session_id) {
        (Some(user_id), Some(session_id)) => (user_id, session_id),
        _ => {
            return Err(create_api_error_response(
                "Missing user context headers",
                ErrorCode::Unauthenticated,
            ));
        }
    };

    let user = Session::validate(&user_id, &session_id)
        .await
        .map_err(|error| create_api_error_response(&error.to_string(), error.code()))?;

    Ok(UserContext { user, session_id })
}

fn header_value(req: &Request, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
