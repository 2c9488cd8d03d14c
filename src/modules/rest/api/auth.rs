// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem_openapi::{param::Query, payload::Json, Object, OpenApi};
use serde::{Deserialize, Serialize};

use crate::modules::oauth2::flow::{
    begin_authorization, poll, AuthenticateResponse, PollResponse,
};
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::ApiResult;

#[derive(Clone, Debug, Default, Serialize, Deserialize, Object)]
pub struct AuthenticateRequest {
    /// OAuth scopes to request; defaults to gmail.modify
    pub scopes: Option<Vec<String>>,
}

pub struct AuthApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::Auth")]
impl AuthApi {
    /// Begin the OAuth authorization flow for a mailbox
    #[oai(path = "/authenticate", method = "post", operation_id = "authenticate")]
    async fn authenticate(
        &self,
        payload: Json<AuthenticateRequest>,
    ) -> ApiResult<Json<AuthenticateResponse>> {
        Ok(Json(begin_authorization(payload.0.scopes).await?))
    }

    /// Poll for the user context produced by a completed authorization
    #[oai(
        path = "/poll-user-context",
        method = "get",
        operation_id = "poll_user_context"
    )]
    async fn poll_user_context(
        &self,
        /// The state returned by authenticate
        state: Query<String>,
    ) -> ApiResult<Json<PollResponse>> {
        Ok(Json(poll(&state.0).await?))
    }
}
