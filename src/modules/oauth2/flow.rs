// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse,
    TokenUrl,
};
use poem_openapi::{Enum, Object};
use serde::{Deserialize, Serialize};

use crate::{
    modules::{
        error::{code::ErrorCode, MailSweepResult},
        oauth2::{
            pending::OAuthPendingEntity,
            token::{StoredToken, TokenStore},
        },
        settings::cli::SETTINGS,
        user::{
            entity::{RegisterUserRequest, User},
            session::Session,
        },
    },
    raise_error, utc_now,
};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GMAIL_PROFILE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/profile";
const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.modify"];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Object)]
pub struct AuthenticateResponse {
    pub auth_url: String,
    pub state: String,
    pub instructions: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Enum)]
pub enum PollStatus {
    Success,
    Pending,
    NotFound,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct PolledUserContext {
    pub user_id: String,
    pub session_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Object)]
pub struct PollResponse {
    pub status: PollStatus,
    pub user_context: Option<PolledUserContext>,
}

fn oauth_client() -> MailSweepResult<
    BasicClient<
        oauth2::EndpointSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointSet,
    >,
> {
    let client_id = SETTINGS.mailsweep_google_client_id.clone().ok_or_else(|| {
        raise_error!(
            "GOOGLE_CLIENT_ID is not configured".into(),
            ErrorCode::MissingConfiguration
        )
    })?;
    let client_secret = SETTINGS
        .mailsweep_google_client_secret
        .clone()
        .ok_or_else(|| {
            raise_error!(
                "GOOGLE_CLIENT_SECRET is not configured".into(),
                ErrorCode::MissingConfiguration
            )
        })?;
    let redirect_uri = SETTINGS
        .mailsweep_google_redirect_uri
        .clone()
        .ok_or_else(|| {
            raise_error!(
                "GOOGLE_REDIRECT_URI is not configured".into(),
                ErrorCode::MissingConfiguration
            )
        })?;

    Ok(BasicClient::new(ClientId::new(client_id))
        .set_client_secret(ClientSecret::new(client_secret))
        .set_auth_uri(
            AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?,
        )
        .set_token_uri(
            TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?,
        )
        .set_redirect_uri(
            RedirectUrl::new(redirect_uri)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InvalidParameter))?,
        ))
}

fn http_client() -> MailSweepResult<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}

/// Starts the authorization-code + PKCE flow and persists the pending
/// state for the callback and the poller.
pub async fn begin_authorization(
    scopes: Option<Vec<String>>,
) -> MailSweepResult<AuthenticateResponse> {
    let client = oauth_client()?;
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let scopes: Vec<Scope> = scopes
        .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect())
        .into_iter()
        .map(Scope::new)
        .collect();

    let mut request = client.authorize_url(CsrfToken::new_random);
    for scope in scopes {
        request = request.add_scope(scope);
    }
    let (auth_url, csrf_token) = request
        .set_pkce_challenge(pkce_challenge)
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .url();

    let state = csrf_token.secret().to_string();
    OAuthPendingEntity::new(state.clone(), pkce_verifier.secret().to_string())
        .save()
        .await?;

    Ok(AuthenticateResponse {
        auth_url: auth_url.to_string(),
        state,
        instructions:
            "Open auth_url in a browser, grant access, then poll poll-user-context with the state"
                .into(),
    })
}

/// Completes the flow for a callback hit: exchanges the code, stores the
/// encrypted token file, resolves the mailbox owner and issues a session.
pub async fn handle_callback(code: &str, state: &str) -> MailSweepResult<PolledUserContext> {
    let pending = OAuthPendingEntity::get(state).await?.ok_or_else(|| {
        raise_error!(
            "Unknown or expired OAuth state".into(),
            ErrorCode::ResourceNotFound
        )
    })?;

    let client = oauth_client()?;
    let http = http_client()?;
    let token_response = client
        .exchange_code(AuthorizationCode::new(code.to_string()))
        .set_pkce_verifier(PkceCodeVerifier::new(pending.code_verifier.clone()))
        .request_async(&http)
        .await
        .map_err(|e| {
            raise_error!(
                format!("OAuth code exchange failed: {e}"),
                ErrorCode::Unauthenticated
            )
        })?;

    let access_token = token_response.access_token().secret().to_string();
    let email = fetch_profile_email(&access_token).await?;

    let user = match User::find_by_email(&email).await? {
        Some(user) => user,
        None => {
            User::register(
                RegisterUserRequest {
                    email: email.clone(),
                    display_name: None,
                    role: None,
                    timezone_offset_minutes: None,
                },
                None,
            )
            .await?
        }
    };

    let stored = StoredToken {
        access_token,
        refresh_token: token_response
            .refresh_token()
            .map(|token| token.secret().to_string()),
        expires_at: utc_now!()
            + token_response
                .expires_in()
                .map(|d| d.as_millis() as i64)
                .unwrap_or(55 * 60 * 1000),
        scopes: token_response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default(),
        updated_at: utc_now!(),
    };
    TokenStore::store(&user.user_id, &stored).await?;

    let session = Session::issue(&user.user_id).await?;
    User::touch_login(&user.user_id).await?;
    OAuthPendingEntity::complete(state, user.user_id.clone(), session.session_id.clone()).await?;

    Ok(PolledUserContext {
        user_id: user.user_id,
        session_id: session.session_id,
    })
}

pub async fn poll(state: &str) -> MailSweepResult<PollResponse> {
    match OAuthPendingEntity::get(state).await? {
        None => Ok(PollResponse {
            status: PollStatus::NotFound,
            user_context: None,
        }),
        Some(pending) if pending.completed => Ok(PollResponse {
            status: PollStatus::Success,
            user_context: match (pending.user_id, pending.session_id) {
                (Some(user_id), Some(session_id)) => Some(PolledUserContext {
                    user_id,
                    session_id,
                }),
                _ => None,
            },
        }),
        Some(_) => Ok(PollResponse {
            status: PollStatus::Pending,
            user_context: None,
        }),
    }
}

/// Exchanges the stored refresh token for a fresh access token. Surfaces
/// `Unauthenticated` when no refresh token exists or Google rejects it.
pub async fn refresh_user_token(user_id: &str) -> MailSweepResult<StoredToken> {
    let current = TokenStore::require(user_id).await?;
    let refresh_token = current.refresh_token.clone().ok_or_else(|| {
        raise_error!(
            format!("No refresh token on file for '{user_id}'"),
            ErrorCode::Unauthenticated
        )
    })?;

    let client = oauth_client()?;
    let http = http_client()?;
    let token_response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
        .request_async(&http)
        .await
        .map_err(|e| {
            raise_error!(
                format!("OAuth token refresh failed: {e}"),
                ErrorCode::Unauthenticated
            )
        })?;

    let refreshed = StoredToken {
        access_token: token_response.access_token().secret().to_string(),
        refresh_token: token_response
            .refresh_token()
            .map(|token| token.secret().to_string())
            .or(Some(refresh_token)),
        expires_at: utc_now!()
            + token_response
                .expires_in()
                .map(|d| d.as_millis() as i64)
                .unwrap_or(55 * 60 * 1000),
        scopes: current.scopes,
        updated_at: utc_now!(),
    };
    TokenStore::store(user_id, &refreshed).await?;
    Ok(refreshed)
}

async fn fetch_profile_email(access_token: &str) -> MailSweepResult<String> {
    #[derive(Deserialize)]
    struct Profile {
        #[serde(rename = "emailAddress")]
        email_address: String,
    }

    let client = http_client()?;
    let response = client
        .get(GMAIL_PROFILE_URL)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::NetworkError))?;
    if !response.status().is_success() {
        return Err(raise_error!(
            format!("Gmail profile lookup failed with {}", response.status()),
            ErrorCode::GmailApiCallFailed
        ));
    }
    let profile: Profile = response
        .json()
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::GmailApiCallFailed))?;
    Ok(profile.email_address)
}
