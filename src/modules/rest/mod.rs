// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::common::auth::ApiGuard;
use crate::modules::common::error::ErrorCapture;
use crate::modules::common::log::Tracing;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::handler::error_handler;
use crate::modules::error::{ApiError, MailSweepResult};
use crate::modules::metrics::endpoint::metrics_endpoint;
use crate::modules::oauth2::flow::handle_callback;
use crate::modules::{settings::cli::SETTINGS, utils::shutdown::shutdown_signal};
use crate::raise_error;

use api::create_openapi_service;
use poem::listener::TcpListener;
use poem::middleware::{CatchPanic, Compression, Cors};
use poem::web::Query;
use poem::{get, handler, EndpointExt, Route, Server};
use poem_openapi::ContactObject;
use serde::Deserialize;
use std::time::Duration;

pub mod api;
pub mod response;

pub type ApiResult<T, E = crate::modules::error::ApiErrorResponse> = std::result::Result<T, E>;

const DESCRIPTION: &str = r#"
    MailSweep is a per-mailbox email lifecycle engine.

    - Indexes Gmail metadata per user and scores every message along importance, staleness, spam and access-recency axes.
    - Executes user-authored cleanup policies (archive/delete) under strict safety gates with auditing and restore.
    - Runs a durable, priority-aware job queue with progress reporting, cancellation and health-gated automation.
"#;

pub fn create_api_error_response(message: &str, code: ErrorCode) -> poem::Error {
    let api_error = ApiError::new(message.to_string(), code as u32);
    poem::Error::from_response(
        poem::Response::builder()
            .status(code.status())
            .content_type("application/json")
            .body(serde_json::to_string(&serde_json::json!({
                "message": api_error.message,
                "code": api_error.code,
            }))
            .unwrap_or_default()),
    )
}

#[derive(Deserialize)]
struct CallbackParams {
    code: String,
    state: String,
}

#[handler]
async fn oauth2_callback(Query(params): Query<CallbackParams>) -> poem::Response {
    match handle_callback(&params.code, &params.state).await {
        Ok(_) => poem::Response::builder()
            .content_type("text/html")
            .body("<html><body><h3>Authorization complete.</h3><p>You can close this window and return to your client.</p></body></html>"),
        Err(e) => poem::Response::builder()
            .status(e.code().status())
            .content_type("text/html")
            .body(format!(
                "<html><body><h3>Authorization failed.</h3><p>{}</p></body></html>",
                e
            )),
    }
}

pub async fn start_http_server() -> MailSweepResult<()> {
    let listener = TcpListener::bind((
        SETTINGS
            .mailsweep_bind_ip
            .clone()
            .unwrap_or("0.0.0.0".into()),
        SETTINGS.mailsweep_http_port as u16,
    ));

    let api_service = create_openapi_service()
        .description(DESCRIPTION)
        .contact(ContactObject::new().email("mailsweep.git@gmail.com"))
        .summary("A per-mailbox email lifecycle engine");

    let swagger = api_service.swagger_ui();
    let redoc = api_service.redoc();
    let scalar = api_service.scalar();
    let spec_json = api_service.spec_endpoint();
    let spec_yaml = api_service.spec_endpoint_yaml();
    let openapi_explorer = api_service.openapi_explorer();

    let open_api_route = Route::new()
        .nest_no_strip("/api/v1", api_service)
        .with(ApiGuard)
        .with(ErrorCapture)
        .with(Tracing);

    let mut cors_origins = SETTINGS.mailsweep_cors_origins.clone();
    if cors_origins.is_empty() {
        cors_origins = ["*".to_string()].into_iter().collect();
    }

    let cors = Cors::new()
        .allow_origins(cors_origins)
        .allow_credentials(true)
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS", "HEAD"])
        .allow_headers(vec![
            "Content-Type",
            crate::modules::common::auth::USER_ID_HEADER,
            crate::modules::common::auth::SESSION_ID_HEADER,
        ])
        .max_age(SETTINGS.mailsweep_cors_max_age);

    let route = Route::new()
        .nest("/api-docs/swagger", swagger)
        .nest("/api-docs/redoc", redoc)
        .nest("/api-docs/explorer", openapi_explorer)
        .nest("/api-docs/scalar", scalar)
        .nest("/api-docs/spec.json", spec_json)
        .nest("/api-docs/spec.yaml", spec_yaml)
        .nest("/metrics", get(metrics_endpoint))
        .nest("/oauth2/callback", get(oauth2_callback))
        .nest_no_strip("/api/v1", open_api_route)
        .with(cors)
        .with_if(
            SETTINGS.mailsweep_http_compression_enabled,
            Compression::new(),
        )
        .with(CatchPanic::new());

    let server = Server::new(listener)
        .name("MailSweep API Service")
        .idle_timeout(Duration::from_secs(60))
        .run_with_graceful_shutdown(
            route.catch_all_error(error_handler),
            shutdown_signal(),
            Some(Duration::from_secs(5)),
        );
    println!(
        "MailSweep API Service is now running on port {}.",
        SETTINGS.mailsweep_http_port
    );
    server
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
}
