// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem_openapi::{OpenApiService, Tags};

use crate::mailsweep_version;

pub mod auth;
pub mod cleanup;
pub mod email;
pub mod job;
pub mod lifecycle;
pub mod system;
pub mod user;

#[derive(Tags)]
pub enum ApiTags {
    /// OAuth authorization and session polling
    Auth,
    /// Email index: listing, search, stats, categorization
    Email,
    /// Archive, restore, delete and trash operations
    Lifecycle,
    /// Job queue status and control
    Job,
    /// Cleanup policies, schedules, automation and metrics
    Cleanup,
    /// User registry and profiles
    User,
    /// System health
    System,
}

type ApiSurface = (
    auth::AuthApi,
    email::EmailApi,
    lifecycle::LifecycleApi,
    job::JobApi,
    cleanup::CleanupApi,
    user::UserApi,
    system::SystemApi,
);

pub fn create_openapi_service() -> OpenApiService<ApiSurface, ()> {
    OpenApiService::new(
        (
            auth::AuthApi,
            email::EmailApi,
            lifecycle::LifecycleApi,
            job::JobApi,
            cleanup::CleanupApi,
            user::UserApi,
            system::SystemApi,
        ),
        "MailSweep",
        mailsweep_version!(),
    )
    .server("/api/v1")
}
