// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem_openapi::{payload::Json, OpenApi};

use crate::modules::health::{HealthReport, HEALTH_MONITOR};
use crate::modules::rest::api::ApiTags;
use crate::modules::rest::ApiResult;

pub struct SystemApi;

#[OpenApi(prefix_path = "/api/v1", tag = "ApiTags::System")]
impl SystemApi {
    /// Current health status, signals and recommendations
    #[oai(
        path = "/system-health",
        method = "get",
        operation_id = "get_system_health"
    )]
    async fn get_system_health(&self) -> ApiResult<Json<HealthReport>> {
        Ok(Json(HEALTH_MONITOR.current()))
    }
}
