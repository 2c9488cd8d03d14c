// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use poem::http::StatusCode;
use poem_openapi::Enum;

#[derive(Copy, Clone, Debug, Enum, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    MissingConfiguration = 10010,
    MethodNotAllowed = 10020,

    // Authentication and authorization errors (20000–20999)
    Unauthenticated = 20000,
    PermissionDenied = 20010,
    SessionExpired = 20020,
    UserDisabled = 20030,

    // Resource errors (30000–30999)
    ResourceNotFound = 30000,
    AlreadyExists = 30010,
    Conflict = 30020,

    // Execution errors (40000–40999)
    OperationTimeout = 40000,
    Cancelled = 40010,
    RetryExhausted = 40020,
    SafetyBlocked = 40030,
    Unavailable = 40040,

    // Upstream provider errors (50000–50999)
    GmailApiCallFailed = 50000,
    NetworkError = 50010,

    // Data integrity errors (60000–60999)
    DataCorrupted = 60000,
    SchemaTooNew = 60010,

    // Internal system errors (70000–70999)
    InternalError = 70000,
    UnhandledPoemError = 70010,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidParameter | ErrorCode::MissingConfiguration => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::Unauthenticated | ErrorCode::SessionExpired => StatusCode::UNAUTHORIZED,
            ErrorCode::PermissionDenied | ErrorCode::UserDisabled | ErrorCode::SafetyBlocked => {
                StatusCode::FORBIDDEN
            }
            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists | ErrorCode::Conflict | ErrorCode::Cancelled => {
                StatusCode::CONFLICT
            }
            ErrorCode::OperationTimeout => StatusCode::REQUEST_TIMEOUT,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::GmailApiCallFailed | ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
            ErrorCode::RetryExhausted
            | ErrorCode::DataCorrupted
            | ErrorCode::SchemaTooNew
            | ErrorCode::InternalError
            | ErrorCode::UnhandledPoemError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
