use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};

use crate::modules::settings::{cli::SETTINGS, dir::DATA_DIR_MANAGER};

// Keeps the non-blocking writer alive for the whole process lifetime.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn setup_file_logger() -> Result<(), tracing::dispatcher::SetGlobalDefaultError> {
    let level = SETTINGS
        .mailsweep_log_level
        .parse::<Level>()
        .unwrap_or(Level::INFO);

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("mailsweep")
        .filename_suffix("log")
        .max_log_files(SETTINGS.mailsweep_max_server_log_files)
        .build(&DATA_DIR_MANAGER.logs_dir)
        .expect("failed to create rolling log appender");

    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);

    if SETTINGS.mailsweep_json_logs {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(writer)
            .json()
            .finish();
        return tracing::subscriber::set_global_default(subscriber);
    }

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
