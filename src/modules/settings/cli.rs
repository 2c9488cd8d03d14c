// Copyright © 2025 mailsweep.dev
// Licensed under MailSweep License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use clap::{builder::ValueParser, Parser};
use std::{collections::HashSet, path::PathBuf, sync::LazyLock};
use url::Url;

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

#[derive(Debug, Parser)]
#[clap(
    name = "mailsweep",
    about = "A per-mailbox email lifecycle engine: Gmail metadata indexing,
    multi-analyzer categorization, staleness scoring and policy-driven cleanup automation.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// mailsweep log level (default: "info")
    #[clap(
        long,
        default_value = "info",
        env = "LOG_LEVEL",
        help = "Set the log level for mailsweep"
    )]
    pub mailsweep_log_level: String,

    /// mailsweep HTTP port (default: 15810)
    #[clap(
        long,
        default_value = "15810",
        env,
        help = "Set the HTTP port for mailsweep"
    )]
    pub mailsweep_http_port: i32,

    /// The IP address that the node binds to, in IPv4 format (e.g., 192.168.1.1).
    #[clap(
        long,
        env,
        default_value = "0.0.0.0",
        help = "The IP address that the HTTP server binds to, in IPv4 format",
        value_parser = ValueParser::new(|s: &str| {
            if s.parse::<std::net::Ipv4Addr>().is_err() {
                return Err("The bind IP address must be a valid IPv4 address.".to_string());
            }
            Ok(s.to_string())
        })
    )]
    pub mailsweep_bind_ip: Option<String>,

    /// Root directory for all durable state (per-user databases, tokens, logs)
    #[clap(
        long,
        env = "STORAGE_PATH",
        help = "Set the root directory for mailsweep durable state",
        value_parser = ValueParser::new(|s: &str| {
            let path = PathBuf::from(s);
            if !path.is_absolute() {
                return Err("Path must be an absolute directory path".to_string());
            }
            Ok(s.to_string())
        })
    )]
    pub mailsweep_storage_path: String,

    /// Secret from which per-user token file keys are derived
    #[clap(
        long,
        default_value = "change-this-default-key-now",
        env = "TOKEN_ENCRYPTION_KEY",
        help = "Set the token encryption secret. ⚠️ Change this default in production!"
    )]
    pub mailsweep_token_encryption_key: String,

    /// Google OAuth2 client id
    #[clap(long, env = "GOOGLE_CLIENT_ID", help = "Google OAuth2 client id")]
    pub mailsweep_google_client_id: Option<String>,

    /// Google OAuth2 client secret
    #[clap(
        long,
        env = "GOOGLE_CLIENT_SECRET",
        help = "Google OAuth2 client secret"
    )]
    pub mailsweep_google_client_secret: Option<String>,

    /// OAuth2 redirect URI registered with Google
    #[clap(
        long,
        env = "GOOGLE_REDIRECT_URI",
        help = "OAuth2 redirect URI registered with Google",
        value_parser = ValueParser::new(|s: &str| -> Result<String, String> {
            Url::parse(s).map_err(|_| format!("Invalid URL for redirect uri: {}", s))?;
            Ok(s.to_string())
        })
    )]
    pub mailsweep_google_redirect_uri: Option<String>,

    /// Gmail API batch size for bulk modify/trash calls
    #[clap(
        long,
        default_value = "100",
        env = "GMAIL_BATCH_SIZE",
        help = "Set the Gmail API batch size for bulk operations",
        value_parser = clap::value_parser!(u32).range(1..=1000)
    )]
    pub mailsweep_gmail_batch_size: u32,

    /// Allow more than one registered mailbox on this instance
    #[clap(
        long,
        default_value = "true",
        env = "MULTI_USER_MODE",
        help = "Allow more than one registered user on this instance"
    )]
    pub mailsweep_multi_user_mode: bool,

    /// Enable ANSI logs (default: true)
    #[clap(long, default_value = "true", env, help = "Enable ANSI formatted logs")]
    pub mailsweep_ansi_logs: bool,

    /// Enable log file output (default: false)
    /// If false, logs will be printed to stdout
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable log file output (otherwise logs go to stdout)"
    )]
    pub mailsweep_log_to_file: bool,

    /// Enable JSON logs (default: false)
    #[clap(
        long,
        default_value = "false",
        env,
        help = "Enable JSON formatted logs"
    )]
    pub mailsweep_json_logs: bool,

    /// Maximum number of log files (default: 5)
    #[clap(
        long,
        default_value = "5",
        env,
        help = "Set the maximum number of server log files"
    )]
    pub mailsweep_max_server_log_files: usize,

    /// CORS allowed origins (default: "*")
    #[clap(
        long,
        default_value = "*",
        env,
        help = "Set the allowed CORS origins (comma-separated list)",
        value_parser = ValueParser::new(|s: &str| -> Result<HashSet<String>, String> {
            let set: HashSet<String> = s.split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect();
            Ok(set)
        })
    )]
    pub mailsweep_cors_origins: HashSet<String>,

    /// CORS max age in seconds (default: 86400)
    #[clap(
        long,
        default_value = "86400",
        env,
        help = "Set the CORS max age in seconds"
    )]
    pub mailsweep_cors_max_age: i32,

    #[clap(
        long,
        default_value = "true",
        env,
        help = "Enable compression for the open api server"
    )]
    pub mailsweep_http_compression_enabled: bool,

    #[clap(
        long,
        default_value = "4",
        env,
        help = "Set the number of workers draining the categorization queue",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub mailsweep_categorize_workers: u16,

    #[clap(
        long,
        default_value = "2",
        env,
        help = "Set the number of workers draining the cleanup queue",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub mailsweep_cleanup_workers: u16,

    /// Upper bound on concurrent destructive Gmail operations across all jobs
    #[clap(
        long,
        default_value = "4",
        env,
        help = "Set the maximum number of concurrent destructive operations",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub mailsweep_max_concurrent_operations: u16,

    #[clap(
        long,
        default_value = "72",
        env,
        help = "The interval (in hours) after which terminal jobs are removed from the queue database",
        value_parser = clap::value_parser!(u64).range(1..=720)
    )]
    pub mailsweep_job_retention_hours: u64,

    /// Per-job execution budget; a job exceeding it fails with a timeout error
    #[clap(
        long,
        default_value = "3600",
        env,
        help = "Set the per-job execution timeout in seconds",
        value_parser = clap::value_parser!(u64).range(10..)
    )]
    pub mailsweep_job_timeout_seconds: u64,

    #[clap(
        long,
        env,
        default_value = "134217728",
        help = "Set the cache size for the mailsweep metadata database in bytes"
    )]
    pub mailsweep_metadata_cache_size: Option<usize>,

    #[clap(
        long,
        env,
        default_value = "134217728",
        help = "Set the redb cache size for each per-user database in bytes"
    )]
    pub mailsweep_user_db_cache_size: Option<usize>,

    /// Bounded size of the in-process analyzer/statistics cache
    #[clap(
        long,
        default_value = "10000",
        env,
        help = "Set the maximum number of entries held by the in-process TTL cache",
        value_parser = clap::value_parser!(u64).range(16..)
    )]
    pub mailsweep_cache_max_entries: u64,

    #[clap(
        long,
        default_value = "30",
        env,
        help = "Set the health monitor sampling interval in seconds",
        value_parser = clap::value_parser!(u64).range(5..)
    )]
    pub mailsweep_health_sample_interval_secs: u64,

    #[clap(
        long,
        default_value = "60",
        env,
        help = "Set the cleanup trigger evaluation interval in seconds",
        value_parser = clap::value_parser!(u64).range(5..)
    )]
    pub mailsweep_trigger_interval_secs: u64,

    #[clap(
        long,
        default_value = "1440",
        env,
        help = "Set the session lifetime in minutes",
        value_parser = clap::value_parser!(u64).range(5..)
    )]
    pub mailsweep_session_ttl_minutes: u64,

    #[clap(
        long,
        default_value = "200",
        env,
        help = "Set the job queue poll interval in milliseconds",
        value_parser = clap::value_parser!(u64).range(50..)
    )]
    pub mailsweep_queue_poll_interval_ms: u64,
}

impl Settings {
    #[cfg(test)]
    fn new_for_test() -> Self {
        Self {
            mailsweep_log_level: "info".to_string(),
            mailsweep_http_port: 15810,
            mailsweep_bind_ip: Default::default(),
            mailsweep_storage_path: std::env::temp_dir()
                .join("mailsweep_test_data")
                .to_string_lossy()
                .into_owned(),
            mailsweep_token_encryption_key: "change-this-default-key-now".into(),
            mailsweep_google_client_id: None,
            mailsweep_google_client_secret: None,
            mailsweep_google_redirect_uri: None,
            mailsweep_gmail_batch_size: 100,
            mailsweep_multi_user_mode: true,
            mailsweep_ansi_logs: false,
            mailsweep_log_to_file: false,
            mailsweep_json_logs: false,
            mailsweep_max_server_log_files: 5,
            mailsweep_cors_origins: Default::default(),
            mailsweep_cors_max_age: 86400,
            mailsweep_http_compression_enabled: true,
            mailsweep_categorize_workers: 2,
            mailsweep_cleanup_workers: 1,
            mailsweep_max_concurrent_operations: 2,
            mailsweep_job_retention_hours: 72,
            mailsweep_job_timeout_seconds: 600,
            mailsweep_metadata_cache_size: None,
            mailsweep_user_db_cache_size: None,
            mailsweep_cache_max_entries: 1024,
            mailsweep_health_sample_interval_secs: 30,
            mailsweep_trigger_interval_secs: 60,
            mailsweep_session_ttl_minutes: 1440,
            mailsweep_queue_poll_interval_ms: 100,
        }
    }
}
