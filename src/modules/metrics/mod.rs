use std::sync::LazyLock;

use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};

use crate::modules::{common::Initialize, error::MailSweepResult};

pub mod endpoint;

pub static MAILSWEEP_REQUEST_DURATION_BY_METHOD_AND_OPERATION: LazyLock<HistogramVec> =
    LazyLock::new(|| {
        register_histogram_vec!(
            "mailsweep_request_duration_by_method_and_operation",
            "Request duration in seconds, labelled by method, operation and status",
            &["method", "operation", "status"]
        )
        .expect("failed to register metric")
    });

pub static MAILSWEEP_REQUEST_DURATION_BY_STATUS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "mailsweep_request_duration_by_status",
        "Request duration in seconds, labelled by status",
        &["status"]
    )
    .expect("failed to register metric")
});

pub static MAILSWEEP_REQUEST_TOTAL_BY_METHOD_AND_OPERATION: LazyLock<IntCounterVec> =
    LazyLock::new(|| {
        register_int_counter_vec!(
            "mailsweep_request_total_by_method_and_operation",
            "Requests served, labelled by method, operation and status",
            &["method", "operation", "status"]
        )
        .expect("failed to register metric")
    });

pub static MAILSWEEP_JOB_QUEUE_LENGTH: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec!(
        "mailsweep_job_queue_length",
        "Claimed pending jobs per queue at the last poll",
        &["queue"]
    )
    .expect("failed to register metric")
});

pub static MAILSWEEP_JOB_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "mailsweep_job_fetch_duration",
        "Time spent claiming pending jobs from the store, in seconds"
    )
    .expect("failed to register metric")
});

pub static MAILSWEEP_EMAILS_CLEANED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "mailsweep_emails_cleaned_total",
        "Emails archived or deleted by the cleanup executor",
        &["action"]
    )
    .expect("failed to register metric")
});

pub static MAILSWEEP_HEALTH_STATUS: LazyLock<IntGauge> = LazyLock::new(|| {
    register_int_gauge!(
        "mailsweep_health_status",
        "Current health status: 0 healthy, 1 degraded, 2 critical"
    )
    .expect("failed to register metric")
});

pub struct MetricsService;

impl Initialize for MetricsService {
    async fn initialize() -> MailSweepResult<()> {
        // Touch every metric so the registry is complete before traffic.
        LazyLock::force(&MAILSWEEP_REQUEST_DURATION_BY_METHOD_AND_OPERATION);
        LazyLock::force(&MAILSWEEP_REQUEST_DURATION_BY_STATUS);
        LazyLock::force(&MAILSWEEP_REQUEST_TOTAL_BY_METHOD_AND_OPERATION);
        LazyLock::force(&MAILSWEEP_JOB_QUEUE_LENGTH);
        LazyLock::force(&MAILSWEEP_JOB_FETCH_DURATION);
        LazyLock::force(&MAILSWEEP_EMAILS_CLEANED_TOTAL);
        LazyLock::force(&MAILSWEEP_HEALTH_STATUS);
        Ok(())
    }
}
