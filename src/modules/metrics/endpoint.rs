use poem::{handler, web::WithContentType, IntoResponse};
use prometheus::{Encoder, TextEncoder};

#[handler]
pub fn metrics_endpoint() -> WithContentType<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new().with_content_type("text/plain");
    }
    String::from_utf8(buffer)
        .unwrap_or_default()
        .with_content_type("text/plain; version=0.0.4")
}
