use std::future::Future;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

pub const TIMING_TARGET: &str = "stylizer.timing";

pub async fn log_generation_timing<T, E, F, Fut>(
    endpoint: &str,
    model: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "stylizer.timing",
        "event=generation_request endpoint={} model={} started_at={} metadata={}",
        endpoint,
        model,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "stylizer.timing",
        "event=generation_response endpoint={} model={} completed_at={} duration_s={:.3} status={} metadata={}",
        endpoint,
        model,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}
