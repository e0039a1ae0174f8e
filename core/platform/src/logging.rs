use std::env;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

/// Field name carrying the turn identifier on every span.
pub const TURN_ID_FIELD: &str = "turn_id";

/// Initialize structured logging for a worker process.
///
/// Production and staging environments emit JSON lines so the log pipeline
/// can index by turn id; development gets a readable text formatter.
/// Message text must already be redacted before it reaches a log call —
/// nothing here inspects payloads.
pub fn init_logging(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let environment = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

    if environment == "prod" || environment == "staging" {
        let json_layer = fmt::layer()
            .json()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(json_layer).init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish()
            .init();
    }

    tracing::info!(
        service = %service_name,
        environment = %environment,
        "logging initialized"
    );
}
