use crate::errors::PlatformError;
use std::env;
use tracing::{info, info_span, Instrument, Span};
use uuid::Uuid;

/// Initialize logging and announce startup for a worker process.
pub fn init_tracing(service_name: &str) -> Result<(), PlatformError> {
    crate::logging::init_logging(service_name);

    let environment = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

    info!(
        service = %service_name,
        environment = %environment,
        event = "startup",
        "tracing initialized"
    );

    Ok(())
}

/// Span covering one operation of a turn. The turn id doubles as the
/// correlation id across orchestrator and agent engines.
pub fn turn_span(turn_id: Uuid, operation: &str) -> Span {
    info_span!(
        "operation",
        %operation,
        turn_id = %turn_id,
        event_type = "turn",
    )
}

/// Instrument an async operation with the turn's span.
pub async fn with_turn_span<F, R>(turn_id: Uuid, operation: &str, f: F) -> R
where
    F: std::future::Future<Output = R>,
{
    let span = turn_span(turn_id, operation);
    f.instrument(span).await
}
