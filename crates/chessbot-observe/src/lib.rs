//! Observability setup for the chess bot: structured logging and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
