//! Outbound delivery: encryption decision, bounded retry, redaction.

pub mod pipeline;
pub mod retry;

pub use pipeline::DeliveryPipeline;
pub use retry::RetryPolicy;
