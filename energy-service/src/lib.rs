pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod tag_preview;
pub mod transform;
pub mod validation;

pub use pipeline::{Envelope, Pipeline};
