pub mod postgres;
pub mod preview;

pub use postgres::PostgresReadingSink;
pub use preview::{FlaggedRow, ImportPreview, ImportPreviewSink};
