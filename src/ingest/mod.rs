//! Frame ingest: per-source capture loops and the source table

pub mod manager;
pub mod source;

pub use manager::SourceManager;
pub use source::IngestStats;
