//! bundle_insights — request statistics from router support bundles.
//!
//! ```text
//! unpack ──► ingest ──► RecordStore ──► analyzer ──► report
//! ```
//!
//! [`unpack`] finds the router-request logs inside a bundle, [`ingest`] loads
//! them into a deduplicating [`store::RecordStore`], and [`analyzer`] runs the
//! top-N, per-key aggregate and timeline queries that [`report`] renders.

pub mod analyzer;
pub mod error;
pub mod ingest;
pub mod record;
pub mod report;
pub mod store;
pub mod unpack;

pub use error::{IngestError, RecordError, StoreError, UnpackError};
pub use ingest::{IngestOptions, IngestResult, Ingestor};
pub use record::{Field, LogRecord};
pub use store::{InsertOutcome, RecordStore};
