//! Data ingestion, canonicalization and storage

pub mod table;
pub mod ingest;
pub mod schema;
pub mod canonicalize;
pub mod store;

pub use ingest::{DataIngestor, DataError, Stage};
pub use canonicalize::{Canonicalizer, CleanReport, CollisionPolicy};
pub use schema::{CanonicalRecord, CanonicalSchema, CanonicalTable, SchemaError};
pub use store::ArtifactMeta;
pub use table::{Cell, Table};
