//! Centralized error handling for the catalog engine.
//!
//! Defines `CatalogError`, which encapsulates every failure kind the engine
//! can surface, grouped the way the error-handling design describes: schema
//! mismatch, I/O, decode, constraint violation, query parse. Cancellation is
//! deliberately absent here — it is represented as data on the relevant
//! result structs, never as an `Err` variant.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// The primary error type for the catalog engine.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file's schema version is newer than this build recognizes.
    #[error("schema mismatch: catalog is at version {found}, this build supports up to {supported}")]
    SchemaMismatch { found: i64, supported: i64 },

    /// Error related to database operations.
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    /// Error related to database migrations.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Error related to filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An image file could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A template file (plain-text or YAML) failed to parse.
    #[error("template error: {0}")]
    Template(String),

    /// A constraint was violated in a context where the caller should see it
    /// (direct APIs; `add_image` itself treats a duplicate path as a no-op skip).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A query expression failed to parse.
    #[error("query parse error: {0}")]
    QueryParse(String),

    /// A resource (image, tag, group, member) was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Catch-all for conditions that don't fit another variant.
    #[error("{0}")]
    Internal(String),
}

impl Serialize for CatalogError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A specialized `Result` type for catalog engine operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
