//! Error types for citytiles.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CityTilesError>;

/// All errors produced by the index, the codecs and ingestion.
///
/// A tile address that cannot be resolved is *not* an error; lookups return
/// `None` and the serving layer turns that into a 404.
#[derive(Debug, Error)]
pub enum CityTilesError {
    /// Coordinates outside the valid latitude/longitude range. Rejected
    /// before any tile-address computation, which is undefined out of range.
    #[error("invalid point: latitude {lat}, longitude {lon} out of range")]
    InvalidPoint { lat: f64, lon: f64 },

    /// The index was configured without a scoring function.
    #[error("quadtree built without a score function")]
    MissingScoreFunction,

    /// Invalid index configuration (capacity, depth policy, thresholds).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Internal codec invariant violation, e.g. an attribute column whose
    /// length does not match the point count. Logged and recovered from
    /// with best-effort alignment; surfaced only when recovery is impossible.
    #[error("encode inconsistency: {0}")]
    EncodeInconsistency(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
