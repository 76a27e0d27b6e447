//! Error types for the placement library.

use std::path::PathBuf;

/// Errors that can occur while loading benchmarks or persisting checkpoints.
///
/// Invalid moves during an episode are not errors: the environment models
/// them as normal terminal transitions. This enum covers construction-time
/// failures and the persistence boundary.
#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    /// An I/O error occurred while reading a benchmark file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A benchmark file contained a line that could not be parsed.
    #[error("parse error in {path} at line {line}: {reason}")]
    Parse {
        /// The benchmark file path.
        path: PathBuf,
        /// 1-based line number of the offending line.
        line: usize,
        /// Description of the parse failure.
        reason: String,
    },

    /// The placement grid cannot hold the macros with enough slack.
    ///
    /// The environment requires `grid * grid >= 1.5 * macro_count` so a
    /// fully legal placement stays reachable for the sampling policy.
    #[error("grid {grid}x{grid} too small for {macros} macros")]
    GridTooSmall {
        /// Grid edge length in cells.
        grid: usize,
        /// Number of macros to place.
        macros: usize,
    },

    /// A checkpoint could not be saved or loaded.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] burn::record::RecorderError),
}
