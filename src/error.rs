use crate::graph::Axis;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the registration engine.
///
/// Every failure is reported at the call that detects it. Nothing in the
/// registration chain skips a tile or an edge silently.
#[derive(Debug, Error)]
pub enum StitchError {
    /// No tiles found, ambiguous file-type detection or unparsable tile name
    #[error("Tile discovery failed: {0}")]
    Discovery(String),

    /// A neighbor pair whose row/col relationship is neither EAST nor SOUTH
    #[error("Cannot infer registration direction from ({from_row}, {from_col}) to ({to_row}, {to_col})")]
    DirectionInference {
        from_row: usize,
        from_col: usize,
        to_row: usize,
        to_col: usize,
    },

    /// The spanning tree of an axis graph does not reach every occupied tile
    #[error("Axis {axis} graph is disconnected: spanning tree has {edges} edges, {required} required")]
    DisconnectedGraph {
        axis: Axis,
        edges: usize,
        required: usize,
    },

    /// A tree edge with no recorded measurement behind it
    #[error("No measurement recorded between vertices {from} and {to}")]
    Lookup { from: usize, to: usize },

    /// Pairwise shift estimation could not run on the given projections
    #[error("Pairwise registration failed: {0}")]
    Registration(String),

    /// Invalid configuration values
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A tile could not be read or decoded
    #[error("Failed to load tile {path:?}: {reason}")]
    TileLoad { path: PathBuf, reason: String },

    /// An operation was called before the step it depends on
    #[error("{0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StitchError {
    pub fn tile_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StitchError::TileLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StitchError>;
