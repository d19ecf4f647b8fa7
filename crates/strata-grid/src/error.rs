//! Error types for the grid model.

use thiserror::Error;

use crate::Cell;

/// Result type for grid operations.
pub type Result<T> = std::result::Result<T, GridError>;

/// Errors raised while building grids and partitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// A partition was requested with zero parts.
    #[error("cannot split rows into zero parts")]
    ZeroParts,

    /// More parts were requested than there are rows.
    #[error("cannot split {height} rows into {parts} non-empty parts")]
    TooManyParts { height: usize, parts: usize },

    /// A grid dimension is zero.
    #[error("grid dimensions must be non-zero, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },

    /// A cell lies outside the grid it was placed on.
    #[error("cell {cell} is outside a {width}x{height} grid")]
    CellOutOfBounds {
        cell: Cell,
        width: usize,
        height: usize,
    },
}
