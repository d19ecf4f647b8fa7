//! Strata Grid
//!
//! The data model shared by every tier of a Strata cluster: cells, byte grids,
//! half-open row partitions and the Life rule applied to a band of rows.
//!
//! # Row decomposition
//!
//! The global grid is cut into contiguous row bands twice: once across nodes
//! and once across the workers of each node. Both cuts use the same rule
//! ([`split_rows`]): every band gets `height / parts` rows and the remainder is
//! folded into the last band. Keeping the remainder at the end makes the
//! decomposition, and therefore every reported result, reproducible for a given
//! input.
//!
//! # Halo rows
//!
//! A band cannot compute its first and last row on its own. The row directly
//! above the band and the row directly below it are supplied from outside as
//! halo rows (see [`step`]). Columns wrap around modulo the grid width; the
//! vertical wrap comes from the ring of bands, where the first band's upper
//! neighbour is the last band.

mod cell;
mod error;
mod grid;
mod life;
mod partition;

pub use cell::Cell;
pub use error::{GridError, Result};
pub use grid::Grid;
pub use life::{next_state, step};
pub use partition::{split_rows, Partition};

/// Byte value of a live cell.
pub const ALIVE: u8 = 255;

/// Byte value of a dead cell.
pub const DEAD: u8 = 0;
