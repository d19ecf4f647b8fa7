//! Grid cell coordinates.

use std::cmp::Ordering;
use std::fmt;

/// A cell position in grid space.
///
/// Cells order row-major: by `y` first, then by `x`. Sorting a list of cells
/// therefore gives the same order a raster scan of the grid would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    /// Column
    pub x: usize,
    /// Row
    pub y: usize,
}

impl Cell {
    /// Create a new cell.
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Move the cell down by `rows`, turning band-local rows into outer rows.
    pub const fn offset_rows(self, rows: usize) -> Self {
        Self {
            x: self.x,
            y: self.y + rows,
        }
    }

    /// Express the cell relative to a band starting at row `start`.
    ///
    /// Returns `None` if the cell lies above the band.
    pub fn rebase_rows(self, start: usize) -> Option<Self> {
        self.y.checked_sub(start).map(|y| Self { x: self.x, y })
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_row_major() {
        let mut cells = vec![Cell::new(3, 1), Cell::new(0, 2), Cell::new(5, 0), Cell::new(1, 1)];
        cells.sort();
        assert_eq!(
            cells,
            vec![Cell::new(5, 0), Cell::new(1, 1), Cell::new(3, 1), Cell::new(0, 2)]
        );
    }

    #[test]
    fn rebase_round_trips_through_offset() {
        let cell = Cell::new(7, 12);
        let local = cell.rebase_rows(10).unwrap();
        assert_eq!(local, Cell::new(7, 2));
        assert_eq!(local.offset_rows(10), cell);
        assert_eq!(cell.rebase_rows(13), None);
    }
}
