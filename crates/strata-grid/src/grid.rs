//! Row-major byte grids.

use crate::{Cell, GridError, Partition, Result, ALIVE, DEAD};

/// A rectangular grid of cell states, stored row-major.
///
/// Each byte is either [`ALIVE`] or [`DEAD`]. A grid knows nothing about
/// where it sits in the global grid; callers pass the row offset when they
/// need global coordinates back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl Grid {
    /// Create an all-dead grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![DEAD; width * height],
        }
    }

    /// Create a grid with the given cells alive.
    pub fn from_cells<'a>(
        width: usize,
        height: usize,
        cells: impl IntoIterator<Item = &'a Cell>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GridError::EmptyGrid { width, height });
        }

        let mut grid = Self::new(width, height);
        for cell in cells {
            if cell.x >= width || cell.y >= height {
                return Err(GridError::CellOutOfBounds {
                    cell: *cell,
                    width,
                    height,
                });
            }
            grid.set(cell.x, cell.y, true);
        }
        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Borrow one row.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width;
        &self.cells[start..start + self.width]
    }

    /// Mutably borrow one row.
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.width;
        &mut self.cells[start..start + self.width]
    }

    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        self.cells[y * self.width + x] == ALIVE
    }

    pub fn set(&mut self, x: usize, y: usize, alive: bool) {
        self.cells[y * self.width + x] = if alive { ALIVE } else { DEAD };
    }

    /// Copy a band of rows out into its own grid.
    pub fn band(&self, partition: Partition) -> Grid {
        let start = partition.start * self.width;
        let end = partition.end * self.width;
        Grid {
            width: self.width,
            height: partition.len(),
            cells: self.cells[start..end].to_vec(),
        }
    }

    /// Number of live cells.
    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|&&b| b == ALIVE).count()
    }

    /// All live cells, in row-major order, with `row_offset` added to each row.
    pub fn alive_cells(&self, row_offset: usize) -> Vec<Cell> {
        let mut alive = Vec::new();
        for y in 0..self.height {
            for (x, &b) in self.row(y).iter().enumerate() {
                if b == ALIVE {
                    alive.push(Cell::new(x, y + row_offset));
                }
            }
        }
        alive
    }

    /// Cells whose state differs between `self` and `next`.
    pub fn flips(&self, next: &Grid, row_offset: usize) -> Vec<Cell> {
        debug_assert_eq!(self.width, next.width);
        debug_assert_eq!(self.height, next.height);

        self.cells
            .iter()
            .zip(&next.cells)
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| Cell::new(i % self.width, i / self.width + row_offset))
            .collect()
    }
}
