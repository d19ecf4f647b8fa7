//! The Life rule applied to a band of rows.

use crate::{Grid, ALIVE, DEAD};

/// Next state of a single cell given its current byte and live neighbour count.
#[inline]
pub fn next_state(cell: u8, live_neighbours: u8) -> u8 {
    match (cell == ALIVE, live_neighbours) {
        (true, 2) | (true, 3) => ALIVE, // Survival
        (false, 3) => ALIVE,            // Birth
        (true, _) => DEAD,              // Under/overpopulation
        (false, _) => cell,
    }
}

/// Compute one generation of `current` into `next`.
///
/// `above` stands in for the row before the band's first row and `below` for
/// the row after its last row. Columns wrap modulo the width.
///
/// # Panics
///
/// Panics if a halo row does not match the grid width or if `next` has a
/// different shape from `current`. Both are caller bugs.
pub fn step(current: &Grid, above: &[u8], below: &[u8], next: &mut Grid) {
    let width = current.width();
    let height = current.height();
    assert_eq!(above.len(), width, "halo row above has the wrong width");
    assert_eq!(below.len(), width, "halo row below has the wrong width");
    assert_eq!(next.width(), width);
    assert_eq!(next.height(), height);

    for y in 0..height {
        let up = if y == 0 { above } else { current.row(y - 1) };
        let down = if y == height - 1 { below } else { current.row(y + 1) };
        let middle = current.row(y);
        let out = next.row_mut(y);

        for x in 0..width {
            let left = (x + width - 1) % width;
            let right = (x + 1) % width;
            let live = [
                up[left], up[x], up[right],
                middle[left], middle[right],
                down[left], down[x], down[right],
            ]
            .iter()
            .filter(|&&b| b == ALIVE)
            .count() as u8;

            out[x] = next_state(middle[x], live);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cell;

    #[test]
    fn rule_table() {
        assert_eq!(next_state(DEAD, 3), ALIVE);
        assert_eq!(next_state(DEAD, 2), DEAD);
        assert_eq!(next_state(ALIVE, 1), DEAD);
        assert_eq!(next_state(ALIVE, 2), ALIVE);
        assert_eq!(next_state(ALIVE, 3), ALIVE);
        assert_eq!(next_state(ALIVE, 4), DEAD);
    }

    #[test]
    fn blinker_oscillates() {
        let grid = Grid::from_cells(5, 5, &[Cell::new(1, 2), Cell::new(2, 2), Cell::new(3, 2)]).unwrap();
        let dead = vec![DEAD; 5];
        let mut next = Grid::new(5, 5);
        step(&grid, &dead, &dead, &mut next);
        assert_eq!(
            next.alive_cells(0),
            vec![Cell::new(2, 1), Cell::new(2, 2), Cell::new(2, 3)]
        );
    }

    #[test]
    fn halo_rows_feed_edge_rows() {
        // A single-row band whose halos each hold two live cells: the middle
        // cell of the band sees three neighbours above and below combined.
        let band = Grid::new(5, 1);
        let mut above = vec![DEAD; 5];
        let mut below = vec![DEAD; 5];
        above[1] = ALIVE;
        above[2] = ALIVE;
        below[3] = ALIVE;
        let mut next = Grid::new(5, 1);
        step(&band, &above, &below, &mut next);
        assert_eq!(next.alive_cells(0), vec![Cell::new(2, 0)]);
    }

    #[test]
    fn columns_wrap() {
        // Vertical blinker straddling column 0 and the last column.
        let grid = Grid::from_cells(4, 3, &[Cell::new(3, 1), Cell::new(0, 1), Cell::new(1, 1)]).unwrap();
        let dead = vec![DEAD; 4];
        let mut next = Grid::new(4, 3);
        step(&grid, &dead, &dead, &mut next);
        assert_eq!(
            next.alive_cells(0),
            vec![Cell::new(0, 0), Cell::new(0, 1), Cell::new(0, 2)]
        );
    }

    #[test]
    #[should_panic(expected = "wrong width")]
    fn mismatched_halo_panics() {
        let grid = Grid::new(4, 2);
        let mut next = Grid::new(4, 2);
        step(&grid, &[DEAD; 3], &[DEAD; 4], &mut next);
    }
}
