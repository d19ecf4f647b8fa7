//! Contiguous row partitions.

use std::ops::Range;

use crate::{GridError, Result};

/// A half-open band of rows `[start, end)`.
///
/// Used both for a worker's band inside a node and for a node's band inside
/// the global grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Partition {
    /// First row of the band
    pub start: usize,
    /// One past the last row of the band
    pub end: usize,
}

impl Partition {
    /// Create a new band. `end` must be greater than `start`.
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(end > start, "empty partition {}..{}", start, end);
        Self { start, end }
    }

    /// Number of rows in the band.
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Bands are never empty; kept for API symmetry with `len`.
    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Check whether a row falls inside the band.
    pub const fn contains(&self, row: usize) -> bool {
        self.start <= row && row < self.end
    }

    /// The rows of the band as a range.
    pub const fn rows(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Split `height` rows into `parts` contiguous bands.
///
/// Every band gets `height / parts` rows; the remainder is folded into the
/// last band rather than spread across all of them.
pub fn split_rows(height: usize, parts: usize) -> Result<Vec<Partition>> {
    if parts == 0 {
        return Err(GridError::ZeroParts);
    }
    if parts > height {
        return Err(GridError::TooManyParts { height, parts });
    }

    let band = height / parts;
    let partitions = (0..parts)
        .map(|i| {
            let start = i * band;
            let end = if i == parts - 1 { height } else { start + band };
            Partition::new(start, end)
        })
        .collect();

    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn remainder_goes_to_last_band() {
        let bands = split_rows(10, 3).unwrap();
        assert_eq!(
            bands,
            vec![Partition::new(0, 3), Partition::new(3, 6), Partition::new(6, 10)]
        );
    }

    #[test]
    fn single_part_covers_everything() {
        assert_eq!(split_rows(7, 1).unwrap(), vec![Partition::new(0, 7)]);
    }

    #[test]
    fn rejects_degenerate_requests() {
        assert_eq!(split_rows(5, 0), Err(GridError::ZeroParts));
        assert_eq!(
            split_rows(2, 3),
            Err(GridError::TooManyParts { height: 2, parts: 3 })
        );
    }

    proptest! {
        #[test]
        fn bands_tile_rows_exactly_once(height in 1usize..512, parts in 1usize..64) {
            prop_assume!(parts <= height);
            let bands = split_rows(height, parts).unwrap();

            prop_assert_eq!(bands.len(), parts);
            prop_assert_eq!(bands[0].start, 0);
            prop_assert_eq!(bands[parts - 1].end, height);
            for pair in bands.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
            for band in &bands {
                prop_assert!(!band.is_empty());
            }

            // Every band but the last is exactly height / parts rows
            let base = height / parts;
            for band in &bands[..parts - 1] {
                prop_assert_eq!(band.len(), base);
            }
            prop_assert_eq!(bands[parts - 1].len(), base + height % parts);
        }
    }
}
