//! Session planning and result merging.
//!
//! Pure functions: cutting a session request into per-node assignments,
//! and folding per-node replies back into one answer for the client.

use strata_grid::{split_rows, GridError};
use strata_protocol::{
    KeyPressReport, Neighbours, NodeAssignment, ReportStatus, SessionRequest, TickReport,
};

/// A running session: the nodes it was allocated, in partition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub nodes: Vec<String>,
    pub epoch: u64,
}

/// Nodes to ask for: at least one, never more than the grid has rows.
pub fn clamp_nodes(request: &SessionRequest) -> usize {
    request.nodes.clamp(1, request.height.max(1))
}

/// Reject a request that cannot be laid out on its grid.
pub fn validate(request: &SessionRequest) -> Result<(), GridError> {
    if request.width == 0 || request.height == 0 {
        return Err(GridError::EmptyGrid {
            width: request.width,
            height: request.height,
        });
    }
    if let Some(cell) = request
        .alive
        .iter()
        .find(|c| c.x >= request.width || c.y >= request.height)
    {
        return Err(GridError::CellOutOfBounds {
            cell: *cell,
            width: request.width,
            height: request.height,
        });
    }
    Ok(())
}

/// Cut `request` into one assignment per node.
///
/// Node `i` gets the `i`th row band, the live cells inside it re-based to
/// its first row, and the nodes before and after it on the ring.
pub fn plan_assignments(
    request: &SessionRequest,
    nodes: &[String],
    epoch: u64,
) -> Result<Vec<NodeAssignment>, GridError> {
    let bands = split_rows(request.height, nodes.len())?;
    let n = nodes.len();

    Ok(bands
        .iter()
        .enumerate()
        .map(|(i, band)| {
            let alive = request
                .alive
                .iter()
                .filter(|c| band.contains(c.y))
                .filter_map(|c| c.rebase_rows(band.start))
                .collect();
            let neighbours = (n > 1).then(|| Neighbours {
                lower: nodes[(i + n - 1) % n].clone(),
                upper: nodes[(i + 1) % n].clone(),
            });

            NodeAssignment {
                session: request.session.clone(),
                epoch,
                width: request.width,
                height: band.len(),
                row_offset: band.start,
                turns: request.turns,
                threads: request.threads,
                alive,
                continue_existing: request.continue_existing,
                neighbours,
            }
        })
        .collect())
}

/// The turn every node of a session can answer for: the slowest node's.
pub fn common_turn(turns: impl IntoIterator<Item = u64>) -> Option<u64> {
    turns.into_iter().min()
}

/// Fold node reports, given in partition order and lined up on one turn.
///
/// The merged turn is the slowest node's; the session is finished only
/// once every node is.
pub fn merge_reports(reports: Vec<TickReport>) -> TickReport {
    let turn = reports.iter().map(|r| r.turn).min().unwrap_or(0);
    let finished = !reports.is_empty()
        && reports.iter().all(|r| r.status == ReportStatus::Finished);
    let cell_count = reports.iter().map(|r| r.cell_count).sum();
    let alive = reports.into_iter().flat_map(|r| r.alive).collect();

    TickReport {
        turn,
        alive,
        cell_count,
        status: if finished {
            ReportStatus::Finished
        } else {
            ReportStatus::Ticking
        },
    }
}

/// Fold key press replies, given in partition order and lined up on one turn.
pub fn merge_key_presses(replies: Vec<KeyPressReport>) -> Option<KeyPressReport> {
    let state = replies.first()?.state;
    let turn = replies.iter().map(|r| r.turn).min().unwrap_or(0);
    let alive = replies.into_iter().flat_map(|r| r.alive).collect();
    Some(KeyPressReport { turn, alive, state })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strata_grid::Cell;
    use strata_protocol::ControlState;

    fn request(height: usize, nodes: usize, alive: Vec<Cell>) -> SessionRequest {
        SessionRequest {
            session: "client".into(),
            width: 8,
            height,
            turns: 10,
            threads: 2,
            alive,
            continue_existing: false,
            nodes,
        }
    }

    fn addrs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("10.0.0.{}:8050", i)).collect()
    }

    #[test]
    fn single_node_has_no_ring() {
        let plan = plan_assignments(&request(10, 1, vec![]), &addrs(1), 3).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].height, 10);
        assert_eq!(plan[0].epoch, 3);
        assert!(plan[0].neighbours.is_none());
    }

    #[test]
    fn bands_rebase_cells_and_close_the_ring() {
        let cells = vec![Cell::new(0, 0), Cell::new(1, 4), Cell::new(2, 9)];
        let plan = plan_assignments(&request(10, 3, cells), &addrs(3), 1).unwrap();

        let heights: Vec<_> = plan.iter().map(|a| a.height).collect();
        assert_eq!(heights, vec![3, 3, 4]);
        let offsets: Vec<_> = plan.iter().map(|a| a.row_offset).collect();
        assert_eq!(offsets, vec![0, 3, 6]);

        assert_eq!(plan[0].alive, vec![Cell::new(0, 0)]);
        assert_eq!(plan[1].alive, vec![Cell::new(1, 1)]);
        assert_eq!(plan[2].alive, vec![Cell::new(2, 3)]);

        let ring = plan[0].neighbours.as_ref().unwrap();
        assert_eq!(ring.lower, "10.0.0.2:8050");
        assert_eq!(ring.upper, "10.0.0.1:8050");
        let ring = plan[2].neighbours.as_ref().unwrap();
        assert_eq!(ring.lower, "10.0.0.1:8050");
        assert_eq!(ring.upper, "10.0.0.0:8050");
    }

    #[test]
    fn node_count_is_clamped_to_height() {
        assert_eq!(clamp_nodes(&request(3, 10, vec![])), 3);
        assert_eq!(clamp_nodes(&request(3, 0, vec![])), 1);
    }

    #[test]
    fn out_of_bounds_cells_are_rejected() {
        let bad = request(4, 1, vec![Cell::new(8, 0)]);
        assert!(matches!(validate(&bad), Err(GridError::CellOutOfBounds { .. })));
        assert!(validate(&request(0, 1, vec![])).is_err());
        assert!(validate(&request(4, 1, vec![Cell::new(7, 3)])).is_ok());
    }

    #[test]
    fn merge_takes_the_slowest_turn() {
        let merged = merge_reports(vec![
            TickReport {
                turn: 5,
                alive: vec![Cell::new(0, 0)],
                cell_count: 1,
                status: ReportStatus::Finished,
            },
            TickReport {
                turn: 4,
                alive: vec![Cell::new(1, 5), Cell::new(2, 5)],
                cell_count: 2,
                status: ReportStatus::Ticking,
            },
        ]);
        assert_eq!(merged.turn, 4);
        assert_eq!(merged.cell_count, 3);
        assert_eq!(merged.alive.len(), 3);
        assert_eq!(merged.status, ReportStatus::Ticking);
    }

    #[test]
    fn common_turn_is_the_slowest() {
        assert_eq!(common_turn([7, 6, 8]), Some(6));
        assert_eq!(common_turn([3]), Some(3));
        assert_eq!(common_turn(Vec::new()), None);
    }

    #[test]
    fn merge_finishes_when_every_node_has() {
        let done = |turn| TickReport {
            turn,
            alive: vec![],
            cell_count: 0,
            status: ReportStatus::Finished,
        };
        assert_eq!(merge_reports(vec![done(7), done(7)]).status, ReportStatus::Finished);
        assert_eq!(merge_reports(vec![]).status, ReportStatus::Ticking);
    }

    #[test]
    fn key_presses_keep_partition_order() {
        let merged = merge_key_presses(vec![
            KeyPressReport {
                turn: 2,
                alive: vec![Cell::new(0, 1)],
                state: ControlState::Paused,
            },
            KeyPressReport {
                turn: 2,
                alive: vec![Cell::new(0, 6)],
                state: ControlState::Paused,
            },
        ])
        .unwrap();
        assert_eq!(merged.alive, vec![Cell::new(0, 1), Cell::new(0, 6)]);
        assert_eq!(merged.state, ControlState::Paused);
        assert!(merge_key_presses(vec![]).is_none());
    }

    proptest! {
        #[test]
        fn every_cell_lands_on_exactly_one_node(
            height in 1usize..64,
            nodes in 1usize..8,
            rows in prop::collection::vec(0usize..64, 0..40),
        ) {
            let nodes = nodes.min(height);
            let cells: Vec<Cell> = rows.iter().map(|&y| Cell::new(y % 8, y % height)).collect();
            let plan = plan_assignments(&request(height, nodes, cells.clone()), &addrs(nodes), 1).unwrap();

            let mut back: Vec<Cell> = plan
                .iter()
                .flat_map(|a| a.alive.iter().map(move |c| c.offset_rows(a.row_offset)))
                .collect();
            let mut expected = cells;
            back.sort();
            expected.sort();
            prop_assert_eq!(back, expected);

            let rows: usize = plan.iter().map(|a| a.height).sum();
            prop_assert_eq!(rows, height);
        }
    }
}
