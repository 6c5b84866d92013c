//! Staging arrangement that agents are dispatched from.

use color_drain_core::AgentId;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Agent waiting in the staging area with its current cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagedAgent {
    /// Identifier of the waiting agent.
    pub agent: AgentId,
    /// Staging column.
    pub column: u32,
    /// Staging row; the highest row is the bottom, closest to the slot bank.
    pub row: u32,
}

/// Roster laid out on a `columns x rows` grid.
///
/// Only the bottom-most agent of every column can leave. Removing an agent
/// drops the agents above it one row down.
///
/// Pickability is decided per column, not by the last row: when the roster
/// does not fill the last row, the columns it leaves short are pickable from
/// their lowest occupied cell right after the level loads.
#[derive(Clone, Debug, Default)]
pub(crate) struct StagingArea {
    rows: usize,
    columns: Vec<Vec<Option<AgentId>>>,
}

impl StagingArea {
    /// Lays `roster` out row-major over at most `max_columns` columns.
    pub(crate) fn arrange(roster: &[AgentId], max_columns: u32, shuffle_seed: Option<u64>) -> Self {
        if roster.is_empty() {
            return Self::default();
        }

        let width = roster.len().min(max_columns.max(1) as usize);
        let rows = roster.len().div_ceil(width);
        let mut cells: Vec<Option<AgentId>> = roster.iter().copied().map(Some).collect();
        cells.resize(width * rows, None);
        if let Some(seed) = shuffle_seed {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            cells.shuffle(&mut rng);
        }

        let mut columns = vec![vec![None; rows]; width];
        for (index, cell) in cells.into_iter().enumerate() {
            columns[index % width][index / width] = cell;
        }
        Self { rows, columns }
    }

    /// Bottom-most agent of `column`.
    fn bottom(column: &[Option<AgentId>]) -> Option<AgentId> {
        column.iter().rev().find_map(|cell| *cell)
    }

    pub(crate) fn is_pickable(&self, agent: AgentId) -> bool {
        self.columns
            .iter()
            .any(|column| Self::bottom(column) == Some(agent))
    }

    pub(crate) fn contains(&self, agent: AgentId) -> bool {
        self.columns
            .iter()
            .any(|column| column.contains(&Some(agent)))
    }

    /// Dispatchable agents in column order.
    pub(crate) fn pickable(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.columns.iter().filter_map(|column| Self::bottom(column))
    }

    /// Takes `agent` out of its column and shifts the agents above it down.
    pub(crate) fn remove(&mut self, agent: AgentId) -> bool {
        for column in &mut self.columns {
            let Some(row) = column.iter().position(|cell| *cell == Some(agent)) else {
                continue;
            };
            column[row] = None;
            column[..=row].rotate_right(1);
            return true;
        }
        false
    }

    pub(crate) fn layout(&self) -> Vec<StagedAgent> {
        self.columns
            .iter()
            .enumerate()
            .flat_map(|(column, cells)| {
                cells.iter().enumerate().filter_map(move |(row, cell)| {
                    cell.map(|agent| StagedAgent {
                        agent,
                        column: column as u32,
                        row: row as u32,
                    })
                })
            })
            .collect()
    }

    pub(crate) fn dimensions(&self) -> (u32, u32) {
        (self.columns.len() as u32, self.rows as u32)
    }

    pub(crate) fn len(&self) -> usize {
        self.columns
            .iter()
            .map(|column| column.iter().flatten().count())
            .sum()
    }
}
