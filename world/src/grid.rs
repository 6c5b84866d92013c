//! Lane-organised token grid and its exclusive-access protocol.

use std::collections::{BTreeMap, VecDeque};

use color_drain_core::{
    ClaimDenial, ColorClass, FrontToken, LaneClaimDenied, LanePosition, LevelSnapshot,
    SnapshotError, TokenId, TokenSnapshot, MAX_GRID_CELLS,
};

/// Kind of lane transition carried by a [`LaneNotice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LaneChange {
    /// The front token was removed and the lane shifted down.
    Advanced,
    /// The lane's exclusive claim was cleared.
    Released,
}

/// Notification produced by the grid whenever a lane changes state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LaneNotice {
    /// Lane that changed.
    pub column: u32,
    /// What happened to the lane.
    pub change: LaneChange,
}

/// Two-dimensional token matrix organised into lanes.
///
/// Lanes are drained from row 0. A lane must be claimed through
/// [`TileGrid::try_claim_lane`] before its front token can be removed, and
/// stays hidden from [`TileGrid::front_tokens`] until it is released.
/// Mutating operations append [`LaneNotice`] values to a caller-provided
/// buffer; the owner broadcasts them before handing control back.
#[derive(Clone, Debug, Default)]
pub struct TileGrid {
    columns: u32,
    rows: u32,
    lanes: Vec<Lane>,
    tokens: BTreeMap<TokenId, Token>,
    live: u32,
}

#[derive(Clone, Debug)]
struct Lane {
    cells: Vec<Option<TokenId>>,
    claimed: bool,
    pending: VecDeque<TokenId>,
}

impl Lane {
    fn empty(rows: usize) -> Self {
        Self {
            cells: vec![None; rows],
            claimed: false,
            pending: VecDeque::new(),
        }
    }

    fn front(&self) -> Option<TokenId> {
        self.cells.first().copied().flatten()
    }
}

#[derive(Clone, Copy, Debug)]
struct Token {
    id: TokenId,
    color: ColorClass,
    position: LanePosition,
    selected: bool,
    busy: bool,
}

impl Token {
    fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            id: self.id,
            color: self.color,
            position: self.position,
            selected: self.selected,
            busy: self.busy,
        }
    }
}

impl TileGrid {
    /// Creates an empty grid with no lanes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the grid with the dimensions and token colors of `snapshot`.
    ///
    /// Token identifiers are assigned row-major starting at zero. Gaps inside
    /// a lane are closed toward the front. The grid is left untouched when the
    /// snapshot is rejected.
    pub fn build_from_snapshot(&mut self, snapshot: &LevelSnapshot) -> Result<(), SnapshotError> {
        if snapshot.rows <= 0 || snapshot.cols <= 0 {
            return Err(SnapshotError::NonPositiveDimensions {
                cols: snapshot.cols,
                rows: snapshot.rows,
            });
        }

        let columns = snapshot.cols.unsigned_abs();
        let rows = snapshot.rows.unsigned_abs();
        if u64::from(columns) * u64::from(rows) > MAX_GRID_CELLS {
            return Err(SnapshotError::GridTooLarge {
                cols: snapshot.cols,
                rows: snapshot.rows,
            });
        }
        let mut placed: BTreeMap<(u32, u32), ColorClass> = BTreeMap::new();
        for tile in &snapshot.tiles {
            let in_bounds = (0..snapshot.cols).contains(&tile.col)
                && (0..snapshot.rows).contains(&tile.row);
            if !in_bounds {
                return Err(SnapshotError::TileOutOfBounds {
                    col: tile.col,
                    row: tile.row,
                });
            }
            let cell = (tile.row.unsigned_abs(), tile.col.unsigned_abs());
            if placed.insert(cell, tile.color).is_some() {
                return Err(SnapshotError::DuplicateCell {
                    col: tile.col,
                    row: tile.row,
                });
            }
        }

        let row_count = usize::try_from(rows).unwrap_or(0);
        let mut lanes: Vec<Lane> = (0..columns).map(|_| Lane::empty(row_count)).collect();
        let mut tokens = BTreeMap::new();
        let mut next_id = 0_u32;

        for (&(_row, column), &color) in &placed {
            let id = TokenId::new(next_id);
            next_id += 1;
            let lane = &mut lanes[column as usize];
            let compacted = lane.cells.iter().take_while(|cell| cell.is_some()).count();
            lane.cells[compacted] = Some(id);
            let _ = tokens.insert(
                id,
                Token {
                    id,
                    color,
                    position: LanePosition::new(column, compacted as u32),
                    selected: false,
                    busy: false,
                },
            );
        }

        self.columns = columns;
        self.rows = rows;
        self.lanes = lanes;
        self.tokens = tokens;
        self.live = next_id;
        Ok(())
    }

    /// Number of lanes in the grid.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of rows in every lane.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of tokens still in the grid.
    #[must_use]
    pub const fn live_count(&self) -> u32 {
        self.live
    }

    /// Front tokens of every unclaimed lane, ordered by lane.
    #[must_use]
    pub fn front_tokens(&self) -> Vec<FrontToken> {
        let mut fronts = Vec::with_capacity(self.lanes.len());
        for lane in self.lanes.iter().filter(|lane| !lane.claimed) {
            let Some(token) = lane.front().and_then(|id| self.tokens.get(&id)) else {
                continue;
            };
            fronts.push(FrontToken {
                id: token.id,
                color: token.color,
                column: token.position.column(),
                selected: token.selected,
            });
        }
        fronts
    }

    /// Row-0 token of `column`, regardless of the lane's claim.
    #[must_use]
    pub fn front_token(&self, column: u32) -> Option<TokenSnapshot> {
        self.lane_ref(column)
            .and_then(Lane::front)
            .and_then(|id| self.token(id))
    }

    /// Looks up a token by identifier.
    #[must_use]
    pub fn token(&self, id: TokenId) -> Option<TokenSnapshot> {
        self.tokens.get(&id).map(Token::snapshot)
    }

    /// Token occupying the provided cell, if any.
    #[must_use]
    pub fn token_at(&self, column: u32, row: u32) -> Option<TokenSnapshot> {
        let lane = self.lane_ref(column)?;
        let id = lane.cells.get(usize::try_from(row).ok()?).copied().flatten()?;
        self.token(id)
    }

    /// Tokens of `column` ordered from the front.
    #[must_use]
    pub fn lane(&self, column: u32) -> Vec<TokenSnapshot> {
        self.lane_ref(column)
            .map(|lane| {
                lane.cells
                    .iter()
                    .flatten()
                    .filter_map(|id| self.token(*id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reports whether `column` is currently claimed.
    #[must_use]
    pub fn is_claimed(&self, column: u32) -> bool {
        self.lane_ref(column).is_some_and(|lane| lane.claimed)
    }

    /// Number of removal requests queued on `column`.
    #[must_use]
    pub fn pending_removals(&self, column: u32) -> usize {
        self.lane_ref(column).map_or(0, |lane| lane.pending.len())
    }

    /// Marks a front token as chosen by an agent.
    ///
    /// Returns `false` if the token is unknown, already selected, not at the
    /// front, or its lane is claimed.
    pub fn select_token(&mut self, id: TokenId) -> bool {
        let Some(token) = self.tokens.get(&id) else {
            return false;
        };
        let column = token.position.column();
        let available = self
            .lane_ref(column)
            .is_some_and(|lane| !lane.claimed && lane.front() == Some(id));
        if !available || token.selected {
            return false;
        }
        if let Some(token) = self.tokens.get_mut(&id) {
            token.selected = true;
        }
        true
    }

    /// Clears the selection mark of a token. Unknown tokens are ignored.
    pub fn deselect_token(&mut self, id: TokenId) {
        if let Some(token) = self.tokens.get_mut(&id) {
            token.selected = false;
        }
    }

    /// Atomically claims `column` for a removal.
    ///
    /// The front token at claim time is queued as the lane's pending removal
    /// and marked busy.
    pub fn try_claim_lane(&mut self, column: u32) -> Result<(), LaneClaimDenied> {
        let Some(lane) = self.lane_mut(column) else {
            return Err(LaneClaimDenied {
                column,
                reason: ClaimDenial::OutOfRange,
            });
        };
        if lane.claimed {
            return Err(LaneClaimDenied {
                column,
                reason: ClaimDenial::Claimed,
            });
        }

        lane.claimed = true;
        let front = lane.front();
        if let Some(id) = front {
            lane.pending.push_back(id);
            if let Some(token) = self.tokens.get_mut(&id) {
                token.busy = true;
            }
        }
        Ok(())
    }

    /// Clears the claim on `column` and drops its pending removals.
    ///
    /// No-op when the lane is unclaimed or out of range.
    pub fn release_lane(&mut self, column: u32, notices: &mut Vec<LaneNotice>) {
        let Some(lane) = self.lane_mut(column) else {
            return;
        };
        if !lane.claimed {
            return;
        }

        lane.claimed = false;
        let pending: Vec<TokenId> = lane.pending.drain(..).collect();
        for id in pending {
            if let Some(token) = self.tokens.get_mut(&id) {
                token.selected = false;
                token.busy = false;
            }
        }
        notices.push(LaneNotice {
            column,
            change: LaneChange::Released,
        });
    }

    /// Removes the front token of a claimed lane and shifts the lane down by one row.
    ///
    /// Returns the removed token. Unclaimed, empty or out-of-range lanes are
    /// left untouched; the claim itself stays in place either way.
    pub fn remove_front(
        &mut self,
        column: u32,
        notices: &mut Vec<LaneNotice>,
    ) -> Option<TokenSnapshot> {
        let lane = self.lane_mut(column)?;
        if !lane.claimed {
            return None;
        }
        let id = lane.front()?;

        let _ = lane.cells.remove(0);
        lane.cells.push(None);
        lane.pending.retain(|pending| *pending != id);
        let shifted: Vec<TokenId> = lane.cells.iter().flatten().copied().collect();

        let removed = self.tokens.remove(&id)?;
        for (row, shifted_id) in shifted.into_iter().enumerate() {
            if let Some(token) = self.tokens.get_mut(&shifted_id) {
                token.position = LanePosition::new(column, row as u32);
            }
        }
        self.live = self.live.saturating_sub(1);
        notices.push(LaneNotice {
            column,
            change: LaneChange::Advanced,
        });
        Some(removed.snapshot())
    }

    fn lane_ref(&self, column: u32) -> Option<&Lane> {
        self.lanes.get(usize::try_from(column).ok()?)
    }

    fn lane_mut(&mut self, column: u32) -> Option<&mut Lane> {
        self.lanes.get_mut(usize::try_from(column).ok()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_drain_core::TileRecord;

    fn snapshot(columns: &[&[ColorClass]], rows: i32) -> LevelSnapshot {
        let mut tiles = Vec::new();
        for (col, lane) in columns.iter().enumerate() {
            for (row, color) in lane.iter().enumerate() {
                tiles.push(TileRecord {
                    id: 0,
                    color: *color,
                    row: row as i32,
                    col: col as i32,
                });
            }
        }
        LevelSnapshot {
            rows,
            cols: columns.len() as i32,
            tiles,
            agents: Vec::new(),
        }
    }

    fn scenario_grid() -> TileGrid {
        use ColorClass::{Blue, Green, Red};
        let mut grid = TileGrid::new();
        grid.build_from_snapshot(&snapshot(&[&[Red, Red], &[Blue], &[Red, Green, Red]], 3))
            .expect("valid snapshot");
        grid
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        let mut grid = TileGrid::new();
        let error = grid
            .build_from_snapshot(&LevelSnapshot {
                rows: 0,
                cols: 3,
                ..LevelSnapshot::default()
            })
            .expect_err("zero rows");
        assert_eq!(error, SnapshotError::NonPositiveDimensions { cols: 3, rows: 0 });
        assert_eq!(grid.columns(), 0);
    }

    #[test]
    fn rejects_grids_beyond_the_cell_cap() {
        let mut grid = scenario_grid();
        let error = grid
            .build_from_snapshot(&LevelSnapshot {
                rows: i32::MAX,
                cols: 1_000,
                ..LevelSnapshot::default()
            })
            .expect_err("oversized grid");
        assert_eq!(
            error,
            SnapshotError::GridTooLarge {
                cols: 1_000,
                rows: i32::MAX,
            }
        );
        assert_eq!(grid.live_count(), 6);
    }

    #[test]
    fn rejected_snapshot_keeps_previous_grid() {
        let mut grid = scenario_grid();
        let mut invalid = snapshot(&[&[ColorClass::Red]], 1);
        invalid.tiles[0].col = 5;

        let error = grid.build_from_snapshot(&invalid).expect_err("out of bounds");

        assert_eq!(error, SnapshotError::TileOutOfBounds { col: 5, row: 0 });
        assert_eq!(grid.columns(), 3);
        assert_eq!(grid.live_count(), 6);
    }

    #[test]
    fn rejects_two_tiles_on_one_cell() {
        let mut grid = TileGrid::new();
        let mut duplicated = snapshot(&[&[ColorClass::Red]], 2);
        duplicated.tiles.push(duplicated.tiles[0]);

        assert_eq!(
            grid.build_from_snapshot(&duplicated),
            Err(SnapshotError::DuplicateCell { col: 0, row: 0 })
        );
    }

    #[test]
    fn assigns_row_major_ids_and_compacts_gaps() {
        let mut grid = TileGrid::new();
        let level = LevelSnapshot {
            rows: 3,
            cols: 2,
            tiles: vec![
                TileRecord {
                    id: 9,
                    color: ColorClass::Blue,
                    row: 2,
                    col: 0,
                },
                TileRecord {
                    id: 4,
                    color: ColorClass::Red,
                    row: 0,
                    col: 1,
                },
            ],
            agents: Vec::new(),
        };

        grid.build_from_snapshot(&level).expect("valid snapshot");

        let red = grid.token_at(1, 0).expect("red at the front of lane 1");
        assert_eq!(red.id, TokenId::new(0));
        let blue = grid.token_at(0, 0).expect("blue compacted to the front");
        assert_eq!(blue.id, TokenId::new(1));
        assert_eq!(blue.position, LanePosition::new(0, 0));
        assert!(grid.token_at(0, 2).is_none());
    }

    #[test]
    fn claimed_lanes_are_hidden_from_front_tokens() {
        let mut grid = scenario_grid();
        assert_eq!(grid.front_tokens().len(), 3);

        grid.try_claim_lane(1).expect("lane 1 free");

        let columns: Vec<u32> = grid.front_tokens().iter().map(|front| front.column).collect();
        assert_eq!(columns, vec![0, 2]);
    }

    #[test]
    fn second_claim_is_denied() {
        let mut grid = scenario_grid();
        grid.try_claim_lane(0).expect("first claim");

        assert_eq!(
            grid.try_claim_lane(0),
            Err(LaneClaimDenied {
                column: 0,
                reason: ClaimDenial::Claimed,
            })
        );
        assert_eq!(grid.pending_removals(0), 1);
        assert_eq!(
            grid.try_claim_lane(7).map_err(|denied| denied.reason),
            Err(ClaimDenial::OutOfRange)
        );
    }

    #[test]
    fn remove_front_shifts_lane_down() {
        let mut grid = scenario_grid();
        let mut notices = Vec::new();
        let before: Vec<TokenId> = grid.lane(2).iter().map(|token| token.id).collect();

        grid.try_claim_lane(2).expect("claim");
        let removed = grid.remove_front(2, &mut notices).expect("front removed");

        assert_eq!(removed.id, before[0]);
        assert_eq!(removed.color, ColorClass::Red);
        let after = grid.lane(2);
        assert_eq!(after.len(), 2);
        for (row, token) in after.iter().enumerate() {
            assert_eq!(token.id, before[row + 1]);
            assert_eq!(token.position, LanePosition::new(2, row as u32));
        }
        assert!(grid.token_at(2, 2).is_none());
        assert_eq!(grid.live_count(), 5);
        assert_eq!(grid.pending_removals(2), 0);
        assert_eq!(
            notices,
            vec![LaneNotice {
                column: 2,
                change: LaneChange::Advanced,
            }]
        );
        assert!(grid.is_claimed(2), "release stays with the caller");
    }

    #[test]
    fn remove_front_requires_claim_and_bounds() {
        let mut grid = scenario_grid();
        let mut notices = Vec::new();

        assert!(grid.remove_front(0, &mut notices).is_none());
        assert!(grid.remove_front(42, &mut notices).is_none());
        assert!(notices.is_empty());
        assert_eq!(grid.live_count(), 6);
    }

    #[test]
    fn remove_front_on_empty_lane_is_noop() {
        let mut grid = scenario_grid();
        let mut notices = Vec::new();
        grid.try_claim_lane(1).expect("claim");
        let _ = grid.remove_front(1, &mut notices).expect("blue removed");
        notices.clear();

        assert!(grid.remove_front(1, &mut notices).is_none());
        assert!(notices.is_empty());
    }

    #[test]
    fn release_clears_flags_once() {
        let mut grid = scenario_grid();
        let mut notices = Vec::new();
        let front = grid.front_token(0).expect("front");

        assert!(grid.select_token(front.id));
        assert!(!grid.select_token(front.id), "already selected");
        grid.try_claim_lane(0).expect("claim");
        let busy = grid.token(front.id).expect("token");
        assert!(busy.selected && busy.busy);

        grid.release_lane(0, &mut notices);
        grid.release_lane(0, &mut notices);
        grid.release_lane(99, &mut notices);

        let released = grid.token(front.id).expect("token");
        assert!(!released.selected && !released.busy);
        assert!(!grid.is_claimed(0));
        assert_eq!(grid.pending_removals(0), 0);
        assert_eq!(
            notices,
            vec![LaneNotice {
                column: 0,
                change: LaneChange::Released,
            }]
        );
    }

    #[test]
    fn tokens_behind_the_front_cannot_be_selected() {
        let mut grid = scenario_grid();
        let behind = grid.token_at(0, 1).expect("second red");
        assert!(!grid.select_token(behind.id));
        assert!(!grid.select_token(TokenId::new(99)));
    }
}
