#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Color Drain engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Adapters submit [`Command`] values
//! describing desired mutations, the world executes those commands via its
//! `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. Systems consume event streams, query immutable
//! snapshots, and respond exclusively with new command batches.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound applied to the ammunition of a single roster entry.
pub const MAX_AGENT_AMMO: u32 = 9_999;

/// Upper bound on the number of cells (`cols * rows`) a level grid may span.
pub const MAX_GRID_CELLS: u64 = 65_536;

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Replaces the timing and capacity parameters used by the world.
    Configure {
        /// Configuration that becomes active for subsequent commands.
        config: PuzzleConfig,
    },
    /// Rebuilds the grid, staging area and slot bank from a level snapshot.
    LoadLevel {
        /// Authoring snapshot describing the level.
        snapshot: LevelSnapshot,
    },
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Requests that a staged agent docks into the slot bank.
    DispatchAgent {
        /// Identifier of the staged agent.
        agent: AgentId,
    },
    /// Signals that the visual step of a shot reached its target.
    CompleteFireStep {
        /// Agent that launched the shot.
        agent: AgentId,
        /// Shot whose visual step completed.
        shot: ShotId,
    },
    /// Halts an agent immediately and retires it without firing further.
    StopAgent {
        /// Identifier of the agent to stop.
        agent: AgentId,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that a level snapshot was accepted.
    LevelLoaded {
        /// Number of lanes in the grid.
        columns: u32,
        /// Number of rows in every lane.
        rows: u32,
        /// Number of tokens placed into the grid.
        tokens: u32,
        /// Number of agents placed into the staging area.
        agents: u32,
    },
    /// Reports that a level snapshot was rejected and the world left untouched.
    LevelRejected {
        /// Specific reason the snapshot is invalid.
        reason: SnapshotError,
    },
    /// Confirms that an agent docked into a slot.
    AgentDocked {
        /// Agent that docked.
        agent: AgentId,
        /// Slot assigned to the agent.
        slot: SlotIndex,
    },
    /// Reports that a dispatch request could not be honoured.
    DispatchRejected {
        /// Agent named in the request.
        agent: AgentId,
        /// Specific reason the dispatch failed.
        reason: DispatchError,
    },
    /// Announces that an agent selected a front token as its target.
    TargetAcquired {
        /// Agent that acquired the target.
        agent: AgentId,
        /// Token selected by the agent.
        token: TokenId,
        /// Lane holding the token.
        column: u32,
    },
    /// Reports that an agent lost the race for a lane and returned to seeking.
    LaneClaimDenied {
        /// Agent whose claim was denied.
        agent: AgentId,
        /// Lane that was already claimed.
        column: u32,
    },
    /// Reports that an agent found no matching front token and now waits for lane notices.
    AgentBlocked {
        /// Agent that became blocked.
        agent: AgentId,
    },
    /// Announces the start of a shot's visual step.
    FireStarted {
        /// Agent that fired.
        agent: AgentId,
        /// Identifier of the shot, echoed back by `Command::CompleteFireStep`.
        shot: ShotId,
        /// Lane claimed for the duration of the shot.
        column: u32,
        /// Token targeted by the shot.
        token: TokenId,
    },
    /// Reports the single resolution of a shot.
    FireResolved {
        /// Agent that fired.
        agent: AgentId,
        /// Shot that resolved.
        shot: ShotId,
        /// Path that won the resolve-once race.
        completion: FireCompletion,
        /// Effect of the shot on the grid.
        outcome: FireOutcome,
        /// Ammunition left to the agent after the shot.
        ammo_left: u32,
    },
    /// Reports that an in-flight shot was cancelled before resolving.
    FireCancelled {
        /// Agent whose shot was cancelled.
        agent: AgentId,
        /// Shot that was cancelled.
        shot: ShotId,
    },
    /// Confirms that the front token of a lane was removed.
    TokenRemoved {
        /// Token that left the grid.
        token: TokenId,
        /// Lane the token was removed from.
        column: u32,
        /// Color of the removed token.
        color: ColorClass,
    },
    /// Reports the number of tokens left in the grid after a removal.
    TilesRemaining {
        /// Live tokens remaining in the grid.
        count: u32,
    },
    /// Confirms that a lane claim was cleared.
    LaneReleased {
        /// Lane whose exclusive flag was cleared.
        column: u32,
    },
    /// Announces that three adjacent agents merged into the middle one.
    AgentsMerged {
        /// Agent occupying the lowest slot of the run.
        left: AgentId,
        /// Surviving agent.
        middle: AgentId,
        /// Agent occupying the highest slot of the run.
        right: AgentId,
        /// Combined ammunition held by the survivor.
        ammo: u32,
    },
    /// Announces that a merge survivor resumed seeking after the settle delay.
    AgentRestarted {
        /// Agent that resumed.
        agent: AgentId,
    },
    /// Confirms that an agent left play.
    AgentRetired {
        /// Agent that retired.
        agent: AgentId,
        /// Slot vacated by the agent, if it was docked.
        slot: Option<SlotIndex>,
        /// Cause of the retirement.
        reason: RetireReason,
    },
    /// Signals that every docked agent is blocked while the slot bank is full.
    GameOver,
}

/// Closed palette of token and agent colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorClass {
    /// Blue tokens.
    Blue,
    /// Red tokens.
    Red,
    /// Green tokens.
    Green,
    /// Yellow tokens.
    Yellow,
    /// Purple tokens.
    Purple,
    /// Orange tokens.
    Orange,
    /// Pink tokens.
    Pink,
    /// White tokens.
    White,
}

impl ColorClass {
    /// Every color in palette order.
    pub const ALL: [ColorClass; 8] = [
        ColorClass::Blue,
        ColorClass::Red,
        ColorClass::Green,
        ColorClass::Yellow,
        ColorClass::Purple,
        ColorClass::Orange,
        ColorClass::Pink,
        ColorClass::White,
    ];

    /// Lowercase name used by level files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Red => "red",
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Purple => "purple",
            Self::Orange => "orange",
            Self::Pink => "pink",
            Self::White => "white",
        }
    }
}

/// Unique identifier assigned to a token when the grid is built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(u32);

impl TokenId {
    /// Creates a new token identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to an agent when the roster is staged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Position of a docking slot within the slot bank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotIndex(u32);

impl SlotIndex {
    /// Creates a new slot index.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the zero-based slot position.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of a single shot, unique for the lifetime of a world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShotId(u64);

impl ShotId {
    /// Creates a new shot identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Location of a token expressed as lane and row, row 0 being the front.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LanePosition {
    column: u32,
    row: u32,
}

impl LanePosition {
    /// Creates a new lane position.
    #[must_use]
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Zero-based lane index.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }

    /// Zero-based row index measured from the front of the lane.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }
}

/// Level description produced by the authoring tool.
///
/// Dimensions are signed so malformed files can be reported as
/// [`SnapshotError`] values instead of failing to parse.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSnapshot {
    /// Number of rows in every lane.
    pub rows: i32,
    /// Number of lanes.
    pub cols: i32,
    /// Tokens placed in the grid, listed row-major.
    #[serde(default)]
    pub tiles: Vec<TileRecord>,
    /// Ordered agent roster.
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
}

/// Single token entry of a [`LevelSnapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Identifier assigned by the authoring tool.
    #[serde(default)]
    pub id: i32,
    /// Color of the token.
    pub color: ColorClass,
    /// Row of the token, 0 being the front of the lane.
    pub row: i32,
    /// Lane of the token.
    pub col: i32,
}

/// Single agent entry of a [`LevelSnapshot`] roster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Color matched by the agent.
    pub color: ColorClass,
    /// Ammunition carried by the agent.
    pub ammo: i32,
}

impl AgentRecord {
    /// Ammunition clamped to the accepted `1..=MAX_AGENT_AMMO` range.
    #[must_use]
    pub fn clamped_ammo(&self) -> u32 {
        u32::try_from(self.ammo.max(1))
            .unwrap_or(1)
            .min(MAX_AGENT_AMMO)
    }
}

/// Timing and capacity parameters of the puzzle core.
///
/// Durations are stored in milliseconds so the structure maps directly onto
/// JSON configuration files; missing fields fall back to the defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PuzzleConfig {
    /// Number of docking slots in the slot bank.
    pub slot_count: u32,
    /// Upper bound on a shot's visual step before the timeout resolves it.
    pub fire_timeout_ms: u64,
    /// Pause between a resolved shot and the next target scan.
    pub shot_interval_ms: u64,
    /// Delay before a merge survivor resumes seeking.
    pub merge_settle_ms: u64,
    /// Grace delay before a full slot bank is checked for deadlock.
    pub deadlock_grace_ms: u64,
    /// Interval after which a blocked agent rescans without a lane notice.
    pub seek_retry_ms: u64,
    /// Maximum number of columns in the staging arrangement.
    pub staging_columns: u32,
    /// Seed used to shuffle the staging arrangement, if any.
    pub staging_shuffle_seed: Option<u64>,
}

impl PuzzleConfig {
    /// Upper bound on a shot's visual step.
    #[must_use]
    pub const fn fire_timeout(&self) -> Duration {
        Duration::from_millis(self.fire_timeout_ms)
    }

    /// Pause between a resolved shot and the next target scan.
    #[must_use]
    pub const fn shot_interval(&self) -> Duration {
        Duration::from_millis(self.shot_interval_ms)
    }

    /// Delay before a merge survivor resumes seeking.
    #[must_use]
    pub const fn merge_settle(&self) -> Duration {
        Duration::from_millis(self.merge_settle_ms)
    }

    /// Grace delay before a full slot bank is checked for deadlock.
    #[must_use]
    pub const fn deadlock_grace(&self) -> Duration {
        Duration::from_millis(self.deadlock_grace_ms)
    }

    /// Interval after which a blocked agent rescans on its own.
    #[must_use]
    pub const fn seek_retry(&self) -> Duration {
        Duration::from_millis(self.seek_retry_ms)
    }
}

impl Default for PuzzleConfig {
    fn default() -> Self {
        Self {
            slot_count: 5,
            fire_timeout_ms: 2_000,
            shot_interval_ms: 100,
            merge_settle_ms: 400,
            deadlock_grace_ms: 1_500,
            seek_retry_ms: 1_000,
            staging_columns: 5,
            staging_shuffle_seed: None,
        }
    }
}

/// Completion path that resolved a shot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FireCompletion {
    /// The visual step reported completion.
    Visual,
    /// The fixed upper-bound timeout elapsed first.
    Timeout,
}

/// Effect of a resolved shot on the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FireOutcome {
    /// The targeted front token was removed.
    Removed,
    /// The target vanished before resolution; the lane was released untouched.
    Stale,
}

/// Reasons an agent leaves play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetireReason {
    /// The agent spent its last round of ammunition.
    Depleted,
    /// The agent was consumed by a merge.
    Merged,
    /// The agent was stopped by an external request.
    Stopped,
}

/// Observable state of an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentPhase {
    /// Waiting in the staging area.
    Staged,
    /// Docked and scanning for a matching front token.
    Seeking,
    /// Docked with no matching front token; waiting for a lane notice.
    Blocked,
    /// Holding a selected token, about to claim its lane.
    TargetAcquired,
    /// Holding a lane claim while the shot is in flight.
    Firing,
    /// Applying the effects of a resolved shot.
    Resolving,
    /// Waiting for the shot interval to elapse.
    Cooling,
    /// Parked by a merge until the settle delay elapses.
    Stopped,
    /// Out of play.
    Retired,
}

/// Immutable representation of a single token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenSnapshot {
    /// Identifier of the token.
    pub id: TokenId,
    /// Color of the token.
    pub color: ColorClass,
    /// Current lane position of the token.
    pub position: LanePosition,
    /// Indicates whether an agent selected the token as its target.
    pub selected: bool,
    /// Indicates whether the token's lane is locked for its removal.
    pub busy: bool,
}

/// Front token of an unclaimed lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrontToken {
    /// Identifier of the token.
    pub id: TokenId,
    /// Color of the token.
    pub color: ColorClass,
    /// Lane holding the token.
    pub column: u32,
    /// Indicates whether another agent already selected the token.
    pub selected: bool,
}

/// Immutable representation of a single agent used for queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgentSnapshot {
    /// Identifier of the agent.
    pub id: AgentId,
    /// Color matched by the agent.
    pub color: ColorClass,
    /// Ammunition left.
    pub ammo: u32,
    /// Current state of the agent.
    pub phase: AgentPhase,
    /// Token currently targeted, if any.
    pub target: Option<TokenId>,
    /// Slot occupied by the agent, if docked.
    pub slot: Option<SlotIndex>,
    /// Indicates whether the agent can be dispatched from the staging area.
    pub pickable: bool,
}

/// Read-only snapshot describing every agent known to the world.
#[derive(Clone, Debug, Default)]
pub struct AgentView {
    snapshots: Vec<AgentSnapshot>,
}

impl AgentView {
    /// Creates a new agent view from the provided snapshots.
    #[must_use]
    pub fn from_snapshots(mut snapshots: Vec<AgentSnapshot>) -> Self {
        snapshots.sort_by_key(|snapshot| snapshot.id);
        Self { snapshots }
    }

    /// Iterator over the captured agent snapshots in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &AgentSnapshot> {
        self.snapshots.iter()
    }
}

/// Immutable representation of a single docking slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotSnapshot {
    /// Position of the slot.
    pub index: SlotIndex,
    /// Agent docked in the slot, if any.
    pub occupant: Option<AgentId>,
    /// Indicates whether the slot is taken.
    pub used: bool,
}

/// Reasons a level snapshot cannot be built.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum SnapshotError {
    /// The grid needs at least one row and one column.
    #[error("invalid snapshot: grid dimensions {cols}x{rows} must be positive")]
    NonPositiveDimensions {
        /// Declared lane count.
        cols: i32,
        /// Declared row count.
        rows: i32,
    },
    /// The grid spans more than [`MAX_GRID_CELLS`] cells.
    #[error("invalid snapshot: grid dimensions {cols}x{rows} exceed {max} cells", max = MAX_GRID_CELLS)]
    GridTooLarge {
        /// Declared lane count.
        cols: i32,
        /// Declared row count.
        rows: i32,
    },
    /// A tile lies outside the declared grid.
    #[error("invalid snapshot: tile at column {col}, row {row} lies outside the grid")]
    TileOutOfBounds {
        /// Lane of the offending tile.
        col: i32,
        /// Row of the offending tile.
        row: i32,
    },
    /// Two tiles share one cell.
    #[error("invalid snapshot: more than one tile at column {col}, row {row}")]
    DuplicateCell {
        /// Lane of the shared cell.
        col: i32,
        /// Row of the shared cell.
        row: i32,
    },
}

/// Reason attached to a denied lane claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClaimDenial {
    /// Another agent holds the lane.
    Claimed,
    /// The lane index does not exist.
    OutOfRange,
}

/// Returned when a lane cannot be claimed; callers return to seeking.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
#[error("lane {column} claim denied: {reason:?}")]
pub struct LaneClaimDenied {
    /// Lane that was requested.
    pub column: u32,
    /// Why the claim was denied.
    pub reason: ClaimDenial,
}

/// Reasons a dispatch request may be rejected by the world.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Hash)]
pub enum DispatchError {
    /// Every slot of the bank is taken.
    #[error("no slot available")]
    NoSlotAvailable,
    /// The agent is staged but not on the bottom row of the staging area.
    #[error("agent is not pickable")]
    NotPickable,
    /// No agent with the provided identifier exists.
    #[error("unknown agent")]
    UnknownAgent,
    /// The agent already left the staging area.
    #[error("agent already dispatched")]
    AlreadyDispatched,
}
