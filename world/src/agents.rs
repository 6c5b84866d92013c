//! Shooter state machine.
//!
//! Agents never own the grid. Every transition receives the collaborators it
//! needs through an [`AgentContext`], which keeps the world the single owner of
//! lane state and makes the machine testable against a bare [`TileGrid`].

use std::time::Duration;

use color_drain_core::{
    AgentId, AgentPhase, AgentSnapshot, ColorClass, Event, FireCompletion, FireOutcome,
    PuzzleConfig, ShotId, SlotIndex, TokenId,
};
use tracing::debug;

use crate::fire::FireStep;
use crate::grid::{LaneNotice, TileGrid};
use crate::LOG_TARGET;

#[derive(Clone, Copy, Debug)]
pub(crate) enum AgentState {
    Staged,
    Seeking {
        blocked: bool,
        retry_at: Option<Duration>,
    },
    TargetAcquired {
        token: TokenId,
    },
    Firing(FireStep),
    Resolving,
    Cooling {
        until: Duration,
    },
    Stopped {
        restart_at: Option<Duration>,
    },
    Retired,
}

/// Collaborators borrowed by a single agent transition.
pub(crate) struct AgentContext<'a> {
    pub(crate) grid: &'a mut TileGrid,
    pub(crate) config: &'a PuzzleConfig,
    pub(crate) now: Duration,
    pub(crate) next_shot: &'a mut u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SeekResult {
    Firing,
    Blocked { newly: bool },
    Idle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Resolution {
    pub(crate) depleted: bool,
    pub(crate) seek_now: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Agent {
    pub(crate) id: AgentId,
    pub(crate) color: ColorClass,
    pub(crate) ammo: u32,
    pub(crate) state: AgentState,
    pub(crate) slot: Option<SlotIndex>,
    pub(crate) pickable: bool,
}

impl Agent {
    pub(crate) fn staged(id: AgentId, color: ColorClass, ammo: u32) -> Self {
        Self {
            id,
            color,
            ammo,
            state: AgentState::Staged,
            slot: None,
            pickable: false,
        }
    }

    pub(crate) fn dock(&mut self, slot: SlotIndex) {
        self.slot = Some(slot);
        self.pickable = false;
        self.state = AgentState::Seeking {
            blocked: false,
            retry_at: None,
        };
    }

    /// Moves a parked or cooling agent back to seeking.
    pub(crate) fn resume(&mut self) {
        if matches!(
            self.state,
            AgentState::Stopped { .. } | AgentState::Cooling { .. }
        ) {
            self.state = AgentState::Seeking {
                blocked: false,
                retry_at: None,
            };
        }
    }

    pub(crate) fn retire(&mut self) -> Option<SlotIndex> {
        self.state = AgentState::Retired;
        self.pickable = false;
        self.slot.take()
    }

    pub(crate) fn is_staged(&self) -> bool {
        matches!(self.state, AgentState::Staged)
    }

    pub(crate) fn is_blocked(&self) -> bool {
        matches!(self.state, AgentState::Seeking { blocked: true, .. })
    }

    pub(crate) fn is_retired(&self) -> bool {
        matches!(self.state, AgentState::Retired)
    }

    pub(crate) fn phase(&self) -> AgentPhase {
        match self.state {
            AgentState::Staged => AgentPhase::Staged,
            AgentState::Seeking { blocked: true, .. } => AgentPhase::Blocked,
            AgentState::Seeking { .. } => AgentPhase::Seeking,
            AgentState::TargetAcquired { .. } => AgentPhase::TargetAcquired,
            AgentState::Firing(_) => AgentPhase::Firing,
            AgentState::Resolving => AgentPhase::Resolving,
            AgentState::Cooling { .. } => AgentPhase::Cooling,
            AgentState::Stopped { .. } => AgentPhase::Stopped,
            AgentState::Retired => AgentPhase::Retired,
        }
    }

    pub(crate) fn target(&self) -> Option<TokenId> {
        match self.state {
            AgentState::TargetAcquired { token } => Some(token),
            AgentState::Firing(step) => Some(step.token),
            _ => None,
        }
    }

    pub(crate) fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            color: self.color,
            ammo: self.ammo,
            phase: self.phase(),
            target: self.target(),
            slot: self.slot,
            pickable: self.pickable,
        }
    }

    /// Scans the front tokens for a match and, on success, claims the lane and fires.
    pub(crate) fn seek(&mut self, cx: &mut AgentContext<'_>, out: &mut Vec<Event>) -> SeekResult {
        let AgentState::Seeking { blocked, .. } = self.state else {
            return SeekResult::Idle;
        };

        for _ in 0..=cx.grid.columns() {
            let candidate = cx
                .grid
                .front_tokens()
                .into_iter()
                .find(|front| front.color == self.color && !front.selected);
            let Some(front) = candidate else {
                break;
            };
            if !cx.grid.select_token(front.id) {
                continue;
            }

            self.state = AgentState::TargetAcquired { token: front.id };
            out.push(Event::TargetAcquired {
                agent: self.id,
                token: front.id,
                column: front.column,
            });

            match cx.grid.try_claim_lane(front.column) {
                Ok(()) => {
                    let shot = ShotId::new(*cx.next_shot);
                    *cx.next_shot += 1;
                    let deadline = cx.now + cx.config.fire_timeout();
                    self.state =
                        AgentState::Firing(FireStep::launch(shot, front.column, front.id, deadline));
                    debug!(
                        target: LOG_TARGET,
                        agent = self.id.get(),
                        shot = shot.get(),
                        column = front.column,
                        "agent.fire.started"
                    );
                    out.push(Event::FireStarted {
                        agent: self.id,
                        shot,
                        column: front.column,
                        token: front.id,
                    });
                    return SeekResult::Firing;
                }
                Err(denied) => {
                    cx.grid.deselect_token(front.id);
                    self.state = AgentState::Seeking {
                        blocked: false,
                        retry_at: None,
                    };
                    out.push(Event::LaneClaimDenied {
                        agent: self.id,
                        column: denied.column,
                    });
                }
            }
        }

        let retry = cx.config.seek_retry();
        let retry_at = (!retry.is_zero()).then(|| cx.now + retry);
        self.state = AgentState::Seeking {
            blocked: true,
            retry_at,
        };
        if !blocked {
            out.push(Event::AgentBlocked { agent: self.id });
        }
        SeekResult::Blocked { newly: !blocked }
    }

    /// Applies the effects of `shot` exactly once.
    ///
    /// Returns `None` when the shot is not in flight anymore, whichever
    /// completion path arrives second.
    pub(crate) fn resolve(
        &mut self,
        shot: ShotId,
        completion: FireCompletion,
        cx: &mut AgentContext<'_>,
        notices: &mut Vec<LaneNotice>,
        out: &mut Vec<Event>,
    ) -> Option<Resolution> {
        let AgentState::Firing(step) = &mut self.state else {
            return None;
        };
        if step.shot != shot || !step.try_resolve() {
            return None;
        }
        let step = *step;

        self.state = AgentState::Resolving;
        self.ammo = self.ammo.saturating_sub(1);

        let still_front = cx
            .grid
            .front_token(step.column)
            .is_some_and(|front| front.id == step.token);
        let removed = if still_front {
            cx.grid.remove_front(step.column, notices)
        } else {
            None
        };
        let outcome = match removed {
            Some(token) => {
                out.push(Event::TokenRemoved {
                    token: token.id,
                    column: step.column,
                    color: token.color,
                });
                out.push(Event::TilesRemaining {
                    count: cx.grid.live_count(),
                });
                FireOutcome::Removed
            }
            None => FireOutcome::Stale,
        };
        cx.grid.release_lane(step.column, notices);

        debug!(
            target: LOG_TARGET,
            agent = self.id.get(),
            shot = shot.get(),
            ?completion,
            ?outcome,
            ammo_left = self.ammo,
            "agent.fire.resolved"
        );
        out.push(Event::FireResolved {
            agent: self.id,
            shot,
            completion,
            outcome,
            ammo_left: self.ammo,
        });

        if self.ammo == 0 {
            return Some(Resolution {
                depleted: true,
                seek_now: false,
            });
        }

        let interval = cx.config.shot_interval();
        if interval.is_zero() {
            self.state = AgentState::Seeking {
                blocked: false,
                retry_at: None,
            };
            Some(Resolution {
                depleted: false,
                seek_now: true,
            })
        } else {
            self.state = AgentState::Cooling {
                until: cx.now + interval,
            };
            Some(Resolution {
                depleted: false,
                seek_now: false,
            })
        }
    }

    /// Cancels any in-flight shot and parks the agent.
    ///
    /// Returns `false` for retired agents. Stopping an agent whose shot
    /// already resolved leaves the grid untouched.
    pub(crate) fn stop(
        &mut self,
        grid: &mut TileGrid,
        notices: &mut Vec<LaneNotice>,
        out: &mut Vec<Event>,
    ) -> bool {
        match &mut self.state {
            AgentState::Retired => return false,
            AgentState::Firing(step) => {
                if step.try_resolve() {
                    grid.release_lane(step.column, notices);
                    out.push(Event::FireCancelled {
                        agent: self.id,
                        shot: step.shot,
                    });
                }
            }
            AgentState::TargetAcquired { token } => grid.deselect_token(*token),
            _ => {}
        }
        self.state = AgentState::Stopped { restart_at: None };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::LaneChange;
    use color_drain_core::{LevelSnapshot, TileRecord};

    struct Harness {
        grid: TileGrid,
        config: PuzzleConfig,
        next_shot: u64,
        notices: Vec<LaneNotice>,
        events: Vec<Event>,
    }

    impl Harness {
        fn scenario() -> Self {
            use ColorClass::{Blue, Green, Red};
            let lanes: [&[ColorClass]; 3] = [&[Red, Red], &[Blue], &[Red, Green, Red]];
            let mut tiles = Vec::new();
            for (col, lane) in lanes.iter().enumerate() {
                for (row, color) in lane.iter().enumerate() {
                    tiles.push(TileRecord {
                        id: 0,
                        color: *color,
                        row: row as i32,
                        col: col as i32,
                    });
                }
            }
            let mut grid = TileGrid::new();
            grid.build_from_snapshot(&LevelSnapshot {
                rows: 3,
                cols: 3,
                tiles,
                agents: Vec::new(),
            })
            .expect("valid snapshot");
            Self {
                grid,
                config: PuzzleConfig {
                    shot_interval_ms: 0,
                    ..PuzzleConfig::default()
                },
                next_shot: 0,
                notices: Vec::new(),
                events: Vec::new(),
            }
        }

        fn seek(&mut self, agent: &mut Agent, now: Duration) -> SeekResult {
            let mut cx = AgentContext {
                grid: &mut self.grid,
                config: &self.config,
                now,
                next_shot: &mut self.next_shot,
            };
            agent.seek(&mut cx, &mut self.events)
        }

        fn resolve(
            &mut self,
            agent: &mut Agent,
            shot: ShotId,
            completion: FireCompletion,
        ) -> Option<Resolution> {
            let mut cx = AgentContext {
                grid: &mut self.grid,
                config: &self.config,
                now: Duration::from_secs(1),
                next_shot: &mut self.next_shot,
            };
            agent.resolve(shot, completion, &mut cx, &mut self.notices, &mut self.events)
        }

        fn released(&self, column: u32) -> usize {
            self.notices
                .iter()
                .filter(|notice| {
                    notice.column == column && notice.change == LaneChange::Released
                })
                .count()
        }
    }

    fn docked(id: u32, color: ColorClass, ammo: u32) -> Agent {
        let mut agent = Agent::staged(AgentId::new(id), color, ammo);
        agent.dock(SlotIndex::new(id));
        agent
    }

    fn firing_shot(agent: &Agent) -> ShotId {
        match agent.state {
            AgentState::Firing(step) => step.shot,
            other => panic!("agent not firing: {other:?}"),
        }
    }

    #[test]
    fn red_agent_drains_the_front_of_lane_zero() {
        let mut harness = Harness::scenario();
        let mut agent = docked(0, ColorClass::Red, 1);

        assert_eq!(harness.seek(&mut agent, Duration::ZERO), SeekResult::Firing);
        assert!(harness.grid.is_claimed(0));
        let shot = firing_shot(&agent);

        let resolution = harness
            .resolve(&mut agent, shot, FireCompletion::Visual)
            .expect("first resolution applies");

        assert!(resolution.depleted);
        assert_eq!(agent.ammo, 0);
        let lane = harness.grid.lane(0);
        assert_eq!(lane.len(), 1);
        assert_eq!(lane[0].color, ColorClass::Red);
        assert_eq!(lane[0].position.row(), 0);
        assert!(!harness.grid.is_claimed(0));
        assert!(harness
            .events
            .contains(&Event::TilesRemaining { count: 5 }));
    }

    #[test]
    fn timeout_then_visual_completion_resolves_once() {
        let mut harness = Harness::scenario();
        let mut agent = docked(0, ColorClass::Blue, 3);
        assert_eq!(harness.seek(&mut agent, Duration::ZERO), SeekResult::Firing);
        let shot = firing_shot(&agent);

        assert!(harness
            .resolve(&mut agent, shot, FireCompletion::Timeout)
            .is_some());
        assert!(harness
            .resolve(&mut agent, shot, FireCompletion::Visual)
            .is_none());

        assert_eq!(agent.ammo, 2);
        assert_eq!(harness.released(1), 1);
        let resolved = harness
            .events
            .iter()
            .filter(|event| matches!(event, Event::FireResolved { .. }))
            .count();
        assert_eq!(resolved, 1);
    }

    #[test]
    fn agent_without_matching_front_blocks_once() {
        let mut harness = Harness::scenario();
        let mut agent = docked(0, ColorClass::Yellow, 2);

        assert_eq!(
            harness.seek(&mut agent, Duration::ZERO),
            SeekResult::Blocked { newly: true }
        );
        assert_eq!(
            harness.seek(&mut agent, Duration::from_secs(1)),
            SeekResult::Blocked { newly: false }
        );
        assert_eq!(agent.phase(), AgentPhase::Blocked);
        let blocked = harness
            .events
            .iter()
            .filter(|event| matches!(event, Event::AgentBlocked { .. }))
            .count();
        assert_eq!(blocked, 1);
    }

    #[test]
    fn two_agents_never_share_a_lane() {
        let mut harness = Harness::scenario();
        let mut first = docked(0, ColorClass::Blue, 1);
        let mut second = docked(1, ColorClass::Blue, 1);

        assert_eq!(harness.seek(&mut first, Duration::ZERO), SeekResult::Firing);
        assert_eq!(
            harness.seek(&mut second, Duration::ZERO),
            SeekResult::Blocked { newly: true }
        );
        assert_eq!(harness.grid.pending_removals(1), 1);
    }

    #[test]
    fn stop_during_flight_releases_lane_without_spending_ammo() {
        let mut harness = Harness::scenario();
        let mut agent = docked(0, ColorClass::Red, 4);
        assert_eq!(harness.seek(&mut agent, Duration::ZERO), SeekResult::Firing);
        let shot = firing_shot(&agent);

        assert!(agent.stop(&mut harness.grid, &mut harness.notices, &mut harness.events));
        assert!(harness
            .resolve(&mut agent, shot, FireCompletion::Visual)
            .is_none());

        assert_eq!(agent.ammo, 4);
        assert_eq!(agent.phase(), AgentPhase::Stopped);
        assert_eq!(harness.grid.live_count(), 6);
        assert_eq!(harness.released(0), 1);
        let front = harness.grid.front_token(0).expect("front kept");
        assert!(!front.selected && !front.busy);
    }

    #[test]
    fn shot_interval_cools_before_next_scan() {
        let mut harness = Harness::scenario();
        harness.config.shot_interval_ms = 250;
        let mut agent = docked(0, ColorClass::Red, 2);
        let _ = harness.seek(&mut agent, Duration::ZERO);
        let shot = firing_shot(&agent);

        let resolution = harness
            .resolve(&mut agent, shot, FireCompletion::Visual)
            .expect("resolves");

        assert!(!resolution.seek_now);
        assert_eq!(agent.phase(), AgentPhase::Cooling);
        agent.resume();
        assert_eq!(agent.phase(), AgentPhase::Seeking);
    }

    #[test]
    fn stale_target_releases_lane_without_removal() {
        let mut harness = Harness::scenario();
        let mut agent = docked(0, ColorClass::Blue, 2);
        let _ = harness.seek(&mut agent, Duration::ZERO);
        let shot = firing_shot(&agent);
        let _ = harness
            .grid
            .remove_front(1, &mut harness.notices)
            .expect("front vanished");

        let _ = harness
            .resolve(&mut agent, shot, FireCompletion::Visual)
            .expect("resolves");

        assert!(harness.events.iter().any(|event| matches!(
            event,
            Event::FireResolved {
                outcome: FireOutcome::Stale,
                ..
            }
        )));
        assert!(!harness.grid.is_claimed(1));
        assert_eq!(agent.ammo, 1);
    }
}
