#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state management for Color Drain.
//!
//! The world owns the token grid, every agent, the staging area and the slot
//! bank. All mutations flow through [`apply`]; adapters and systems observe
//! the results through the emitted [`Event`] stream and the [`query`] module.

mod agents;
mod fire;
mod grid;
mod slots;
mod staging;

use std::time::Duration;

use color_drain_core::{
    AgentId, Command, DispatchError, Event, FireCompletion, LevelSnapshot, PuzzleConfig,
    RetireReason, ShotId, SlotIndex,
};
use color_drain_hub::ObserverHub;
use tracing::{debug, info, warn};

use crate::agents::{Agent, AgentContext, AgentState, SeekResult};
use crate::staging::StagingArea;

pub use crate::grid::{LaneChange, LaneNotice, TileGrid};
pub use crate::slots::{MergeTriple, SlotBank};
pub use crate::staging::StagedAgent;

const LOG_TARGET: &str = "color_drain::world";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Topic {
    LaneAdvanced,
    LaneReleased,
    BankFull,
    SlotFreed,
}

/// Hub handle. Agent handles order by slot first, which fixes the wake-up
/// order when several blocked agents react to one lane notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Subscriber {
    Agent { slot: SlotIndex, agent: AgentId },
    DeadlockWatch,
}

/// Represents the authoritative Color Drain world state.
#[derive(Debug)]
pub struct World {
    config: PuzzleConfig,
    grid: TileGrid,
    agents: Vec<Agent>,
    staging: StagingArea,
    slots: SlotBank,
    hub: ObserverHub<Topic, Subscriber>,
    notices: Vec<LaneNotice>,
    clock: Duration,
    next_shot: u64,
    deadlock_check_at: Option<Duration>,
    game_over: bool,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates an empty world using the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(PuzzleConfig::default())
    }

    /// Creates an empty world that uses `config` for every level it loads.
    #[must_use]
    pub fn with_config(config: PuzzleConfig) -> Self {
        Self {
            grid: TileGrid::new(),
            agents: Vec::new(),
            staging: StagingArea::default(),
            slots: SlotBank::new(config.slot_count),
            hub: ObserverHub::new(),
            notices: Vec::new(),
            clock: Duration::ZERO,
            next_shot: 0,
            deadlock_check_at: None,
            game_over: false,
            config,
        }
    }

    fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(id.get() as usize)
    }

    fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agents.get_mut(id.get() as usize)
    }

    /// Docked agents matching `filter`, in slot order.
    fn docked_where<F>(&self, filter: F) -> Vec<AgentId>
    where
        F: Fn(&Agent) -> bool,
    {
        self.slots
            .occupants()
            .filter(|(_, id)| self.agent(*id).is_some_and(&filter))
            .map(|(_, id)| id)
            .collect()
    }

    fn load_level(&mut self, snapshot: &LevelSnapshot, out_events: &mut Vec<Event>) {
        let mut grid = TileGrid::new();
        if let Err(reason) = grid.build_from_snapshot(snapshot) {
            warn!(target: LOG_TARGET, %reason, "level.rejected");
            out_events.push(Event::LevelRejected { reason });
            return;
        }

        self.grid = grid;
        self.agents = snapshot
            .agents
            .iter()
            .enumerate()
            .map(|(index, record)| {
                Agent::staged(AgentId::new(index as u32), record.color, record.clamped_ammo())
            })
            .collect();
        let roster: Vec<AgentId> = self.agents.iter().map(|agent| agent.id).collect();
        self.staging = StagingArea::arrange(
            &roster,
            self.config.staging_columns,
            self.config.staging_shuffle_seed,
        );
        self.refresh_pickable();
        self.slots = SlotBank::new(self.config.slot_count);
        self.hub.clear();
        let _ = self.hub.subscribe(Topic::BankFull, Subscriber::DeadlockWatch);
        let _ = self.hub.subscribe(Topic::SlotFreed, Subscriber::DeadlockWatch);
        self.notices.clear();
        self.deadlock_check_at = None;
        self.game_over = false;

        info!(
            target: LOG_TARGET,
            columns = self.grid.columns(),
            rows = self.grid.rows(),
            tokens = self.grid.live_count(),
            agents = roster.len(),
            "level.loaded"
        );
        out_events.push(Event::LevelLoaded {
            columns: self.grid.columns(),
            rows: self.grid.rows(),
            tokens: self.grid.live_count(),
            agents: roster.len() as u32,
        });
    }

    fn refresh_pickable(&mut self) {
        let Self {
            agents, staging, ..
        } = self;
        for agent in agents.iter_mut() {
            agent.pickable = agent.is_staged() && staging.is_pickable(agent.id);
        }
    }

    fn validate_dispatch(&self, id: AgentId) -> Result<(), DispatchError> {
        let agent = self.agent(id).ok_or(DispatchError::UnknownAgent)?;
        if !agent.is_staged() || !self.staging.contains(id) {
            return Err(DispatchError::AlreadyDispatched);
        }
        if !self.staging.is_pickable(id) {
            return Err(DispatchError::NotPickable);
        }
        if self.slots.is_full() {
            return Err(DispatchError::NoSlotAvailable);
        }
        Ok(())
    }

    fn dispatch(&mut self, id: AgentId, out_events: &mut Vec<Event>) {
        let slot = match self
            .validate_dispatch(id)
            .and_then(|()| self.slots.assign(id))
        {
            Ok(slot) => slot,
            Err(reason) => {
                debug!(target: LOG_TARGET, agent = id.get(), %reason, "dispatch.rejected");
                out_events.push(Event::DispatchRejected { agent: id, reason });
                return;
            }
        };

        let _ = self.staging.remove(id);
        self.refresh_pickable();
        if let Some(agent) = self.agent_mut(id) {
            agent.dock(slot);
        }
        let handle = Subscriber::Agent { slot, agent: id };
        let _ = self.hub.subscribe(Topic::LaneAdvanced, handle);
        let _ = self.hub.subscribe(Topic::LaneReleased, handle);

        info!(target: LOG_TARGET, agent = id.get(), slot = slot.get(), "agent.docked");
        out_events.push(Event::AgentDocked { agent: id, slot });

        let color_of = |candidate: AgentId| {
            self.agent(candidate)
                .filter(|agent| !agent.is_retired())
                .map(|agent| agent.color)
        };
        if let Some(triple) = self.slots.evaluate_adjacency(id, color_of) {
            self.merge(triple, out_events);
            return;
        }

        if self.slots.is_full() {
            self.publish_bank(Topic::BankFull);
        }
        self.seek(id, out_events);
    }

    fn merge(&mut self, triple: MergeTriple, out_events: &mut Vec<Event>) {
        let members = [triple.left, triple.middle, triple.right];
        {
            let Self {
                agents,
                grid,
                notices,
                ..
            } = self;
            for member in members {
                if let Some(agent) = agents.get_mut(member.get() as usize) {
                    let _ = agent.stop(grid, notices, out_events);
                }
            }
        }

        let donated: u32 = [triple.left, triple.right]
            .into_iter()
            .filter_map(|member| self.agent(member))
            .fold(0, |total, agent| total.saturating_add(agent.ammo));
        let restart_at = self.clock + self.config.merge_settle();
        let Some(middle) = self.agent_mut(triple.middle) else {
            return;
        };
        middle.ammo = middle.ammo.saturating_add(donated);
        middle.state = AgentState::Stopped {
            restart_at: Some(restart_at),
        };
        let ammo = middle.ammo;

        info!(
            target: LOG_TARGET,
            left = triple.left.get(),
            middle = triple.middle.get(),
            right = triple.right.get(),
            ammo,
            "agents.merged"
        );
        out_events.push(Event::AgentsMerged {
            left: triple.left,
            middle: triple.middle,
            right: triple.right,
            ammo,
        });

        self.retire(triple.left, RetireReason::Merged, out_events);
        self.retire(triple.right, RetireReason::Merged, out_events);
        self.broadcast_lane_notices(out_events);
    }

    fn stop_agent(&mut self, id: AgentId, out_events: &mut Vec<Event>) {
        let Some(agent) = self.agent(id) else {
            return;
        };
        if agent.is_retired() {
            return;
        }
        if agent.is_staged() {
            let _ = self.staging.remove(id);
            self.refresh_pickable();
        }

        {
            let Self {
                agents,
                grid,
                notices,
                ..
            } = self;
            if let Some(agent) = agents.get_mut(id.get() as usize) {
                let _ = agent.stop(grid, notices, out_events);
            }
        }
        self.retire(id, RetireReason::Stopped, out_events);
        self.broadcast_lane_notices(out_events);
    }

    fn retire(&mut self, id: AgentId, reason: RetireReason, out_events: &mut Vec<Event>) {
        let Some(agent) = self.agent_mut(id) else {
            return;
        };
        if agent.is_retired() {
            return;
        }
        let slot = agent.retire();
        let _ = self.slots.release(id);
        if let Some(slot) = slot {
            let _ = self
                .hub
                .unsubscribe_all(Subscriber::Agent { slot, agent: id });
        }

        info!(
            target: LOG_TARGET,
            agent = id.get(),
            slot = slot.map(|slot| slot.get()),
            ?reason,
            "agent.retired"
        );
        out_events.push(Event::AgentRetired {
            agent: id,
            slot,
            reason,
        });
        if slot.is_some() {
            self.publish_bank(Topic::SlotFreed);
        }
    }

    fn seek(&mut self, id: AgentId, out_events: &mut Vec<Event>) {
        let result = {
            let Self {
                agents,
                grid,
                config,
                clock,
                next_shot,
                ..
            } = self;
            let Some(agent) = agents.get_mut(id.get() as usize) else {
                return;
            };
            let mut cx = AgentContext {
                grid,
                config,
                now: *clock,
                next_shot,
            };
            agent.seek(&mut cx, out_events)
        };
        if result == (SeekResult::Blocked { newly: true }) && self.slots.is_full() {
            self.publish_bank(Topic::BankFull);
        }
    }

    fn resolve_shot(
        &mut self,
        id: AgentId,
        shot: ShotId,
        completion: FireCompletion,
        out_events: &mut Vec<Event>,
    ) {
        let resolution = {
            let Self {
                agents,
                grid,
                config,
                clock,
                next_shot,
                notices,
                ..
            } = self;
            let Some(agent) = agents.get_mut(id.get() as usize) else {
                return;
            };
            let mut cx = AgentContext {
                grid,
                config,
                now: *clock,
                next_shot,
            };
            agent.resolve(shot, completion, &mut cx, notices, out_events)
        };
        let Some(resolution) = resolution else {
            debug!(
                target: LOG_TARGET,
                agent = id.get(),
                shot = shot.get(),
                ?completion,
                "fire.completion.ignored"
            );
            return;
        };

        if resolution.depleted {
            self.retire(id, RetireReason::Depleted, out_events);
        }
        self.broadcast_lane_notices(out_events);
        if self.grid.live_count() == 0 {
            info!(target: LOG_TARGET, "level.cleared");
        }
        if resolution.seek_now {
            self.seek(id, out_events);
        }
    }

    /// Publishes buffered grid notices to the agents subscribed to lane topics.
    ///
    /// Only blocked agents rescan; the others pick up lane changes on their
    /// next scheduled scan.
    fn broadcast_lane_notices(&mut self, out_events: &mut Vec<Event>) {
        let mut newly_blocked = false;
        for notice in std::mem::take(&mut self.notices) {
            let topic = match notice.change {
                LaneChange::Advanced => Topic::LaneAdvanced,
                LaneChange::Released => {
                    out_events.push(Event::LaneReleased {
                        column: notice.column,
                    });
                    Topic::LaneReleased
                }
            };

            let Self {
                hub,
                agents,
                grid,
                config,
                clock,
                next_shot,
                ..
            } = self;
            let _ = hub.publish(topic, &notice, |subscriber, _| {
                let Subscriber::Agent { slot, agent: id } = subscriber else {
                    return;
                };
                let Some(agent) = agents.get_mut(id.get() as usize) else {
                    return;
                };
                if !agent.is_blocked() {
                    return;
                }
                debug!(
                    target: LOG_TARGET,
                    agent = id.get(),
                    slot = slot.get(),
                    column = notice.column,
                    "agent.woken"
                );
                let mut cx = AgentContext {
                    grid: &mut *grid,
                    config: &*config,
                    now: *clock,
                    next_shot: &mut *next_shot,
                };
                if agent.seek(&mut cx, out_events) == (SeekResult::Blocked { newly: true }) {
                    newly_blocked = true;
                }
            });
        }
        if newly_blocked && self.slots.is_full() {
            self.publish_bank(Topic::BankFull);
        }
    }

    /// Notifies the deadlock watch that the bank filled up or a slot opened.
    ///
    /// A cleared grid cannot deadlock, so a full bank is not reported then.
    fn publish_bank(&mut self, topic: Topic) {
        if topic == Topic::BankFull && self.grid.live_count() == 0 {
            return;
        }
        let Self {
            hub,
            config,
            clock,
            deadlock_check_at,
            ..
        } = self;
        let _ = hub.publish(topic, &(), |subscriber, _| {
            if subscriber != Subscriber::DeadlockWatch {
                return;
            }
            match topic {
                Topic::BankFull if deadlock_check_at.is_none() => {
                    *deadlock_check_at = Some(*clock + config.deadlock_grace());
                }
                Topic::SlotFreed => *deadlock_check_at = None,
                _ => {}
            }
        });
    }

    fn tick(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        self.clock = self.clock.saturating_add(dt);
        out_events.push(Event::TimeAdvanced { dt });

        self.expire_fire_steps(out_events);
        self.finish_cooldowns(out_events);
        self.restart_merged(out_events);
        self.retry_blocked(out_events);
        self.check_deadlock(out_events);
    }

    fn expire_fire_steps(&mut self, out_events: &mut Vec<Event>) {
        let now = self.clock;
        let mut due: Vec<(Duration, AgentId, ShotId)> = self
            .slots
            .occupants()
            .filter_map(|(_, id)| match self.agent(id)?.state {
                AgentState::Firing(step) if step.is_due(now) => Some((step.deadline, id, step.shot)),
                _ => None,
            })
            .collect();
        due.sort_by_key(|(deadline, _, _)| *deadline);

        for (_, id, shot) in due {
            debug!(
                target: LOG_TARGET,
                agent = id.get(),
                shot = shot.get(),
                "fire.timeout"
            );
            self.resolve_shot(id, shot, FireCompletion::Timeout, out_events);
        }
    }

    fn finish_cooldowns(&mut self, out_events: &mut Vec<Event>) {
        let now = self.clock;
        let ready = self.docked_where(
            |agent| matches!(agent.state, AgentState::Cooling { until } if until <= now),
        );
        for id in ready {
            if let Some(agent) = self.agent_mut(id) {
                agent.resume();
            }
            self.seek(id, out_events);
        }
    }

    fn restart_merged(&mut self, out_events: &mut Vec<Event>) {
        let now = self.clock;
        let ready = self.docked_where(|agent| {
            matches!(agent.state, AgentState::Stopped { restart_at: Some(at) } if at <= now)
        });
        for id in ready {
            if let Some(agent) = self.agent_mut(id) {
                agent.resume();
            }
            debug!(target: LOG_TARGET, agent = id.get(), "agent.restarted");
            out_events.push(Event::AgentRestarted { agent: id });
            self.seek(id, out_events);
        }
    }

    fn retry_blocked(&mut self, out_events: &mut Vec<Event>) {
        let now = self.clock;
        let ready = self.docked_where(|agent| {
            matches!(
                agent.state,
                AgentState::Seeking {
                    blocked: true,
                    retry_at: Some(at),
                } if at <= now
            )
        });
        for id in ready {
            self.seek(id, out_events);
        }
    }

    fn check_deadlock(&mut self, out_events: &mut Vec<Event>) {
        let Some(at) = self.deadlock_check_at else {
            return;
        };
        if self.clock < at {
            return;
        }
        self.deadlock_check_at = None;
        if self.game_over || !self.slots.is_full() || self.grid.live_count() == 0 {
            return;
        }

        let stuck = self
            .slots
            .occupants()
            .all(|(_, id)| self.agent(id).is_some_and(Agent::is_blocked));
        if stuck {
            self.game_over = true;
            warn!(
                target: LOG_TARGET,
                docked = self.slots.occupied(),
                tokens = self.grid.live_count(),
                "game.over"
            );
            out_events.push(Event::GameOver);
        }
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Configure { config } => {
            debug!(target: LOG_TARGET, ?config, "world.configured");
            world.config = config;
        }
        Command::LoadLevel { snapshot } => world.load_level(&snapshot, out_events),
        Command::Tick { dt } => world.tick(dt, out_events),
        Command::DispatchAgent { agent } => world.dispatch(agent, out_events),
        Command::CompleteFireStep { agent, shot } => {
            world.resolve_shot(agent, shot, FireCompletion::Visual, out_events);
        }
        Command::StopAgent { agent } => world.stop_agent(agent, out_events),
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use super::{SlotBank, StagedAgent, TileGrid, World};
    use color_drain_core::{AgentId, AgentSnapshot, AgentView, FrontToken, PuzzleConfig, SlotSnapshot};

    /// Provides read-only access to the token grid.
    #[must_use]
    pub fn grid(world: &World) -> &TileGrid {
        &world.grid
    }

    /// Front tokens of every unclaimed, non-empty lane in lane order.
    #[must_use]
    pub fn front_tokens(world: &World) -> Vec<FrontToken> {
        world.grid.front_tokens()
    }

    /// Number of tokens left in the grid.
    #[must_use]
    pub fn tiles_remaining(world: &World) -> u32 {
        world.grid.live_count()
    }

    /// Captures a read-only view of every agent, staged, docked or retired.
    #[must_use]
    pub fn agent_view(world: &World) -> AgentView {
        AgentView::from_snapshots(world.agents.iter().map(|agent| agent.snapshot()).collect())
    }

    /// Snapshot of a single agent.
    #[must_use]
    pub fn agent(world: &World, agent: AgentId) -> Option<AgentSnapshot> {
        world.agent(agent).map(|agent| agent.snapshot())
    }

    /// Provides read-only access to the slot bank.
    #[must_use]
    pub fn slot_bank(world: &World) -> &SlotBank {
        &world.slots
    }

    /// Captures the state of every docking slot.
    #[must_use]
    pub fn slots(world: &World) -> Vec<SlotSnapshot> {
        world.slots.snapshots()
    }

    /// Agents waiting in the staging area with their cells.
    #[must_use]
    pub fn staging_layout(world: &World) -> Vec<StagedAgent> {
        world.staging.layout()
    }

    /// Column and row count of the staging arrangement.
    #[must_use]
    pub fn staging_dimensions(world: &World) -> (u32, u32) {
        world.staging.dimensions()
    }

    /// Number of agents still waiting in the staging area.
    #[must_use]
    pub fn staged_count(world: &World) -> usize {
        world.staging.len()
    }

    /// Agents that can be dispatched right now, in staging column order.
    #[must_use]
    pub fn pickable_agents(world: &World) -> Vec<AgentId> {
        world.staging.pickable().collect()
    }

    /// Reports whether the deadlock check raised game over.
    #[must_use]
    pub fn is_game_over(world: &World) -> bool {
        world.game_over
    }

    /// Simulated time elapsed since the world was created.
    #[must_use]
    pub fn clock(world: &World) -> Duration {
        world.clock
    }

    /// Configuration currently in effect.
    #[must_use]
    pub fn config(world: &World) -> &PuzzleConfig {
        &world.config
    }
}
