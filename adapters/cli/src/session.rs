use std::{fmt, time::Duration};

use color_drain_core::{
    AgentPhase, Command, Event, FireCompletion, LevelSnapshot, PuzzleConfig, SnapshotError,
};
use color_drain_system_dispatch::{self as dispatch, AutoDispatch};
use color_drain_system_fire_animation::{self as fire_animation, FireAnimation};
use color_drain_world::{self as world, query, World};
use tracing::{debug, info};

const LOG_TARGET: &str = "color_drain::session";

/// Parameters of a headless autoplay session.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SessionSettings {
    pub(crate) tick: Duration,
    pub(crate) max_ticks: u64,
    pub(crate) travel: Duration,
    pub(crate) drop_completions: bool,
    pub(crate) reserved_slots: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            max_ticks: 20_000,
            travel: Duration::from_millis(300),
            drop_completions: false,
            reserved_slots: 1,
        }
    }
}

/// Way a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Cleared,
    GameOver,
    /// Every agent left play while tokens remain.
    Stranded,
    OutOfTicks,
    Rejected(SnapshotError),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cleared => f.write_str("cleared"),
            Self::GameOver => f.write_str("game over"),
            Self::Stranded => f.write_str("stranded"),
            Self::OutOfTicks => f.write_str("out of ticks"),
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Summary {
    pub(crate) outcome: Outcome,
    pub(crate) ticks: u64,
    pub(crate) elapsed: Duration,
    pub(crate) shots: u32,
    pub(crate) timeouts: u32,
    pub(crate) cancelled: u32,
    pub(crate) merges: u32,
    pub(crate) dispatched: u32,
    pub(crate) tiles_left: u32,
}

impl Summary {
    fn new() -> Self {
        Self {
            outcome: Outcome::OutOfTicks,
            ticks: 0,
            elapsed: Duration::ZERO,
            shots: 0,
            timeouts: 0,
            cancelled: 0,
            merges: 0,
            dispatched: 0,
            tiles_left: 0,
        }
    }

    fn record(&mut self, events: &[Event]) -> Option<Outcome> {
        let mut outcome = None;
        for event in events {
            match event {
                Event::LevelRejected { reason } => outcome = Some(Outcome::Rejected(*reason)),
                Event::AgentDocked { .. } => self.dispatched += 1,
                Event::FireResolved { completion, .. } => {
                    self.shots += 1;
                    if *completion == FireCompletion::Timeout {
                        self.timeouts += 1;
                    }
                }
                Event::FireCancelled { .. } => self.cancelled += 1,
                Event::AgentsMerged { .. } => self.merges += 1,
                Event::GameOver => outcome = Some(Outcome::GameOver),
                _ => {}
            }
        }
        outcome
    }
}

/// Plays `snapshot` to completion with the autoplay dispatcher.
pub(crate) fn play(
    puzzle: PuzzleConfig,
    snapshot: LevelSnapshot,
    settings: &SessionSettings,
) -> Summary {
    let mut world = World::with_config(puzzle);
    let mut dispatcher = AutoDispatch::new(dispatch::Config::new(settings.reserved_slots));
    let mut animation = FireAnimation::new(animation_config(settings));
    let mut summary = Summary::new();

    let mut events = Vec::new();
    world::apply(&mut world, Command::LoadLevel { snapshot }, &mut events);
    if let Some(outcome) = summary.record(&events) {
        summary.outcome = outcome;
        return summary;
    }
    let (staging_columns, staging_rows) = query::staging_dimensions(&world);
    info!(
        target: LOG_TARGET,
        tokens = query::tiles_remaining(&world),
        staged = query::staging_layout(&world).len(),
        staging_columns,
        staging_rows,
        slots = query::config(&world).slot_count,
        "session.started"
    );
    let mut commands = Vec::new();
    animation.handle(&events, &mut commands);

    while summary.ticks < settings.max_ticks {
        events.clear();
        commands.clear();

        let free_slots = query::slots(&world)
            .iter()
            .filter(|slot| !slot.used)
            .count();
        dispatcher.handle(
            &query::agent_view(&world),
            &query::front_tokens(&world),
            free_slots,
            &mut commands,
        );
        commands.push(Command::Tick { dt: settings.tick });
        summary.ticks += 1;

        while !commands.is_empty() {
            let mut step = Vec::new();
            for command in commands.drain(..) {
                world::apply(&mut world, command, &mut step);
            }
            animation.handle(&step, &mut commands);
            events.append(&mut step);
        }

        if let Some(outcome) = summary.record(&events) {
            summary.outcome = outcome;
            break;
        }
        if query::tiles_remaining(&world) == 0 {
            summary.outcome = Outcome::Cleared;
            break;
        }
        if query::agent_view(&world)
            .iter()
            .all(|agent| agent.phase == AgentPhase::Retired)
        {
            summary.outcome = Outcome::Stranded;
            break;
        }
        debug!(
            target: LOG_TARGET,
            tick = summary.ticks,
            in_flight = animation.in_flight(),
            "session.tick"
        );
    }

    summary.elapsed = query::clock(&world);
    summary.tiles_left = query::tiles_remaining(&world);
    info!(
        target: LOG_TARGET,
        outcome = %summary.outcome,
        ticks = summary.ticks,
        shots = summary.shots,
        merges = summary.merges,
        tiles_left = summary.tiles_left,
        "session.finished"
    );
    summary
}

fn animation_config(settings: &SessionSettings) -> fire_animation::Config {
    let config = fire_animation::Config::new(settings.travel);
    if settings.drop_completions {
        config.dropping_completions()
    } else {
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_drain_core::{AgentRecord, ColorClass, TileRecord};

    fn lanes(columns: &[&[ColorClass]], agents: &[(ColorClass, i32)]) -> LevelSnapshot {
        let mut tiles = Vec::new();
        for (col, lane) in columns.iter().enumerate() {
            for (row, color) in lane.iter().enumerate() {
                tiles.push(TileRecord {
                    id: tiles.len() as i32,
                    color: *color,
                    row: row as i32,
                    col: col as i32,
                });
            }
        }
        LevelSnapshot {
            rows: columns.iter().map(|lane| lane.len()).max().unwrap_or(0) as i32,
            cols: columns.len() as i32,
            tiles,
            agents: agents
                .iter()
                .map(|&(color, ammo)| AgentRecord { color, ammo })
                .collect(),
        }
    }

    fn balanced() -> LevelSnapshot {
        use ColorClass::{Blue, Green, Red};
        lanes(
            &[&[Red, Blue, Green], &[Blue, Blue, Red], &[Green, Red, Green]],
            &[(Green, 3), (Red, 3), (Blue, 3)],
        )
    }

    #[test]
    fn balanced_level_is_cleared() {
        let summary = play(
            PuzzleConfig::default(),
            balanced(),
            &SessionSettings::default(),
        );

        assert_eq!(summary.outcome, Outcome::Cleared);
        assert_eq!(summary.shots, 9);
        assert_eq!(summary.timeouts, 0);
        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.tiles_left, 0);
    }

    #[test]
    fn dropped_completions_still_clear_through_timeouts() {
        let settings = SessionSettings {
            drop_completions: true,
            ..SessionSettings::default()
        };

        let summary = play(PuzzleConfig::default(), balanced(), &settings);

        assert_eq!(summary.outcome, Outcome::Cleared);
        assert_eq!(summary.timeouts, summary.shots);
    }

    #[test]
    fn short_roster_strands_the_level() {
        use ColorClass::Red;
        let snapshot = lanes(&[&[Red, Red, Red]], &[(Red, 2)]);

        let summary = play(PuzzleConfig::default(), snapshot, &SessionSettings::default());

        assert_eq!(summary.outcome, Outcome::Stranded);
        assert_eq!(summary.tiles_left, 1);
    }

    #[test]
    fn invalid_level_is_rejected_before_play() {
        let mut snapshot = balanced();
        snapshot.cols = 0;

        let summary = play(PuzzleConfig::default(), snapshot, &SessionSettings::default());

        assert!(matches!(summary.outcome, Outcome::Rejected(_)));
        assert_eq!(summary.ticks, 0);
    }

    #[test]
    fn tick_budget_bounds_the_session() {
        let settings = SessionSettings {
            max_ticks: 2,
            ..SessionSettings::default()
        };

        let summary = play(PuzzleConfig::default(), balanced(), &settings);

        assert_eq!(summary.outcome, Outcome::OutOfTicks);
        assert_eq!(summary.ticks, 2);
        assert_eq!(summary.elapsed, Duration::from_millis(100));
    }
}
