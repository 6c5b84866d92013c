#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Headless stand-in for the visual fire step.
//!
//! Every shot announced by [`Event::FireStarted`] travels for a fixed time
//! measured from [`Event::TimeAdvanced`] events, after which the system reports
//! its arrival through [`Command::CompleteFireStep`]. Shots the world resolved
//! or cancelled on its own are forgotten.

use std::time::Duration;

use color_drain_core::{AgentId, Command, Event, ShotId};

/// Configuration parameters required to construct the fire animation system.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    travel_time: Duration,
    drop_completions: bool,
}

impl Config {
    /// Creates a configuration whose shots land after `travel_time`.
    #[must_use]
    pub const fn new(travel_time: Duration) -> Self {
        Self {
            travel_time,
            drop_completions: false,
        }
    }

    /// Never reports completion, leaving every shot to the world's timeout.
    #[must_use]
    pub const fn dropping_completions(mut self) -> Self {
        self.drop_completions = true;
        self
    }
}

#[derive(Clone, Copy, Debug)]
struct Projectile {
    agent: AgentId,
    shot: ShotId,
    elapsed: Duration,
}

/// Pure system that turns elapsed time into fire-step completions.
#[derive(Debug)]
pub struct FireAnimation {
    travel_time: Duration,
    drop_completions: bool,
    in_flight: Vec<Projectile>,
}

impl FireAnimation {
    /// Creates a new fire animation system using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            travel_time: config.travel_time,
            drop_completions: config.drop_completions,
            in_flight: Vec::new(),
        }
    }

    /// Number of shots still travelling.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Consumes world events and emits completions for shots that landed.
    ///
    /// Completions are emitted in launch order.
    pub fn handle(&mut self, events: &[Event], out: &mut Vec<Command>) {
        for event in events {
            match event {
                Event::LevelLoaded { .. } => self.in_flight.clear(),
                Event::FireStarted { agent, shot, .. } if !self.drop_completions => {
                    self.in_flight.push(Projectile {
                        agent: *agent,
                        shot: *shot,
                        elapsed: Duration::ZERO,
                    });
                }
                Event::FireResolved { shot, .. } | Event::FireCancelled { shot, .. } => {
                    self.in_flight.retain(|projectile| projectile.shot != *shot);
                }
                Event::TimeAdvanced { dt } => {
                    for projectile in &mut self.in_flight {
                        projectile.elapsed = projectile.elapsed.saturating_add(*dt);
                    }
                }
                _ => {}
            }
        }

        let travel_time = self.travel_time;
        self.in_flight.retain(|projectile| {
            if projectile.elapsed < travel_time {
                return true;
            }
            out.push(Command::CompleteFireStep {
                agent: projectile.agent,
                shot: projectile.shot,
            });
            false
        });
    }
}
