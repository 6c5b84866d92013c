#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure autoplay policy that decides which staged agent enters the slot bank.

use color_drain_core::{AgentId, AgentPhase, AgentView, ColorClass, Command, FrontToken};

/// Configuration parameters required to construct the dispatch system.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    reserved_slots: usize,
}

impl Config {
    /// Creates a configuration that keeps `reserved_slots` free for agents
    /// with a matching front token.
    #[must_use]
    pub const fn new(reserved_slots: usize) -> Self {
        Self { reserved_slots }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Priority {
    Filler,
    PairsDocked,
    CompletesRun,
    MatchesFront,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    agent: AgentId,
    priority: Priority,
    ammo: u32,
}

/// Dispatch system that reuses a scratch buffer between calls.
#[derive(Debug, Default)]
pub struct AutoDispatch {
    reserved_slots: usize,
    candidates: Vec<Candidate>,
}

impl AutoDispatch {
    /// Creates a new dispatch system using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            reserved_slots: config.reserved_slots,
            candidates: Vec::new(),
        }
    }

    /// Emits at most one [`Command::DispatchAgent`] for the best pickable agent.
    ///
    /// An agent whose color matches an unselected front token is preferred,
    /// then one whose color already has two docked agents, then one that
    /// pairs with a single docked agent of its color. Other agents are only sent
    /// while more than the reserved number of slots is free. Ties go to the
    /// agent with more ammunition, then to the lower identifier.
    pub fn handle(
        &mut self,
        agents: &AgentView,
        fronts: &[FrontToken],
        free_slots: usize,
        out: &mut Vec<Command>,
    ) {
        self.candidates.clear();
        if free_slots == 0 {
            return;
        }

        let docked = |color: ColorClass| {
            agents
                .iter()
                .filter(|agent| agent.slot.is_some() && agent.phase != AgentPhase::Retired)
                .filter(|agent| agent.color == color)
                .count()
        };

        for agent in agents.iter() {
            if agent.phase != AgentPhase::Staged || !agent.pickable {
                continue;
            }
            let matches_front = fronts
                .iter()
                .any(|front| front.color == agent.color && !front.selected);
            let priority = if matches_front {
                Priority::MatchesFront
            } else {
                match docked(agent.color) {
                    0 => Priority::Filler,
                    1 => Priority::PairsDocked,
                    _ => Priority::CompletesRun,
                }
            };
            self.candidates.push(Candidate {
                agent: agent.id,
                priority,
                ammo: agent.ammo,
            });
        }

        let best = self.candidates.iter().max_by(|left, right| {
            left.priority
                .cmp(&right.priority)
                .then(left.ammo.cmp(&right.ammo))
                .then(right.agent.cmp(&left.agent))
        });
        let Some(best) = best else {
            return;
        };
        if best.priority == Priority::Filler && free_slots <= self.reserved_slots {
            return;
        }
        out.push(Command::DispatchAgent { agent: best.agent });
    }
}
