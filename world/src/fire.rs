//! In-flight shots and their resolve-once guard.

use std::time::Duration;

use color_drain_core::{ShotId, TokenId};

/// Shot in flight: the lane claim it holds and its resolve-once guard.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FireStep {
    pub(crate) shot: ShotId,
    pub(crate) column: u32,
    pub(crate) token: TokenId,
    pub(crate) deadline: Duration,
    guard: ResolveOnce,
}

impl FireStep {
    pub(crate) fn launch(shot: ShotId, column: u32, token: TokenId, deadline: Duration) -> Self {
        Self {
            shot,
            column,
            token,
            deadline,
            guard: ResolveOnce::default(),
        }
    }

    /// Claims the right to apply this shot's effects. Only the first caller wins.
    pub(crate) fn try_resolve(&mut self) -> bool {
        self.guard.try_claim()
    }

    pub(crate) fn is_due(&self, now: Duration) -> bool {
        now >= self.deadline
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct ResolveOnce {
    resolved: bool,
}

impl ResolveOnce {
    fn try_claim(&mut self) -> bool {
        !std::mem::replace(&mut self.resolved, true)
    }
}
