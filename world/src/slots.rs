//! Fixed row of docking slots and the adjacency rule that merges agents.

use std::collections::BTreeMap;

use color_drain_core::{AgentId, ColorClass, DispatchError, SlotIndex, SlotSnapshot};

/// Three agents occupying consecutive slots with one shared color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeTriple {
    /// Agent in the lowest slot of the run.
    pub left: AgentId,
    /// Agent in the middle slot; survives the merge.
    pub middle: AgentId,
    /// Agent in the highest slot of the run.
    pub right: AgentId,
}

/// Row of docking slots owned by the world.
///
/// Every docked agent holds exactly one slot and no two agents share one.
#[derive(Clone, Debug, Default)]
pub struct SlotBank {
    slots: Vec<Option<AgentId>>,
    positions: BTreeMap<AgentId, SlotIndex>,
}

impl SlotBank {
    /// Creates a bank with `count` empty slots.
    #[must_use]
    pub fn new(count: u32) -> Self {
        Self {
            slots: vec![None; count as usize],
            positions: BTreeMap::new(),
        }
    }

    /// Number of slots in the bank.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Docks `agent` into the lowest free slot.
    ///
    /// Assigning an agent that already holds a slot returns that slot.
    pub fn assign(&mut self, agent: AgentId) -> Result<SlotIndex, DispatchError> {
        if let Some(index) = self.positions.get(&agent) {
            return Ok(*index);
        }
        let free = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(DispatchError::NoSlotAvailable)?;
        self.slots[free] = Some(agent);
        let index = SlotIndex::new(free as u32);
        let _ = self.positions.insert(agent, index);
        Ok(index)
    }

    /// Frees the slot held by `agent`. Releasing twice is a no-op.
    pub fn release(&mut self, agent: AgentId) -> Option<SlotIndex> {
        let index = self.positions.remove(&agent)?;
        if let Some(slot) = self.slots.get_mut(index.get() as usize) {
            *slot = None;
        }
        Some(index)
    }

    /// Slot held by `agent`, if any.
    #[must_use]
    pub fn slot_of(&self, agent: AgentId) -> Option<SlotIndex> {
        self.positions.get(&agent).copied()
    }

    /// Agent docked in `index`, if any.
    #[must_use]
    pub fn occupant(&self, index: SlotIndex) -> Option<AgentId> {
        self.slots.get(index.get() as usize).copied().flatten()
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.positions.len()
    }

    /// Reports whether every slot is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Occupants in slot order.
    pub fn occupants(&self) -> impl Iterator<Item = (SlotIndex, AgentId)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.map(|agent| (SlotIndex::new(index as u32), agent))
        })
    }

    /// Captures the state of every slot.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SlotSnapshot> {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, occupant)| SlotSnapshot {
                index: SlotIndex::new(index as u32),
                occupant: *occupant,
                used: occupant.is_some(),
            })
            .collect()
    }

    /// Looks for three consecutive same-colored agents that include `agent`.
    ///
    /// The windows starting two slots left of the agent, one slot left, and at
    /// the agent itself are tried in that order; the first full match wins.
    pub fn evaluate_adjacency<F>(&self, agent: AgentId, color_of: F) -> Option<MergeTriple>
    where
        F: Fn(AgentId) -> Option<ColorClass>,
    {
        let index = self.slot_of(agent)?.get() as usize;
        let color = color_of(agent)?;

        (0..=2).rev().find_map(|offset| {
            let start = index.checked_sub(offset)?;
            let window = self.slots.get(start..start + 3)?;
            let mut members = [agent; 3];
            for (member, slot) in members.iter_mut().zip(window) {
                let occupant = (*slot)?;
                if color_of(occupant)? != color {
                    return None;
                }
                *member = occupant;
            }
            Some(MergeTriple {
                left: members[0],
                middle: members[1],
                right: members[2],
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ColorClass::{Blue, Green, Red};

    fn bank_with(colors: &[ColorClass]) -> (SlotBank, BTreeMap<AgentId, ColorClass>) {
        let mut bank = SlotBank::new(5);
        let mut palette = BTreeMap::new();
        for (id, color) in colors.iter().enumerate() {
            let agent = AgentId::new(id as u32);
            let _ = bank.assign(agent).expect("free slot");
            let _ = palette.insert(agent, *color);
        }
        (bank, palette)
    }

    #[test]
    fn assign_fills_lowest_free_slot() {
        let (mut bank, _) = bank_with(&[Red, Blue, Green]);
        assert_eq!(bank.release(AgentId::new(1)), Some(SlotIndex::new(1)));

        assert_eq!(bank.assign(AgentId::new(7)), Ok(SlotIndex::new(1)));
        assert_eq!(bank.occupant(SlotIndex::new(1)), Some(AgentId::new(7)));
        assert_eq!(bank.occupied(), 3);
    }

    #[test]
    fn assign_is_idempotent_per_agent() {
        let (mut bank, _) = bank_with(&[Red]);
        assert_eq!(bank.assign(AgentId::new(0)), Ok(SlotIndex::new(0)));
        assert_eq!(bank.occupied(), 1);
    }

    #[test]
    fn full_bank_rejects_assignment() {
        let (mut bank, _) = bank_with(&[Red, Blue, Green, Red, Blue]);
        assert!(bank.is_full());
        assert_eq!(
            bank.assign(AgentId::new(9)),
            Err(DispatchError::NoSlotAvailable)
        );
    }

    #[test]
    fn release_twice_is_a_no_op() {
        let (mut bank, _) = bank_with(&[Red, Blue]);
        assert!(bank.release(AgentId::new(0)).is_some());
        assert!(bank.release(AgentId::new(0)).is_none());
        assert_eq!(bank.occupied(), 1);
        assert!(!bank.snapshots()[0].used);
    }

    #[test]
    fn three_reds_merge_into_the_middle_slot() {
        let (bank, palette) = bank_with(&[Red, Red, Red, Blue, Green]);
        let color_of = |agent| palette.get(&agent).copied();

        let triple = bank
            .evaluate_adjacency(AgentId::new(2), color_of)
            .expect("run of three");

        assert_eq!(
            triple,
            MergeTriple {
                left: AgentId::new(0),
                middle: AgentId::new(1),
                right: AgentId::new(2),
            }
        );
        assert_eq!(bank.slot_of(triple.middle), Some(SlotIndex::new(1)));
    }

    #[test]
    fn window_starting_at_agent_is_checked_last() {
        let (bank, palette) = bank_with(&[Blue, Red, Red, Red, Green]);
        let color_of = |agent| palette.get(&agent).copied();

        let triple = bank
            .evaluate_adjacency(AgentId::new(1), color_of)
            .expect("run of three");

        assert_eq!(triple.middle, AgentId::new(2));
    }

    #[test]
    fn run_of_four_takes_the_first_matching_window() {
        let (bank, palette) = bank_with(&[Red, Red, Red, Red, Blue]);
        let color_of = |agent| palette.get(&agent).copied();

        let triple = bank
            .evaluate_adjacency(AgentId::new(2), color_of)
            .expect("run of four");

        assert_eq!(triple.left, AgentId::new(0));
        assert_eq!(triple.right, AgentId::new(2));
    }

    #[test]
    fn gaps_break_adjacency() {
        let mut bank = SlotBank::new(5);
        let mut palette = BTreeMap::new();
        for id in [0_u32, 1, 2] {
            let _ = bank.assign(AgentId::new(id)).expect("free slot");
            let _ = palette.insert(AgentId::new(id), Red);
        }
        let _ = bank.release(AgentId::new(1));
        let color_of = |agent| palette.get(&agent).copied();

        assert!(bank.evaluate_adjacency(AgentId::new(2), color_of).is_none());
        assert!(bank.evaluate_adjacency(AgentId::new(9), color_of).is_none());
    }
}
