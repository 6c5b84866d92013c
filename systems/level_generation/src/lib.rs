#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic level generation and roster derivation.
//!
//! A level is a fully populated grid of random colors plus a roster whose
//! ammunition exactly covers the tokens of every color. Each level index of a
//! campaign seed maps onto its own random stream, so levels can be generated
//! out of order and still replay identically.

use std::collections::BTreeMap;

use color_drain_core::{AgentRecord, ColorClass, LevelSnapshot, TileRecord};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Ammunition carried by a full roster pack.
pub const PACK_AMMO: u32 = 10;
/// Maximum number of full packs issued per color.
pub const MAX_PACKS_PER_COLOR: u32 = 20;

const RNG_STREAM_GRID: &str = "grid";

/// Reasons a level cannot be generated.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The grid needs at least one lane and one row.
    #[error("level dimensions {columns}x{rows} must be positive")]
    EmptyGrid {
        /// Requested lane count.
        columns: u32,
        /// Requested row count.
        rows: u32,
    },
    /// The palette size lies outside `1..=ColorClass::ALL.len()`.
    #[error("palette of {0} colors is not available")]
    InvalidPalette(usize),
}

/// Parameters describing the levels of one campaign.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Number of lanes.
    pub columns: u32,
    /// Number of rows per lane.
    pub rows: u32,
    /// Number of colors drawn from the front of [`ColorClass::ALL`].
    pub palette: usize,
    /// Campaign seed every level seed is derived from.
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            columns: 6,
            rows: 8,
            palette: 4,
            seed: 0,
        }
    }
}

/// Pure system that produces level snapshots.
#[derive(Debug, Default)]
pub struct LevelGeneration {
    counts: BTreeMap<ColorClass, u32>,
}

impl LevelGeneration {
    /// Creates a new generator with an empty scratch table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates the level with the provided index.
    pub fn generate(
        &mut self,
        config: &GeneratorConfig,
        level: u32,
    ) -> Result<LevelSnapshot, GenerationError> {
        if config.columns == 0 || config.rows == 0 {
            return Err(GenerationError::EmptyGrid {
                columns: config.columns,
                rows: config.rows,
            });
        }
        let palette = ColorClass::ALL
            .get(..config.palette)
            .filter(|palette| !palette.is_empty())
            .ok_or(GenerationError::InvalidPalette(config.palette))?;

        let seed = derive_labeled_seed(derive_level_seed(config.seed, level), RNG_STREAM_GRID);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut tiles = Vec::with_capacity((config.columns * config.rows) as usize);
        for row in 0..config.rows {
            for col in 0..config.columns {
                let color = palette[rng.gen_range(0..palette.len())];
                tiles.push(TileRecord {
                    id: tiles.len() as i32,
                    color,
                    row: row as i32,
                    col: col as i32,
                });
            }
        }

        let mut snapshot = LevelSnapshot {
            rows: config.rows as i32,
            cols: config.columns as i32,
            tiles,
            agents: Vec::new(),
        };
        snapshot.agents = self.roster_for(&snapshot);
        Ok(snapshot)
    }

    /// Builds a roster whose ammunition matches the token count of each color.
    ///
    /// Colors are visited in palette order. Each color receives full packs of
    /// [`PACK_AMMO`] up to [`MAX_PACKS_PER_COLOR`], followed by one pack
    /// holding the remainder when the pack limit was not reached.
    pub fn roster_for(&mut self, snapshot: &LevelSnapshot) -> Vec<AgentRecord> {
        self.counts.clear();
        for tile in &snapshot.tiles {
            *self.counts.entry(tile.color).or_default() += 1;
        }

        let mut roster = Vec::new();
        for (&color, &count) in &self.counts {
            let packs = (count / PACK_AMMO).min(MAX_PACKS_PER_COLOR);
            roster.extend((0..packs).map(|_| AgentRecord {
                color,
                ammo: PACK_AMMO as i32,
            }));
            let remainder = count % PACK_AMMO;
            if remainder > 0 && packs < MAX_PACKS_PER_COLOR {
                roster.push(AgentRecord {
                    color,
                    ammo: remainder as i32,
                });
            }
        }
        roster
    }
}

fn derive_level_seed(campaign_seed: u64, level: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(campaign_seed.to_le_bytes());
    hasher.update(level.to_le_bytes());
    finalize_seed(hasher)
}

fn derive_labeled_seed(base: u64, label: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(base.to_le_bytes());
    hasher.update(label.as_bytes());
    finalize_seed(hasher)
}

fn finalize_seed(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
