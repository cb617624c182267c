//! Demo drop spawner.
//!
//! Without a real game engine nothing would ever drop an item, so the host can
//! scatter random drops and mobs around the origin on a fixed tick cadence.
//! Everything goes through the world; the stackers only see the resulting
//! notifications.

use crate::config::SimulationSettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stackcraft_events::{DamageCause, EntityQuery, ItemPayload, MemoryWorld, Vec3, WorldHost};
use tracing::{debug, warn};

const ITEM_MAX_AMOUNT: u32 = 64;

/// What one wave put into (or took out of) the world.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WaveReport {
    pub items: u32,
    pub mobs: u32,
    pub kills: u32,
}

/// Spawns random drops every `drop_interval_ticks`.
#[derive(Debug)]
pub struct DropSimulator {
    settings: SimulationSettings,
    rng: StdRng,
    waves: u64,
}

impl DropSimulator {
    pub fn new(settings: SimulationSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { settings, rng, waves: 0 }
    }

    /// Number of waves spawned so far.
    pub fn waves(&self) -> u64 {
        self.waves
    }

    /// Spawns a wave when one is due on `tick`.
    pub fn step(&mut self, tick: u64, world: &MemoryWorld) -> Option<WaveReport> {
        if !self.settings.enabled || tick % self.settings.drop_interval_ticks != 0 {
            return None;
        }
        self.waves += 1;
        let mut report = WaveReport::default();

        if !self.settings.item_types.is_empty() {
            for _ in 0..self.settings.drops_per_wave {
                let type_id = pick(&mut self.rng, &self.settings.item_types);
                let amount = self.rng.gen_range(1..=self.settings.max_drop_amount.max(1));
                let location = self.random_location();
                world.spawn_item(ItemPayload::new(type_id, amount, ITEM_MAX_AMOUNT), location);
                report.items += 1;
            }
        }

        if !self.settings.mob_types.is_empty() && self.rng.gen_bool(self.settings.mob_chance) {
            let type_id = pick(&mut self.rng, &self.settings.mob_types);
            let location = self.random_location();
            match world.spawn_entity(&type_id, location) {
                Ok(_) => report.mobs += 1,
                Err(e) => warn!("🎲 Simulation: could not spawn {}: {}", type_id, e),
            }
        }

        if self.rng.gen_bool(self.settings.kill_chance) && self.kill_random_mob(world) {
            report.kills += 1;
        }

        debug!(
            "🎲 Simulation: wave {} on tick {}: {} items, {} mobs, {} kills",
            self.waves, tick, report.items, report.mobs, report.kills
        );
        Some(report)
    }

    fn random_location(&mut self) -> Vec3 {
        let spread = self.settings.spread;
        if spread <= 0.0 {
            return Vec3::zero();
        }
        Vec3::new(
            self.rng.gen_range(-spread..=spread),
            0.0,
            self.rng.gen_range(-spread..=spread),
        )
    }

    fn kill_random_mob(&mut self, world: &MemoryWorld) -> bool {
        let mut mobs: Vec<_> = world
            .query_entities(&EntityQuery::around(Vec3::zero()))
            .into_iter()
            .filter(|id| {
                world
                    .type_id(*id)
                    .map_or(false, |type_id| self.settings.mob_types.contains(&type_id))
            })
            .collect();
        if mobs.is_empty() {
            return false;
        }
        mobs.sort();
        let victim = mobs[self.rng.gen_range(0..mobs.len())];
        world.kill(victim, DamageCause::Attack).is_ok()
    }
}

fn pick(rng: &mut StdRng, choices: &[String]) -> String {
    choices[rng.gen_range(0..choices.len())].clone()
}
