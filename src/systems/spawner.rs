//! Spawn-rate and population control.
//!
//! Each tick the spawner computes a batch size from a time-ramped
//! interpolation between a minimum and maximum rate (difficulty ramp), gates
//! it on a spawn cooldown and the population cap, and records spawn edits
//! into the mutation log. The replay step claims pooled entities (or
//! instantiates fresh) and activates them inside the spawn volume.

use crate::components::*;
use crate::mutation::{Edit, MutationLog};
use crate::systems::movement::SimTime;
use crate::templates::{TemplateId, TemplateTable};
use bevy_ecs::prelude::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tracing::warn;

/// The simulation's single persistent random stream.
///
/// One generator, advanced once per draw, instead of reseeding per call:
/// replays with the same seed and input sequence reproduce spawn placement.
#[derive(Resource, Debug)]
pub struct SimRng(pub Pcg32);

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self(Pcg32::seed_from_u64(seed))
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::seeded(0)
    }
}

/// Spawner configuration: rates, window, cap and volume.
#[derive(Debug, Clone)]
pub struct SpawnSettings {
    /// Candidate templates, picked uniformly at random per unit.
    pub templates: Vec<TemplateId>,
    /// Batch size at `ramp_start` and before.
    pub min_rate: u32,
    /// Batch size at `ramp_end` and after.
    pub max_rate: u32,
    pub ramp_start: f32,
    pub ramp_end: f32,
    /// Minimum sim-seconds between spawn batches.
    pub cooldown_delay: f32,
    /// Maximum concurrent alive units (ignored in infinite mode).
    pub capacity: u32,
    pub infinite: bool,
    /// Axis-aligned volume new units are placed in, uniformly per axis.
    pub volume: Aabb,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            templates: Vec::new(),
            min_rate: 1,
            max_rate: 8,
            ramp_start: 0.0,
            ramp_end: 120.0,
            cooldown_delay: 2.0,
            capacity: 64,
            infinite: false,
            volume: Aabb::new(Position::new(-50.0, 0.0, -50.0), Position::new(50.0, 0.0, 50.0)),
        }
    }
}

impl SpawnSettings {
    /// Batch size for time `now`: linear ramp between the rates over the
    /// configured window, clamped outside it.
    pub fn ramped_batch(&self, now: f32) -> u32 {
        let span = self.ramp_end - self.ramp_start;
        let t = if span <= 0.0 {
            if now >= self.ramp_start { 1.0 } else { 0.0 }
        } else {
            ((now - self.ramp_start) / span).clamp(0.0, 1.0)
        };
        let rate = self.min_rate as f32 + (self.max_rate as f32 - self.min_rate as f32) * t;
        rate.round() as u32
    }
}

/// Spawner runtime state.
#[derive(Resource, Debug, Default)]
pub struct SpawnController {
    pub settings: SpawnSettings,
    pub last_spawn_time: f32,
    /// Set once the first batch has gone out, so `last_spawn_time == 0.0`
    /// does not suppress spawning at sim start.
    pub has_spawned: bool,
}

impl SpawnController {
    pub fn new(settings: SpawnSettings) -> Self {
        Self {
            settings,
            last_spawn_time: 0.0,
            has_spawned: false,
        }
    }
}

/// System that computes this tick's spawn batch and records spawn edits.
///
/// ## Data access
/// - Reads: SimTime, TemplateTable, LifecycleState (hostiles)
/// - Writes: SpawnController, SimRng, MutationLog
pub fn spawner_system(
    time: Res<SimTime>,
    templates: Res<TemplateTable>,
    mut controller: ResMut<SpawnController>,
    mut rng: ResMut<SimRng>,
    mut log: ResMut<MutationLog>,
    alive_query: Query<&LifecycleState, With<Hostile>>,
) {
    let now = time.0;
    let settings = controller.settings.clone();
    if settings.templates.is_empty() {
        return;
    }
    if controller.has_spawned && now - controller.last_spawn_time < settings.cooldown_delay {
        return;
    }

    let mut batch = settings.ramped_batch(now);
    if !settings.infinite {
        let alive = alive_query
            .iter()
            .filter(|state| state.counts_as_alive())
            .count() as u32;
        batch = batch.min(settings.capacity.saturating_sub(alive));
    }
    if batch == 0 {
        return;
    }

    for _ in 0..batch {
        let pick = rng.0.gen_range(0..settings.templates.len());
        let template_id = settings.templates[pick];
        if templates.get(template_id).is_none() {
            // Configured id missing from the table: skip the unit, keep the
            // loop alive.
            warn!(?template_id, "spawn skipped, template not in table");
            continue;
        }

        let volume = &settings.volume;
        let position = Position::new(
            volume.min.x + (volume.max.x - volume.min.x) * rng.0.gen::<f32>(),
            volume.min.y + (volume.max.y - volume.min.y) * rng.0.gen::<f32>(),
            volume.min.z + (volume.max.z - volume.min.z) * rng.0.gen::<f32>(),
        );
        let yaw = rng.0.gen::<f32>() * std::f32::consts::TAU;
        let heading = Heading::new(yaw.sin(), 0.0, yaw.cos());

        log.record(Edit::SpawnUnit {
            template: template_id,
            position,
            heading,
        });
    }

    controller.last_spawn_time = now;
    controller.has_spawned = true;
}
