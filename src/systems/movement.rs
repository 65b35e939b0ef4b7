//! Time resources and heading-based movement integration.

use crate::components::*;
use bevy_ecs::prelude::*;

/// Resource containing the delta time for the current tick.
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Elapsed simulation time in seconds at the start of the current tick.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTime(pub f32);

/// Global simulation tick counter. Increments each fixed update.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// System that advances hostile units along their heading.
///
/// The heading was resolved earlier in the tick by the seek system (chase
/// direction or default heading). Dying units stop moving.
pub fn hostile_movement_system(
    dt: Res<DeltaTime>,
    mut query: Query<(&mut Position, &Heading, &RuntimeStats, &LifecycleState), With<Hostile>>,
) {
    let delta = dt.0;
    for (mut pos, heading, stats, lifecycle) in query.iter_mut() {
        if !lifecycle.is_active() {
            continue;
        }
        *pos = pos.advanced(heading, stats.speed * delta);
    }
}
