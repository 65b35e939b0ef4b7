//! Player-unit movement and weapon fire.
//!
//! Both systems are pure producers: they read the per-tick `PlayerInput`
//! fed in by the external input layer, mutate only their own components,
//! and record projectile activations into the mutation log. Neither touches
//! the pool directly.

use crate::components::*;
use crate::mutation::{Edit, MutationLog};
use crate::systems::movement::{DeltaTime, SimTime};
use crate::templates::TemplateTable;
use bevy_ecs::prelude::*;
use tracing::warn;

/// Distance in front of the muzzle at which a projectile materializes, so it
/// does not start inside its own shooter's collision sphere.
const MUZZLE_OFFSET: f32 = 1.0;

/// System that applies external movement/aim input to player units.
pub fn player_movement_system(
    dt: Res<DeltaTime>,
    mut query: Query<
        (&mut Position, &mut Heading, &PlayerInput, &RuntimeStats, &LifecycleState),
        With<PlayerControlled>,
    >,
) {
    let delta = dt.0;
    for (mut pos, mut heading, input, stats, lifecycle) in query.iter_mut() {
        if !lifecycle.is_active() {
            continue;
        }
        if input.moving {
            let dir = input.move_dir.normalized();
            *pos = pos.advanced(&dir, stats.speed * delta);
        }
        if input.aim.magnitude() > 0.0001 {
            *heading = input.aim.normalized();
        }
    }
}

/// System that turns held triggers into projectile activation requests,
/// gated by the weapon's fire cooldown.
pub fn weapon_fire_system(
    time: Res<SimTime>,
    templates: Res<TemplateTable>,
    mut log: ResMut<MutationLog>,
    mut query: Query<
        (&Position, &Heading, &PlayerInput, &mut Weapon, &LifecycleState),
        With<PlayerControlled>,
    >,
) {
    let now = time.0;
    for (pos, heading, input, mut weapon, lifecycle) in query.iter_mut() {
        if !lifecycle.is_active() || !input.trigger || !weapon.cooldown_ready(now) {
            continue;
        }
        let Some(template) = templates.get(weapon.projectile) else {
            // Mis-tuned weapon data degrades gameplay but must not halt the
            // loop; skip this unit for the tick.
            warn!(template = ?weapon.projectile, "weapon references missing projectile template");
            continue;
        };

        weapon.last_fire_time = now;
        log.record(Edit::FireProjectile {
            template: template.id,
            position: pos.advanced(heading, MUZZLE_OFFSET),
            heading: *heading,
            hit_effect: template.hit_effect,
        });
    }
}
