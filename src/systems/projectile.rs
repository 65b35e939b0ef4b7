//! Projectile motion and hit resolution.
//!
//! Gather phase over active projectiles: sweep one tick of travel as a ray
//! against the hostile collision layer, produce damage events and
//! deactivation/effect requests, commit the new position on a miss. Expiry
//! is checked independently of collision; a hit resolved in the same tick
//! wins over expiry, and the replay step's first-edit-wins policy guarantees
//! a single pool return either way.

use crate::components::*;
use crate::mutation::{Edit, MutationLog};
use crate::spatial::SpatialGrid;
use crate::systems::damage::{DamageEvent, DamageQueue};
use crate::systems::movement::{DeltaTime, SimTime};
use bevy_ecs::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Extra sweep length past the tick's travel, so grazing contacts right at
/// the integration boundary are not skipped over.
const RAY_OVERTRAVEL: f32 = 0.25;

/// Projectile state extracted for the gather phase, read-only on entities.
#[derive(Clone, Copy)]
struct FlightData {
    entity: Entity,
    position: Position,
    heading: Heading,
    speed: f32,
    damage: f32,
    spawn_time: f32,
    time_to_live: f32,
    hit_effect: Option<crate::templates::TemplateId>,
}

enum FlightOutcome {
    Hit {
        projectile: Entity,
        target: Entity,
        damage: f32,
        point: Position,
        normal: Heading,
        hit_effect: Option<crate::templates::TemplateId>,
    },
    Expired {
        projectile: Entity,
    },
    Miss {
        projectile: Entity,
        next: Position,
    },
}

/// Pure per-projectile resolution; callable from parallel workers.
fn resolve_flight(flight: &FlightData, grid: &SpatialGrid, now: f32, delta: f32) -> FlightOutcome {
    let travel = flight.speed * delta;
    let hit = grid.raycast(
        &flight.position,
        &flight.heading,
        travel + RAY_OVERTRAVEL,
        CollisionLayer::Hostile,
    );

    if let Some(hit) = hit {
        return FlightOutcome::Hit {
            projectile: flight.entity,
            target: hit.entity,
            damage: flight.damage,
            point: hit.point,
            normal: hit.normal,
            hit_effect: flight.hit_effect,
        };
    }

    if flight.time_to_live > 0.0 && now - flight.spawn_time >= flight.time_to_live {
        return FlightOutcome::Expired { projectile: flight.entity };
    }

    FlightOutcome::Miss {
        projectile: flight.entity,
        next: flight.position.advanced(&flight.heading, travel),
    }
}

/// System that sweeps active projectiles and resolves hits and expiry.
///
/// ## Data access
/// - Reads: DeltaTime, SimTime, SpatialGrid
/// - Writes: Position (own), DamageQueue, MutationLog
pub fn projectile_flight_system(
    dt: Res<DeltaTime>,
    time: Res<SimTime>,
    grid: Res<SpatialGrid>,
    mut queue: ResMut<DamageQueue>,
    mut log: ResMut<MutationLog>,
    mut query: Query<(Entity, &mut Position, &Heading, &RuntimeStats, &Projectile, &LifecycleState)>,
) {
    let now = time.0;
    let delta = dt.0;

    let flights: Vec<FlightData> = query
        .iter()
        .filter(|(_, _, _, _, _, lifecycle)| lifecycle.is_active())
        .map(|(entity, pos, heading, stats, projectile, _)| FlightData {
            entity,
            position: *pos,
            heading: *heading,
            speed: stats.speed,
            damage: stats.damage,
            spawn_time: projectile.spawn_time,
            time_to_live: stats.time_to_live,
            hit_effect: projectile.hit_effect,
        })
        .collect();

    #[cfg(feature = "parallel")]
    let outcomes: Vec<FlightOutcome> = flights
        .par_iter()
        .map(|flight| resolve_flight(flight, &grid, now, delta))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let outcomes: Vec<FlightOutcome> = flights
        .iter()
        .map(|flight| resolve_flight(flight, &grid, now, delta))
        .collect();

    for outcome in outcomes {
        match outcome {
            FlightOutcome::Hit {
                projectile,
                target,
                damage,
                point,
                normal,
                hit_effect,
            } => {
                queue.push(target, damage);
                log.record(Edit::Deactivate { entity: projectile });
                if let Some(template) = hit_effect {
                    log.record(Edit::ActivateEffect {
                        template,
                        position: point,
                        normal,
                    });
                }
            }
            FlightOutcome::Expired { projectile } => {
                log.record(Edit::Deactivate { entity: projectile });
            }
            FlightOutcome::Miss { projectile, next } => {
                if let Ok((_, mut pos, _, _, _, _)) = query.get_mut(projectile) {
                    *pos = next;
                }
            }
        }
    }
}
