//! Hostile-unit AI: target acquisition, chase heading and melee attacks.
//!
//! Candidate target positions are snapshotted once per tick into a resource,
//! bounding cost to O(targets) instead of re-querying per unit. The seek
//! system then runs as a gather phase: read-only seeker data is collected,
//! per-unit decisions are computed (in parallel under the `parallel`
//! feature), and the results are applied to owned components plus the damage
//! queue.

use crate::components::*;
use crate::systems::damage::{DamageEvent, DamageQueue};
use crate::systems::movement::SimTime;
use bevy_ecs::prelude::*;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Positions of all active player-controlled units, captured once per tick
/// before the parallel phase. Read-only shared input for the workers.
#[derive(Resource, Debug, Default)]
pub struct TargetSnapshot {
    pub targets: Vec<(Entity, Position)>,
}

/// System that rebuilds the candidate target snapshot.
pub fn target_snapshot_system(
    mut snapshot: ResMut<TargetSnapshot>,
    query: Query<(Entity, &Position, &LifecycleState, &Health), With<PlayerControlled>>,
) {
    snapshot.targets.clear();
    for (entity, pos, lifecycle, health) in query.iter() {
        if lifecycle.is_active() && health.is_alive() {
            snapshot.targets.push((entity, *pos));
        }
    }
}

/// Seeker state extracted for the gather phase, read-only on entities.
#[derive(Clone, Copy)]
struct SeekerData {
    entity: Entity,
    position: Position,
    default_heading: Heading,
    chasing_range: f32,
    attack_range: f32,
    damage: f32,
    cooldown_ready: bool,
}

/// Per-unit decision computed by the gather phase.
struct SeekDecision {
    entity: Entity,
    heading: Heading,
    /// Damage events this unit produced (one per candidate in attack range
    /// while the cooldown was ready).
    attacks: Vec<DamageEvent>,
}

/// Pure per-unit resolution; callable from parallel workers.
fn resolve_seeker(seeker: &SeekerData, targets: &[(Entity, Position)]) -> SeekDecision {
    // Nearest candidate within chasing range. Strict `<` keeps the first
    // candidate encountered in scan order on an exact distance tie.
    let mut nearest: Option<(f32, &Position)> = None;
    for (_, target_pos) in targets {
        let dist = seeker.position.distance_to(target_pos);
        if dist > seeker.chasing_range {
            continue;
        }
        if nearest.map_or(true, |(best, _)| dist < best) {
            nearest = Some((dist, target_pos));
        }
    }

    let heading = match nearest {
        Some((_, target_pos)) => Heading::toward(&seeker.position, target_pos),
        None => seeker.default_heading,
    };

    let mut attacks = Vec::new();
    if seeker.cooldown_ready {
        // One qualifying tick may hit several candidates at once.
        for (target, target_pos) in targets {
            if seeker.position.distance_to(target_pos) <= seeker.attack_range {
                attacks.push(DamageEvent {
                    target: *target,
                    amount: seeker.damage,
                });
            }
        }
    }

    SeekDecision {
        entity: seeker.entity,
        heading,
        attacks,
    }
}

/// System that resolves chase headings and melee attacks for hostiles.
///
/// ## Data access
/// - Reads: SimTime, TargetSnapshot
/// - Writes: Heading, RuntimeStats (own components), DamageQueue
pub fn hostile_seek_system(
    time: Res<SimTime>,
    snapshot: Res<TargetSnapshot>,
    mut queue: ResMut<DamageQueue>,
    mut query: Query<
        (
            Entity,
            &Position,
            &mut Heading,
            &DefaultHeading,
            &mut RuntimeStats,
            &LifecycleState,
        ),
        With<Hostile>,
    >,
) {
    let now = time.0;

    let seekers: Vec<SeekerData> = query
        .iter()
        .filter(|(_, _, _, _, _, lifecycle)| lifecycle.is_active())
        .map(|(entity, pos, _, default_heading, stats, _)| SeekerData {
            entity,
            position: *pos,
            default_heading: default_heading.0,
            chasing_range: stats.chasing_range,
            attack_range: stats.attack_range,
            damage: stats.damage,
            cooldown_ready: stats.cooldown_ready(now),
        })
        .collect();

    #[cfg(feature = "parallel")]
    let decisions: Vec<SeekDecision> = seekers
        .par_iter()
        .map(|seeker| resolve_seeker(seeker, &snapshot.targets))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let decisions: Vec<SeekDecision> = seekers
        .iter()
        .map(|seeker| resolve_seeker(seeker, &snapshot.targets))
        .collect();

    for decision in decisions {
        if let Ok((_, _, mut heading, _, mut stats, _)) = query.get_mut(decision.entity) {
            *heading = decision.heading;
            if !decision.attacks.is_empty() {
                stats.last_attack_time = now;
            }
        }
        queue.merge(decision.attacks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationLog;
    use crate::templates::{Template, TemplateId};

    fn test_world() -> (World, Schedule) {
        let mut world = World::new();
        world.insert_resource(SimTime(0.0));
        world.insert_resource(TargetSnapshot::default());
        world.insert_resource(DamageQueue::default());
        world.insert_resource(MutationLog::default());
        let mut schedule = Schedule::default();
        schedule.add_systems((target_snapshot_system, hostile_seek_system).chain());
        (world, schedule)
    }

    fn spawn_hostile(world: &mut World, template: &Template, pos: Position) -> Entity {
        world
            .spawn((
                TemplateRef(template.id),
                LifecycleState::Active,
                PoolPolicy::Pooled,
                HostileBundle::from_template(template, pos, Heading::new(0.0, 0.0, 1.0)),
            ))
            .id()
    }

    fn spawn_player(world: &mut World, id: u32, pos: Position) -> Entity {
        let template = Template::player_unit(100 + id);
        world.spawn(PlayerUnitBundle::from_template(&template, id, pos)).id()
    }

    #[test]
    fn test_seek_turns_toward_nearest_target() {
        let (mut world, mut schedule) = test_world();
        let template = Template::hostile(1);
        let hostile = spawn_hostile(&mut world, &template, Position::new(0.0, 0.0, 0.0));
        spawn_player(&mut world, 0, Position::new(30.0, 0.0, 0.0));
        spawn_player(&mut world, 1, Position::new(10.0, 0.0, 0.0));

        schedule.run(&mut world);

        let heading = world.get::<Heading>(hostile).unwrap();
        assert!((heading.x - 1.0).abs() < 0.001, "should chase the closer target");
        assert!(heading.z.abs() < 0.001);
    }

    #[test]
    fn test_no_target_in_range_falls_back_to_default_heading() {
        let (mut world, mut schedule) = test_world();
        let template = Template::hostile(1);
        let hostile = spawn_hostile(&mut world, &template, Position::new(0.0, 0.0, 0.0));
        // Far outside the 60-unit chasing range.
        spawn_player(&mut world, 0, Position::new(500.0, 0.0, 0.0));

        schedule.run(&mut world);

        let heading = world.get::<Heading>(hostile).unwrap();
        assert!((heading.z - 1.0).abs() < 0.001, "should keep the default heading");
    }

    #[test]
    fn test_attack_respects_cooldown() {
        let (mut world, mut schedule) = test_world();
        let mut template = Template::hostile(1);
        template.attack_range = 2.0;
        template.attack_cooldown = 1.0;
        template.damage = 5.0;

        let hostile = spawn_hostile(&mut world, &template, Position::new(0.0, 0.0, 0.0));
        spawn_player(&mut world, 0, Position::new(1.0, 0.0, 0.0));

        // t = 0: fresh unit attacks immediately.
        schedule.run(&mut world);
        assert_eq!(world.resource::<DamageQueue>().len(), 1);
        world.resource_mut::<DamageQueue>().drain();

        // t = 0.5: still cooling down, target still in range.
        world.insert_resource(SimTime(0.5));
        schedule.run(&mut world);
        assert!(world.resource::<DamageQueue>().is_empty());

        // t = 1.0: cooldown elapsed.
        world.insert_resource(SimTime(1.0));
        schedule.run(&mut world);
        assert_eq!(world.resource::<DamageQueue>().len(), 1);

        let stats = world.get::<RuntimeStats>(hostile).unwrap();
        assert!((stats.last_attack_time - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_attack_hits_all_candidates_in_range() {
        let (mut world, mut schedule) = test_world();
        let mut template = Template::hostile(1);
        template.attack_range = 2.0;
        template.damage = 5.0;

        spawn_hostile(&mut world, &template, Position::new(0.0, 0.0, 0.0));
        spawn_player(&mut world, 0, Position::new(1.0, 0.0, 0.0));
        spawn_player(&mut world, 1, Position::new(-1.0, 0.0, 0.0));
        spawn_player(&mut world, 2, Position::new(50.0, 0.0, 0.0));

        schedule.run(&mut world);

        assert_eq!(world.resource::<DamageQueue>().len(), 2);
    }

    #[test]
    fn test_dying_units_do_not_seek() {
        let (mut world, mut schedule) = test_world();
        let template = Template::hostile(1);
        let hostile = spawn_hostile(&mut world, &template, Position::new(0.0, 0.0, 0.0));
        world.entity_mut(hostile).insert(LifecycleState::Dying { since: 0.0 });
        spawn_player(&mut world, 0, Position::new(1.0, 0.0, 0.0));

        schedule.run(&mut world);

        assert!(world.resource::<DamageQueue>().is_empty());
        let heading = world.get::<Heading>(hostile).unwrap();
        assert!((heading.z - 1.0).abs() < 0.001, "heading untouched");
    }
}
