//! Damage aggregation.
//!
//! No system that deals damage mutates target health directly. Producers
//! (melee attacks, projectile hits) append `DamageEvent`s; after the gather
//! phase a single serial pass drains the queue into per-target sums and
//! applies one authoritative subtraction per target. Two bullets hitting the
//! same unit in one tick sum correctly instead of losing all-but-one write,
//! no matter how many producers ran or in what order.

use crate::components::*;
use crate::mutation::{Edit, MutationLog};
use bevy_ecs::prelude::*;
use std::collections::HashMap;

/// Ephemeral (target, amount) record. Produced any number of times per tick,
/// consumed exactly once by the aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageEvent {
    pub target: Entity,
    pub amount: f32,
}

/// Append-only queue of this tick's damage events.
///
/// Producers hold `ResMut` access (the scheduler serializes them) or build
/// thread-local batches merged in producer order under the `parallel`
/// feature.
#[derive(Resource, Debug, Default)]
pub struct DamageQueue {
    events: Vec<DamageEvent>,
}

impl DamageQueue {
    pub fn push(&mut self, target: Entity, amount: f32) {
        self.events.push(DamageEvent { target, amount });
    }

    /// Append a producer's local batch, preserving its internal order.
    pub fn merge(&mut self, batch: Vec<DamageEvent>) {
        self.events.extend(batch);
    }

    pub fn drain(&mut self) -> Vec<DamageEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Serial pass: drain the queue, sum per target, subtract once, and request
/// `Active -> Dying` for anything at or below zero.
///
/// Events against entities that are no longer active (died earlier this
/// tick, already pooled, despawned) are dropped; racing producers are
/// legitimate, not an error.
pub fn damage_apply_system(
    mut queue: ResMut<DamageQueue>,
    mut log: ResMut<MutationLog>,
    mut query: Query<(&mut Health, &LifecycleState)>,
) {
    let events = queue.drain();
    if events.is_empty() {
        return;
    }

    let mut totals: HashMap<Entity, f32> = HashMap::new();
    for event in events {
        *totals.entry(event.target).or_insert(0.0) += event.amount;
    }

    // Applied in entity order, so the edits recorded here land in the log in
    // the same order every run regardless of hash seeding.
    let mut totals: Vec<(Entity, f32)> = totals.into_iter().collect();
    totals.sort_unstable_by_key(|(target, _)| *target);

    for (target, amount) in totals {
        if amount == 0.0 {
            continue;
        }
        let Ok((mut health, lifecycle)) = query.get_mut(target) else {
            tracing::trace!(?target, "damage for missing entity dropped");
            continue;
        };
        if !lifecycle.is_active() {
            continue;
        }
        health.current -= amount;
        if health.current <= 0.0 {
            log.record(Edit::BeginDying { entity: target });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_unit(world: &mut World, health: f32) -> Entity {
        world
            .spawn((Health::new(health), LifecycleState::Active))
            .id()
    }

    fn run_apply(world: &mut World) {
        let mut schedule = Schedule::default();
        schedule.add_systems(damage_apply_system);
        schedule.run(world);
    }

    #[test]
    fn test_damage_conservation_under_many_producers() {
        let mut world = World::new();
        world.insert_resource(MutationLog::default());
        let target = spawn_unit(&mut world, 1000.0);

        // Simulate many producers contributing partial batches out of order.
        let mut queue = DamageQueue::default();
        let mut expected = 0.0;
        for producer in 0..8 {
            let mut batch = Vec::new();
            for i in 0..5 {
                let amount = (producer * 5 + i) as f32 * 0.5;
                expected += amount;
                batch.push(DamageEvent { target, amount });
            }
            queue.merge(batch);
        }
        world.insert_resource(queue);

        run_apply(&mut world);

        let health = world.get::<Health>(target).unwrap();
        assert!((1000.0 - health.current - expected).abs() < 0.001);
        assert!(world.resource::<DamageQueue>().is_empty());
    }

    #[test]
    fn test_simultaneous_lethal_events_sum_and_request_dying_once() {
        let mut world = World::new();
        world.insert_resource(MutationLog::default());
        let target = spawn_unit(&mut world, 10.0);

        let mut queue = DamageQueue::default();
        queue.push(target, 6.0);
        queue.push(target, 6.0);
        world.insert_resource(queue);

        run_apply(&mut world);

        let health = world.get::<Health>(target).unwrap();
        assert!((health.current - (-2.0)).abs() < 0.001);

        let log = world.resource::<MutationLog>();
        let dying: Vec<_> = log
            .iter()
            .filter(|e| matches!(e, Edit::BeginDying { entity } if *entity == target))
            .collect();
        assert_eq!(dying.len(), 1);
    }

    #[test]
    fn test_lethal_requests_recorded_in_entity_order() {
        let mut world = World::new();
        world.insert_resource(MutationLog::default());
        let a = spawn_unit(&mut world, 5.0);
        let b = spawn_unit(&mut world, 5.0);

        // Producers hit in reverse spawn order.
        let mut queue = DamageQueue::default();
        queue.push(b, 10.0);
        queue.push(a, 10.0);
        world.insert_resource(queue);

        run_apply(&mut world);

        let edits: Vec<_> = world.resource::<MutationLog>().iter().cloned().collect();
        assert_eq!(
            edits,
            vec![Edit::BeginDying { entity: a }, Edit::BeginDying { entity: b }]
        );
    }

    #[test]
    fn test_damage_to_non_active_target_dropped() {
        let mut world = World::new();
        world.insert_resource(MutationLog::default());
        let target = world
            .spawn((Health::new(50.0), LifecycleState::Dying { since: 0.0 }))
            .id();

        let mut queue = DamageQueue::default();
        queue.push(target, 10.0);
        world.insert_resource(queue);

        run_apply(&mut world);

        let health = world.get::<Health>(target).unwrap();
        assert!((health.current - 50.0).abs() < 0.001);
        assert!(world.resource::<MutationLog>().is_empty());
    }
}
