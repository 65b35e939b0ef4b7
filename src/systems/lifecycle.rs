//! Lifecycle state machine and mutation replay.
//!
//! Active -> Dying -> PooledInactive -> Active, with a PendingDestroy path
//! for one-shot entities and a force-disable short-circuit for anything that
//! leaves the active bounds. All transitions are requested as edits during
//! the serial resolution phase and applied here, in FIFO order, by the
//! exclusive replay system - the only place the pool free-lists and entity
//! structure are mutated.

use crate::components::*;
use crate::mutation::{Edit, MutationLog};
use crate::pool::EntityPool;
use crate::systems::movement::{SimTick, SimTime};
use crate::templates::{TemplateKind, TemplateTable};
use bevy_ecs::prelude::*;
use std::collections::HashSet;
use tracing::{trace, warn};

/// How long a dying unit lingers (death animation) before it is pooled.
pub const DEATH_LINGER: f32 = 4.0;

/// Simulation-wide configuration.
#[derive(Resource, Debug, Clone)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g. 1/30 for 30 Hz).
    pub fixed_timestep: f32,
    /// Entities leaving this box are force-disabled back to their pool.
    pub active_bounds: Aabb,
    /// Seed for the persistent random stream.
    pub rng_seed: u64,
    /// Ticks between pool right-sizing passes.
    pub pool_trim_interval: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 30.0,
            active_bounds: Aabb::new(
                Position::new(-200.0, -50.0, -200.0),
                Position::new(200.0, 50.0, 200.0),
            ),
            rng_seed: 0,
            pool_trim_interval: 300,
        }
    }
}

/// System that force-disables poolable entities leaving the active bounds.
/// Skips the death animation but still returns them to the correct pool.
pub fn bounds_system(
    config: Res<SimConfig>,
    mut log: ResMut<MutationLog>,
    query: Query<(Entity, &Position, &LifecycleState), With<PoolPolicy>>,
) {
    for (entity, pos, lifecycle) in query.iter() {
        if lifecycle.is_active() && !config.active_bounds.contains(pos) {
            log.record(Edit::Deactivate { entity });
        }
    }
}

/// System that graduates Dying entities to the pool once the linger elapsed.
/// Session entities (player units) carry no pool policy and are exempt; the
/// host owns their lifetime.
pub fn dying_timer_system(
    time: Res<SimTime>,
    mut log: ResMut<MutationLog>,
    query: Query<(Entity, &LifecycleState), With<PoolPolicy>>,
) {
    let now = time.0;
    for (entity, lifecycle) in query.iter() {
        if let LifecycleState::Dying { since } = lifecycle {
            if now - since >= DEATH_LINGER {
                log.record(Edit::Deactivate { entity });
            }
        }
    }
}

/// System that expires active effect carriers by their time-to-live.
pub fn effect_expiry_system(
    time: Res<SimTime>,
    mut log: ResMut<MutationLog>,
    query: Query<(Entity, &EffectCarrier, &RuntimeStats, &LifecycleState)>,
) {
    let now = time.0;
    for (entity, effect, stats, lifecycle) in query.iter() {
        if !lifecycle.is_active() {
            continue;
        }
        if stats.time_to_live > 0.0 && now - effect.spawn_time >= stats.time_to_live {
            log.record(Edit::Deactivate { entity });
        }
    }
}

/// Exclusive system that replays the mutation log against the world.
///
/// FIFO over the whole log; stable per producer. The first lifecycle edit
/// recorded for an entity wins, later ones in the same replay are no-ops.
/// Edits against entities destroyed earlier in the replay are no-ops too.
pub fn mutation_replay_system(world: &mut World) {
    let edits = world.resource_mut::<MutationLog>().drain();
    if edits.is_empty() {
        return;
    }
    let now = world.resource::<SimTime>().0;

    world.resource_scope(|world, mut pool: Mut<EntityPool>| {
        world.resource_scope(|world, templates: Mut<TemplateTable>| {
            let mut transitioned: HashSet<Entity> = HashSet::new();

            for edit in edits {
                if let Some(target) = edit.lifecycle_target() {
                    if transitioned.contains(&target) {
                        trace!(?target, "conflicting lifecycle edit skipped");
                        continue;
                    }
                }

                match edit {
                    Edit::SpawnUnit { template, position, heading } => {
                        activate(
                            world,
                            &mut pool,
                            &templates,
                            ActivationRequest::Unit { template, position, heading },
                            now,
                        );
                    }
                    Edit::FireProjectile { template, position, heading, hit_effect } => {
                        activate(
                            world,
                            &mut pool,
                            &templates,
                            ActivationRequest::Projectile { template, position, heading, hit_effect },
                            now,
                        );
                    }
                    Edit::ActivateEffect { template, position, normal } => {
                        activate(
                            world,
                            &mut pool,
                            &templates,
                            ActivationRequest::Effect { template, position, normal },
                            now,
                        );
                    }
                    Edit::BeginDying { entity } => {
                        begin_dying(world, entity, now, &mut transitioned);
                    }
                    Edit::Deactivate { entity } => {
                        deactivate(world, &mut pool, entity, &mut transitioned);
                    }
                    Edit::DestroySubtree { entity } => {
                        destroy_subtree(world, entity, &mut transitioned);
                    }
                }
            }
        });
    });
}

enum ActivationRequest {
    Unit {
        template: crate::templates::TemplateId,
        position: Position,
        heading: Heading,
    },
    Projectile {
        template: crate::templates::TemplateId,
        position: Position,
        heading: Heading,
        hit_effect: Option<crate::templates::TemplateId>,
    },
    Effect {
        template: crate::templates::TemplateId,
        position: Position,
        normal: Heading,
    },
}

impl ActivationRequest {
    fn template_id(&self) -> crate::templates::TemplateId {
        match self {
            ActivationRequest::Unit { template, .. }
            | ActivationRequest::Projectile { template, .. }
            | ActivationRequest::Effect { template, .. } => *template,
        }
    }

    fn expected_kind(&self) -> TemplateKind {
        match self {
            ActivationRequest::Unit { .. } => TemplateKind::Hostile,
            ActivationRequest::Projectile { .. } => TemplateKind::Projectile,
            ActivationRequest::Effect { .. } => TemplateKind::Effect,
        }
    }
}

/// Claim a pooled entity for `request` (or instantiate fresh) and dress it
/// with template-derived components. PooledInactive -> Active.
fn activate(
    world: &mut World,
    pool: &mut EntityPool,
    templates: &TemplateTable,
    request: ActivationRequest,
    now: f32,
) {
    let template_id = request.template_id();
    let Some(template) = templates.get(template_id) else {
        warn!(?template_id, "activation skipped, template not in table");
        return;
    };
    if template.kind != request.expected_kind() {
        warn!(?template_id, kind = ?template.kind, "activation skipped, template kind mismatch");
        return;
    }

    let entity = match pool.claim(template_id) {
        Some(entity) if world.get::<LifecycleState>(entity).is_some() => Some(entity),
        Some(entity) => {
            // Stale handle (entity was destroyed while parked). Undo the
            // claim bookkeeping and fall through to fresh instantiation.
            warn!(?entity, ?template_id, "stale pooled handle dropped");
            pool.note_claim_failed(template_id);
            pool.note_created(template_id);
            None
        }
        None => {
            pool.note_created(template_id);
            None
        }
    };

    let entity = match entity {
        Some(entity) => entity,
        None => world
            .spawn((
                TemplateRef(template_id),
                PoolPolicy::Pooled,
                LifecycleState::PooledInactive,
            ))
            .id(),
    };

    let mut entity_mut = world.entity_mut(entity);
    entity_mut.insert(LifecycleState::Active);
    match request {
        ActivationRequest::Unit { position, heading, .. } => {
            entity_mut.insert(HostileBundle::from_template(template, position, heading));
        }
        ActivationRequest::Projectile { position, heading, hit_effect, .. } => {
            entity_mut.insert(ProjectileBundle::from_template(
                template, position, heading, now, hit_effect,
            ));
        }
        ActivationRequest::Effect { position, normal, .. } => {
            entity_mut.insert(EffectBundle::from_template(template, position, normal, now));
        }
    }
}

/// Active -> Dying: record the timestamp and stop being a threat.
fn begin_dying(world: &mut World, entity: Entity, now: f32, transitioned: &mut HashSet<Entity>) {
    match world.get::<LifecycleState>(entity) {
        Some(LifecycleState::Active) => {}
        Some(_) => {
            trace!(?entity, "begin-dying on non-active entity skipped");
            return;
        }
        None => {
            trace!(?entity, "begin-dying on missing entity skipped");
            return;
        }
    }

    let mut entity_mut = world.entity_mut(entity);
    entity_mut.insert(LifecycleState::Dying { since: now });
    if let Some(mut layer) = entity_mut.get_mut::<CollisionLayer>() {
        *layer = CollisionLayer::NonThreat;
    }
    transitioned.insert(entity);
}

/// Leave the field: pooled entities are stripped and parked, one-shots are
/// marked pending-destroy for the next sweep. Attachment subtrees are walked
/// children-first so each child lands in its own template's free-list.
///
/// Entities without a `PoolPolicy` are session-owned (player units); their
/// lifetime belongs to the host and a deactivate request is a no-op.
fn deactivate(
    world: &mut World,
    pool: &mut EntityPool,
    entity: Entity,
    transitioned: &mut HashSet<Entity>,
) {
    match world.get::<LifecycleState>(entity) {
        Some(LifecycleState::Active) | Some(LifecycleState::Dying { .. }) => {}
        Some(_) => {
            trace!(?entity, "deactivate on already-pooled entity skipped");
            return;
        }
        None => {
            trace!(?entity, "deactivate on missing entity skipped");
            return;
        }
    }

    match world.get::<PoolPolicy>(entity) {
        Some(PoolPolicy::OneShot) => {
            world.entity_mut(entity).insert(LifecycleState::PendingDestroy);
            transitioned.insert(entity);
            return;
        }
        Some(PoolPolicy::Pooled) => {}
        None => {
            trace!(?entity, "deactivate on session entity skipped");
            return;
        }
    }

    let children = world
        .get::<Attachments>(entity)
        .map(|a| a.0.clone())
        .unwrap_or_default();
    for child in children {
        if !transitioned.contains(&child) {
            deactivate(world, pool, child, transitioned);
        }
    }

    let Some(&TemplateRef(template_id)) = world.get::<TemplateRef>(entity) else {
        // Nothing to pool it under; destroying beats leaking a live entity.
        warn!(?entity, "deactivated entity has no template, destroying");
        destroy_subtree(world, entity, transitioned);
        return;
    };

    let mut entity_mut = world.entity_mut(entity);
    entity_mut.remove::<StripOnPool>();
    entity_mut.remove::<(AttachedTo, Attachments)>();
    entity_mut.insert(LifecycleState::PooledInactive);
    pool.give_back(entity, template_id);
    transitioned.insert(entity);
}

/// Full removal of an entity and its attachment subtree, depth-first so no
/// dangling parent reference survives.
fn destroy_subtree(world: &mut World, entity: Entity, transitioned: &mut HashSet<Entity>) {
    if world.get_entity(entity).is_err() {
        trace!(?entity, "destroy on missing entity skipped");
        return;
    }
    let children = world
        .get::<Attachments>(entity)
        .map(|a| a.0.clone())
        .unwrap_or_default();
    for child in children {
        destroy_subtree(world, child, transitioned);
    }
    transitioned.insert(entity);
    world.despawn(entity);
}

/// System that sweeps pending-destroy entities into the edit log. The
/// replay despawns them, subtree and all, the same tick.
pub fn pending_destroy_system(
    mut log: ResMut<MutationLog>,
    query: Query<(Entity, &LifecycleState)>,
) {
    for (entity, lifecycle) in query.iter() {
        if *lifecycle == LifecycleState::PendingDestroy {
            log.record(Edit::DestroySubtree { entity });
        }
    }
}

/// Exclusive system that periodically right-sizes the pool free-lists and
/// despawns surplus parked entities.
pub fn pool_maintenance_system(world: &mut World) {
    let tick = world.resource::<SimTick>().0;
    let interval = world.resource::<SimConfig>().pool_trim_interval;
    if interval == 0 || tick == 0 || tick % interval != 0 {
        return;
    }

    world.resource_scope(|world, mut pool: Mut<EntityPool>| {
        for entity in pool.trim_to_peak() {
            world.despawn(entity);
        }
    });
}
