//! Embedding API: the fixed-timestep simulation loop.
//!
//! [`SimWorld`] owns the ECS world and schedule. The host calls [`SimWorld::step`]
//! with wall-clock frame deltas; an accumulator converts those into zero or
//! more fixed ticks so simulation behavior is identical at any frame rate.
//!
//! Tick phase order (see `systems`): snapshot, gather, resolve, replay. The
//! whole schedule is chained, so edit order in the mutation log is the same
//! run to run and the replay's first-edit-wins policy is deterministic.

use crate::components::*;
use crate::mutation::{Edit, MutationLog};
use crate::pool::EntityPool;
use crate::spatial::{spatial_grid_update_system, SpatialGrid};
use crate::systems::*;
use crate::templates::{SimError, TemplateId, TemplateTable};
use crate::world::Snapshot;
use bevy_ecs::prelude::*;

/// Spatial grid cell size in world units. Sized to a typical chasing-range
/// query so most lookups touch a handful of cells.
const GRID_CELL_SIZE: f32 = 8.0;

/// Cap on how many fixed ticks one `step` call may run, so a long stall
/// (debugger, window drag) does not snowball into a catch-up spiral.
const MAX_TICKS_PER_STEP: u32 = 8;

/// The simulation core. Headless; all rendering-facing state leaves through
/// [`SimWorld::snapshot`].
pub struct SimWorld {
    world: World,
    schedule: Schedule,
    fixed_timestep: f32,
    accumulator: f32,
    time: f32,
    tick: u64,
}

impl SimWorld {
    pub fn new(config: SimConfig, templates: TemplateTable, spawn: SpawnSettings) -> Self {
        let fixed_timestep = config.fixed_timestep;

        let mut world = World::new();
        world.insert_resource(DeltaTime(fixed_timestep));
        world.insert_resource(SimTime(0.0));
        world.insert_resource(SimTick(0));
        world.insert_resource(SimRng::seeded(config.rng_seed));
        world.insert_resource(SpatialGrid::new(GRID_CELL_SIZE));
        world.insert_resource(TargetSnapshot::default());
        world.insert_resource(DamageQueue::default());
        world.insert_resource(MutationLog::default());
        world.insert_resource(EntityPool::new());
        world.insert_resource(SpawnController::new(spawn));
        world.insert_resource(templates);
        world.insert_resource(config);

        let mut schedule = Schedule::default();
        schedule.add_systems(
            (
                // Snapshot: rebuild grid and target list from committed state.
                (spatial_grid_update_system, target_snapshot_system),
                // Gather: combat producers.
                (
                    player_movement_system,
                    weapon_fire_system,
                    hostile_seek_system,
                    projectile_flight_system,
                )
                    .chain(),
                // Resolve: serial aggregation and timers.
                (
                    hostile_movement_system,
                    damage_apply_system,
                    bounds_system,
                    dying_timer_system,
                    effect_expiry_system,
                    pending_destroy_system,
                    spawner_system,
                )
                    .chain(),
                // Replay: the only structural mutation point.
                (mutation_replay_system, pool_maintenance_system).chain(),
            )
                .chain(),
        );

        Self {
            world,
            schedule,
            fixed_timestep,
            accumulator: 0.0,
            time: 0.0,
            tick: 0,
        }
    }

    /// Advance the simulation by a frame delta, running as many fixed ticks
    /// as have accumulated. Returns the number of ticks run.
    pub fn step(&mut self, dt: f32) -> u32 {
        if dt > 0.0 {
            self.accumulator += dt;
        }
        let mut ran = 0;
        while self.accumulator >= self.fixed_timestep && ran < MAX_TICKS_PER_STEP {
            self.accumulator -= self.fixed_timestep;
            self.run_fixed_tick();
            ran += 1;
        }
        if ran == MAX_TICKS_PER_STEP {
            // Shed the backlog rather than spiraling.
            self.accumulator = 0.0;
        }
        ran
    }

    fn run_fixed_tick(&mut self) {
        self.world.insert_resource(SimTime(self.time));
        self.world.insert_resource(SimTick(self.tick));
        self.world.insert_resource(DeltaTime(self.fixed_timestep));
        self.schedule.run(&mut self.world);
        self.time += self.fixed_timestep;
        self.tick += 1;
    }

    /// Spawn a player-controlled unit immediately. Player units bypass the
    /// pool; they live for the whole session.
    pub fn spawn_player_unit(
        &mut self,
        player_id: u32,
        template: TemplateId,
        position: Position,
        weapon: Option<Weapon>,
    ) -> Result<Entity, SimError> {
        let stats = *self
            .world
            .resource::<TemplateTable>()
            .get(template)
            .ok_or(SimError::UnknownTemplate(template))?;

        let mut entity = self.world.spawn((
            TemplateRef(template),
            PlayerUnitBundle::from_template(&stats, player_id, position),
        ));
        if let Some(weapon) = weapon {
            entity.insert(weapon);
        }
        Ok(entity.id())
    }

    /// Replace a player unit's input for the coming ticks. Returns false if
    /// the entity has no input component.
    pub fn set_player_input(&mut self, entity: Entity, input: PlayerInput) -> bool {
        match self.world.get_mut::<PlayerInput>(entity) {
            Some(mut slot) => {
                *slot = input;
                true
            }
            None => false,
        }
    }

    /// Request a scripted unit spawn; activated by the next tick's replay.
    pub fn request_spawn(&mut self, template: TemplateId, position: Position, heading: Heading) {
        self.world
            .resource_mut::<MutationLog>()
            .record(Edit::SpawnUnit { template, position, heading });
    }

    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world)
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::Template;

    fn table() -> TemplateTable {
        let mut templates = TemplateTable::new();
        templates.insert(Template::hostile(1)).unwrap();
        let mut bullet = Template::projectile(2);
        bullet.hit_effect = Some(TemplateId(3));
        templates.insert(bullet).unwrap();
        templates.insert(Template::effect(3)).unwrap();
        templates.insert(Template::player_unit(100)).unwrap();
        templates
    }

    fn idle_spawner() -> SpawnSettings {
        SpawnSettings { templates: Vec::new(), ..Default::default() }
    }

    fn sim_with_timestep(fixed: f32) -> SimWorld {
        let config = SimConfig { fixed_timestep: fixed, ..Default::default() };
        SimWorld::new(config, table(), idle_spawner())
    }

    #[test]
    fn test_accumulator_converts_frames_to_ticks() {
        let mut sim = sim_with_timestep(0.5);

        assert_eq!(sim.step(0.4), 0, "not enough time accumulated");
        assert_eq!(sim.step(0.4), 1, "0.8 accumulated covers one tick");
        assert_eq!(sim.step(1.2), 3, "remainder carries over");
        assert_eq!(sim.tick(), 4);
        assert!((sim.time() - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_step_sheds_runaway_backlog() {
        let mut sim = sim_with_timestep(0.1);
        // A 10-second stall would owe 100 ticks; the cap sheds the rest.
        assert_eq!(sim.step(10.0), 8);
        assert_eq!(sim.step(0.05), 0, "backlog was dropped, not carried");
    }

    #[test]
    fn test_spawner_populates_world() {
        let spawn = SpawnSettings {
            templates: vec![TemplateId(1)],
            min_rate: 3,
            max_rate: 3,
            cooldown_delay: 100.0,
            ..Default::default()
        };
        let config = SimConfig { fixed_timestep: 1.0, ..Default::default() };
        let mut sim = SimWorld::new(config, table(), spawn);

        sim.step(1.0);

        let snapshot = sim.snapshot();
        assert_eq!(snapshot.entities.len(), 3);
        let pool = sim.world().resource::<EntityPool>();
        assert_eq!(pool.counters(TemplateId(1)).created, 3);
    }

    #[test]
    fn test_lethal_damage_walks_full_lifecycle() {
        let mut sim = sim_with_timestep(1.0);
        let mut frail = Template::hostile(9);
        frail.health = 10.0;
        frail.speed = 0.0;
        sim.world_mut()
            .resource_mut::<TemplateTable>()
            .insert(frail)
            .unwrap();

        sim.request_spawn(TemplateId(9), Position::new(0.0, 0.0, 0.0), Heading::default());
        sim.step(5.0); // Ticks at t = 0..4; active from tick 0's replay.

        let mut query = sim.world_mut().query_filtered::<Entity, With<Hostile>>();
        let unit = query.single(sim.world());

        // Two producers land 6 damage each in the same tick (t = 5).
        {
            let mut queue = sim.world_mut().resource_mut::<DamageQueue>();
            queue.push(unit, 6.0);
            queue.push(unit, 6.0);
        }
        sim.step(1.0);
        assert_eq!(
            sim.world().get::<LifecycleState>(unit),
            Some(&LifecycleState::Dying { since: 5.0 })
        );
        // Dying units still render.
        assert_eq!(sim.snapshot().entities.len(), 1);

        // Death linger runs t = 5..9.
        sim.step(3.0);
        assert!(matches!(
            sim.world().get::<LifecycleState>(unit),
            Some(LifecycleState::Dying { .. })
        ));

        sim.step(1.0); // Tick at t = 9: linger elapsed, unit pooled.
        assert_eq!(
            sim.world().get::<LifecycleState>(unit),
            Some(&LifecycleState::PooledInactive)
        );
        assert_eq!(sim.snapshot().entities.len(), 0);
        assert_eq!(sim.world().resource::<EntityPool>().free_count(TemplateId(9)), 1);

        // The pooled handle is claimed by the next spawn.
        sim.request_spawn(TemplateId(9), Position::new(1.0, 0.0, 1.0), Heading::default());
        sim.step(1.0);
        assert_eq!(
            sim.world().get::<LifecycleState>(unit),
            Some(&LifecycleState::Active)
        );
        assert_eq!(sim.world().resource::<EntityPool>().counters(TemplateId(9)).claimed, 1);
    }

    #[test]
    fn test_player_shot_kills_hostile_and_spawns_effect() {
        let mut sim = sim_with_timestep(1.0);
        let mut frail = Template::hostile(9);
        frail.health = 10.0;
        frail.speed = 0.0;
        sim.world_mut()
            .resource_mut::<TemplateTable>()
            .insert(frail)
            .unwrap();

        let player = sim
            .spawn_player_unit(
                0,
                TemplateId(100),
                Position::new(0.0, 0.0, 0.0),
                Some(Weapon::new(TemplateId(2), 10.0)),
            )
            .unwrap();
        sim.request_spawn(TemplateId(9), Position::new(10.0, 0.0, 0.0), Heading::default());
        sim.step(1.0); // Hostile activates.

        sim.set_player_input(
            player,
            PlayerInput {
                aim: Heading::new(1.0, 0.0, 0.0),
                trigger: true,
                ..Default::default()
            },
        );
        sim.step(1.0); // Weapon fires; projectile activates in the replay.

        sim.set_player_input(player, PlayerInput::default());
        sim.step(1.0); // Projectile sweeps 40 units, hits at x = 10.

        let mut query = sim.world_mut().query_filtered::<(Entity, &LifecycleState), With<Hostile>>();
        let (_, state) = query.single(sim.world());
        assert!(matches!(state, LifecycleState::Dying { .. }));

        // Projectile returned to its pool, hit effect activated at the point.
        let pool = sim.world().resource::<EntityPool>();
        assert_eq!(pool.counters(TemplateId(2)).returned, 1);
        let mut effects = sim.world_mut().query::<&EffectCarrier>();
        assert_eq!(effects.iter(sim.world()).count(), 1);
    }

    #[test]
    fn test_dead_player_unit_survives_pool_maintenance() {
        let config = SimConfig {
            fixed_timestep: 1.0,
            pool_trim_interval: 1,
            ..Default::default()
        };
        let mut sim = SimWorld::new(config, table(), idle_spawner());
        let player = sim
            .spawn_player_unit(0, TemplateId(100), Position::default(), None)
            .unwrap();

        sim.world_mut().resource_mut::<DamageQueue>().push(player, 1000.0);
        sim.step(8.0);

        // The host still holds a valid handle: the unit went down but was
        // neither pooled nor despawned by maintenance.
        assert!(sim.world().get_entity(player).is_ok());
        assert!(matches!(
            sim.world().get::<LifecycleState>(player),
            Some(LifecycleState::Dying { .. })
        ));
        assert!(!sim.world().resource::<EntityPool>().contains(player));
    }

    #[test]
    fn test_spawn_player_unit_unknown_template_fails() {
        let mut sim = sim_with_timestep(1.0);
        let err = sim.spawn_player_unit(0, TemplateId(77), Position::default(), None);
        assert!(matches!(err, Err(SimError::UnknownTemplate(TemplateId(77)))));
    }

    #[test]
    fn test_same_seed_same_spawn_placement() {
        let spawn = SpawnSettings {
            templates: vec![TemplateId(1)],
            min_rate: 4,
            max_rate: 4,
            ..Default::default()
        };
        let config = SimConfig { fixed_timestep: 1.0, rng_seed: 11, ..Default::default() };
        let mut a = SimWorld::new(config.clone(), table(), spawn.clone());
        let mut b = SimWorld::new(config, table(), spawn);

        a.step(3.0);
        b.step(3.0);

        let mut pos_a: Vec<(f32, f32)> = a.snapshot().entities.iter().map(|e| (e.x, e.z)).collect();
        let mut pos_b: Vec<(f32, f32)> = b.snapshot().entities.iter().map(|e| (e.x, e.z)).collect();
        pos_a.sort_by(|l, r| l.partial_cmp(r).unwrap());
        pos_b.sort_by(|l, r| l.partial_cmp(r).unwrap());
        assert_eq!(pos_a, pos_b);
    }
}
