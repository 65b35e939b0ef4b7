//! Simulation systems, grouped by tick phase.
//!
//! A fixed tick runs four phases:
//! 1. Snapshot - rebuild the spatial grid and target list from last tick's
//!    committed state.
//! 2. Gather - combat producers (seeking, weapon fire, projectile sweeps)
//!    read the snapshots, mutate only their own components, and append
//!    damage events and lifecycle edits. Parallel-safe.
//! 3. Resolve - serial aggregation: damage totals are applied once per
//!    target, timers and the spawner record their edits.
//! 4. Replay - the exclusive replay system applies the edit log FIFO and is
//!    the only phase that touches the pool or entity structure.

pub mod ai;
pub mod damage;
pub mod lifecycle;
pub mod movement;
pub mod projectile;
pub mod spawner;
pub mod weapon;

pub use ai::{hostile_seek_system, target_snapshot_system, TargetSnapshot};
pub use damage::{damage_apply_system, DamageEvent, DamageQueue};
pub use lifecycle::{
    bounds_system, dying_timer_system, effect_expiry_system, mutation_replay_system,
    pending_destroy_system, pool_maintenance_system, SimConfig, DEATH_LINGER,
};
pub use movement::{hostile_movement_system, DeltaTime, SimTick, SimTime};
pub use projectile::projectile_flight_system;
pub use spawner::{spawner_system, SimRng, SpawnController, SpawnSettings};
pub use weapon::{player_movement_system, weapon_fire_system};
