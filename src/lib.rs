//! Headless wave-survival combat simulation core.
//!
//! Drives the entity lifecycle, pooling and combat resolution for a
//! horde-style survival game: hostiles spawn in ramped waves, chase and
//! attack player units, take projectile fire, die, and are recycled through
//! per-template pools instead of being destroyed.
//!
//! The crate is engine-agnostic. A host (game engine, dedicated server,
//! test harness) feeds [`PlayerInput`] in, calls [`SimWorld::step`] with
//! frame deltas, and reads the world back as [`Snapshot`] values. All
//! simulation runs on a fixed timestep; all structural mutation funnels
//! through a deferred edit log replayed serially once per tick, which is
//! what makes the gather phase safe to parallelize (enable the `parallel`
//! feature).

pub mod api;
pub mod components;
pub mod mutation;
pub mod pool;
pub mod spatial;
pub mod systems;
pub mod templates;
pub mod world;

pub use api::SimWorld;
pub use components::{Aabb, Heading, LifecycleState, PlayerInput, PoolPolicy, Position, Weapon};
pub use pool::{EntityPool, PoolCounters};
pub use systems::{SimConfig, SpawnSettings, DEATH_LINGER};
pub use templates::{SimError, Template, TemplateId, TemplateKind, TemplateTable};
pub use world::{EntityPose, PoolStats, PoseState, Snapshot};
