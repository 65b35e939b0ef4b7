//! ECS components for the wave-survival simulation core.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in systems that query these components.

use crate::templates::{Template, TemplateId};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// 3D position (x = east/west, y = up, z = north/south).
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Move `amount` units along `dir`.
    pub fn advanced(&self, dir: &Heading, amount: f32) -> Self {
        Self {
            x: self.x + dir.x * amount,
            y: self.y + dir.y * amount,
            z: self.z + dir.z * amount,
        }
    }
}

/// Normalized facing/travel direction. Doubles as the entity's orientation
/// for pose events.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Heading {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, z: 1.0 }
    }
}

impl Heading {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalized(&self) -> Self {
        let mag = self.magnitude();
        if mag < 0.0001 {
            Self::default()
        } else {
            Self {
                x: self.x / mag,
                y: self.y / mag,
                z: self.z / mag,
            }
        }
    }

    /// Direction from `from` toward `to`, normalized.
    pub fn toward(from: &Position, to: &Position) -> Self {
        Self::new(to.x - from.x, to.y - from.y, to.z - from.z).normalized()
    }

    pub fn reversed(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Fallback travel direction for hostiles with no target in chasing range.
/// Precomputed and normalized at spawn time.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DefaultHeading(pub Heading);

/// Axis-aligned box, used for the spawn volume and the active play bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Position,
    pub max: Position,
}

impl Aabb {
    pub fn new(min: Position, max: Position) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, pos: &Position) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Which template an entity was instantiated from. The only gameplay-adjacent
/// component a pooled-inactive entity keeps, so it can be returned to (and
/// claimed from) the right free-list.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateRef(pub TemplateId);

/// External identifier for a player-controlled unit.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

/// Marker for hostile units.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Hostile;

/// Marker for player-controlled units (the candidate target set).
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PlayerControlled;

// ============================================================================
// COMBAT COMPONENTS
// ============================================================================

/// Health of a unit.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Mutable per-entity copy of template stats plus attack bookkeeping.
/// Reset from the template every time the entity is (re)activated, so a
/// pool round-trip is indistinguishable from a fresh instantiation.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStats {
    pub speed: f32,
    pub damage: f32,
    pub attack_range: f32,
    pub attack_cooldown: f32,
    pub chasing_range: f32,
    pub time_to_live: f32,
    /// Sim time of the last successful attack. Negative infinity until the
    /// first attack so a fresh unit may attack immediately.
    pub last_attack_time: f32,
}

impl RuntimeStats {
    pub fn from_template(template: &Template) -> Self {
        Self {
            speed: template.speed,
            damage: template.damage,
            attack_range: template.attack_range,
            attack_cooldown: template.attack_cooldown,
            chasing_range: template.chasing_range,
            time_to_live: template.time_to_live,
            last_attack_time: f32::NEG_INFINITY,
        }
    }

    pub fn cooldown_ready(&self, now: f32) -> bool {
        now - self.last_attack_time >= self.attack_cooldown
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self {
            speed: 5.0,
            damage: 10.0,
            attack_range: 1.5,
            attack_cooldown: 1.0,
            chasing_range: 60.0,
            time_to_live: 0.0,
            last_attack_time: f32::NEG_INFINITY,
        }
    }
}

/// Collision layer an entity occupies. A dying unit is swapped to `NonThreat`
/// so projectiles and target scans stop matching it mid-death-animation,
/// without structurally removing its collision data.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionLayer {
    #[default]
    Hostile,
    Friendly,
    NonThreat,
}

/// Sphere collision radius used by the projectile raycast.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CollisionRadius(pub f32);

impl Default for CollisionRadius {
    fn default() -> Self {
        Self(0.5)
    }
}

/// Weapon carried by a player unit. Fires pooled projectiles.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weapon {
    /// Projectile template this weapon fires.
    pub projectile: TemplateId,
    pub fire_cooldown: f32,
    pub last_fire_time: f32,
}

impl Weapon {
    pub fn new(projectile: TemplateId, fire_cooldown: f32) -> Self {
        Self {
            projectile,
            fire_cooldown,
            last_fire_time: f32::NEG_INFINITY,
        }
    }

    pub fn cooldown_ready(&self, now: f32) -> bool {
        now - self.last_fire_time >= self.fire_cooldown
    }
}

/// Per-tick external input for a player unit. The core only consumes this as
/// movement/aim vectors and an attack-intent boolean; where it comes from is
/// the input layer's business.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlayerInput {
    pub move_dir: Heading,
    /// False = no movement this tick regardless of `move_dir`.
    pub moving: bool,
    pub aim: Heading,
    pub trigger: bool,
}

// ============================================================================
// LIFECYCLE COMPONENTS
// ============================================================================

/// Canonical lifecycle state. Exactly one per poolable entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Live and participating in gameplay.
    #[default]
    Active,
    /// Lethal damage or expiry received; playing out the death linger.
    Dying { since: f32 },
    /// Parked in a free-list, stripped of gameplay components.
    PooledInactive,
    /// One-shot entity scheduled for full removal.
    PendingDestroy,
}

impl LifecycleState {
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    /// Still counted against the population cap: on the field, even if dying.
    pub fn counts_as_alive(&self) -> bool {
        matches!(self, LifecycleState::Active | LifecycleState::Dying { .. })
    }
}

/// Whether an entity is recycled through the pool or destroyed outright.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PoolPolicy {
    #[default]
    Pooled,
    OneShot,
}

/// Projectile flight data. Stat numbers live in `RuntimeStats`.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Projectile {
    pub spawn_time: f32,
    /// Effect template to activate at the hit point, if any.
    pub hit_effect: Option<TemplateId>,
}

/// One-shot effect carrier (hit flash etc.). Expires by `RuntimeStats::time_to_live`.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EffectCarrier {
    pub spawn_time: f32,
}

/// Ownership edge from a child to its parent (compound bodies: a unit plus
/// its attached weapon prop). Walked on destroy/disable.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedTo(pub Entity);

/// Child list kept on the parent side of the ownership edge.
#[derive(Component, Debug, Clone, Default)]
pub struct Attachments(pub Vec<Entity>);

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Gameplay components of a hostile unit. Attached on activation, removed
/// when the entity goes pooled-inactive.
#[derive(Bundle, Default)]
pub struct HostileBundle {
    pub position: Position,
    pub heading: Heading,
    pub default_heading: DefaultHeading,
    pub health: Health,
    pub stats: RuntimeStats,
    pub layer: CollisionLayer,
    pub radius: CollisionRadius,
    pub marker: Hostile,
}

impl HostileBundle {
    pub fn from_template(template: &Template, position: Position, heading: Heading) -> Self {
        Self {
            position,
            heading,
            default_heading: DefaultHeading(heading.normalized()),
            health: Health::new(template.health),
            stats: RuntimeStats::from_template(template),
            layer: CollisionLayer::Hostile,
            radius: CollisionRadius(template.collision_radius),
            marker: Hostile,
        }
    }
}

/// Gameplay components of a projectile.
#[derive(Bundle)]
pub struct ProjectileBundle {
    pub position: Position,
    pub heading: Heading,
    pub stats: RuntimeStats,
    pub layer: CollisionLayer,
    pub radius: CollisionRadius,
    pub projectile: Projectile,
}

impl ProjectileBundle {
    pub fn from_template(
        template: &Template,
        position: Position,
        heading: Heading,
        spawn_time: f32,
        hit_effect: Option<TemplateId>,
    ) -> Self {
        Self {
            position,
            heading: heading.normalized(),
            stats: RuntimeStats::from_template(template),
            layer: CollisionLayer::NonThreat,
            radius: CollisionRadius(template.collision_radius),
            projectile: Projectile { spawn_time, hit_effect },
        }
    }
}

/// Gameplay components of an effect carrier.
#[derive(Bundle)]
pub struct EffectBundle {
    pub position: Position,
    pub heading: Heading,
    pub stats: RuntimeStats,
    pub effect: EffectCarrier,
}

impl EffectBundle {
    pub fn from_template(
        template: &Template,
        position: Position,
        heading: Heading,
        spawn_time: f32,
    ) -> Self {
        Self {
            position,
            heading,
            stats: RuntimeStats::from_template(template),
            effect: EffectCarrier { spawn_time },
        }
    }
}

/// Full component set for a player-controlled unit. Player units are not
/// pooled; they live for the whole session.
#[derive(Bundle)]
pub struct PlayerUnitBundle {
    pub player_id: PlayerId,
    pub position: Position,
    pub heading: Heading,
    pub health: Health,
    pub stats: RuntimeStats,
    pub layer: CollisionLayer,
    pub radius: CollisionRadius,
    pub input: PlayerInput,
    pub lifecycle: LifecycleState,
    pub marker: PlayerControlled,
}

impl PlayerUnitBundle {
    pub fn from_template(template: &Template, id: u32, position: Position) -> Self {
        Self {
            player_id: PlayerId(id),
            position,
            heading: Heading::default(),
            health: Health::new(template.health),
            stats: RuntimeStats::from_template(template),
            layer: CollisionLayer::Friendly,
            radius: CollisionRadius(template.collision_radius),
            input: PlayerInput::default(),
            lifecycle: LifecycleState::Active,
            marker: PlayerControlled,
        }
    }
}

/// Every component stripped from an entity when it goes pooled-inactive.
/// Removing a bundle ignores components the entity never had, so one strip
/// set covers hostiles, projectiles and effects alike. `TemplateRef`,
/// `LifecycleState` and `PoolPolicy` deliberately stay behind.
#[derive(Bundle)]
pub struct StripOnPool {
    pub position: Position,
    pub heading: Heading,
    pub default_heading: DefaultHeading,
    pub health: Health,
    pub stats: RuntimeStats,
    pub layer: CollisionLayer,
    pub radius: CollisionRadius,
    pub hostile: Hostile,
    pub projectile: Projectile,
    pub effect: EffectCarrier,
}
