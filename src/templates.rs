//! Authored stat templates.
//!
//! A `Template` is the immutable source of truth for fresh instances: every
//! spawned unit, projectile or effect copies its numbers from one. Tables are
//! loaded once at startup (JSON via serde) and read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Identifier of a template within a table. Unique per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub u32);

/// What kind of entity a template instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateKind {
    /// Hostile melee unit (chases targets, attacks in range).
    Hostile,
    /// Pooled projectile fired by a weapon.
    Projectile,
    /// Pooled one-shot visual effect carrier (hit flash etc.).
    Effect,
    /// Player-controlled unit, externally driven.
    PlayerUnit,
}

/// Immutable stat block for one entity kind.
///
/// Fields that do not apply to a kind (e.g. `attack_cooldown` on an effect)
/// stay at their defaults and are ignored by the relevant systems.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub kind: TemplateKind,
    #[serde(default = "default_health")]
    pub health: f32,
    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default)]
    pub damage: f32,
    #[serde(default)]
    pub attack_range: f32,
    #[serde(default = "default_cooldown")]
    pub attack_cooldown: f32,
    #[serde(default = "default_chasing_range")]
    pub chasing_range: f32,
    /// Lifetime in sim seconds for projectiles and effects. Zero = unlimited.
    #[serde(default)]
    pub time_to_live: f32,
    #[serde(default = "default_collision_radius")]
    pub collision_radius: f32,
    /// Effect template activated at the hit point (projectiles only).
    #[serde(default)]
    pub hit_effect: Option<TemplateId>,
}

fn default_health() -> f32 {
    100.0
}

fn default_speed() -> f32 {
    5.0
}

fn default_cooldown() -> f32 {
    1.0
}

fn default_chasing_range() -> f32 {
    60.0
}

fn default_collision_radius() -> f32 {
    0.5
}

impl Template {
    /// Minimal hostile-unit template for tests and demos.
    pub fn hostile(id: u32) -> Self {
        Self {
            id: TemplateId(id),
            kind: TemplateKind::Hostile,
            health: default_health(),
            speed: default_speed(),
            damage: 10.0,
            attack_range: 1.5,
            attack_cooldown: default_cooldown(),
            chasing_range: default_chasing_range(),
            time_to_live: 0.0,
            collision_radius: default_collision_radius(),
            hit_effect: None,
        }
    }

    /// Minimal projectile template for tests and demos.
    pub fn projectile(id: u32) -> Self {
        Self {
            id: TemplateId(id),
            kind: TemplateKind::Projectile,
            health: 1.0,
            speed: 40.0,
            damage: 25.0,
            attack_range: 0.0,
            attack_cooldown: 0.0,
            chasing_range: 0.0,
            time_to_live: 3.0,
            collision_radius: 0.1,
            hit_effect: None,
        }
    }

    /// Minimal hit-effect template for tests and demos.
    pub fn effect(id: u32) -> Self {
        Self {
            id: TemplateId(id),
            kind: TemplateKind::Effect,
            health: 1.0,
            speed: 0.0,
            damage: 0.0,
            attack_range: 0.0,
            attack_cooldown: 0.0,
            chasing_range: 0.0,
            time_to_live: 1.0,
            collision_radius: 0.0,
            hit_effect: None,
        }
    }

    /// Minimal player-unit template for tests and demos.
    pub fn player_unit(id: u32) -> Self {
        Self {
            id: TemplateId(id),
            kind: TemplateKind::PlayerUnit,
            health: 100.0,
            speed: 8.0,
            damage: 0.0,
            attack_range: 0.0,
            attack_cooldown: 0.0,
            chasing_range: 0.0,
            time_to_live: 0.0,
            collision_radius: 0.5,
            hit_effect: None,
        }
    }
}

/// Errors raised while building or loading a template table.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("duplicate template id {0:?} in table")]
    DuplicateTemplate(TemplateId),
    #[error("template id {0:?} not present in table")]
    UnknownTemplate(TemplateId),
    #[error("malformed template table: {0}")]
    MalformedTable(#[from] serde_json::Error),
}

/// In-memory id -> stats table. Ids are unique; a missing id resolves to
/// `None` and the caller skips that unit for the tick.
#[derive(Debug, Clone, Default, bevy_ecs::prelude::Resource)]
pub struct TemplateTable {
    templates: HashMap<TemplateId, Template>,
}

impl TemplateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a template, rejecting duplicate ids.
    pub fn insert(&mut self, template: Template) -> Result<(), SimError> {
        if self.templates.contains_key(&template.id) {
            return Err(SimError::DuplicateTemplate(template.id));
        }
        self.templates.insert(template.id, template);
        Ok(())
    }

    /// Load a table from a JSON array of templates.
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let list: Vec<Template> = serde_json::from_str(json)?;
        let mut table = Self::new();
        for template in list {
            table.insert(template)?;
        }
        Ok(table)
    }

    pub fn get(&self, id: TemplateId) -> Option<&Template> {
        self.templates.get(&id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TemplateId> + '_ {
        self.templates.keys().copied()
    }
}
