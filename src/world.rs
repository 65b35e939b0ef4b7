//! Read-only world snapshots for the embedding layer.
//!
//! The host engine never touches components directly; once per rendered
//! frame it takes a [`Snapshot`] of the committed state and interpolates
//! visuals from that. Snapshots are plain serde data so they cross an FFI
//! or script boundary as JSON without extra glue.

use crate::components::*;
use crate::pool::EntityPool;
use crate::systems::movement::{SimTick, SimTime};
use crate::templates::{TemplateId, TemplateKind, TemplateTable};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle tag as exposed to the host. Pooled entities are not reported,
/// so only the visible states appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseState {
    Active,
    Dying,
}

/// One visible entity's pose and vitals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPose {
    pub id: u64,
    pub template: TemplateId,
    pub kind: TemplateKind,
    pub state: PoseState,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub heading_x: f32,
    pub heading_z: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<f32>,
}

/// Per-template pool statistics, for the host's debug overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub template: TemplateId,
    pub free: usize,
    pub created: u64,
    pub returned: u64,
    pub claimed: u64,
}

/// Full observable state of the simulation at one tick boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub time: f32,
    pub entities: Vec<EntityPose>,
    pub pools: Vec<PoolStats>,
}

impl Snapshot {
    pub fn from_world(world: &mut World) -> Self {
        let tick = world.resource::<SimTick>().0;
        let time = world.resource::<SimTime>().0;

        let mut entities = Vec::new();
        let mut query = world.query::<(
            Entity,
            &TemplateRef,
            &Position,
            &Heading,
            &LifecycleState,
            Option<&Health>,
        )>();
        for (entity, template_ref, pos, heading, lifecycle, health) in query.iter(world) {
            let state = match lifecycle {
                LifecycleState::Active => PoseState::Active,
                LifecycleState::Dying { .. } => PoseState::Dying,
                _ => continue,
            };
            let kind = world
                .resource::<TemplateTable>()
                .get(template_ref.0)
                .map(|t| t.kind)
                .unwrap_or(TemplateKind::Hostile);
            entities.push(EntityPose {
                id: entity.to_bits(),
                template: template_ref.0,
                kind,
                state,
                x: pos.x,
                y: pos.y,
                z: pos.z,
                heading_x: heading.x,
                heading_z: heading.z,
                health: health.map(|h| h.current),
            });
        }

        let pool = world.resource::<EntityPool>();
        let mut pools: Vec<PoolStats> = pool
            .all_counters()
            .map(|(template, counters)| PoolStats {
                template,
                free: pool.free_count(template),
                created: counters.created,
                returned: counters.returned,
                claimed: counters.claimed,
            })
            .collect();
        pools.sort_by_key(|s| s.template.0);

        Self { tick, time, entities, pools }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
