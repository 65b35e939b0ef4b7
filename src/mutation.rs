//! Deferred mutation log.
//!
//! Systems running in the parallel gather phase never apply structural
//! changes (spawn, despawn, component attach/detach, lifecycle transitions)
//! directly. They record intents into this log; a single exclusive replay
//! step applies them in FIFO order once the phase has synchronized.
//!
//! Ordering guarantee: stable per producer. Interleaving across producers is
//! unspecified; consumers may only rely on "all effects visible before the
//! next phase starts". A replayed edit that targets an entity already
//! transitioned or destroyed earlier in the same replay is a logged no-op.

use crate::components::{Heading, Position};
use crate::templates::TemplateId;
use bevy_ecs::prelude::*;

/// One deferred structural change.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Activate a hostile unit at `position` (pool claim, else fresh).
    SpawnUnit {
        template: TemplateId,
        position: Position,
        heading: Heading,
    },
    /// Activate a projectile (pool claim, else fresh).
    FireProjectile {
        template: TemplateId,
        position: Position,
        heading: Heading,
        hit_effect: Option<TemplateId>,
    },
    /// Activate a one-shot effect carrier at a pose (pool claim, else fresh).
    ActivateEffect {
        template: TemplateId,
        position: Position,
        normal: Heading,
    },
    /// Active -> Dying: lethal damage or expiry. Collision layer swaps to
    /// non-threat; the death linger starts.
    BeginDying { entity: Entity },
    /// Leave the field now: Dying units whose linger elapsed, projectiles
    /// that hit or expired, and out-of-bounds force-disables. Pooled entities
    /// go back to their free-list, one-shots are marked pending-destroy for
    /// the next sweep, session entities (no pool policy) are untouched.
    Deactivate { entity: Entity },
    /// Full removal of a one-shot entity and its attachment subtree,
    /// children first.
    DestroySubtree { entity: Entity },
}

impl Edit {
    /// The entity whose lifecycle this edit transitions, if any. Used by the
    /// replay step's first-edit-wins conflict policy.
    pub fn lifecycle_target(&self) -> Option<Entity> {
        match self {
            Edit::BeginDying { entity }
            | Edit::Deactivate { entity }
            | Edit::DestroySubtree { entity } => Some(*entity),
            _ => None,
        }
    }
}

/// Ordered log of deferred edits for the current tick.
///
/// During the gather phase every producer either holds a `ResMut` on this
/// (producers are serialized against each other by the scheduler) or builds
/// a thread-local `Vec<Edit>` that is merged in producer order, mirroring
/// how damage results are gathered.
#[derive(Resource, Debug, Default)]
pub struct MutationLog {
    edits: Vec<Edit>,
}

impl MutationLog {
    pub fn record(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    /// Append a producer's local batch, preserving its internal order.
    pub fn merge(&mut self, batch: Vec<Edit>) {
        self.edits.extend(batch);
    }

    /// Take the whole log for replay, leaving it empty for the next tick.
    pub fn drain(&mut self) -> Vec<Edit> {
        std::mem::take(&mut self.edits)
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Edit> {
        self.edits.iter()
    }
}
