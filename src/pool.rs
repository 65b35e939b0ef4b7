//! Typed entity pool.
//!
//! Dead and expired entities are not despawned on the hot path. They are
//! stripped of gameplay components and parked in a per-template FIFO
//! free-list, then claimed and re-dressed on the next spawn. FIFO keeps
//! entity ages even instead of hammering the most recently returned handle.
//!
//! The free-lists are only mutated from the serial replay step, never from
//! parallel phases, so no locking is needed here.

use crate::templates::TemplateId;
use bevy_ecs::prelude::*;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Per-template bookkeeping counters, exposed for external UI/debug use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounters {
    /// Entities instantiated fresh because no pooled one was available.
    pub created: u64,
    /// Entities returned to the free-list.
    pub returned: u64,
    /// Entities claimed out of the free-list.
    pub claimed: u64,
}

#[derive(Debug, Default)]
struct FreeList {
    free: VecDeque<Entity>,
    counters: PoolCounters,
    /// Handles currently out of the list (active or dying).
    outstanding: usize,
    /// Peak outstanding since the last right-sizing pass.
    peak_outstanding: usize,
    /// Fresh instantiations since the last right-sizing pass. Persistent
    /// growth here means the pool is sized below the real population.
    created_since_trim: u64,
}

/// Pool of inactive entity handles keyed by template id.
///
/// Holds handles only; the ECS world owns all component data. A handle in a
/// free-list is meaningless until the replay step re-attaches components.
#[derive(Resource, Debug, Default)]
pub struct EntityPool {
    lists: HashMap<TemplateId, FreeList>,
}

impl EntityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the oldest free entity for `template`, if any. `None` tells the
    /// caller to instantiate fresh (normal overflow path, not an error).
    pub fn claim(&mut self, template: TemplateId) -> Option<Entity> {
        let list = self.lists.entry(template).or_default();
        let entity = list.free.pop_front()?;
        list.counters.claimed += 1;
        list.outstanding += 1;
        list.peak_outstanding = list.peak_outstanding.max(list.outstanding);
        Some(entity)
    }

    /// Undo the bookkeeping of a claim whose handle turned out stale (the
    /// entity was destroyed while parked). The caller records its fresh
    /// instantiation separately via [`EntityPool::note_created`].
    pub fn note_claim_failed(&mut self, template: TemplateId) {
        let list = self.lists.entry(template).or_default();
        list.counters.claimed = list.counters.claimed.saturating_sub(1);
        list.outstanding = list.outstanding.saturating_sub(1);
    }

    /// Record a fresh instantiation for `template` (claim found nothing).
    pub fn note_created(&mut self, template: TemplateId) {
        let list = self.lists.entry(template).or_default();
        list.counters.created += 1;
        list.created_since_trim += 1;
        list.outstanding += 1;
        list.peak_outstanding = list.peak_outstanding.max(list.outstanding);
    }

    /// Append `entity` to the free-list for `template`.
    ///
    /// A double return is a lifecycle defect: it is logged and dropped so it
    /// cannot corrupt the list. Returns whether the entity was accepted.
    pub fn give_back(&mut self, entity: Entity, template: TemplateId) -> bool {
        let list = self.lists.entry(template).or_default();
        if list.free.contains(&entity) {
            warn!(?entity, ?template, "double return to pool dropped");
            return false;
        }
        list.free.push_back(entity);
        list.outstanding = list.outstanding.saturating_sub(1);
        list.counters.returned += 1;
        true
    }

    pub fn free_count(&self, template: TemplateId) -> usize {
        self.lists.get(&template).map_or(0, |l| l.free.len())
    }

    pub fn counters(&self, template: TemplateId) -> PoolCounters {
        self.lists.get(&template).map_or_else(PoolCounters::default, |l| l.counters)
    }

    pub fn all_counters(&self) -> impl Iterator<Item = (TemplateId, PoolCounters)> + '_ {
        self.lists.iter().map(|(id, l)| (*id, l.counters))
    }

    /// True if `entity` sits in any free-list. Diagnostic helper for tests
    /// and invariant checks.
    pub fn contains(&self, entity: Entity) -> bool {
        self.lists.values().any(|l| l.free.contains(&entity))
    }

    /// Right-size free-lists against the observed peak outstanding count,
    /// handing surplus handles back to the caller for despawning. Resets the
    /// peak window.
    pub fn trim_to_peak(&mut self) -> Vec<Entity> {
        let mut surplus = Vec::new();
        for (template, list) in self.lists.iter_mut() {
            if list.created_since_trim > 0 && list.counters.returned > 0 {
                // Overflow past the pool is a normal path once, a sizing
                // problem when it keeps happening.
                debug!(
                    ?template,
                    created = list.created_since_trim,
                    "pool exhausted repeatedly since last right-sizing"
                );
            }
            list.created_since_trim = 0;
            // Keep enough parked entities to cover the peak population seen
            // since the last pass; anything beyond that is dead weight.
            let keep = list.peak_outstanding.max(list.outstanding);
            while list.free.len() > keep {
                if let Some(entity) = list.free.pop_back() {
                    surplus.push(entity);
                }
            }
            list.peak_outstanding = list.outstanding;
        }
        surplus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(entities: &[Entity], template: TemplateId) -> EntityPool {
        let mut pool = EntityPool::new();
        for _ in entities {
            pool.note_created(template);
        }
        for &e in entities {
            pool.give_back(e, template);
        }
        pool
    }

    #[test]
    fn test_claim_is_fifo() {
        let t = TemplateId(1);
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);
        let mut pool = pool_with(&[a, b], t);

        assert_eq!(pool.claim(t), Some(a));
        assert_eq!(pool.claim(t), Some(b));
        assert_eq!(pool.claim(t), None);
    }

    #[test]
    fn test_double_return_dropped() {
        let t = TemplateId(1);
        let e = Entity::from_raw(7);
        let mut pool = EntityPool::new();
        pool.note_created(t);

        assert!(pool.give_back(e, t));
        assert!(!pool.give_back(e, t));
        assert_eq!(pool.free_count(t), 1);
    }

    #[test]
    fn test_counters_track_claims_and_returns() {
        let t = TemplateId(3);
        let e = Entity::from_raw(9);
        let mut pool = EntityPool::new();

        pool.note_created(t);
        pool.give_back(e, t);
        pool.claim(t);

        let counters = pool.counters(t);
        assert_eq!(counters.created, 1);
        assert_eq!(counters.returned, 1);
        assert_eq!(counters.claimed, 1);
    }

    #[test]
    fn test_stale_claim_correction_keeps_counters_honest() {
        let t = TemplateId(1);
        let e = Entity::from_raw(4);
        let mut pool = EntityPool::new();
        pool.note_created(t);
        pool.give_back(e, t);

        // Claim hands out a handle that turns out stale; the caller undoes
        // the claim and instantiates fresh instead.
        assert_eq!(pool.claim(t), Some(e));
        pool.note_claim_failed(t);
        pool.note_created(t);

        let counters = pool.counters(t);
        assert_eq!(counters.claimed, 0);
        assert_eq!(counters.created, 2);

        // Outstanding was not double-counted: one entity out, one comes
        // back, and right-sizing keeps exactly that one.
        let f = Entity::from_raw(5);
        pool.give_back(f, t);
        assert!(pool.trim_to_peak().is_empty());
        assert_eq!(pool.free_count(t), 1);
    }

    #[test]
    fn test_trim_to_peak_releases_surplus() {
        let t = TemplateId(1);
        let entities: Vec<Entity> = (1..=6).map(Entity::from_raw).collect();
        let mut pool = pool_with(&entities, t);

        // Peak outstanding was 6, so nothing to trim yet.
        assert!(pool.trim_to_peak().is_empty());

        // New window: only two go out and come back, peak drops to 2.
        let a = pool.claim(t).unwrap();
        let b = pool.claim(t).unwrap();
        pool.give_back(a, t);
        pool.give_back(b, t);

        let surplus = pool.trim_to_peak();
        assert_eq!(surplus.len(), 4);
        assert_eq!(pool.free_count(t), 2);
    }
}
