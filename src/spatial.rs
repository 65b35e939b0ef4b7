//! Spatial partitioning for projectile hit queries and neighbor lookups.
//!
//! Grid over the XZ ground plane: O(1) cell lookup, O(k) queries over nearby
//! cells instead of O(n) brute force. Rebuilt once per tick before the
//! parallel gather phase, then read-only, so workers can query it freely.

use crate::components::{CollisionLayer, CollisionRadius, Health, LifecycleState, Position};
use bevy_ecs::prelude::*;
use std::collections::HashMap;

/// Entry in a spatial cell.
#[derive(Debug, Clone, Copy)]
pub struct SpatialEntry {
    pub entity: Entity,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub layer: CollisionLayer,
    pub radius: f32,
}

/// Result of a raycast against the grid.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub entity: Entity,
    /// Distance from the ray origin to the hit point.
    pub distance: f32,
    pub point: Position,
    /// Surface normal at the hit point (radial for sphere colliders).
    pub normal: crate::components::Heading,
}

/// Grid-based spatial partitioning structure keyed on (x, z).
#[derive(Resource, Debug)]
pub struct SpatialGrid {
    /// Cell size in world units.
    pub cell_size: f32,
    cells: HashMap<(i32, i32), Vec<SpatialEntry>>,
    total: usize,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(8.0)
    }
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            total: 0,
        }
    }

    #[inline]
    pub fn world_to_cell(&self, x: f32, z: f32) -> (i32, i32) {
        (
            (x / self.cell_size).floor() as i32,
            (z / self.cell_size).floor() as i32,
        )
    }

    /// Clear all entries (call before rebuilding each tick).
    pub fn clear(&mut self) {
        self.cells.clear();
        self.total = 0;
    }

    pub fn insert(&mut self, entry: SpatialEntry) {
        let cell = self.world_to_cell(entry.x, entry.z);
        self.cells.entry(cell).or_default().push(entry);
        self.total += 1;
    }

    pub fn total_count(&self) -> usize {
        self.total
    }

    /// All entities of `layer` within `radius` of a point, unsorted.
    pub fn query_radius(&self, x: f32, z: f32, radius: f32, layer: CollisionLayer) -> Vec<SpatialEntry> {
        let radius_sq = radius * radius;
        let cells_to_check = (radius / self.cell_size).ceil() as i32 + 1;
        let center = self.world_to_cell(x, z);

        let mut results = Vec::new();
        for dx in -cells_to_check..=cells_to_check {
            for dz in -cells_to_check..=cells_to_check {
                let cell = (center.0 + dx, center.1 + dz);
                if let Some(entries) = self.cells.get(&cell) {
                    for entry in entries {
                        if entry.layer != layer {
                            continue;
                        }
                        let dist_sq = (entry.x - x).powi(2) + (entry.z - z).powi(2);
                        if dist_sq <= radius_sq {
                            results.push(*entry);
                        }
                    }
                }
            }
        }
        results
    }

    /// Cast a segment from `origin` along `dir` (normalized) for `max_dist`
    /// against sphere colliders on `layer`. Returns the nearest hit.
    pub fn raycast(
        &self,
        origin: &Position,
        dir: &crate::components::Heading,
        max_dist: f32,
        layer: CollisionLayer,
    ) -> Option<RayHit> {
        // Candidate cells: everything the segment's XZ bounding box touches,
        // padded by one cell so large colliders poking in from neighbors are
        // still seen.
        let end_x = origin.x + dir.x * max_dist;
        let end_z = origin.z + dir.z * max_dist;
        let (cx0, cz0) = self.world_to_cell(origin.x.min(end_x), origin.z.min(end_z));
        let (cx1, cz1) = self.world_to_cell(origin.x.max(end_x), origin.z.max(end_z));

        let mut best: Option<RayHit> = None;
        for cx in (cx0 - 1)..=(cx1 + 1) {
            for cz in (cz0 - 1)..=(cz1 + 1) {
                let Some(entries) = self.cells.get(&(cx, cz)) else {
                    continue;
                };
                for entry in entries {
                    if entry.layer != layer {
                        continue;
                    }
                    if let Some(t) = ray_sphere(origin, dir, max_dist, entry) {
                        if best.map_or(true, |b| t < b.distance) {
                            let point = origin.advanced(dir, t);
                            let center = Position::new(entry.x, entry.y, entry.z);
                            let normal = crate::components::Heading::toward(&center, &point);
                            best = Some(RayHit {
                                entity: entry.entity,
                                distance: t,
                                point,
                                normal,
                            });
                        }
                    }
                }
            }
        }
        best
    }
}

/// Segment vs sphere intersection: smallest non-negative t along `dir`, or
/// `None` if the segment misses or stops short.
fn ray_sphere(origin: &Position, dir: &crate::components::Heading, max_dist: f32, entry: &SpatialEntry) -> Option<f32> {
    let ox = origin.x - entry.x;
    let oy = origin.y - entry.y;
    let oz = origin.z - entry.z;

    let b = ox * dir.x + oy * dir.y + oz * dir.z;
    let c = ox * ox + oy * oy + oz * oz - entry.radius * entry.radius;

    // Starting inside counts as an immediate hit.
    if c <= 0.0 {
        return Some(0.0);
    }

    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    if t >= 0.0 && t <= max_dist {
        Some(t)
    } else {
        None
    }
}

/// System that rebuilds the spatial grid each tick from active entities.
/// Pooled entities carry no `Position` and drop out of the query on their own.
pub fn spatial_grid_update_system(
    mut grid: ResMut<SpatialGrid>,
    query: Query<(
        Entity,
        &Position,
        &CollisionLayer,
        &CollisionRadius,
        &LifecycleState,
        Option<&Health>,
    )>,
) {
    grid.clear();

    for (entity, pos, layer, radius, lifecycle, health) in query.iter() {
        if !lifecycle.is_active() {
            continue;
        }
        if let Some(health) = health {
            if !health.is_alive() {
                continue;
            }
        }
        grid.insert(SpatialEntry {
            entity,
            x: pos.x,
            y: pos.y,
            z: pos.z,
            layer: *layer,
            radius: radius.0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Heading;

    fn entry(entity: Entity, x: f32, z: f32, layer: CollisionLayer, radius: f32) -> SpatialEntry {
        SpatialEntry { entity, x, y: 0.0, z, layer, radius }
    }

    #[test]
    fn test_query_radius_filters_by_layer() {
        let mut grid = SpatialGrid::new(10.0);
        let e1 = Entity::from_raw(1);
        let e2 = Entity::from_raw(2);
        let e3 = Entity::from_raw(3);

        grid.insert(entry(e1, 5.0, 5.0, CollisionLayer::Hostile, 0.5));
        grid.insert(entry(e2, 6.0, 5.0, CollisionLayer::NonThreat, 0.5));
        grid.insert(entry(e3, 100.0, 100.0, CollisionLayer::Hostile, 0.5));

        let nearby = grid.query_radius(5.0, 5.0, 15.0, CollisionLayer::Hostile);
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].entity, e1);
    }

    #[test]
    fn test_raycast_hits_nearest() {
        let mut grid = SpatialGrid::new(10.0);
        let near = Entity::from_raw(1);
        let far = Entity::from_raw(2);

        grid.insert(entry(far, 20.0, 0.0, CollisionLayer::Hostile, 1.0));
        grid.insert(entry(near, 10.0, 0.0, CollisionLayer::Hostile, 1.0));

        let origin = Position::new(0.0, 0.0, 0.0);
        let dir = Heading::new(1.0, 0.0, 0.0);
        let hit = grid.raycast(&origin, &dir, 50.0, CollisionLayer::Hostile).unwrap();

        assert_eq!(hit.entity, near);
        assert!((hit.distance - 9.0).abs() < 0.01);
        // Normal points back toward the ray origin.
        assert!(hit.normal.x < 0.0);
    }

    #[test]
    fn test_raycast_respects_max_distance_and_layer() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(entry(Entity::from_raw(1), 30.0, 0.0, CollisionLayer::Hostile, 1.0));
        grid.insert(entry(Entity::from_raw(2), 5.0, 0.0, CollisionLayer::NonThreat, 1.0));

        let origin = Position::new(0.0, 0.0, 0.0);
        let dir = Heading::new(1.0, 0.0, 0.0);

        // Too short to reach the hostile; the non-threat on the way is ignored.
        assert!(grid.raycast(&origin, &dir, 10.0, CollisionLayer::Hostile).is_none());
        assert!(grid.raycast(&origin, &dir, 50.0, CollisionLayer::Hostile).is_some());
    }

    #[test]
    fn test_raycast_miss_off_axis() {
        let mut grid = SpatialGrid::new(10.0);
        grid.insert(entry(Entity::from_raw(1), 10.0, 5.0, CollisionLayer::Hostile, 1.0));

        let origin = Position::new(0.0, 0.0, 0.0);
        let dir = Heading::new(1.0, 0.0, 0.0);
        assert!(grid.raycast(&origin, &dir, 50.0, CollisionLayer::Hostile).is_none());
    }
}
