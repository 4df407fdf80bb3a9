// Spatial query service boundary and an in-memory reference implementation.
//
// The engine only ever reads through `SpatialQuery`. The physics layer that
// owns the real broad-phase implements the trait; `CollisionWorld` is the
// stand-in used by the headless demo and the tests.

use glam::{IVec3, Vec3};

use super::components::{AgentId, StationId};
use super::geometry::Aabb;

// ============================================================================
// BODIES
// ============================================================================

/// Opaque index of a body inside a spatial query service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub usize);

/// What a body stands for. Every query consumer switches over this tag
/// instead of asking the entity store what a body is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Obstacle,
    Agent(AgentId),
    Station(StationId),
    Projectile { owner: AgentId },
    /// Level geometry with no gameplay role. Deflects avoidance rays but
    /// never blocks grid cells.
    Untagged,
}

/// Collision layer bitmask. A body matches a filter when the masks intersect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const ALL: Self = Self(!0);
    pub const DEFAULT: Self = Self(1);

    #[inline]
    pub fn matches(self, other: LayerMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Body {
    pub kind: BodyKind,
    pub layer: LayerMask,
    pub bounds: Aabb,
}

/// One surface crossing reported by a ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyHandle,
    pub position: Vec3,
    pub normal: Vec3,
    /// Fraction along the cast segment in [0, 1].
    pub fraction: f32,
}

// ============================================================================
// QUERY SERVICE
// ============================================================================

/// Read-only view of all simulated bodies.
///
/// Empty results are always valid. Implementations must be shareable across
/// the worker threads that compute per-agent forces.
pub trait SpatialQuery: Sync {
    /// Append every body whose bounds overlap the box `min..max` and whose
    /// layer matches `filter`. Does not clear `out`.
    fn overlap_box(&self, min: Vec3, max: Vec3, filter: LayerMask, out: &mut Vec<BodyHandle>);

    /// Append every body crossed by the segment `start..end`, nearest first.
    /// Does not clear `out`.
    fn raycast(&self, start: Vec3, end: Vec3, filter: LayerMask, out: &mut Vec<RayHit>);

    /// Tag of a body, `None` for a stale handle.
    fn body_kind(&self, body: BodyHandle) -> Option<BodyKind>;
}

// ============================================================================
// BROAD-PHASE GRID
// ============================================================================

/// Uniform 3D hash grid over a fixed world volume.
///
/// Stores body indices in every cell a body's bounds touch. Bodies reaching
/// outside the covered volume are also kept in an overflow list that every
/// query scans, so nothing is ever lost at the edges.
struct BroadphaseGrid {
    cells: Vec<Vec<usize>>,
    overflow: Vec<usize>,
    cell_size: f32,
    dims: IVec3,
    world_min: Vec3,
}

impl BroadphaseGrid {
    fn new(world_min: Vec3, world_max: Vec3, cell_size: f32) -> Self {
        let cell_size = cell_size.max(0.01);
        let span = (world_max - world_min).max(Vec3::ZERO);
        let dims = (span / cell_size).ceil().as_ivec3().max(IVec3::ONE);
        Self {
            cells: vec![Vec::new(); (dims.x * dims.y * dims.z) as usize],
            overflow: Vec::new(),
            cell_size,
            dims,
            world_min,
        }
    }

    fn clear(&mut self) {
        for c in &mut self.cells {
            c.clear();
        }
        self.overflow.clear();
    }

    fn cell_of(&self, pos: Vec3) -> IVec3 {
        ((pos - self.world_min) / self.cell_size).floor().as_ivec3()
    }

    fn index(&self, cell: IVec3) -> usize {
        (cell.x + self.dims.x * (cell.y + self.dims.y * cell.z)) as usize
    }

    /// Clamped cell range covered by `bounds` and whether it spilled outside.
    fn cell_range(&self, bounds: &Aabb) -> (IVec3, IVec3, bool) {
        let lo = self.cell_of(bounds.min);
        let hi = self.cell_of(bounds.max);
        let max_cell = self.dims - IVec3::ONE;
        let spilled = lo.cmplt(IVec3::ZERO).any() || hi.cmpgt(max_cell).any();
        (lo.clamp(IVec3::ZERO, max_cell), hi.clamp(IVec3::ZERO, max_cell), spilled)
    }

    fn insert(&mut self, bounds: &Aabb, idx: usize) {
        let (lo, hi, spilled) = self.cell_range(bounds);
        if spilled {
            self.overflow.push(idx);
        }
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let i = self.index(IVec3::new(x, y, z));
                    self.cells[i].push(idx);
                }
            }
        }
    }

    /// Superset of bodies near `bounds`; may contain duplicates.
    fn query(&self, bounds: &Aabb, out: &mut Vec<usize>) {
        let (lo, hi, _) = self.cell_range(bounds);
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    out.extend_from_slice(&self.cells[self.index(IVec3::new(x, y, z))]);
                }
            }
        }
        out.extend_from_slice(&self.overflow);
    }
}

// ============================================================================
// COLLISION WORLD
// ============================================================================

/// In-memory body store answering `SpatialQuery`.
///
/// Rebuilt by the caller whenever bodies move (`clear` then `insert`).
pub struct CollisionWorld {
    bodies: Vec<Body>,
    broadphase: BroadphaseGrid,
}

impl CollisionWorld {
    /// `world_min`/`world_max` bound the broad-phase grid; bodies outside
    /// still work, just without acceleration.
    pub fn new(world_min: Vec3, world_max: Vec3, cell_size: f32) -> Self {
        Self {
            bodies: Vec::new(),
            broadphase: BroadphaseGrid::new(world_min, world_max, cell_size),
        }
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.broadphase.clear();
    }

    pub fn insert(&mut self, kind: BodyKind, layer: LayerMask, bounds: Aabb) -> BodyHandle {
        let idx = self.bodies.len();
        self.bodies.push(Body { kind, layer, bounds });
        self.broadphase.insert(&bounds, idx);
        BodyHandle(idx)
    }

    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.0)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl SpatialQuery for CollisionWorld {
    fn overlap_box(&self, min: Vec3, max: Vec3, filter: LayerMask, out: &mut Vec<BodyHandle>) {
        let query = Aabb::new(min, max);
        let mut candidates = Vec::new();
        self.broadphase.query(&query, &mut candidates);
        candidates.sort_unstable();
        candidates.dedup();

        out.extend(
            candidates
                .into_iter()
                .filter(|&i| {
                    let body = &self.bodies[i];
                    body.layer.matches(filter) && body.bounds.overlaps(&query)
                })
                .map(BodyHandle),
        );
    }

    fn raycast(&self, start: Vec3, end: Vec3, filter: LayerMask, out: &mut Vec<RayHit>) {
        let first = out.len();
        for (i, body) in self.bodies.iter().enumerate() {
            if !body.layer.matches(filter) {
                continue;
            }
            if let Some(hit) = body.bounds.intersect_segment(start, end) {
                out.push(RayHit {
                    body: BodyHandle(i),
                    position: hit.position,
                    normal: hit.normal,
                    fraction: hit.fraction,
                });
            }
        }
        out[first..].sort_by(|a, b| a.fraction.total_cmp(&b.fraction));
    }

    fn body_kind(&self, body: BodyHandle) -> Option<BodyKind> {
        self.bodies.get(body.0).map(|b| b.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> CollisionWorld {
        CollisionWorld::new(Vec3::splat(-50.0), Vec3::splat(50.0), 5.0)
    }

    #[test]
    fn overlap_finds_each_body_once() {
        let mut w = world();
        let big = w.insert(BodyKind::Obstacle, LayerMask::DEFAULT, Aabb::from_center(Vec3::ZERO, Vec3::splat(12.0)));
        let small = w.insert(BodyKind::Agent(3), LayerMask::DEFAULT, Aabb::from_center(Vec3::new(30.0, 0.0, 0.0), Vec3::ONE));

        let mut out = Vec::new();
        w.overlap_box(Vec3::splat(-20.0), Vec3::splat(20.0), LayerMask::ALL, &mut out);
        assert_eq!(out, vec![big]);

        out.clear();
        w.overlap_box(Vec3::splat(-40.0), Vec3::splat(40.0), LayerMask::ALL, &mut out);
        assert_eq!(out, vec![big, small]);
    }

    #[test]
    fn overlap_respects_layer_filter() {
        let mut w = world();
        w.insert(BodyKind::Obstacle, LayerMask(0b10), Aabb::from_center(Vec3::ZERO, Vec3::ONE));
        let mut out = Vec::new();
        w.overlap_box(Vec3::splat(-2.0), Vec3::splat(2.0), LayerMask(0b01), &mut out);
        assert!(out.is_empty());
        w.overlap_box(Vec3::splat(-2.0), Vec3::splat(2.0), LayerMask(0b10), &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn bodies_outside_broadphase_are_still_found() {
        let mut w = world();
        let far = w.insert(BodyKind::Obstacle, LayerMask::DEFAULT, Aabb::from_center(Vec3::splat(200.0), Vec3::ONE));
        let mut out = Vec::new();
        w.overlap_box(Vec3::splat(195.0), Vec3::splat(205.0), LayerMask::ALL, &mut out);
        assert_eq!(out, vec![far]);
    }

    #[test]
    fn raycast_orders_hits_nearest_first() {
        let mut w = world();
        let far = w.insert(BodyKind::Obstacle, LayerMask::DEFAULT, Aabb::from_center(Vec3::new(0.0, 0.0, 20.0), Vec3::ONE));
        let near = w.insert(BodyKind::Station(0), LayerMask::DEFAULT, Aabb::from_center(Vec3::new(0.0, 0.0, 10.0), Vec3::ONE));

        let mut hits = Vec::new();
        w.raycast(Vec3::ZERO, Vec3::new(0.0, 0.0, 30.0), LayerMask::ALL, &mut hits);
        let order: Vec<_> = hits.iter().map(|h| h.body).collect();
        assert_eq!(order, vec![near, far]);
        assert_eq!(w.body_kind(near), Some(BodyKind::Station(0)));
        assert_eq!(w.body_kind(BodyHandle(99)), None);
    }
}
