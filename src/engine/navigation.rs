// Traversability grid for station patrol routes.
//
// World space is cut into a 3D lattice of cells. Each cell is walkable or
// blocked, decided by a box-overlap query against the spatial query service.
// The grid is only ever rebuilt wholesale on a fixed cadence; there is no
// per-cell invalidation.

use std::collections::HashSet;

use bitvec::prelude::*;
use glam::{IVec3, Vec3};

use super::config::GridConfig;
use super::spatial::{BodyKind, LayerMask, SpatialQuery};

/// Fraction of a cell trimmed off each query box so bodies that only touch a
/// cell face do not block the neighbouring cell.
const FACE_TOLERANCE: f32 = 1e-3;

/// Per-axis cell limit. Keeps the cell count inside `i32` index math.
pub const MAX_AXIS_CELLS: i32 = 1024;

/// Largest total cell count a scenario may ask for.
pub const MAX_CELLS: usize = 1 << 24;

/// Cell counts produced by the last rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub walkable: usize,
    pub blocked: usize,
    pub walker_origin: usize,
}

// ============================================================================
// TRAVERSABILITY GRID
// ============================================================================

pub struct TraversabilityGrid {
    center: Vec3,
    extent: Vec3,
    cell_size: Vec3,
    dims: IVec3,
    /// One bit per cell, x fastest then y then z. Set = walkable.
    walkable: BitVec,
    /// Cells blocked only because a station overlaps them. Paths may start
    /// from these so a station can always leave its own footprint.
    walker_origin: HashSet<usize>,
}

impl TraversabilityGrid {
    /// Lattice covering `extent` around `center`. Every cell starts blocked
    /// until the first `rebuild`.
    /// Each axis is capped at `MAX_AXIS_CELLS`.
    pub fn new(center: Vec3, extent: Vec3, cell_size: Vec3) -> Self {
        let extent = extent.max(Vec3::ONE);
        let cell_size = cell_size.max(Vec3::ONE);
        let wanted = Self::dims_for(extent, cell_size);
        let dims = wanted.min(IVec3::splat(MAX_AXIS_CELLS));
        if dims != wanted {
            log::warn!("traversability grid {wanted} capped to {dims} cells");
        }
        let count = dims.x as usize * dims.y as usize * dims.z as usize;
        Self {
            center,
            extent,
            cell_size,
            dims,
            walkable: bitvec![0; count],
            walker_origin: HashSet::new(),
        }
    }

    /// Uncapped lattice dimensions for `extent` split into `cell_size` cells.
    fn dims_for(extent: Vec3, cell_size: Vec3) -> IVec3 {
        (extent.max(Vec3::ONE) / cell_size.max(Vec3::ONE)).round().as_ivec3().max(IVec3::ONE)
    }

    /// Total cells a grid of this shape would hold, or `None` on overflow.
    pub fn cell_count_for(extent: Vec3, cell_size: Vec3) -> Option<usize> {
        let dims = Self::dims_for(extent, cell_size);
        (dims.x as usize).checked_mul(dims.y as usize)?.checked_mul(dims.z as usize)
    }

    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(config.center, config.extent, config.cell_size)
    }

    /// Fully open grid, used by tests and scenarios without static geometry.
    pub fn new_open(center: Vec3, extent: Vec3, cell_size: Vec3) -> Self {
        let mut grid = Self::new(center, extent, cell_size);
        grid.walkable.fill(true);
        grid
    }

    pub fn dims(&self) -> IVec3 {
        self.dims
    }

    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    pub fn cell_count(&self) -> usize {
        self.walkable.len()
    }

    /// World-space center of cell (0, 0, 0).
    fn origin(&self) -> Vec3 {
        self.center - self.extent * 0.5 + self.cell_size * 0.5
    }

    // ------------------------------------------------------------------------
    // Coordinates
    // ------------------------------------------------------------------------

    /// World-space center of a cell.
    pub fn world_pos_of(&self, cell: IVec3) -> Vec3 {
        self.origin() + cell.as_vec3() * self.cell_size
    }

    /// Cell whose center is nearest to `pos`. May lie outside the grid.
    pub fn cell_coord_of(&self, pos: Vec3) -> IVec3 {
        ((pos - self.origin()) / self.cell_size).round().as_ivec3()
    }

    pub fn in_bounds(&self, cell: IVec3) -> bool {
        cell.cmpge(IVec3::ZERO).all() && cell.cmplt(self.dims).all()
    }

    pub fn in_bounds_world(&self, pos: Vec3) -> bool {
        self.in_bounds(self.cell_coord_of(pos))
    }

    pub fn clamp_cell(&self, cell: IVec3) -> IVec3 {
        cell.clamp(IVec3::ZERO, self.dims - IVec3::ONE)
    }

    #[inline]
    pub fn cell_index(&self, cell: IVec3) -> Option<usize> {
        self.in_bounds(cell)
            .then(|| (cell.x + self.dims.x * (cell.y + self.dims.y * cell.z)) as usize)
    }

    // ------------------------------------------------------------------------
    // Walkability
    // ------------------------------------------------------------------------

    pub fn is_walkable(&self, cell: IVec3) -> bool {
        self.cell_index(cell).is_some_and(|i| self.walkable[i])
    }

    pub fn is_walkable_at(&self, pos: Vec3) -> bool {
        self.is_walkable(self.cell_coord_of(pos))
    }

    pub fn is_walker_origin(&self, cell: IVec3) -> bool {
        self.cell_index(cell).is_some_and(|i| self.walker_origin.contains(&i))
    }

    /// Override one cell. Out-of-bounds cells are ignored.
    pub fn set_walkable(&mut self, cell: IVec3, walkable: bool) {
        if let Some(i) = self.cell_index(cell) {
            self.walkable.set(i, walkable);
        }
    }

    /// Reclassify every cell from the current contents of `query`.
    ///
    /// A cell is blocked when any overlapping body on `layers` is an obstacle
    /// or a station. Cells blocked by stations alone are remembered as
    /// walker-origin cells. All other body kinds are ignored.
    pub fn rebuild<Q: SpatialQuery + ?Sized>(&mut self, query: &Q, layers: LayerMask) -> RebuildStats {
        self.walker_origin.clear();
        let half = self.cell_size * (0.5 - FACE_TOLERANCE);
        let mut stats = RebuildStats::default();
        let mut hits = Vec::new();

        for z in 0..self.dims.z {
            for y in 0..self.dims.y {
                for x in 0..self.dims.x {
                    let cell = IVec3::new(x, y, z);
                    let i = (x + self.dims.x * (y + self.dims.y * z)) as usize;
                    let center = self.world_pos_of(cell);

                    hits.clear();
                    query.overlap_box(center - half, center + half, layers, &mut hits);

                    let mut obstacle = false;
                    let mut station = false;
                    for &body in &hits {
                        match query.body_kind(body) {
                            Some(BodyKind::Obstacle) => {
                                obstacle = true;
                                break;
                            }
                            Some(BodyKind::Station(_)) => station = true,
                            _ => {}
                        }
                    }
                    if station && !obstacle {
                        self.walker_origin.insert(i);
                    }

                    let blocked = obstacle || station;
                    self.walkable.set(i, !blocked);
                    if blocked {
                        stats.blocked += 1;
                    } else {
                        stats.walkable += 1;
                    }
                }
            }
        }

        stats.walker_origin = self.walker_origin.len();
        log::debug!(
            "traversability grid rebuilt: {} walkable, {} blocked ({} station cells)",
            stats.walkable,
            stats.blocked,
            stats.walker_origin
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::geometry::Aabb;
    use crate::engine::spatial::CollisionWorld;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    fn grid() -> TraversabilityGrid {
        TraversabilityGrid::new(Vec3::ZERO, Vec3::new(100.0, 20.0, 100.0), Vec3::splat(10.0))
    }

    fn collision_world() -> CollisionWorld {
        CollisionWorld::new(Vec3::splat(-60.0), Vec3::splat(60.0), 10.0)
    }

    #[rstest]
    #[case(Vec3::new(100.0, 20.0, 100.0), Vec3::splat(10.0), IVec3::new(10, 2, 10))]
    #[case(Vec3::new(25.0, 4.0, 14.0), Vec3::splat(10.0), IVec3::new(3, 1, 1))]
    #[case(Vec3::new(0.2, 0.2, 0.2), Vec3::splat(5.0), IVec3::ONE)]
    fn dimensions_round_to_at_least_one(#[case] extent: Vec3, #[case] cell: Vec3, #[case] dims: IVec3) {
        assert_eq!(TraversabilityGrid::new(Vec3::ZERO, extent, cell).dims(), dims);
    }

    #[test]
    fn world_and_cell_coordinates_round_trip() {
        let g = grid();
        assert_abs_diff_eq!(g.world_pos_of(IVec3::ZERO), Vec3::new(-45.0, -5.0, -45.0));
        for cell in [IVec3::ZERO, IVec3::new(9, 1, 9), IVec3::new(4, 0, 7)] {
            assert_eq!(g.cell_coord_of(g.world_pos_of(cell)), cell);
        }
        assert_eq!(g.cell_coord_of(Vec3::new(-44.0, -3.0, -41.0)), IVec3::ZERO);
    }

    #[test]
    fn bounds_checks() {
        let g = grid();
        assert!(g.in_bounds(IVec3::new(9, 1, 9)));
        assert!(!g.in_bounds(IVec3::new(10, 0, 0)));
        assert!(!g.in_bounds(IVec3::new(0, -1, 0)));
        assert!(!g.in_bounds_world(Vec3::new(200.0, 0.0, 0.0)));
        assert_eq!(g.clamp_cell(IVec3::new(-4, 7, 12)), IVec3::new(0, 1, 9));
    }

    #[test]
    fn unbuilt_grid_is_blocked() {
        let g = grid();
        assert!(!g.is_walkable(IVec3::ZERO));
    }

    #[test]
    fn obstacle_free_world_is_fully_walkable() {
        let mut g = grid();
        let mut world = collision_world();
        // Agents and projectiles never block cells.
        world.insert(BodyKind::Agent(0), LayerMask::DEFAULT, Aabb::from_center(Vec3::ZERO, Vec3::ONE));
        world.insert(BodyKind::Projectile { owner: 0 }, LayerMask::DEFAULT, Aabb::from_center(Vec3::splat(20.0), Vec3::ONE));

        let stats = g.rebuild(&world, LayerMask::ALL);
        assert_eq!(stats.blocked, 0);
        assert_eq!(stats.walkable, g.cell_count());
        for z in 0..10 {
            for y in 0..2 {
                for x in 0..10 {
                    assert!(g.is_walkable(IVec3::new(x, y, z)));
                }
            }
        }
    }

    #[test]
    fn enclosed_cells_are_blocked_and_neighbours_stay_open() {
        let mut g = grid();
        let mut world = collision_world();
        // Exactly covers cells x 4..=5, all y, z 4..=5.
        world.insert(
            BodyKind::Obstacle,
            LayerMask::DEFAULT,
            Aabb::new(Vec3::new(-10.0, -10.0, -10.0), Vec3::new(10.0, 10.0, 10.0)),
        );
        g.rebuild(&world, LayerMask::ALL);

        for cell in [IVec3::new(4, 0, 4), IVec3::new(5, 1, 5), IVec3::new(4, 1, 5)] {
            assert!(!g.is_walkable(cell), "{cell} should be blocked");
            assert!(!g.is_walker_origin(cell));
        }
        for cell in [IVec3::new(3, 0, 4), IVec3::new(6, 0, 4), IVec3::new(4, 0, 6)] {
            assert!(g.is_walkable(cell), "{cell} should be open");
        }
    }

    #[test]
    fn station_cells_are_blocked_walker_origins() {
        let mut g = grid();
        let mut world = collision_world();
        world.insert(BodyKind::Station(0), LayerMask::DEFAULT, Aabb::from_center(g.world_pos_of(IVec3::new(2, 0, 2)), Vec3::splat(2.0)));
        let stats = g.rebuild(&world, LayerMask::ALL);
        assert_eq!(stats.walker_origin, 1);
        assert!(!g.is_walkable(IVec3::new(2, 0, 2)));
        assert!(g.is_walker_origin(IVec3::new(2, 0, 2)));
    }

    #[test]
    fn station_inside_obstacle_is_not_a_walker_origin() {
        let mut g = grid();
        let mut world = collision_world();
        let center = g.world_pos_of(IVec3::new(2, 0, 2));
        world.insert(BodyKind::Station(0), LayerMask::DEFAULT, Aabb::from_center(center, Vec3::splat(2.0)));
        world.insert(BodyKind::Obstacle, LayerMask::DEFAULT, Aabb::from_center(center, Vec3::splat(3.0)));
        let stats = g.rebuild(&world, LayerMask::ALL);
        assert_eq!(stats.walker_origin, 0);
        assert!(!g.is_walker_origin(IVec3::new(2, 0, 2)));
    }

    #[test]
    fn oversized_grids_are_capped_per_axis() {
        let extent = Vec3::splat(1.0e5);
        assert_eq!(TraversabilityGrid::cell_count_for(Vec3::new(20.0, 10.0, 30.0), Vec3::splat(10.0)), Some(6));
        assert!(TraversabilityGrid::cell_count_for(extent, Vec3::ONE).is_some_and(|n| n > MAX_CELLS));
        let g = TraversabilityGrid::new(Vec3::ZERO, Vec3::new(1.0e7, 2.0, 2.0), Vec3::ONE);
        assert_eq!(g.dims(), IVec3::new(MAX_AXIS_CELLS, 2, 2));
        assert_eq!(g.cell_count(), MAX_AXIS_CELLS as usize * 4);
    }

    #[test]
    fn rebuild_ignores_other_layers() {
        let mut g = grid();
        let mut world = collision_world();
        world.insert(BodyKind::Obstacle, LayerMask(0b100), Aabb::from_center(Vec3::ZERO, Vec3::splat(30.0)));
        let stats = g.rebuild(&world, LayerMask(0b001));
        assert_eq!(stats.blocked, 0);
    }
}
