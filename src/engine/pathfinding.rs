// A* path planner over the traversability grid.
//
// 26-connected neighbourhood, Manhattan distance as both step cost and
// heuristic. The open set is ordered by (f, h, x, y, z) so that equal-cost
// alternatives always resolve the same way and patrol routes stay stable
// between rebuilds.
//
// Paths are returned end-first: `path[0]` is the destination and the last
// element is the start. Walkers consume them from the back.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};

use bitvec::prelude::*;
use glam::{IVec3, Vec3};
use thiserror::Error;

use super::navigation::TraversabilityGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("start or end cell lies outside the grid")]
    OutOfBounds,
    #[error("no walkable cell reachable from the requested endpoint")]
    NoWalkableCell,
    #[error("no route between start and end")]
    Unreachable,
}

/// 3x3x3 block minus the centre, z outermost then y then x.
const NEIGHBOUR_OFFSETS: [IVec3; 26] = {
    let mut offsets = [IVec3::ZERO; 26];
    let mut i = 0;
    let mut z = -1;
    while z <= 1 {
        let mut y = -1;
        while y <= 1 {
            let mut x = -1;
            while x <= 1 {
                if x != 0 || y != 0 || z != 0 {
                    offsets[i] = IVec3::new(x, y, z);
                    i += 1;
                }
                x += 1;
            }
            y += 1;
        }
        z += 1;
    }
    offsets
};

/// Manhattan distance between two cells.
#[inline]
pub fn manhattan(a: IVec3, b: IVec3) -> i32 {
    let d = (a - b).abs();
    d.x + d.y + d.z
}

// ============================================================================
// SNAP TO WALKABLE
// ============================================================================

/// Nearest walkable cell to `cell` by breadth-first search over neighbour
/// rings, after clamping `cell` into the grid. The search visits each cell at
/// most once, so it is bounded by the grid size.
pub fn nearest_walkable(grid: &TraversabilityGrid, cell: IVec3) -> Option<IVec3> {
    let start = grid.clamp_cell(cell);
    if grid.is_walkable(start) {
        return Some(start);
    }

    let mut visited = bitvec![0; grid.cell_count()];
    let mut queue = VecDeque::new();
    visited.set(grid.cell_index(start)?, true);
    queue.push_back(start);

    while let Some(pos) = queue.pop_front() {
        for offset in NEIGHBOUR_OFFSETS {
            let nb = pos + offset;
            let Some(ni) = grid.cell_index(nb) else {
                continue;
            };
            if grid.is_walkable(nb) {
                return Some(nb);
            }
            if !visited[ni] {
                visited.set(ni, true);
                queue.push_back(nb);
            }
        }
    }
    None
}

// ============================================================================
// A*
// ============================================================================

/// Open-set entry. Field order is the comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct OpenNode {
    f_cost: i32,
    h_cost: i32,
    xyz: [i32; 3],
}

/// Shortest simplified path between two world positions.
///
/// Positions outside the grid are clamped to the nearest edge cell first.
pub fn find_path(grid: &TraversabilityGrid, start: Vec3, end: Vec3) -> Result<Vec<IVec3>, PathError> {
    let start = grid.clamp_cell(grid.cell_coord_of(start));
    let end = grid.clamp_cell(grid.cell_coord_of(end));
    find_path_cells(grid, start, end)
}

/// Shortest simplified path between two cells.
///
/// A start inside a station footprint is kept as is and the route may cross
/// the rest of that footprint. Any other unwalkable endpoint is replaced by
/// its nearest walkable cell.
pub fn find_path_cells(grid: &TraversabilityGrid, start: IVec3, end: IVec3) -> Result<Vec<IVec3>, PathError> {
    if !grid.in_bounds(start) || !grid.in_bounds(end) {
        return Err(PathError::OutOfBounds);
    }
    let footprint = origin_footprint(grid, start);
    let start = if footprint.any() {
        start
    } else {
        nearest_walkable(grid, start).ok_or(PathError::NoWalkableCell)?
    };
    let end = nearest_walkable(grid, end).ok_or(PathError::NoWalkableCell)?;

    let raw = astar(grid, start, end, &footprint).ok_or(PathError::Unreachable)?;
    Ok(simplify(&raw))
}

/// Walker-origin cells connected to `start`, itself included. Empty when
/// `start` is not a walker-origin cell.
fn origin_footprint(grid: &TraversabilityGrid, start: IVec3) -> BitVec {
    let mut footprint = bitvec![0; grid.cell_count()];
    let Some(start_i) = grid.cell_index(start).filter(|_| grid.is_walker_origin(start)) else {
        return footprint;
    };
    footprint.set(start_i, true);
    let mut queue = VecDeque::from([start]);
    while let Some(pos) = queue.pop_front() {
        for offset in NEIGHBOUR_OFFSETS {
            let nb = pos + offset;
            let Some(ni) = grid.cell_index(nb) else {
                continue;
            };
            if !footprint[ni] && grid.is_walker_origin(nb) {
                footprint.set(ni, true);
                queue.push_back(nb);
            }
        }
    }
    footprint
}

/// Raw node-by-node route, end-first. `end` must be walkable; cells in
/// `footprint` count as walkable.
fn astar(grid: &TraversabilityGrid, start: IVec3, end: IVec3, footprint: &BitSlice) -> Option<Vec<IVec3>> {
    let count = grid.cell_count();
    let start_i = grid.cell_index(start)?;
    let end_i = grid.cell_index(end)?;

    // g = cheapest known cost from start; i32::MAX means never reached.
    let mut g_costs = vec![i32::MAX; count];
    let mut parents: Vec<Option<IVec3>> = vec![None; count];
    let mut closed = bitvec![0; count];
    let mut open = BinaryHeap::new();

    g_costs[start_i] = 0;
    open.push(Reverse(OpenNode {
        f_cost: manhattan(start, end),
        h_cost: manhattan(start, end),
        xyz: start.to_array(),
    }));

    while let Some(Reverse(node)) = open.pop() {
        let current = IVec3::from_array(node.xyz);
        let Some(current_i) = grid.cell_index(current) else {
            continue;
        };
        // Superseded entries linger in the heap after a cheaper push.
        if closed[current_i] {
            continue;
        }
        if current_i == end_i {
            return Some(trace_back(&parents, grid, start, end));
        }
        closed.set(current_i, true);

        for offset in NEIGHBOUR_OFFSETS {
            let nb = current + offset;
            let Some(ni) = grid.cell_index(nb) else {
                continue;
            };
            if closed[ni] || !(grid.is_walkable(nb) || footprint[ni]) {
                continue;
            }

            let g = g_costs[current_i] + manhattan(current, nb);
            if g >= g_costs[ni] {
                continue;
            }
            g_costs[ni] = g;
            parents[ni] = Some(current);

            let h = manhattan(nb, end);
            open.push(Reverse(OpenNode { f_cost: g + h, h_cost: h, xyz: nb.to_array() }));
        }
    }
    None
}

fn trace_back(parents: &[Option<IVec3>], grid: &TraversabilityGrid, start: IVec3, end: IVec3) -> Vec<IVec3> {
    let mut path = vec![end];
    let mut current = end;
    while current != start {
        match grid.cell_index(current).and_then(|i| parents[i]) {
            Some(parent) => {
                path.push(parent);
                current = parent;
            }
            None => break,
        }
    }
    path
}

// ============================================================================
// SIMPLIFICATION
// ============================================================================

/// Smallest integer step along `v` (each component divided by the gcd).
fn step_direction(v: IVec3) -> IVec3 {
    fn gcd(a: i32, b: i32) -> i32 {
        if b == 0 { a } else { gcd(b, a % b) }
    }
    let a = v.abs();
    let g = gcd(gcd(a.x, a.y), a.z);
    if g == 0 { v } else { v / g }
}

/// Drop every interior waypoint that continues in the same direction as the
/// segment before it. Endpoints are always kept, so simplifying an already
/// simplified path returns it unchanged.
pub fn simplify(path: &[IVec3]) -> Vec<IVec3> {
    let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
        return Vec::new();
    };
    if path.len() <= 2 {
        return path.to_vec();
    }

    let mut out = vec![first];
    for w in path.windows(3) {
        let incoming = step_direction(w[0] - w[1]);
        let outgoing = step_direction(w[1] - w[2]);
        if incoming != outgoing {
            out.push(w[1]);
        }
    }
    out.push(last);
    out
}

/// Re-expand a simplified path into unit steps, end-first like the input.
pub fn expand(path: &[IVec3]) -> Vec<IVec3> {
    let mut out = Vec::new();
    let Some(&first) = path.first() else {
        return out;
    };
    out.push(first);
    for pair in path.windows(2) {
        let step = step_direction(pair[1] - pair[0]);
        let mut cell = pair[0];
        while cell != pair[1] {
            cell += step;
            out.push(cell);
        }
    }
    out
}
