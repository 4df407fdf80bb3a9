// Patrol walker: moves stations along planned grid paths.
//
// Idle -> Planning -> Following -> (path exhausted) Planning ...
//
// Replanning happens when the grid was rebuilt this tick, when a following
// walker runs off the end of its path, or when a new target was requested.
// Only path exhaustion draws a fresh random target; a rebuild keeps the
// current target and carries the node being walked to into the new path.
// A failed plan leaves the walker Idle until the next rebuild or retarget.

use glam::{IVec3, Vec3};
use rand::Rng;

use super::components::{station_fx, EffectCue, Station, StationId, WalkerPhase};
use super::geometry;
use super::navigation::TraversabilityGrid;
use super::pathfinding;

/// Uniformly distributed unit vector.
pub fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let v = Vec3::new(rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0), rng.gen_range(-1.0..=1.0));
        let len_sq = v.length_squared();
        if len_sq > 1e-6 && len_sq <= 1.0 {
            return v / len_sq.sqrt();
        }
    }
}

/// Ask `station` to walk to `target` on its next patrol step.
pub fn retarget(station: &mut Station, target: Vec3) {
    if station.walker.phase == WalkerPhase::Halted {
        return;
    }
    station.walker.target_pos = target;
    station.walker.phase = WalkerPhase::Planning;
}

/// Advance one station by `dt`.
pub fn step_station<R: Rng + ?Sized>(
    id: StationId,
    station: &mut Station,
    grid: &TraversabilityGrid,
    grid_rebuilt: bool,
    rng: &mut R,
    dt: f32,
    cues: &mut Vec<EffectCue>,
) {
    station.velocity = Vec3::ZERO;

    if !station.is_alive() {
        if !station.wrecked {
            station.wrecked = true;
            cues.push(EffectCue::Station { station: id, effect: station_fx::DEATH });
            log::debug!("station {id} (team {}) destroyed", station.team);
        }
        station.walker.phase = WalkerPhase::Halted;
        return;
    }

    let exhausted = station.walker.phase == WalkerPhase::Following && station.walker.current_node().is_none();
    if grid_rebuilt || exhausted || station.walker.phase == WalkerPhase::Planning {
        if exhausted && !grid_rebuilt {
            station.walker.target_pos = station.home + random_direction(rng) * rng.gen_range(0.0..=station.patrol_radius.max(0.0));
            station.target_up = random_direction(rng);
        }
        let carried = if grid_rebuilt { station.walker.current_node() } else { None };
        plan(id, station, grid, carried);
    }

    follow(station, grid, dt);
}

fn plan(id: StationId, station: &mut Station, grid: &TraversabilityGrid, carried: Option<IVec3>) {
    let walker = &mut station.walker;
    walker.phase = WalkerPhase::Planning;
    match pathfinding::find_path(grid, station.position, walker.target_pos) {
        Ok(mut path) => {
            let last = path.len() - 1;
            if let Some(node) = carried {
                path[last] = node;
            }
            walker.path = path;
            walker.current = Some(last);
            walker.phase = WalkerPhase::Following;
        }
        Err(err) => {
            log::debug!("station {id} could not plan to {}: {err}", walker.target_pos);
            walker.path.clear();
            walker.current = None;
            walker.phase = WalkerPhase::Idle;
        }
    }
}

fn follow(station: &mut Station, grid: &TraversabilityGrid, dt: f32) {
    let walker = &mut station.walker;
    let (Some(index), Some(node)) = (walker.current, walker.current_node()) else {
        return;
    };

    let delta = grid.world_pos_of(node) - station.position;
    if delta.length_squared() <= walker.next_node_threshold * walker.next_node_threshold {
        walker.current = index.checked_sub(1);
    }

    let look_dir = delta.normalize_or_zero();
    station.orientation = geometry::turn_towards(station.orientation, look_dir, station.target_up, walker.look_speed * dt);
    station.velocity = look_dir * walker.move_speed;
    station.position += station.velocity * dt;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::components::Walker;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grid() -> TraversabilityGrid {
        TraversabilityGrid::new_open(Vec3::ZERO, Vec3::new(100.0, 10.0, 100.0), Vec3::splat(10.0))
    }

    fn station_at(grid: &TraversabilityGrid, cell: IVec3) -> Station {
        let mut station = Station::new(grid.world_pos_of(cell), Vec3::splat(2.0), 1, 10.0, Walker::new(1.0, 4.0, 1.0));
        station.patrol_radius = 30.0;
        station.home = Vec3::ZERO;
        station
    }

    #[test]
    fn dead_station_freezes_and_cues_once() {
        let g = grid();
        let mut rng = StdRng::seed_from_u64(1);
        let mut station = station_at(&g, IVec3::new(2, 0, 2));
        station.health = 0.0;
        station.velocity = Vec3::X;
        let mut cues = Vec::new();

        step_station(3, &mut station, &g, true, &mut rng, 0.1, &mut cues);
        step_station(3, &mut station, &g, true, &mut rng, 0.1, &mut cues);

        assert_eq!(cues, vec![EffectCue::Station { station: 3, effect: station_fx::DEATH }]);
        assert_eq!(station.velocity, Vec3::ZERO);
        assert_eq!(station.walker.phase, WalkerPhase::Halted);
        assert!(station.walker.path.is_empty());
    }

    #[test]
    fn exhausted_path_draws_target_inside_patrol_radius() {
        let g = grid();
        let mut rng = StdRng::seed_from_u64(7);
        let mut station = station_at(&g, IVec3::new(2, 0, 2));
        station.walker.phase = WalkerPhase::Following;
        let mut cues = Vec::new();

        step_station(0, &mut station, &g, false, &mut rng, 0.0, &mut cues);

        assert!(station.walker.target_pos.distance(station.home) <= 30.0 + 1e-4);
        assert_abs_diff_eq!(station.target_up.length(), 1.0, epsilon = 1e-5);
        assert_eq!(station.walker.phase, WalkerPhase::Following);
        // Already standing on the start node, so the first step consumes it.
        assert_eq!(station.walker.path.last(), Some(&IVec3::new(2, 0, 2)));
        assert_eq!(station.walker.current, station.walker.path.len().checked_sub(2));
        assert!(cues.is_empty());
    }

    #[test]
    fn rebuild_keeps_target_and_carries_current_node() {
        let g = grid();
        let mut rng = StdRng::seed_from_u64(7);
        let mut station = station_at(&g, IVec3::new(2, 0, 2));
        let target = g.world_pos_of(IVec3::new(5, 0, 5));
        station.walker.target_pos = target;
        station.walker.path = vec![IVec3::new(5, 0, 5), IVec3::new(3, 0, 3)];
        station.walker.current = Some(1);
        station.walker.phase = WalkerPhase::Following;

        step_station(0, &mut station, &g, true, &mut rng, 0.0, &mut Vec::new());

        let path = &station.walker.path;
        assert_eq!(station.walker.target_pos, target);
        assert_eq!(path.first(), Some(&IVec3::new(5, 0, 5)));
        assert_eq!(path.last(), Some(&IVec3::new(3, 0, 3)));
        assert_eq!(station.walker.current, Some(path.len() - 1));
    }

    #[test]
    fn arrival_steps_toward_destination() {
        let g = grid();
        let mut rng = StdRng::seed_from_u64(7);
        let mut station = station_at(&g, IVec3::new(2, 0, 2));
        station.walker.path = vec![IVec3::new(5, 0, 2), IVec3::new(2, 0, 2)];
        station.walker.current = Some(1);
        station.walker.phase = WalkerPhase::Following;

        step_station(0, &mut station, &g, false, &mut rng, 0.0, &mut Vec::new());
        assert_eq!(station.walker.current, Some(0));
        assert_eq!(station.velocity, Vec3::ZERO);

        step_station(0, &mut station, &g, false, &mut rng, 0.5, &mut Vec::new());
        assert_abs_diff_eq!(station.velocity, Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-5);
        assert_abs_diff_eq!(station.position, g.world_pos_of(IVec3::new(2, 0, 2)) + Vec3::new(2.0, 0.0, 0.0), epsilon = 1e-4);
    }

    #[test]
    fn failed_plan_idles_until_next_trigger() {
        // Never rebuilt, so every cell is blocked.
        let blocked = TraversabilityGrid::new(Vec3::ZERO, Vec3::new(100.0, 10.0, 100.0), Vec3::splat(10.0));
        let mut rng = StdRng::seed_from_u64(7);
        let mut station = station_at(&blocked, IVec3::new(2, 0, 2));
        station.walker.target_pos = Vec3::new(20.0, 0.0, 20.0);

        step_station(0, &mut station, &blocked, true, &mut rng, 0.1, &mut Vec::new());
        assert_eq!(station.walker.phase, WalkerPhase::Idle);
        assert_eq!(station.walker.current, None);

        step_station(0, &mut station, &blocked, false, &mut rng, 0.1, &mut Vec::new());
        assert_eq!(station.walker.phase, WalkerPhase::Idle);
        assert_eq!(station.walker.target_pos, Vec3::new(20.0, 0.0, 20.0));
        assert_eq!(station.velocity, Vec3::ZERO);
    }

    #[test]
    fn retarget_plans_without_rebuild() {
        let g = grid();
        let mut rng = StdRng::seed_from_u64(7);
        let mut station = station_at(&g, IVec3::new(2, 0, 2));
        let target = g.world_pos_of(IVec3::new(2, 0, 8));
        retarget(&mut station, target);

        step_station(0, &mut station, &g, false, &mut rng, 0.0, &mut Vec::new());
        assert_eq!(station.walker.target_pos, target);
        assert_eq!(station.walker.path.first(), Some(&IVec3::new(2, 0, 8)));
        assert_eq!(station.walker.phase, WalkerPhase::Following);
    }
}
