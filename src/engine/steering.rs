// Steering force composer.
//
// Runs once per living agent per tick against a read-only snapshot of every
// agent plus the spatial query service, and returns the forces the
// integration pass will apply. Priority:
//   1. obstacle avoidance (preempts everything below it)
//   2. flocking: cohesion + alignment + separation + arena containment
//   3. line-of-sight clearing (always)
//   4. constant forward thrust (always)

use glam::Vec3;

use super::components::{Agent, AgentId};
use super::geometry::{self, WORLD_UP};
use super::settings::Settings;
use super::spatial::{BodyHandle, BodyKind, RayHit, SpatialQuery};

/// Everything one agent wants to do this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringOutput {
    /// Avoidance force when avoiding, otherwise the flocking sum.
    pub move_force: Vec3,
    pub thrust: Vec3,
    /// Desired roll reference for the look rotation.
    pub target_up: Vec3,
    pub line_of_sight_force: Vec3,
    pub avoiding: bool,
}

impl SteeringOutput {
    /// No force and hold the current roll.
    pub fn idle(agent: &Agent) -> Self {
        Self {
            move_force: Vec3::ZERO,
            thrust: Vec3::ZERO,
            target_up: geometry::up(agent.orientation),
            line_of_sight_force: Vec3::ZERO,
            avoiding: false,
        }
    }

    pub fn total_force(&self) -> Vec3 {
        self.move_force + self.thrust + self.line_of_sight_force
    }
}

/// Individual flocking terms, kept separate for inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlockForces {
    pub cohesion: Vec3,
    pub alignment: Vec3,
    pub separation: Vec3,
    pub containment: Vec3,
    pub up: Vec3,
    pub neighbours: usize,
}

impl FlockForces {
    pub fn sum(&self) -> Vec3 {
        self.cohesion + self.alignment + self.separation + self.containment
    }
}

// ============================================================================
// NEIGHBOURHOOD
// ============================================================================

/// Living same-team agents inside the forward view cone of `agents[id]`.
pub fn friendly_neighbours<Q: SpatialQuery + ?Sized>(
    id: AgentId,
    agents: &[Agent],
    query: &Q,
    settings: &Settings,
    view_dst: f32,
    fov_deg: f32,
) -> Vec<AgentId> {
    let me = &agents[id];
    let forward = geometry::forward(me.orientation);

    let mut bodies: Vec<BodyHandle> = Vec::new();
    query.overlap_box(me.position - view_dst, me.position + view_dst, settings.query_layers, &mut bodies);

    bodies
        .into_iter()
        .filter_map(|body| match query.body_kind(body) {
            Some(BodyKind::Agent(other)) if other != id => Some(other),
            _ => None,
        })
        .filter(|&other| {
            agents.get(other).is_some_and(|n| {
                n.is_alive()
                    && n.team == me.team
                    && geometry::in_view_cone(me.position, forward, n.position, view_dst, fov_deg)
            })
        })
        .collect()
}

// ============================================================================
// BEHAVIOURS
// ============================================================================

/// Push away from the first static surface straight ahead.
///
/// Agents and projectiles never deflect the ray: spacing between agents is
/// left entirely to separation.
pub fn obstacle_avoidance<Q: SpatialQuery + ?Sized>(agent: &Agent, settings: &Settings, query: &Q) -> Vec3 {
    let view_dst = settings.obstacle_view_dst;
    if view_dst <= 0.0 {
        return Vec3::ZERO;
    }
    let start = agent.position;
    let end = start + geometry::forward(agent.orientation) * view_dst;

    let mut hits: Vec<RayHit> = Vec::new();
    query.raycast(start, end, settings.query_layers, &mut hits);

    let first = hits.iter().find(|hit| {
        matches!(
            query.body_kind(hit.body),
            Some(BodyKind::Obstacle | BodyKind::Station(_) | BodyKind::Untagged)
        )
    });

    match first {
        Some(hit) => {
            let distance = hit.fraction * view_dst;
            hit.normal * (view_dst - distance) * settings.obstacle_avoid_weight
        }
        None => Vec3::ZERO,
    }
}

/// Cohesion, alignment, separation and arena containment over `neighbours`.
pub fn flocking(agent: &Agent, agents: &[Agent], neighbours: &[AgentId], settings: &Settings) -> FlockForces {
    let mut forces = FlockForces { up: WORLD_UP, ..Default::default() };

    let offset = agent.position - settings.map_centre;
    let distance = offset.length();
    if distance > settings.map_radius {
        forces.containment =
            (-offset).normalize_or_zero() * (distance - settings.map_radius) * settings.map_radius_weight;
    }

    let mut sum_pos = Vec3::ZERO;
    let mut sum_vel = Vec3::ZERO;
    let mut sum_away = Vec3::ZERO;
    let mut sum_up = Vec3::ZERO;
    let mut count = 0usize;
    for n in neighbours.iter().filter_map(|&i| agents.get(i)) {
        sum_pos += n.position;
        sum_vel += n.velocity;
        sum_away += (agent.position - n.position).normalize_or_zero();
        sum_up += geometry::up(n.orientation);
        count += 1;
    }
    if count == 0 {
        return forces;
    }

    let inv = 1.0 / count as f32;
    forces.neighbours = count;
    forces.cohesion = (sum_pos * inv - agent.position) * settings.cohesion_weight;
    forces.alignment = (sum_vel * inv - agent.velocity).normalize_or_zero() * settings.alignment_weight;
    forces.separation = sum_away * inv * settings.separation_weight;
    forces.up = (sum_up * inv).try_normalize().unwrap_or(WORLD_UP);
    forces
}

/// Nudge formation-mates in the firing lane apart vertically.
///
/// Each friendly in the firing cone contributes the lateral direction
/// `to_neighbour x right`, flipped so the agent moves away from the side of
/// its up-plane the neighbour is on.
pub fn line_of_sight(agent: &Agent, agents: &[Agent], lane_mates: &[AgentId], settings: &Settings) -> Vec3 {
    let up = geometry::up(agent.orientation);
    let right = geometry::right(agent.orientation);

    let mut sum = Vec3::ZERO;
    for n in lane_mates.iter().filter_map(|&i| agents.get(i)) {
        let delta = n.position - agent.position;
        let lateral = delta.normalize_or_zero().cross(right);
        let above = delta.dot(up) >= 0.0;
        sum += if above { -lateral } else { lateral };
    }
    sum * settings.line_of_sight_weight
}

// ============================================================================
// COMPOSER
// ============================================================================

/// Compose the full steering output for `agents[id]`.
pub fn compose<Q: SpatialQuery + ?Sized>(id: AgentId, agents: &[Agent], settings: &Settings, query: &Q) -> SteeringOutput {
    let agent = &agents[id];
    let mut out = SteeringOutput::idle(agent);

    let avoidance = obstacle_avoidance(agent, settings, query);
    if avoidance != Vec3::ZERO {
        out.move_force = avoidance;
        out.avoiding = true;
    } else {
        let neighbours = friendly_neighbours(
            id,
            agents,
            query,
            settings,
            settings.boid_detect_radius,
            settings.boid_detect_fov,
        );
        let flock = flocking(agent, agents, &neighbours, settings);
        out.move_force = flock.sum();
        out.target_up = flock.up;
    }

    let lane_mates = friendly_neighbours(id, agents, query, settings, settings.firing_view_dst, settings.firing_fov);
    out.line_of_sight_force = line_of_sight(agent, agents, &lane_mates, settings);
    out.thrust = geometry::forward(agent.orientation) * settings.move_speed;
    out
}

// ============================================================================
// INTEGRATION
// ============================================================================

/// Apply one tick of steering to `agent`: accelerate, clamp speed, turn
/// toward the velocity and advance the position. Dead agents are held still.
pub fn integrate(agent: &mut Agent, out: &SteeringOutput, settings: &Settings, dt: f32) {
    agent.move_force = out.move_force;
    agent.target_up = out.target_up;
    agent.line_of_sight_force = out.line_of_sight_force;

    if !agent.is_alive() {
        agent.velocity = Vec3::ZERO;
        return;
    }

    agent.velocity += out.total_force() * dt;
    let speed = agent.velocity.length();
    if speed > settings.max_move_speed {
        agent.velocity = agent.velocity / speed * settings.max_move_speed;
    }

    agent.orientation = geometry::turn_towards(agent.orientation, agent.velocity, out.target_up, settings.look_speed * dt);
    agent.position += agent.velocity * dt;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::components::SettingsId;
    use crate::engine::geometry::Aabb;
    use crate::engine::spatial::{CollisionWorld, LayerMask};
    use approx::assert_abs_diff_eq;
    use glam::Quat;

    fn settings() -> Settings {
        Settings {
            cohesion_weight: 0.5,
            alignment_weight: 1.0,
            separation_weight: 2.0,
            obstacle_view_dst: 10.0,
            obstacle_avoid_weight: 3.0,
            boid_detect_radius: 10.0,
            boid_detect_fov: 360.0,
            firing_view_dst: 20.0,
            firing_fov: 40.0,
            line_of_sight_weight: 1.0,
            map_radius: 1000.0,
            ..Default::default()
        }
    }

    fn agent(position: Vec3, team: u32) -> Agent {
        Agent::new(position, Quat::IDENTITY, team, SettingsId(0))
    }

    fn world_with(agents: &[Agent]) -> CollisionWorld {
        let mut world = CollisionWorld::new(Vec3::splat(-100.0), Vec3::splat(100.0), 10.0);
        for (i, a) in agents.iter().enumerate() {
            world.insert(BodyKind::Agent(i), LayerMask::DEFAULT, Aabb::from_center(a.position, Vec3::splat(0.5)));
        }
        world
    }

    #[test]
    fn coincident_twins_have_no_cohesion_or_separation() {
        let mut agents = vec![agent(Vec3::ZERO, 1), agent(Vec3::ZERO, 1)];
        agents[0].velocity = Vec3::new(0.0, 0.0, 5.0);
        agents[1].velocity = Vec3::new(0.0, 0.0, 5.0);
        let s = settings();
        let world = world_with(&agents);

        let neighbours = friendly_neighbours(0, &agents, &world, &s, s.boid_detect_radius, s.boid_detect_fov);
        assert_eq!(neighbours, vec![1]);

        let flock = flocking(&agents[0], &agents, &neighbours, &s);
        assert_eq!(flock.separation, Vec3::ZERO);
        assert_eq!(flock.cohesion, Vec3::ZERO);
        assert_eq!(flock.alignment, Vec3::ZERO);
        assert!(flock.sum().is_finite());
    }

    #[test]
    fn flocking_terms_point_the_expected_way() {
        let mut agents = vec![agent(Vec3::ZERO, 1), agent(Vec3::new(4.0, 0.0, 0.0), 1)];
        agents[1].velocity = Vec3::new(0.0, 3.0, 0.0);
        let s = settings();
        let flock = flocking(&agents[0], &agents, &[1], &s);

        assert_abs_diff_eq!(flock.cohesion, Vec3::new(2.0, 0.0, 0.0));
        assert_abs_diff_eq!(flock.alignment, Vec3::new(0.0, 1.0, 0.0));
        assert_abs_diff_eq!(flock.separation, Vec3::new(-2.0, 0.0, 0.0));
        assert_abs_diff_eq!(flock.up, Vec3::Y, epsilon = 1e-6);
        assert_eq!(flock.neighbours, 1);
    }

    #[test]
    fn enemies_dead_and_hidden_agents_are_not_neighbours() {
        let mut agents = vec![
            agent(Vec3::ZERO, 1),
            agent(Vec3::new(0.0, 0.0, 3.0), 2),
            agent(Vec3::new(0.0, 0.0, 4.0), 1),
            agent(Vec3::new(0.0, 0.0, -3.0), 1),
            agent(Vec3::new(0.0, 0.0, 30.0), 1),
            agent(Vec3::new(1.0, 0.0, 5.0), 1),
        ];
        agents[2].health = 0.0;
        let s = Settings { boid_detect_fov: 180.0, ..settings() };
        let world = world_with(&agents);

        let neighbours = friendly_neighbours(0, &agents, &world, &s, s.boid_detect_radius, s.boid_detect_fov);
        assert_eq!(neighbours, vec![5]);
    }

    #[test]
    fn lonely_agent_keeps_world_up_and_only_thrusts() {
        let agents = vec![agent(Vec3::ZERO, 1)];
        let s = settings();
        let world = world_with(&agents);
        let out = compose(0, &agents, &s, &world);

        assert_eq!(out.move_force, Vec3::ZERO);
        assert_eq!(out.target_up, WORLD_UP);
        assert_eq!(out.line_of_sight_force, Vec3::ZERO);
        assert_abs_diff_eq!(out.thrust, Vec3::new(0.0, 0.0, s.move_speed));
    }

    #[test]
    fn arena_containment_pulls_back_toward_centre() {
        let a = agent(Vec3::new(0.0, 0.0, 120.0), 1);
        let s = Settings { map_radius: 100.0, map_radius_weight: 0.5, ..settings() };
        let flock = flocking(&a, &[a], &[], &s);
        assert_abs_diff_eq!(flock.containment, Vec3::new(0.0, 0.0, -10.0));

        let inside = agent(Vec3::new(0.0, 0.0, 50.0), 1);
        assert_eq!(flocking(&inside, &[inside], &[], &s).containment, Vec3::ZERO);
    }

    #[test]
    fn obstacle_avoidance_preempts_flocking() {
        let agents = vec![agent(Vec3::ZERO, 1), agent(Vec3::new(2.0, 0.0, 1.0), 1)];
        let s = settings();
        let mut world = world_with(&agents);
        // Near face at z = 6.
        world.insert(BodyKind::Obstacle, LayerMask::DEFAULT, Aabb::from_center(Vec3::new(0.0, 0.0, 8.0), Vec3::splat(2.0)));

        let out = compose(0, &agents, &s, &world);
        let expected = Vec3::NEG_Z * (10.0 - 6.0) * 3.0;
        assert!(out.avoiding);
        assert_abs_diff_eq!(out.move_force, expected, epsilon = 1e-4);
    }

    #[test]
    fn avoidance_ray_ignores_agents_and_projectiles() {
        let agents = vec![agent(Vec3::ZERO, 1), agent(Vec3::new(0.0, 0.0, 4.0), 2)];
        let s = settings();
        let mut world = world_with(&agents);
        world.insert(BodyKind::Projectile { owner: 1 }, LayerMask::DEFAULT, Aabb::from_center(Vec3::new(0.0, 0.0, 6.0), Vec3::ONE));
        assert_eq!(obstacle_avoidance(&agents[0], &s, &world), Vec3::ZERO);
    }

    #[test]
    fn line_of_sight_pushes_away_from_lane_mate_above() {
        let agents = vec![agent(Vec3::ZERO, 1), agent(Vec3::new(0.0, 1.0, 10.0), 1)];
        let s = settings();
        let force = line_of_sight(&agents[0], &agents, &[1], &s);
        assert!(force.y < 0.0, "expected a downward nudge, got {force}");

        let below = vec![agent(Vec3::ZERO, 1), agent(Vec3::new(0.0, -1.0, 10.0), 1)];
        assert!(line_of_sight(&below[0], &below, &[1], &s).y > 0.0);
    }

    #[test]
    fn integration_clamps_speed_and_stays_finite_at_rest() {
        let s = Settings { max_move_speed: 5.0, ..settings() };
        let mut a = agent(Vec3::ZERO, 1);
        let out = SteeringOutput { move_force: Vec3::new(0.0, 0.0, 1000.0), ..SteeringOutput::idle(&a) };
        integrate(&mut a, &out, &s, 0.1);
        assert_abs_diff_eq!(a.velocity.length(), 5.0, epsilon = 1e-4);
        assert_abs_diff_eq!(a.position, Vec3::new(0.0, 0.0, 0.5), epsilon = 1e-4);

        let mut still = agent(Vec3::ZERO, 1);
        let idle = SteeringOutput::idle(&still);
        integrate(&mut still, &idle, &s, 0.1);
        assert_eq!(still.velocity, Vec3::ZERO);
        assert!(still.orientation.is_finite());
        assert_eq!(still.orientation, Quat::IDENTITY);
    }

    #[test]
    fn dead_agents_do_not_move() {
        let s = settings();
        let mut a = agent(Vec3::ZERO, 1);
        a.health = 0.0;
        a.velocity = Vec3::X;
        let out = SteeringOutput { move_force: Vec3::splat(10.0), ..SteeringOutput::idle(&a) };
        integrate(&mut a, &out, &s, 1.0);
        assert_eq!(a.position, Vec3::ZERO);
        assert_eq!(a.velocity, Vec3::ZERO);
    }
}
