// Player controller context.
// Owned by the simulation loop and handed to the tick explicitly; there is no
// global controller singleton. Input arrives as a per-tick snapshot.

use glam::{Quat, Vec3};

use super::combat::{self, FireDecision, TargetRef};
use super::components::{Agent, AgentId, SettingsId, TeamId};
use super::geometry;
use super::settings::Settings;
use super::spatial::{BodyKind, RayHit, SpatialQuery};
use super::steering::SteeringOutput;

/// Longest distance a manual shot's camera ray is traced.
pub const MANUAL_AIM_DISTANCE: f32 = 1000.0;

/// Teams the selection keys can pick.
const SELECTABLE_TEAMS: std::ops::RangeInclusive<TeamId> = 1..=3;

/// Camera ray used to aim manual shots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimRay {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// Input snapshot for one tick. Button fields are edge-triggered presses.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInput {
    pub toggle_manual: bool,
    pub select_team: Option<TeamId>,
    pub next_agent: bool,
    pub prev_agent: bool,

    // Axes in [-1, 1]: x = strafe right, y = hover up, z = forward.
    pub move_axes: Vec3,
    pub roll: f32,

    pub fire: bool,
    pub aim: Option<AimRay>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerContext {
    pub manual: bool,
    pub selected_team: TeamId,
    pub selected_agent: Option<AgentId>,
}

impl Default for ControllerContext {
    fn default() -> Self {
        Self {
            manual: false,
            selected_team: 1,
            selected_agent: None,
        }
    }
}

impl ControllerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agent currently flown by the player, if manual control is on.
    pub fn controlled(&self) -> Option<AgentId> {
        if self.manual { self.selected_agent } else { None }
    }

    /// Apply mode toggles and selection changes from `input`.
    pub fn apply_input(&mut self, input: &ControlInput, agents: &[Agent]) {
        if input.toggle_manual {
            self.manual = !self.manual;
            log::debug!("manual control {}", if self.manual { "on" } else { "off" });
        }

        let old_team = self.selected_team;
        if let Some(team) = input.select_team.filter(|t| SELECTABLE_TEAMS.contains(t)) {
            self.selected_team = team;
        }

        if !input.next_agent && !input.prev_agent && old_team == self.selected_team {
            return;
        }
        let forward = !input.prev_agent || input.next_agent;
        if let Some(next) = cycle_selection(agents, self.selected_agent, self.selected_team, forward) {
            self.selected_agent = Some(next);
        }
    }
}

/// Next agent of `team` after `current`, wrapping around. `current` itself is
/// checked last so a lone team member stays selected.
pub fn cycle_selection(agents: &[Agent], current: Option<AgentId>, team: TeamId, forward: bool) -> Option<AgentId> {
    let n = agents.len();
    if n == 0 {
        return None;
    }
    let start = match current {
        Some(i) if i < n => i,
        _ if forward => n - 1,
        _ => 0,
    };
    (1..=n)
        .map(|step| if forward { (start + step) % n } else { (start + n - step) % n })
        .find(|&i| agents[i].team == team)
}

// ============================================================================
// MANUAL FLIGHT
// ============================================================================

fn axis_force(axis: f32, min_speed: f32, max_speed: f32, dir: Vec3) -> Vec3 {
    if axis == 0.0 {
        return Vec3::ZERO;
    }
    let speed = min_speed + (max_speed - min_speed) * axis.abs().min(1.0);
    dir * speed * axis
}

/// Steering for the player-flown agent: axis-driven movement and roll, no
/// flocking, no thrust.
pub fn manual_steering(agent: &Agent, settings: &Settings, input: &ControlInput) -> SteeringOutput {
    let forward = geometry::forward(agent.orientation);
    let up = geometry::up(agent.orientation);
    let right = geometry::right(agent.orientation);
    let (min, max) = (settings.move_speed, settings.max_move_speed);

    let move_force = axis_force(input.move_axes.x, min, max, right)
        + axis_force(input.move_axes.y, min, max, up)
        + axis_force(input.move_axes.z, min, max, forward);

    let target_up = if input.roll != 0.0 {
        let speed = settings.look_speed * 0.5 * input.roll.abs();
        Quat::from_axis_angle(-forward, speed * input.roll) * up
    } else {
        agent.target_up
    };

    SteeringOutput {
        move_force,
        thrust: Vec3::ZERO,
        target_up,
        line_of_sight_force: Vec3::ZERO,
        avoiding: false,
    }
}

/// Shot along the camera ray for the player-flown agent.
///
/// Aims at the hit nearest the muzzle that is not the shooter, or at the far
/// end of the ray. Subject to the same fire timer as automatic firing.
pub fn manual_fire<Q: SpatialQuery + ?Sized>(
    id: AgentId,
    agents: &[Agent],
    settings: &Settings,
    settings_id: SettingsId,
    query: &Q,
    ray: AimRay,
    now: f32,
) -> Option<FireDecision> {
    let agent = agents.get(id)?;
    if !agent.is_alive() || !agent.can_fire(now) {
        return None;
    }
    let end = ray.origin + ray.direction.try_normalize()? * MANUAL_AIM_DISTANCE;
    let muzzle = combat::muzzle_position(agent, settings);

    let mut hits: Vec<RayHit> = Vec::new();
    query.raycast(ray.origin, end, settings.query_layers, &mut hits);

    let nearest = hits
        .iter()
        .filter_map(|hit| query.body_kind(hit.body).map(|kind| (hit, kind)))
        .filter(|(_, kind)| *kind != BodyKind::Agent(id))
        .min_by(|(a, _), (b, _)| {
            a.position
                .distance_squared(muzzle)
                .total_cmp(&b.position.distance_squared(muzzle))
        });

    let (aim, target) = match nearest {
        Some((hit, BodyKind::Agent(other))) => (hit.position, Some(TargetRef::Agent(other))),
        Some((hit, BodyKind::Station(s))) => (hit.position, Some(TargetRef::Station(s))),
        Some((hit, _)) => (hit.position, None),
        None => (end, None),
    };

    Some(FireDecision {
        target,
        intent: combat::aim_intent(id, agent, settings, settings_id, aim),
    })
}
