// Combat targeting, lead aim and projectile hits.
//
// Target acquisition is read-only and runs inside the parallel force pass;
// committing a shot (fire timer, muzzle cue) happens afterwards on the
// single-threaded side.

use glam::Vec3;

use super::components::{agent_fx, Agent, AgentId, EffectCue, ProjectileSpawnIntent, SettingsId, Station, StationId};
use super::geometry;
use super::settings::{ProjectilePrototype, Settings};
use super::spatial::{BodyHandle, BodyKind, SpatialQuery};

/// Something that can be shot at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRef {
    Agent(AgentId),
    Station(StationId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub target: TargetRef,
    pub position: Vec3,
    pub velocity: Vec3,
}

/// A shot an agent wants to take this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireDecision {
    pub target: Option<TargetRef>,
    pub intent: ProjectileSpawnIntent,
}

// ============================================================================
// AIMING
// ============================================================================

/// Predict where to aim so a projectile fired from `origin` meets a target
/// moving at constant velocity.
///
/// Returns `target` exactly when the projectile speed is not positive or the
/// target is stationary.
pub fn lead_position(target: Vec3, target_velocity: Vec3, origin: Vec3, projectile_speed: f32, correction: f32) -> Vec3 {
    if projectile_speed <= 0.0 || target_velocity == Vec3::ZERO {
        return target;
    }
    let travel_time = origin.distance(target) / projectile_speed;
    target + target_velocity * travel_time * correction
}

/// World-space muzzle position for `agent`.
pub fn muzzle_position(agent: &Agent, settings: &Settings) -> Vec3 {
    agent.position + agent.orientation * settings.shoot_offset
}

/// Projectile intent aimed from the muzzle toward `aim_point`.
///
/// When no look rotation can be built the projectile inherits the shooter's
/// orientation.
pub fn aim_intent(owner: AgentId, agent: &Agent, settings: &Settings, settings_id: SettingsId, aim_point: Vec3) -> ProjectileSpawnIntent {
    let position = muzzle_position(agent, settings);
    let orientation = geometry::look_rotation(aim_point - position, geometry::up(agent.orientation))
        .unwrap_or(agent.orientation);
    ProjectileSpawnIntent {
        owner,
        position,
        orientation,
        lead_position: aim_point,
        settings: settings_id,
    }
}

// ============================================================================
// TARGET ACQUISITION
// ============================================================================

/// Nearest living enemy in the firing cone of `agents[id]`.
///
/// Stations are checked against twice the firing FOV.
pub fn acquire_target<Q: SpatialQuery + ?Sized>(
    id: AgentId,
    agents: &[Agent],
    stations: &[Station],
    settings: &Settings,
    query: &Q,
) -> Option<Target> {
    let me = &agents[id];
    let forward = geometry::forward(me.orientation);
    let view_dst = settings.firing_view_dst;

    let mut bodies: Vec<BodyHandle> = Vec::new();
    query.overlap_box(me.position - view_dst, me.position + view_dst, settings.query_layers, &mut bodies);

    let mut best: Option<(f32, Target)> = None;
    for body in bodies {
        let candidate = match query.body_kind(body) {
            Some(BodyKind::Agent(other)) if other != id => agents
                .get(other)
                .filter(|n| n.is_alive() && n.team != me.team)
                .filter(|n| geometry::in_view_cone(me.position, forward, n.position, view_dst, settings.firing_fov))
                .map(|n| Target { target: TargetRef::Agent(other), position: n.position, velocity: n.velocity }),
            Some(BodyKind::Station(s)) => stations
                .get(s)
                .filter(|st| st.is_alive() && st.team != me.team)
                .filter(|st| geometry::in_view_cone(me.position, forward, st.position, view_dst, settings.firing_fov * 2.0))
                .map(|st| Target { target: TargetRef::Station(s), position: st.position, velocity: st.velocity }),
            _ => None,
        };
        let Some(candidate) = candidate else { continue };
        let dist_sq = me.position.distance_squared(candidate.position);
        if best.as_ref().is_none_or(|(d, _)| dist_sq < *d) {
            best = Some((dist_sq, candidate));
        }
    }
    best.map(|(_, target)| target)
}

/// Decide whether `agents[id]` fires this tick. Read-only.
pub fn decide_fire<Q: SpatialQuery + ?Sized>(
    id: AgentId,
    agents: &[Agent],
    stations: &[Station],
    settings: &Settings,
    settings_id: SettingsId,
    query: &Q,
    now: f32,
) -> Option<FireDecision> {
    let agent = &agents[id];
    if !agent.is_alive() || !agent.can_fire(now) {
        return None;
    }
    let target = acquire_target(id, agents, stations, settings, query)?;
    let muzzle = muzzle_position(agent, settings);
    let aim = lead_position(
        target.position,
        target.velocity,
        muzzle,
        settings.projectile.speed,
        settings.lead_correction,
    );
    Some(FireDecision {
        target: Some(target.target),
        intent: aim_intent(id, agent, settings, settings_id, aim),
    })
}

/// Arm the fire timer and emit the muzzle cue for a shot that was taken.
pub fn commit_fire(agent: &mut Agent, decision: &FireDecision, settings: &Settings, now: f32, cues: &mut Vec<EffectCue>) -> ProjectileSpawnIntent {
    agent.next_allowed_fire_time = now + settings.shoot_rate;
    cues.push(EffectCue::Agent { agent: decision.intent.owner, effect: agent_fx::MUZZLE });
    log::debug!(
        "agent {} fired at {:?} (lead {})",
        decision.intent.owner,
        decision.target,
        decision.intent.lead_position
    );
    decision.intent
}

// ============================================================================
// PROJECTILE HITS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// Owner hit, dead target, or unknown id.
    Ignored,
    Damaged,
    /// This hit took the target from alive to dead.
    Killed,
}

/// Apply one projectile strike from `owner` to `target`.
///
/// Agents record a hit-flash deadline and, on the lethal hit, their death
/// time. Stations only lose health; their death cue is raised by patrol.
pub fn apply_projectile_hit(
    agents: &mut [Agent],
    stations: &mut [Station],
    target: TargetRef,
    owner: AgentId,
    prototype: &ProjectilePrototype,
    now: f32,
) -> HitOutcome {
    match target {
        TargetRef::Agent(id) => {
            if id == owner {
                return HitOutcome::Ignored;
            }
            let Some(agent) = agents.get_mut(id).filter(|a| a.is_alive()) else {
                return HitOutcome::Ignored;
            };
            agent.health -= prototype.damage;
            agent.hit_time = now + prototype.hit_time;
            if agent.is_alive() {
                return HitOutcome::Damaged;
            }
            agent.died_time = now;
            HitOutcome::Killed
        }
        TargetRef::Station(id) => {
            let Some(station) = stations.get_mut(id).filter(|s| s.is_alive()) else {
                return HitOutcome::Ignored;
            };
            station.health -= prototype.damage;
            if station.is_alive() { HitOutcome::Damaged } else { HitOutcome::Killed }
        }
    }
}
