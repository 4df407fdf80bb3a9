// Per-entity records owned by the simulation.
// Agents and stations live in plain Vecs; their index is their id.

use glam::{IVec3, Quat, Vec3};

use super::geometry::WORLD_UP;

pub type AgentId = usize;
pub type StationId = usize;
pub type TeamId = u32;

/// Index into the team settings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SettingsId(pub usize);

/// Team ids are `0..MAX_TEAMS`. Team 0 is conventionally unused by scenarios.
pub const MAX_TEAMS: usize = 4;

// ============================================================================
// PARTICLE EFFECT INDICES
// ============================================================================

/// Stable particle-effect slots on an agent's effect rig.
pub mod agent_fx {
    pub const TRAIL: usize = 0;
    pub const DEATH: usize = 1;
    pub const MUZZLE: usize = 2;
}

/// Stable particle-effect slots on a station's effect rig.
pub mod station_fx {
    pub const DEATH: usize = 0;
}

// ============================================================================
// AGENT
// ============================================================================

/// Mobile combat unit.
///
/// Health at or below zero means dead: the agent stays in the collection,
/// inert, until a respawner resets it.
#[derive(Debug, Clone, Copy)]
pub struct Agent {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub health: f32,
    pub team: TeamId,
    /// `None` means the agent is skipped by steering and combat.
    pub settings: Option<SettingsId>,
    pub next_allowed_fire_time: f32,
    pub died_time: f32,
    pub hit_time: f32,

    // Per-tick intents written by the force pass, consumed by integration.
    pub move_force: Vec3,
    pub target_up: Vec3,
    pub line_of_sight_force: Vec3,
}

impl Agent {
    pub fn new(position: Vec3, orientation: Quat, team: TeamId, settings: SettingsId) -> Self {
        Self {
            position,
            orientation,
            velocity: Vec3::ZERO,
            health: 1.0,
            team,
            settings: Some(settings),
            next_allowed_fire_time: 0.0,
            died_time: 0.0,
            hit_time: 0.0,
            move_force: Vec3::ZERO,
            target_up: WORLD_UP,
            line_of_sight_force: Vec3::ZERO,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn can_fire(&self, now: f32) -> bool {
        self.next_allowed_fire_time <= now
    }
}

// ============================================================================
// STATION
// ============================================================================

/// Where a patrol walker is in its plan/follow cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkerPhase {
    /// No usable path; waits for a trigger.
    #[default]
    Idle,
    /// A plan was requested this tick.
    Planning,
    /// Walking the current path.
    Following,
    /// Station destroyed; never replans again.
    Halted,
}

/// Patrol route state for a station.
///
/// `path[0]` is the destination; the walker consumes the path from the back
/// (nearest the start) toward index 0.
#[derive(Debug, Clone, Default)]
pub struct Walker {
    pub path: Vec<IVec3>,
    pub current: Option<usize>,
    pub phase: WalkerPhase,
    pub next_node_threshold: f32,
    pub target_pos: Vec3,
    pub move_speed: f32,
    pub look_speed: f32,
}

impl Walker {
    pub fn new(next_node_threshold: f32, move_speed: f32, look_speed: f32) -> Self {
        Self {
            next_node_threshold,
            move_speed,
            look_speed,
            ..Default::default()
        }
    }

    /// Current waypoint cell, if the index is still inside the path.
    pub fn current_node(&self) -> Option<IVec3> {
        self.current.and_then(|i| self.path.get(i).copied())
    }
}

/// Respawn timer attached to a station.
#[derive(Debug, Clone, Copy)]
pub struct Spawner {
    pub spawn_rate: f32,
    pub next_spawn_time: f32,
    /// Spawn point in the station's local frame.
    pub spawn_offset: Vec3,
    pub enabled: bool,
}

impl Spawner {
    pub fn new(spawn_rate: f32, spawn_offset: Vec3) -> Self {
        Self {
            spawn_rate,
            next_spawn_time: 0.0,
            spawn_offset,
            enabled: true,
        }
    }
}

/// Stationary team base that patrols a territory and respawns its team.
#[derive(Debug, Clone)]
pub struct Station {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    pub half_extents: Vec3,
    pub health: f32,
    pub team: TeamId,
    /// Radius allied agents use as a rally cue.
    pub attract_radius: f32,
    pub patrol_radius: f32,
    /// Patrol targets are drawn around this point.
    pub home: Vec3,
    pub target_up: Vec3,
    /// Set once the death cue has been emitted.
    pub wrecked: bool,
    pub walker: Walker,
    pub spawner: Option<Spawner>,
}

impl Station {
    pub fn new(position: Vec3, half_extents: Vec3, team: TeamId, health: f32, walker: Walker) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            half_extents,
            health,
            team,
            attract_radius: 0.0,
            patrol_radius: 0.0,
            home: position,
            target_up: WORLD_UP,
            wrecked: false,
            walker,
            spawner: None,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }
}

// ============================================================================
// TICK OUTPUTS
// ============================================================================

/// Request for the spawn collaborator to create a projectile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileSpawnIntent {
    pub owner: AgentId,
    pub position: Vec3,
    pub orientation: Quat,
    /// Where the shot is aimed, already lead-corrected.
    pub lead_position: Vec3,
    pub settings: SettingsId,
}

/// Visual/audio cue for the presentation layer, keyed by a stable effect slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectCue {
    Agent { agent: AgentId, effect: usize },
    Station { station: StationId, effect: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_agent_is_alive_and_ready_to_fire() {
        let agent = Agent::new(Vec3::ZERO, Quat::IDENTITY, 1, SettingsId(0));
        assert!(agent.is_alive());
        assert!(agent.can_fire(0.0));
        assert_eq!(agent.target_up, WORLD_UP);
    }

    #[test]
    fn walker_current_node_guards_index() {
        let mut walker = Walker::new(0.5, 1.0, 1.0);
        assert_eq!(walker.current_node(), None);
        walker.path = vec![IVec3::new(3, 0, 0), IVec3::ZERO];
        walker.current = Some(1);
        assert_eq!(walker.current_node(), Some(IVec3::ZERO));
        walker.current = Some(2);
        assert_eq!(walker.current_node(), None);
    }
}
