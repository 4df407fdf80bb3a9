// Team stat tracking and station respawning.
// Stats are recomputed from scratch every tick; steering and combat never
// read them, they exist for spawners and reporting.

use glam::Vec3;

use super::components::{Agent, AgentId, MAX_TEAMS, Station, TeamId};

/// Per-team aggregate for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TeamStats {
    pub total: usize,
    pub alive: usize,
    /// Sum of station health for the team.
    pub station_health: f32,
    /// Next spawn time of the team's last enabled spawner seen.
    pub next_spawn_time: f32,
}

#[derive(Debug, Clone, Default)]
pub struct TeamStatTracker {
    teams: [TeamStats; MAX_TEAMS],
}

impl TeamStatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, agents: &[Agent], stations: &[Station]) {
        self.teams = [TeamStats::default(); MAX_TEAMS];

        for agent in agents {
            if let Some(stats) = self.teams.get_mut(agent.team as usize) {
                stats.total += 1;
                if agent.is_alive() {
                    stats.alive += 1;
                }
            }
        }
        for station in stations {
            if let Some(stats) = self.teams.get_mut(station.team as usize) {
                stats.station_health += station.health;
                if let Some(spawner) = station.spawner.as_ref().filter(|s| s.enabled) {
                    stats.next_spawn_time = spawner.next_spawn_time;
                }
            }
        }
    }

    pub fn team(&self, team: TeamId) -> Option<&TeamStats> {
        self.teams.get(team as usize)
    }

    /// Teams that have at least one agent or station.
    pub fn active(&self) -> impl Iterator<Item = (TeamId, &TeamStats)> {
        self.teams
            .iter()
            .enumerate()
            .filter(|(_, s)| s.total > 0 || s.station_health != 0.0)
            .map(|(team, s)| (team as TeamId, s))
    }
}

// ============================================================================
// RESPAWNER
// ============================================================================

/// Dead agent of `team` that died first.
fn longest_dead(agents: &[Agent], team: TeamId) -> Option<AgentId> {
    agents
        .iter()
        .enumerate()
        .filter(|(_, a)| a.team == team && !a.is_alive())
        .min_by(|(_, a), (_, b)| a.died_time.total_cmp(&b.died_time))
        .map(|(i, _)| i)
}

/// Let every due station spawner bring back one dead agent of its team.
///
/// Spawners are enabled only while their station lives. Returns the agents
/// that were revived, in station order.
pub fn respawn(agents: &mut [Agent], stations: &mut [Station], now: f32) -> Vec<AgentId> {
    let mut revived = Vec::new();

    for station in stations.iter_mut() {
        let alive = station.is_alive();
        let Some(spawner) = station.spawner.as_mut() else { continue };
        spawner.enabled = alive;
        if !spawner.enabled || spawner.next_spawn_time > now {
            continue;
        }
        let Some(id) = longest_dead(agents, station.team) else { continue };
        spawner.next_spawn_time = now + spawner.spawn_rate;

        let agent = &mut agents[id];
        agent.health = 1.0;
        agent.position = station.position + station.orientation * spawner.spawn_offset;
        agent.orientation = station.orientation;
        agent.velocity = Vec3::ZERO;
        agent.move_force = Vec3::ZERO;
        agent.line_of_sight_force = Vec3::ZERO;
        revived.push(id);
        log::debug!("agent {id} respawned for team {} at {}", station.team, agent.position);
    }
    revived
}
