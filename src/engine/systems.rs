// Per-tick schedule over the owned agent and station collections.
//
// Order within a tick:
//   1. controller input
//   2. team stats, then respawn
//   3. grid rebuild (on its cadence, never during planning)
//   4. station patrol
//   5. parallel steering + targeting over a read-only snapshot
//   6. barrier, then single-threaded fire commits and integration

use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use super::combat::{self, FireDecision, HitOutcome, TargetRef};
use super::components::*;
use super::config::{ConfigError, ScenarioConfig};
use super::control::{self, ControlInput, ControllerContext};
use super::navigation::TraversabilityGrid;
use super::patrol;
use super::respawn::{self, TeamStatTracker};
use super::settings::{ProjectilePrototype, SettingsTable};
use super::spatial::{LayerMask, SpatialQuery};
use super::steering::{self, SteeringOutput};

/// External collaborator that turns spawn intents into live projectiles.
pub trait ProjectileSpawner {
    type Handle;

    fn spawn(&mut self, intent: &ProjectileSpawnIntent, prototype: &ProjectilePrototype) -> Self::Handle;
}

/// Everything a tick produced for the outside world.
#[derive(Debug, Default)]
pub struct TickReport {
    pub intents: Vec<ProjectileSpawnIntent>,
    pub cues: Vec<EffectCue>,
    pub revived: Vec<AgentId>,
    pub grid_rebuilt: bool,
}

/// Result of the read-only pass for one agent.
#[derive(Debug, Clone, Copy, Default)]
struct AgentPlan {
    steering: Option<SteeringOutput>,
    fire: Option<FireDecision>,
    missing_settings: bool,
}

pub struct Simulation {
    pub agents: Vec<Agent>,
    pub stations: Vec<Station>,
    pub settings: SettingsTable,
    pub grid: TraversabilityGrid,
    pub controller: ControllerContext,
    pub stats: TeamStatTracker,
    grid_layers: LayerMask,
    rebuild_interval: f32,
    next_rebuild_time: f32,
    time: f32,
    rng: StdRng,
    pending_cues: Vec<EffectCue>,
}

impl Simulation {
    pub fn new(settings: SettingsTable, grid: TraversabilityGrid, rebuild_interval: f32, grid_layers: LayerMask, seed: u64) -> Self {
        Self {
            agents: Vec::new(),
            stations: Vec::new(),
            settings,
            grid,
            controller: ControllerContext::new(),
            stats: TeamStatTracker::new(),
            grid_layers,
            rebuild_interval,
            next_rebuild_time: 0.0,
            time: 0.0,
            rng: StdRng::seed_from_u64(seed),
            pending_cues: Vec::new(),
        }
    }

    /// Build the settings table, grid and stations described by `config`.
    /// Agents are added separately.
    pub fn from_config(config: &ScenarioConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut settings = SettingsTable::new();
        for team in &config.teams {
            settings.insert(team.team, team.settings)?;
        }

        let mut sim = Self::new(
            settings,
            TraversabilityGrid::from_config(&config.grid),
            config.grid.rebuild_interval,
            config.grid.layers,
            config.seed,
        );
        for sc in &config.stations {
            let mut walker = Walker::new(sc.next_node_threshold, sc.move_speed, sc.look_speed);
            walker.target_pos = sc.position;
            let mut station = Station::new(sc.position, sc.half_extents, sc.team, sc.health, walker);
            station.attract_radius = sc.attract_radius;
            station.patrol_radius = sc.patrol_radius;
            station.spawner = Some(Spawner::new(sc.spawn_rate, sc.spawn_offset));
            sim.stations.push(station);
        }
        log::info!(
            "scenario loaded: {} teams, {} stations, grid {}",
            sim.settings.len(),
            sim.stations.len(),
            sim.grid.dims()
        );
        Ok(sim)
    }

    /// Add a living agent to `team`, bound to that team's settings.
    pub fn add_agent(&mut self, team: TeamId, position: Vec3, orientation: Quat) -> Result<AgentId, ConfigError> {
        let settings = self
            .settings
            .for_team(team)
            .ok_or_else(|| ConfigError::Invalid(format!("no settings registered for team {team}")))?;
        self.agents.push(Agent::new(position, orientation, team, settings));
        Ok(self.agents.len() - 1)
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Strike an agent or station with a projectile fired by `owner`.
    /// Agent death cues are reported with the next tick.
    pub fn apply_projectile_hit(&mut self, target: TargetRef, owner: AgentId, prototype: &ProjectilePrototype) -> HitOutcome {
        let outcome = combat::apply_projectile_hit(&mut self.agents, &mut self.stations, target, owner, prototype, self.time);
        if let (HitOutcome::Killed, TargetRef::Agent(agent)) = (outcome, target) {
            self.pending_cues.push(EffectCue::Agent { agent, effect: agent_fx::DEATH });
            log::debug!("agent {agent} killed by agent {owner}");
        }
        outcome
    }

    /// Hand this tick's spawn intents to `spawner`, resolving each intent's
    /// projectile prototype. Intents with an unknown settings id are dropped.
    pub fn dispatch<S: ProjectileSpawner>(&self, intents: &[ProjectileSpawnIntent], spawner: &mut S) -> Vec<S::Handle> {
        intents
            .iter()
            .filter_map(|intent| {
                let settings = self.settings.get(intent.settings)?;
                Some(spawner.spawn(intent, &settings.projectile))
            })
            .collect()
    }

    /// Advance the world by `dt` seconds.
    pub fn tick<Q: SpatialQuery + ?Sized>(&mut self, dt: f32, query: &Q, input: &ControlInput) -> TickReport {
        let now = self.time;
        let mut report = TickReport {
            cues: std::mem::take(&mut self.pending_cues),
            ..Default::default()
        };

        self.controller.apply_input(input, &self.agents);

        self.stats.update(&self.agents, &self.stations);
        report.revived = respawn::respawn(&mut self.agents, &mut self.stations, now);
        report
            .cues
            .extend(report.revived.iter().map(|&agent| EffectCue::Agent { agent, effect: agent_fx::TRAIL }));

        if now >= self.next_rebuild_time {
            self.grid.rebuild(query, self.grid_layers);
            self.next_rebuild_time = now + self.rebuild_interval;
            report.grid_rebuilt = true;
        }

        for (id, station) in self.stations.iter_mut().enumerate() {
            patrol::step_station(id, station, &self.grid, report.grid_rebuilt, &mut self.rng, dt, &mut report.cues);
        }

        let plans = self.plan_agents(query, input, now);

        let skipped = plans.iter().filter(|p| p.missing_settings).count();
        if skipped > 0 {
            log::warn!("{skipped} agents skipped: settings reference unset or unknown");
        }

        for (id, plan) in plans.iter().enumerate() {
            let agent = &mut self.agents[id];
            let Some(settings) = agent.settings.and_then(|s| self.settings.get(s)) else {
                continue;
            };
            if let Some(decision) = &plan.fire {
                report.intents.push(combat::commit_fire(agent, decision, settings, now, &mut report.cues));
            }
            if let Some(out) = &plan.steering {
                steering::integrate(agent, out, settings, dt);
            }
        }

        self.time += dt;
        report
    }

    /// Read-only steering and targeting for every agent. The collect is the
    /// barrier before integration.
    fn plan_agents<Q: SpatialQuery + ?Sized>(&self, query: &Q, input: &ControlInput, now: f32) -> Vec<AgentPlan> {
        let agents = &self.agents;
        let stations = &self.stations;
        let table = &self.settings;
        let controlled = self.controller.controlled();

        (0..agents.len())
            .into_par_iter()
            .map(|id| {
                let agent = &agents[id];
                let Some((settings_id, settings)) = agent.settings.and_then(|s| table.get(s).map(|st| (s, st))) else {
                    return AgentPlan { missing_settings: true, ..Default::default() };
                };
                if !agent.is_alive() {
                    return AgentPlan { steering: Some(SteeringOutput::idle(agent)), ..Default::default() };
                }

                if controlled == Some(id) {
                    let fire = input
                        .aim
                        .filter(|_| input.fire)
                        .and_then(|ray| control::manual_fire(id, agents, settings, settings_id, query, ray, now));
                    return AgentPlan {
                        steering: Some(control::manual_steering(agent, settings, input)),
                        fire,
                        missing_settings: false,
                    };
                }

                AgentPlan {
                    steering: Some(steering::compose(id, agents, settings, query)),
                    fire: combat::decide_fire(id, agents, stations, settings, settings_id, query, now),
                    missing_settings: false,
                }
            })
            .collect()
    }
}
