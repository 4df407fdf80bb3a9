// Headless arena: the collision world and projectile flight that surround
// the simulation core.
//
// The core never owns projectiles. The arena receives spawn intents, flies
// projectiles in straight lines until they hit something or their lifetime
// runs out, and reports hits back to the simulation.

use glam::Vec3;

use crate::engine::combat::TargetRef;
use crate::engine::config::{GridConfig, ObstacleConfig};
use crate::engine::geometry::{self, Aabb};
use crate::engine::spatial::{BodyKind, CollisionWorld, LayerMask, RayHit, SpatialQuery};
use crate::engine::{AgentId, ProjectilePrototype, ProjectileSpawnIntent, ProjectileSpawner, Simulation};

/// Collision box of every agent.
pub const AGENT_HALF_EXTENTS: Vec3 = Vec3::splat(0.5);

#[derive(Debug, Clone, Copy)]
pub struct Projectile {
    pub owner: AgentId,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Seconds left before despawn.
    pub remaining: f32,
    pub prototype: ProjectilePrototype,
}

pub struct Arena {
    pub world: CollisionWorld,
    pub obstacles: Vec<Aabb>,
    pub projectiles: Vec<Projectile>,
    layer: LayerMask,
    hits: u64,
}

impl Arena {
    pub fn new(grid: &GridConfig, obstacles: &[ObstacleConfig]) -> Self {
        let half = grid.extent * 0.5;
        Self {
            world: CollisionWorld::new(grid.center - half, grid.center + half, grid.cell_size.max_element()),
            obstacles: obstacles.iter().map(|o| Aabb::from_center(o.center, o.half_extents)).collect(),
            projectiles: Vec::new(),
            layer: grid.layers,
            hits: 0,
        }
    }

    /// Total projectile strikes on agents and stations so far.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Rebuild the collision world from the current simulation state.
    /// Dead agents and wrecked stations have no body.
    pub fn sync_bodies(&mut self, sim: &Simulation) {
        self.world.clear();
        for obstacle in &self.obstacles {
            self.world.insert(BodyKind::Obstacle, self.layer, *obstacle);
        }
        for (id, station) in sim.stations.iter().enumerate().filter(|(_, s)| s.is_alive()) {
            self.world
                .insert(BodyKind::Station(id), self.layer, Aabb::from_center(station.position, station.half_extents));
        }
        for (id, agent) in sim.agents.iter().enumerate().filter(|(_, a)| a.is_alive()) {
            self.world
                .insert(BodyKind::Agent(id), self.layer, Aabb::from_center(agent.position, AGENT_HALF_EXTENTS));
        }
        for p in &self.projectiles {
            self.world.insert(
                BodyKind::Projectile { owner: p.owner },
                self.layer,
                Aabb::from_center(p.position, p.prototype.half_extents),
            );
        }
    }

    /// Fly every projectile by `dt`, apply the first strike along its path and
    /// drop projectiles that hit something or expired.
    pub fn advance_projectiles(&mut self, sim: &mut Simulation, dt: f32) {
        let mut hits: Vec<RayHit> = Vec::new();
        let world = &self.world;
        let mut strikes = 0;

        self.projectiles.retain_mut(|p| {
            p.remaining -= dt;
            if p.remaining <= 0.0 {
                return false;
            }

            let start = p.position;
            let end = start + p.velocity * dt;
            p.position = end;

            hits.clear();
            world.raycast(start, end, LayerMask::ALL, &mut hits);
            let first = hits.iter().find_map(|hit| match world.body_kind(hit.body) {
                Some(BodyKind::Agent(id)) if id == p.owner => None,
                Some(BodyKind::Projectile { .. }) | None => None,
                Some(kind) => Some(kind),
            });

            let target = match first {
                None => return true,
                Some(BodyKind::Agent(id)) => TargetRef::Agent(id),
                Some(BodyKind::Station(id)) => TargetRef::Station(id),
                Some(_) => return false,
            };
            sim.apply_projectile_hit(target, p.owner, &p.prototype);
            strikes += 1;
            false
        });
        self.hits += strikes;
    }
}

impl ProjectileSpawner for Arena {
    type Handle = usize;

    fn spawn(&mut self, intent: &ProjectileSpawnIntent, prototype: &ProjectilePrototype) -> usize {
        self.projectiles.push(Projectile {
            owner: intent.owner,
            position: intent.position,
            velocity: geometry::forward(intent.orientation) * prototype.speed,
            remaining: prototype.life_time,
            prototype: *prototype,
        });
        self.projectiles.len() - 1
    }
}
