// Boid skirmish: flocking and combat steering for team agents, plus grid
// A* patrols for team stations.

pub mod arena;
pub mod engine;
pub mod logging;
