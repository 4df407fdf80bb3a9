// Headless skirmish demo.
// Loads a scenario, seeds each team's agents around its stations and runs a
// fixed number of ticks, logging team stats once per simulated second.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use boid_skirmish::arena::Arena;
use boid_skirmish::engine::{ConfigError, ControlInput, ScenarioConfig, Simulation};
use boid_skirmish::logging;

/// Headless boid skirmish simulation
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (TOML). Uses the built-in scenario when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of ticks to simulate
    #[arg(short, long, default_value_t = 600)]
    ticks: u32,

    /// Override the scenario's random seed
    #[arg(short, long)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

// ============================================================================
// SETUP
// ============================================================================

fn load_scenario(args: &Args) -> Result<ScenarioConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    Ok(config)
}

/// Scatter `agents_per_team` agents of every team around that team's first
/// station, or around the arena centre for teams without one.
fn spawn_agents(sim: &mut Simulation, config: &ScenarioConfig) -> Result<(), ConfigError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    for team in &config.teams {
        let anchor = config
            .stations
            .iter()
            .find(|s| s.team == team.team)
            .map(|s| s.position + s.spawn_offset)
            .unwrap_or(team.settings.map_centre);

        for _ in 0..config.agents_per_team {
            let offset = Vec3::new(
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-4.0..4.0),
                rng.gen_range(-10.0..10.0),
            );
            let yaw = Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU));
            sim.add_agent(team.team, anchor + offset, yaw)?;
        }
    }
    Ok(())
}

// ============================================================================
// MAIN LOOP
// ============================================================================

fn run(args: &Args) -> Result<(), ConfigError> {
    let config = load_scenario(args)?;
    let mut sim = Simulation::from_config(&config)?;
    spawn_agents(&mut sim, &config)?;
    let mut arena = Arena::new(&config.grid, &config.obstacles);

    let dt = 1.0 / config.tick_rate;
    let ticks_per_report = config.tick_rate.round().max(1.0) as u32;
    let input = ControlInput::default();
    let mut shots = 0usize;

    log::info!(
        "running {} ticks at {} Hz with {} agents",
        args.ticks,
        config.tick_rate,
        sim.agents.len()
    );

    for tick in 1..=args.ticks {
        arena.sync_bodies(&sim);
        let report = sim.tick(dt, &arena.world, &input);
        shots += sim.dispatch(&report.intents, &mut arena).len();
        arena.advance_projectiles(&mut sim, dt);

        if tick % ticks_per_report == 0 {
            for (team, stats) in sim.stats.active() {
                log::info!(
                    "t={:>6.2}s team {team}: {}/{} alive, station health {:.1}",
                    sim.time(),
                    stats.alive,
                    stats.total,
                    stats.station_health
                );
            }
        }
    }

    log::info!(
        "done after {:.2}s: {shots} shots, {} hits, {} projectiles in flight",
        sim.time(),
        arena.hits(),
        arena.projectiles.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
