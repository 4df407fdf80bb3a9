// Per-team tuning shared by reference across every agent of a team.
// Agents hold a `SettingsId`; only the team controller (this table) mutates
// records, and only to clamp or validate designer input.

use glam::Vec3;
use serde::Deserialize;

use super::components::{MAX_TEAMS, SettingsId, TeamId};
use super::config::{self, ConfigError};
use super::spatial::LayerMask;

/// Projectile body spawned by a team's agents.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectilePrototype {
    /// Units per second along the projectile's forward axis.
    pub speed: f32,
    pub damage: f32,
    /// Seconds before the projectile despawns on its own.
    pub life_time: f32,
    /// Hit-flash duration applied to whatever it strikes.
    pub hit_time: f32,
    pub half_extents: Vec3,
}

impl Default for ProjectilePrototype {
    fn default() -> Self {
        Self {
            speed: 60.0,
            damage: 0.25,
            life_time: 3.0,
            hit_time: 0.2,
            half_extents: Vec3::new(0.2, 0.2, 0.6),
        }
    }
}

/// Steering, firing and arena tuning for one team.
///
/// Field-of-view values are full cone angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub move_speed: f32,
    pub max_move_speed: f32,
    pub look_speed: f32,

    pub boid_detect_radius: f32,
    pub boid_detect_fov: f32,

    pub cohesion_weight: f32,
    pub alignment_weight: f32,
    pub separation_weight: f32,

    pub obstacle_avoid_weight: f32,
    pub obstacle_view_dst: f32,

    pub firing_view_dst: f32,
    pub firing_fov: f32,
    pub line_of_sight_weight: f32,

    pub map_centre: Vec3,
    pub map_radius: f32,
    pub map_radius_weight: f32,

    pub projectile: ProjectilePrototype,
    /// Seconds between shots.
    pub shoot_rate: f32,
    /// Muzzle position in the agent's local frame.
    pub shoot_offset: Vec3,
    /// Scales the target-velocity term of lead aiming; 1.0 is a pure intercept.
    pub lead_correction: f32,

    /// Layers scanned by neighbour, firing and avoidance queries.
    pub query_layers: LayerMask,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            move_speed: 10.0,
            max_move_speed: 20.0,
            look_speed: 2.0,
            boid_detect_radius: 10.0,
            boid_detect_fov: 270.0,
            cohesion_weight: 0.5,
            alignment_weight: 1.0,
            separation_weight: 1.5,
            obstacle_avoid_weight: 4.0,
            obstacle_view_dst: 15.0,
            firing_view_dst: 40.0,
            firing_fov: 30.0,
            line_of_sight_weight: 2.0,
            map_centre: Vec3::ZERO,
            map_radius: 150.0,
            map_radius_weight: 0.5,
            projectile: ProjectilePrototype::default(),
            shoot_rate: 1.0,
            shoot_offset: Vec3::new(0.0, 0.0, 1.5),
            lead_correction: 1.0,
            query_layers: LayerMask::ALL,
        }
    }
}

impl Settings {
    /// Smallest separation weight that keeps formation-mates from overlapping
    /// the projectile body they fire.
    pub fn min_separation_weight(&self) -> f32 {
        self.projectile.half_extents.max_element()
    }

    /// Raise `separation_weight` to the prototype's safe minimum.
    pub fn clamp_to_prototype(&mut self) {
        let min = self.min_separation_weight();
        if self.separation_weight.is_nan() || self.separation_weight < min {
            log::debug!(
                "separation weight {} raised to prototype minimum {}",
                self.separation_weight,
                min
            );
            self.separation_weight = min;
        }
    }

    /// Reject NaN, infinite or negative tunables before they reach the
    /// steering maths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        config::check_non_negative(&[
            ("move_speed", self.move_speed),
            ("max_move_speed", self.max_move_speed),
            ("look_speed", self.look_speed),
            ("boid_detect_radius", self.boid_detect_radius),
            ("boid_detect_fov", self.boid_detect_fov),
            ("cohesion_weight", self.cohesion_weight),
            ("alignment_weight", self.alignment_weight),
            ("separation_weight", self.separation_weight),
            ("obstacle_avoid_weight", self.obstacle_avoid_weight),
            ("obstacle_view_dst", self.obstacle_view_dst),
            ("firing_view_dst", self.firing_view_dst),
            ("firing_fov", self.firing_fov),
            ("line_of_sight_weight", self.line_of_sight_weight),
            ("map_radius", self.map_radius),
            ("map_radius_weight", self.map_radius_weight),
            ("shoot_rate", self.shoot_rate),
            ("lead_correction", self.lead_correction),
        ])?;
        self.projectile.validate()?;
        if self.max_move_speed < self.move_speed {
            return Err(ConfigError::Invalid(format!(
                "max_move_speed ({}) is below move_speed ({})",
                self.max_move_speed, self.move_speed
            )));
        }
        config::check_finite(&[("map_centre", self.map_centre), ("shoot_offset", self.shoot_offset)])
    }
}

impl ProjectilePrototype {
    pub fn validate(&self) -> Result<(), ConfigError> {
        config::check_non_negative(&[
            ("projectile.speed", self.speed),
            ("projectile.damage", self.damage),
            ("projectile.life_time", self.life_time),
            ("projectile.hit_time", self.hit_time),
        ])?;
        config::check_finite(&[("projectile.half_extents", self.half_extents)])?;
        if self.half_extents.cmplt(Vec3::ZERO).any() {
            return Err(ConfigError::Invalid(format!(
                "projectile.half_extents must not be negative, got {}",
                self.half_extents
            )));
        }
        Ok(())
    }
}

// ============================================================================
// TEAM SETTINGS TABLE
// ============================================================================

/// Owns every team's `Settings`. Agents look records up by `SettingsId`.
#[derive(Debug, Clone, Default)]
pub struct SettingsTable {
    entries: Vec<Settings>,
    by_team: [Option<SettingsId>; MAX_TEAMS],
}

impl SettingsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, clamp and register `settings` as the record for `team`.
    pub fn insert(&mut self, team: TeamId, mut settings: Settings) -> Result<SettingsId, ConfigError> {
        let slot = self
            .by_team
            .get_mut(team as usize)
            .ok_or_else(|| ConfigError::Invalid(format!("team {team} exceeds the maximum of {MAX_TEAMS} teams")))?;
        settings.validate()?;
        settings.clamp_to_prototype();

        let id = SettingsId(self.entries.len());
        self.entries.push(settings);
        *slot = Some(id);
        Ok(id)
    }

    pub fn get(&self, id: SettingsId) -> Option<&Settings> {
        self.entries.get(id.0)
    }

    pub fn for_team(&self, team: TeamId) -> Option<SettingsId> {
        self.by_team.get(team as usize).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn insert_clamps_separation_to_projectile_extent() {
        let mut table = SettingsTable::new();
        let settings = Settings {
            separation_weight: 0.1,
            projectile: ProjectilePrototype { half_extents: Vec3::new(0.2, 0.3, 0.9), ..Default::default() },
            ..Default::default()
        };
        let id = table.insert(1, settings).unwrap();
        assert_eq!(table.get(id).unwrap().separation_weight, 0.9);
        assert_eq!(table.for_team(1), Some(id));
        assert_eq!(table.for_team(2), None);
    }

    #[test]
    fn insert_keeps_weights_already_above_minimum() {
        let mut table = SettingsTable::new();
        let id = table.insert(2, Settings { separation_weight: 3.0, ..Default::default() }).unwrap();
        assert_eq!(table.get(id).unwrap().separation_weight, 3.0);
    }

    #[test]
    fn insert_rejects_out_of_range_team() {
        let mut table = SettingsTable::new();
        assert!(matches!(
            table.insert(MAX_TEAMS as TeamId, Settings::default()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[rstest]
    #[case::cohesion(Settings { cohesion_weight: f32::NAN, ..Default::default() })]
    #[case::separation(Settings { separation_weight: f32::NAN, ..Default::default() })]
    #[case::avoidance(Settings { obstacle_avoid_weight: -5.0, ..Default::default() })]
    #[case::line_of_sight(Settings { line_of_sight_weight: f32::INFINITY, ..Default::default() })]
    #[case::containment(Settings { map_radius_weight: -0.1, ..Default::default() })]
    #[case::lead(Settings { lead_correction: f32::NAN, ..Default::default() })]
    #[case::damage(Settings { projectile: ProjectilePrototype { damage: f32::NAN, ..Default::default() }, ..Default::default() })]
    #[case::life_time(Settings { projectile: ProjectilePrototype { life_time: -1.0, ..Default::default() }, ..Default::default() })]
    #[case::extents(Settings { projectile: ProjectilePrototype { half_extents: Vec3::new(0.2, f32::NAN, 0.6), ..Default::default() }, ..Default::default() })]
    fn bad_weights_and_prototypes_are_rejected(#[case] settings: Settings) {
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
        assert!(SettingsTable::new().insert(1, settings).is_err());
    }

    #[test]
    fn clamp_replaces_nan_separation() {
        let mut settings = Settings { separation_weight: f32::NAN, ..Default::default() };
        settings.clamp_to_prototype();
        assert_eq!(settings.separation_weight, settings.min_separation_weight());
    }

    #[test]
    fn validate_rejects_nan_and_inverted_speeds() {
        let nan = Settings { look_speed: f32::NAN, ..Default::default() };
        assert!(nan.validate().is_err());
        let inverted = Settings { move_speed: 5.0, max_move_speed: 1.0, ..Default::default() };
        assert!(inverted.validate().is_err());
        assert!(Settings::default().validate().is_ok());
    }
}
