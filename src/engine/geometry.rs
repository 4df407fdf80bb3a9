// Shared vector and orientation helpers used by steering, combat and patrol.
//
// Convention: +Z is forward, +Y is up, +X is right (right = up x forward).
// All helpers are NaN-free for degenerate input: zero-length directions
// normalise to zero and look rotations that cannot be built return None so
// the caller can hold its current orientation.

use glam::{Mat3, Quat, Vec3};

/// World up axis, used as the fallback "up" for formations without neighbours.
pub const WORLD_UP: Vec3 = Vec3::Y;

const EPSILON: f32 = 1e-6;

// ============================================================================
// ORIENTATION
// ============================================================================

/// Local forward axis of `rotation` in world space.
#[inline]
pub fn forward(rotation: Quat) -> Vec3 {
    rotation * Vec3::Z
}

/// Local up axis of `rotation` in world space.
#[inline]
pub fn up(rotation: Quat) -> Vec3 {
    rotation * Vec3::Y
}

/// Local right axis of `rotation` in world space.
#[inline]
pub fn right(rotation: Quat) -> Vec3 {
    rotation * Vec3::X
}

/// Rotation whose forward axis points along `forward` and whose up axis is
/// as close to `up` as possible.
///
/// Returns `None` when `forward` is zero-length or parallel to `up`.
pub fn look_rotation(forward: Vec3, up: Vec3) -> Option<Quat> {
    let z = forward.try_normalize()?;
    let x = up.cross(z).try_normalize()?;
    let y = z.cross(x);
    Some(Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize())
}

/// Spherically interpolate `from` toward the look rotation built from
/// `look_dir`/`up_hint`, advancing by `t` (clamped to [0, 1]).
///
/// Holds `from` when no look rotation can be built.
pub fn turn_towards(from: Quat, look_dir: Vec3, up_hint: Vec3, t: f32) -> Quat {
    match look_rotation(look_dir, up_hint) {
        Some(target) => from.slerp(target, t.clamp(0.0, 1.0)).normalize(),
        None => from,
    }
}

// ============================================================================
// VISIBILITY
// ============================================================================

/// Angle in degrees between two directions. Zero-length input yields 0.
pub fn angle_deg(a: Vec3, b: Vec3) -> f32 {
    let denom = (a.length_squared() * b.length_squared()).sqrt();
    if denom < EPSILON {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

/// True if `target` lies within `view_dst` of `origin` and inside the forward
/// cone of full angle `fov_deg`.
///
/// A target coincident with the origin has no direction and counts as visible.
pub fn in_view_cone(origin: Vec3, forward: Vec3, target: Vec3, view_dst: f32, fov_deg: f32) -> bool {
    let delta = target - origin;
    if delta.length_squared() > view_dst * view_dst {
        return false;
    }
    if delta.length_squared() < EPSILON * EPSILON {
        return true;
    }
    angle_deg(forward, delta) <= fov_deg * 0.5
}

// ============================================================================
// AXIS-ALIGNED BOXES
// ============================================================================

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

/// Result of a segment/box intersection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Fraction along the segment in [0, 1].
    pub fraction: f32,
    pub position: Vec3,
    /// Outward face normal of the face that was entered.
    pub normal: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min: min.min(max), max: min.max(max) }
    }

    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Closed-interval overlap test; touching faces count as overlapping.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    pub fn contains(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// Slab test of the segment `start..end` against this box.
    ///
    /// Segments that start inside the box report no hit, matching a ray cast
    /// that only reports surfaces it enters.
    pub fn intersect_segment(&self, start: Vec3, end: Vec3) -> Option<SegmentHit> {
        if self.contains(start) {
            return None;
        }
        let dir = end - start;
        let mut t_enter = 0.0f32;
        let mut t_exit = 1.0f32;
        let mut normal = Vec3::ZERO;

        for axis in 0..3 {
            let (o, d, lo, hi) = (start[axis], dir[axis], self.min[axis], self.max[axis]);
            if d.abs() < EPSILON {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (lo - o) * inv;
            let mut t1 = (hi - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_enter {
                t_enter = t0;
                normal = Vec3::ZERO;
                normal[axis] = -d.signum();
            }
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }

        if normal == Vec3::ZERO {
            return None;
        }
        Some(SegmentHit {
            fraction: t_enter,
            position: start + dir * t_enter,
            normal,
        })
    }
}
