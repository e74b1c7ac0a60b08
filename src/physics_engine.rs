// Physics Engine - Atmosphere Entry Geometry
// Implements vector math, gravitational focusing and the closed-form
// sphere-intersection approximation used for every sampled grain

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::random_source::RandomSource;

// =============================================================================
// PHYSICAL CONSTANTS (SI Units)
// =============================================================================

/// Gravitational constant (m³/(kg·s²))
pub const G: f64 = 6.67430e-11;

/// Earth mass (kg)
pub const MASS_EARTH: f64 = 5.972e24;

/// Earth's mean radius (m)
pub const R_EARTH: f64 = 6.371e6;

/// Altitude of the top of the atmosphere (m)
pub const H_ATMOSPHERE_TOP: f64 = 100e3;

/// Radius of the atmosphere-entry sphere (m)
pub const R_TOP: f64 = R_EARTH + H_ATMOSPHERE_TOP;

/// Escape velocity from Earth at distance `radius` from its centre (m/s)
pub fn escape_velocity(radius: f64) -> f64 {
    (2.0 * G * MASS_EARTH / radius).sqrt()
}

/// Escape velocity at the top of the atmosphere (~11.1 km/s)
pub fn v_esc_top() -> f64 {
    escape_velocity(R_TOP)
}

// =============================================================================
// 3D VECTOR MATHEMATICS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const X: Vector3 = Vector3 {
        x: 1.0,
        y: 0.0,
        z: 0.0,
    };
    pub const Y: Vector3 = Vector3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Unit vector, or `None` when the length is too small to divide by
    pub fn try_normalize(&self) -> Option<Self> {
        let mag = self.magnitude();
        if mag > 1e-15 && mag.is_finite() {
            Some(self.scale(1.0 / mag))
        } else {
            None
        }
    }

    pub fn normalize(&self) -> Self {
        self.try_normalize().unwrap_or_else(Self::zero)
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn scale(&self, s: f64) -> Self {
        Self {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    pub fn add(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    pub fn sub(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }

    /// Rotate about unit `axis` by `angle` radians (Rodrigues' formula)
    pub fn rotate_about(&self, axis: &Vector3, angle: f64) -> Vector3 {
        let (sin_a, cos_a) = angle.sin_cos();
        let k_cross_v = axis.cross(self);
        let k_dot_v = axis.dot(self);
        self.scale(cos_a)
            .add(&k_cross_v.scale(sin_a))
            .add(&axis.scale(k_dot_v * (1.0 - cos_a)))
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn to_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

// =============================================================================
// GRAVITATIONAL FOCUSING
// =============================================================================

/// Largest impact parameter that still reaches `R_TOP` for speed `v_inf` at infinity
pub fn max_impact_parameter(v_inf: f64) -> f64 {
    let v_esc = v_esc_top();
    R_TOP * (1.0 + (v_esc * v_esc) / (v_inf * v_inf)).sqrt()
}

/// Speed at `R_TOP` from energy conservation on the hyperbolic approach
pub fn entry_speed(v_inf: f64) -> f64 {
    let v_esc = v_esc_top();
    (v_inf * v_inf + v_esc * v_esc).sqrt()
}

// =============================================================================
// TRAJECTORY GEOMETRY
// =============================================================================

/// Random unit vector, uniformly oriented in the plane perpendicular to unit `u`.
pub fn sample_perpendicular(u: &Vector3, rng: &mut RandomSource) -> Vector3 {
    let seed_axis = if u.x.abs() < 0.9 { Vector3::X } else { Vector3::Y };
    let v_perp = perpendicular_component(&seed_axis, u)
        .or_else(|| perpendicular_component(&Vector3::Y, u))
        .or_else(|| perpendicular_component(&Vector3::new(0.0, 0.0, 1.0), u))
        .unwrap_or(Vector3::X);

    let angle = rng.uniform_range(0.0, 2.0 * PI);
    v_perp.rotate_about(u, angle).normalize()
}

// Gram-Schmidt step: unit part of `v` orthogonal to `u`
fn perpendicular_component(v: &Vector3, u: &Vector3) -> Option<Vector3> {
    v.sub(&u.scale(v.dot(u))).try_normalize()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereIntersection {
    /// Entry point, |position| == radius
    pub position: Vector3,
    /// Latitude in degrees, [-90, 90]
    pub lat: f64,
    /// Longitude in degrees, (-180, 180]
    pub lon: f64,
}

/// Approximate crossing of the sphere of `radius` by a grain moving along `-u`
/// with closest-approach offset `b_vec`.
///
/// This is the straight-line construction `p = -u·t + b` rescaled onto the
/// sphere, not a solve of the gravity-bent hyperbola. Offsets at or beyond the
/// radius use `t = 0`.
pub fn intersect_sphere(
    u: &Vector3,
    b_vec: &Vector3,
    radius: f64,
    rng: &mut RandomSource,
) -> SphereIntersection {
    let b = b_vec.magnitude();
    let t = if b < radius {
        (radius * radius - b * b).sqrt()
    } else {
        0.0
    };

    let direction = u
        .scale(-t)
        .add(b_vec)
        .try_normalize()
        .unwrap_or_else(|| sample_perpendicular(u, rng));
    let position = direction.scale(radius);

    let (lat, lon) = lat_lon(&position, radius);
    SphereIntersection { position, lat, lon }
}

/// Geographic coordinates (degrees) of a point on a sphere of `radius`
pub fn lat_lon(position: &Vector3, radius: f64) -> (f64, f64) {
    let lat = (position.z / radius).clamp(-1.0, 1.0).asin().to_degrees();
    let mut lon = position.y.atan2(position.x).to_degrees();
    if lon <= -180.0 {
        lon += 360.0;
    }
    (lat, lon)
}

/// Angle (degrees) between the inward velocity and the local vertical at `position`
pub fn entry_angle(v_entry: &Vector3, position: &Vector3) -> f64 {
    let normal = position.normalize();
    let v_hat = v_entry.normalize();
    let cos_angle = -v_hat.dot(&normal);
    cos_angle.clamp(-1.0, 1.0).acos().to_degrees()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_escape_velocity_at_atmosphere_top() {
        let v = v_esc_top();
        assert!(v > 11_000.0 && v < 11_200.0, "v_esc = {}", v);
        assert_relative_eq!(R_TOP, 6.471e6);
    }

    #[test]
    fn test_focusing_grows_at_low_speed() {
        assert!(max_impact_parameter(11e3) > max_impact_parameter(70e3));
        assert!(max_impact_parameter(1e9) > R_TOP);
        assert_relative_eq!(max_impact_parameter(1e12), R_TOP, max_relative = 1e-9);

        let v_inf = 30e3;
        let v_esc = v_esc_top();
        assert_relative_eq!(
            entry_speed(v_inf),
            (v_inf * v_inf + v_esc * v_esc).sqrt(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_vector3_operations() {
        let v1 = Vector3::new(1.0, 2.0, 3.0);
        let v2 = Vector3::new(4.0, 5.0, 6.0);

        let sum = v1.add(&v2);
        assert!((sum.x - 5.0).abs() < 1e-10);
        assert!((sum.y - 7.0).abs() < 1e-10);
        assert!((sum.z - 9.0).abs() < 1e-10);

        let dot = v1.dot(&v2);
        assert!((dot - 32.0).abs() < 1e-10);

        let cross = v1.cross(&v2);
        assert!((cross.x - (-3.0)).abs() < 1e-10);
        assert!((cross.y - 6.0).abs() < 1e-10);
        assert!((cross.z - (-3.0)).abs() < 1e-10);

        assert!(Vector3::zero().try_normalize().is_none());
        assert_eq!(Vector3::zero().normalize(), Vector3::zero());
    }

    #[test]
    fn test_rodrigues_quarter_turn() {
        let z = Vector3::new(0.0, 0.0, 1.0);
        let rotated = Vector3::X.rotate_about(&z, PI / 2.0);
        assert_relative_eq!(rotated.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(rotated.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(rotated.z, 0.0, epsilon = 1e-12);

        // Components along the axis are untouched
        let tilted = Vector3::new(1.0, 0.0, 2.0).rotate_about(&z, 1.234);
        assert_relative_eq!(tilted.z, 2.0, epsilon = 1e-12);
        assert_relative_eq!(tilted.magnitude(), 5.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_perpendicular_is_unit_and_orthogonal() {
        let mut rng = RandomSource::seeded(3);
        let axes = [
            Vector3::X,
            Vector3::Y,
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(0.95, 0.3, 0.1).normalize(),
            Vector3::new(-1.0, 1.0, 1.0).normalize(),
        ];
        for u in axes {
            for _ in 0..50 {
                let p = sample_perpendicular(&u, &mut rng);
                assert_relative_eq!(p.magnitude(), 1.0, epsilon = 1e-12);
                assert!(p.dot(&u).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_perpendicular_orientation_is_isotropic() {
        // Mean of uniformly oriented in-plane unit vectors tends to zero
        let mut rng = RandomSource::seeded(11);
        let u = Vector3::new(0.0, 0.0, 1.0);
        let n = 20_000;
        let mut mean = Vector3::zero();
        for _ in 0..n {
            mean = mean.add(&sample_perpendicular(&u, &mut rng));
        }
        let mean = mean.scale(1.0 / n as f64);
        assert!(mean.magnitude() < 0.03, "mean = {:?}", mean);
    }

    #[test]
    fn test_head_on_intersection() {
        // Zero offset: the construction lands on the far side, antiparallel to u
        let mut rng = RandomSource::seeded(1);
        let u = Vector3::new(0.0, 0.0, 1.0);
        let hit = intersect_sphere(&u, &Vector3::zero(), R_TOP, &mut rng);

        assert_relative_eq!(hit.position.magnitude(), R_TOP, max_relative = 1e-12);
        assert_relative_eq!(hit.lat, -90.0, epsilon = 1e-9);

        let v_entry = u.scale(-entry_speed(20e3));
        assert_relative_eq!(entry_angle(&v_entry, &hit.position), 180.0, epsilon = 1e-6);
        assert_eq!(rng.draws(), 0);
    }

    #[test]
    fn test_grazing_intersection_beyond_radius() {
        let mut rng = RandomSource::seeded(1);
        let u = Vector3::X;
        let b_vec = Vector3::new(0.0, 2.0 * R_TOP, 0.0);
        let hit = intersect_sphere(&u, &b_vec, R_TOP, &mut rng);

        assert_relative_eq!(hit.position.y, R_TOP, max_relative = 1e-12);
        assert_relative_eq!(hit.lon, 90.0, epsilon = 1e-9);

        let v_entry = u.scale(-30e3);
        assert_relative_eq!(entry_angle(&v_entry, &hit.position), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn test_longitude_excludes_minus_180() {
        let (lat, lon) = lat_lon(&Vector3::new(-R_TOP, -0.0, 0.0), R_TOP);
        assert_relative_eq!(lat, 0.0);
        assert_relative_eq!(lon, 180.0);
    }

    #[test]
    fn test_entry_angle_outbound_is_180() {
        let position = Vector3::new(0.0, 0.0, R_TOP);
        let outward = Vector3::new(0.0, 0.0, 5.0);
        assert_relative_eq!(entry_angle(&outward, &position), 180.0, epsilon = 1e-9);
    }
}
