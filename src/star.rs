use rand::{Rng, RngExt};
use rkyv::{Archive, Deserialize, Serialize};

use crate::Vector3;

/// Catalog identity of a star.
pub type Label = u32;

/// Tolerance used when comparing star components for equality.
pub const COMPONENT_EPSILON: f64 = 1e-12;

/// A direction on the celestial sphere, optionally tagged with a catalog label and magnitude.
///
/// Equality is defined over the vector components only, so two stars with different
/// labels compare equal when they point the same way. The zero vector is reserved as the
/// "null star" and never represents a valid direction.
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
pub struct Star {
    pub v: [f64; 3],
    /// Catalog label. `None` for unidentified observations.
    pub label: Option<Label>,
    /// Apparent magnitude. `None` when unknown.
    pub magnitude: Option<f64>,
}

impl PartialEq for Star {
    fn eq(&self, other: &Self) -> bool {
        self.v
            .iter()
            .zip(other.v.iter())
            .all(|(a, b)| (a - b).abs() < COMPONENT_EPSILON)
    }
}

impl Star {
    /// Star with the given components, no label and unknown magnitude.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            v: [x, y, z],
            label: None,
            magnitude: None,
        }
    }

    /// The reserved zero-vector star.
    pub fn null() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn is_null(&self) -> bool {
        self.v.iter().all(|c| *c == 0.0)
    }

    pub fn from_vector(v: &Vector3) -> Self {
        Self::new(v.x, v.y, v.z)
    }

    /// Unit star from right ascension and declination, both in degrees.
    pub fn from_radec_deg(ra_deg: f64, dec_deg: f64) -> Self {
        let (rasin, racos) = ra_deg.to_radians().sin_cos();
        let (decsin, deccos) = dec_deg.to_radians().sin_cos();
        Self::new(deccos * racos, deccos * rasin, decsin)
    }

    /// Copy of this star carrying `label`.
    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    /// Copy of this star with its label removed.
    pub fn without_label(mut self) -> Self {
        self.label = None;
        self
    }

    pub fn with_magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = Some(magnitude);
        self
    }

    pub fn uvec(&self) -> Vector3 {
        Vector3::new(self.v[0], self.v[1], self.v[2])
    }

    pub fn norm(&self) -> f64 {
        self.uvec().norm()
    }

    /// Unit-length copy. The null star stays null.
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n == 0.0 {
            return *self;
        }
        Self {
            v: [self.v[0] / n, self.v[1] / n, self.v[2] / n],
            ..*self
        }
    }

    /// Right ascension in degrees, in `[0, 360)`.
    pub fn ra_deg(&self) -> f64 {
        self.v[1].atan2(self.v[0]).to_degrees().rem_euclid(360.0)
    }

    /// Declination in degrees.
    pub fn dec_deg(&self) -> f64 {
        (self.v[2] / self.norm()).clamp(-1.0, 1.0).asin().to_degrees()
    }

    /// Angular separation of two stars in degrees.
    ///
    /// Computed with `atan2(|a x b|, a . b)`, which stays accurate for very small and
    /// nearly antipodal separations.
    pub fn angle_between(a: &Star, b: &Star) -> f64 {
        let (u, w) = (a.uvec(), b.uvec());
        u.cross(&w).norm().atan2(u.dot(&w)).to_degrees()
    }

    /// True when the separation of `a` and `b` is strictly less than `theta` degrees.
    pub fn within_angle(a: &Star, b: &Star, theta: f64) -> bool {
        Self::angle_between(a, b) < theta
    }

    /// True when every pair in `stars` is separated by less than `theta` degrees.
    pub fn all_within_angle(stars: &[Star], theta: f64) -> bool {
        stars.iter().enumerate().all(|(i, a)| {
            stars[i + 1..]
                .iter()
                .all(|b| Self::within_angle(a, b, theta))
        })
    }

    /// Uniformly distributed unit direction.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let z: f64 = rng.random::<f64>() * 2.0 - 1.0;
        let phi: f64 = rng.random::<f64>() * std::f64::consts::TAU;
        let r = (1.0 - z * z).max(0.0).sqrt();
        Self::new(r * phi.cos(), r * phi.sin(), z)
    }

    /// Uniform direction within `radius_deg` of `focus`, found by rejection.
    ///
    /// Returns `None` if no sample lands inside the cap within a bounded number of draws,
    /// which only happens for vanishingly small radii.
    pub fn random_near<R: Rng + ?Sized>(focus: &Star, radius_deg: f64, rng: &mut R) -> Option<Self> {
        const MAX_DRAWS: usize = 1_000_000;
        (0..MAX_DRAWS)
            .map(|_| Self::random(rng))
            .find(|s| Self::within_angle(s, focus, radius_deg))
    }
}
