//! Attitude determination from matched star directions (Wahba's problem).
//!
//! All rotations map the inertial (catalog) frame into the body frame:
//! `body ≈ q * inertial`.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion};
use rand::{Rng, RngExt};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::star::Star;
use crate::{Quaternion, Vector3};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttitudeError {
    #[error("body and inertial lists differ in length ({body} vs {inertial})")]
    LengthMismatch { body: usize, inertial: usize },
    #[error("at least two vector pairs are required, got {0}")]
    TooFew(usize),
}

/// Strategy used to solve for the rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WahbaSolver {
    /// Two-vector TRIAD; uses only the first two pairs.
    #[default]
    Triad,
    /// Least-squares SVD over all pairs.
    Svd,
}

impl WahbaSolver {
    /// Rotation `q` with `body[i] ≈ q * inertial[i]`.
    ///
    /// Both lists must be index-aligned and hold at least two stars. Parallel pairs are
    /// not corrected for and may give a meaningless rotation.
    pub fn solve(self, body: &[Star], inertial: &[Star]) -> Result<Quaternion, AttitudeError> {
        if body.len() != inertial.len() {
            return Err(AttitudeError::LengthMismatch {
                body: body.len(),
                inertial: inertial.len(),
            });
        }
        if body.len() < 2 {
            return Err(AttitudeError::TooFew(body.len()));
        }
        let r = match self {
            WahbaSolver::Triad => triad(
                &body[0].uvec(),
                &body[1].uvec(),
                &inertial[0].uvec(),
                &inertial[1].uvec(),
            ),
            WahbaSolver::Svd => svd(body, inertial),
        };
        Ok(UnitQuaternion::from_rotation_matrix(
            &Rotation3::from_matrix_unchecked(r),
        ))
    }
}

fn triad(b1: &Vector3, b2: &Vector3, r1: &Vector3, r2: &Vector3) -> Matrix3<f64> {
    let frame = |a: &Vector3, b: &Vector3| {
        let t1 = a.normalize();
        let t2 = a.cross(b).normalize();
        let t3 = t1.cross(&t2);
        Matrix3::from_columns(&[t1, t2, t3])
    };
    frame(b1, b2) * frame(r1, r2).transpose()
}

/// Uses SVD of the cross-covariance matrix `H = Σ(b_i ⊗ r_i)`, with the sign of the
/// last singular direction flipped when `U Vᵀ` would be a reflection.
fn svd(body: &[Star], inertial: &[Star]) -> Matrix3<f64> {
    let mut h = Matrix3::<f64>::zeros();
    for (b, r) in body.iter().zip(inertial.iter()) {
        h += b.uvec() * r.uvec().transpose();
    }
    let svd = h.svd(true, true);
    let (Some(mut u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Matrix3::identity();
    };
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    u * v_t
}

/// `star` carried through `q`, keeping its label and magnitude.
pub fn rotate(star: &Star, q: &Quaternion) -> Star {
    let v = q * star.uvec();
    Star {
        v: [v.x, v.y, v.z],
        ..*star
    }
}

/// Uniformly distributed rotation (Shoemake's subgroup algorithm).
pub fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> Quaternion {
    let (u1, u2, u3) = (rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>());
    let (a, b) = ((1.0 - u1).sqrt(), u1.sqrt());
    let (s2, c2) = (std::f64::consts::TAU * u2).sin_cos();
    let (s3, c3) = (std::f64::consts::TAU * u3).sin_cos();
    UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(b * c3, a * s2, a * c2, b * s3))
}

/// `q` followed by a small rotation about a random axis, with the angle drawn from
/// `N(0, sigma_deg)`. A negative or NaN `sigma_deg` is an error.
pub fn shake<R: Rng + ?Sized>(
    q: &Quaternion,
    sigma_deg: f64,
    rng: &mut R,
) -> anyhow::Result<Quaternion> {
    let noise = Normal::new(0.0, sigma_deg)
        .map_err(|e| anyhow::anyhow!("invalid shake sigma {}: {}", sigma_deg, e))?;
    let angle = noise.sample(rng);
    let axis = nalgebra::Unit::new_normalize(Star::random(rng).uvec());
    Ok(UnitQuaternion::from_axis_angle(&axis, angle.to_radians()) * q)
}

/// Overlay: rotate each candidate into the body frame and pair it with the first
/// still-unmatched observed star within `3 * sigma_overlay` degrees.
///
/// Each observed and each candidate star is used at most once. The returned stars carry
/// the observed (body) vectors with the candidates' labels.
pub fn find_matches(image: &[Star], candidates: &[Star], q: &Quaternion, sigma_overlay: f64) -> Vec<Star> {
    let radius = 3.0 * sigma_overlay;
    let mut remaining = image.to_vec();
    let mut matches = Vec::new();
    for candidate in candidates {
        let projected = rotate(candidate, q);
        if let Some(pos) = remaining
            .iter()
            .position(|b| Star::angle_between(b, &projected) <= radius)
        {
            let observed = remaining.remove(pos);
            matches.push(Star {
                label: candidate.label,
                ..observed
            });
        }
    }
    matches
}
