//! Synthetic observations for exercising the identification methods.
//!
//! An [`Image`] is the set of catalog stars around a focus, rotated into a body frame.
//! The generator remembers each star's catalog label as an oracle, so results can be
//! scored after the labels are stripped for presentation. Perturbations model stray
//! light, occluding bodies and centroid noise.

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::attitude::rotate;
use crate::star::Star;
use crate::tree::NearbyStars;
use crate::Quaternion;

/// Draws allowed when looking for a shifted position that stays in the field.
const MAX_SHIFT_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerturbationKind {
    /// Unlabeled directions added to the image.
    ExtraLight,
    /// Stars removed by dark spots.
    RemovedLight,
    /// Stars moved by Gaussian noise.
    ShiftedLight,
}

/// Record of one perturbation and the stars it touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Perturbation {
    pub kind: PerturbationKind,
    pub affected: Vec<Star>,
}

/// A synthetic body-frame observation with oracle labels.
#[derive(Debug, Clone)]
pub struct Image {
    fov: f64,
    focus: Star,
    rotation: Quaternion,
    stars: Vec<Star>,
    perturbations: Vec<Perturbation>,
}

impl Image {
    /// Catalog stars within `fov / 2` of `focus`, rotated into the body frame by
    /// `rotation` and shuffled.
    pub fn generate<N, R>(
        catalog: &N,
        focus: &Star,
        fov: f64,
        rotation: Quaternion,
        rng: &mut R,
    ) -> Self
    where
        N: NearbyStars + ?Sized,
        R: Rng + ?Sized,
    {
        let expected = (fov * 4.0).max(0.0) as usize;
        let mut stars: Vec<Star> = catalog
            .nearby_stars(focus, fov / 2.0, expected)
            .iter()
            .map(|s| rotate(s, &rotation))
            .collect();
        stars.shuffle(rng);
        debug!("Generated image of {} stars, fov {:.2} deg", stars.len(), fov);
        Self {
            fov,
            focus: rotate(focus, &rotation),
            rotation,
            stars,
            perturbations: Vec::new(),
        }
    }

    /// Add `n` spurious directions inside the field.
    pub fn add_extra_light<R: Rng + ?Sized>(&mut self, n: usize, rng: &mut R) {
        let mut affected = Vec::with_capacity(n);
        while affected.len() < n {
            match Star::random_near(&self.focus, self.fov / 2.0, rng) {
                Some(s) => affected.push(s.without_label()),
                None => break,
            }
        }
        self.stars.extend_from_slice(&affected);
        self.stars.shuffle(rng);
        self.record(PerturbationKind::ExtraLight, affected);
    }

    /// Place `n` dark spots in the field and drop every star within `psi / 2` degrees of
    /// one.
    pub fn remove_light<R: Rng + ?Sized>(&mut self, n: usize, psi: f64, rng: &mut R) {
        let spots: Vec<Star> = (0..n)
            .filter_map(|_| Star::random_near(&self.focus, self.fov / 2.0, rng))
            .collect();
        let (removed, kept): (Vec<Star>, Vec<Star>) = self
            .stars
            .iter()
            .copied()
            .partition(|s| spots.iter().any(|b| Star::within_angle(b, s, psi / 2.0)));
        self.stars = kept;
        self.stars.shuffle(rng);
        self.record(PerturbationKind::RemovedLight, removed);
    }

    /// Move up to `n` stars by adding `N(0, sigma)` noise to each component. A star is
    /// only moved to a position that stays inside the field; labels are kept.
    pub fn shift_light<R: Rng + ?Sized>(
        &mut self,
        n: usize,
        sigma: f64,
        rng: &mut R,
    ) -> anyhow::Result<()> {
        let noise = Normal::new(0.0, sigma)
            .map_err(|e| anyhow::anyhow!("invalid shift sigma {}: {}", sigma, e))?;
        let mut affected = Vec::with_capacity(n);
        for star in self.stars.iter_mut().take(n) {
            for _ in 0..MAX_SHIFT_ATTEMPTS {
                let v = star.v.map(|c| c + noise.sample(rng));
                let candidate = Star { v, ..*star }.normalized();
                if Star::within_angle(&candidate, &self.focus, self.fov / 2.0) {
                    *star = candidate;
                    affected.push(candidate);
                    break;
                }
            }
        }
        self.stars.shuffle(rng);
        self.record(PerturbationKind::ShiftedLight, affected);
        Ok(())
    }

    fn record(&mut self, kind: PerturbationKind, affected: Vec<Star>) {
        debug!("{:?}: {} stars affected", kind, affected.len());
        self.perturbations.push(Perturbation { kind, affected });
    }

    /// The image as a sensor would report it: body vectors with no labels.
    pub fn present(&self) -> Vec<Star> {
        self.stars.iter().map(|s| s.without_label()).collect()
    }

    /// Body stars with their oracle labels. Spurious stars have none.
    pub fn oracle(&self) -> &[Star] {
        &self.stars
    }

    pub fn fov(&self) -> f64 {
        self.fov
    }

    /// Focus direction in the body frame.
    pub fn focus(&self) -> &Star {
        &self.focus
    }

    /// Rotation taking catalog directions into the body frame.
    pub fn rotation(&self) -> &Quaternion {
        &self.rotation
    }

    pub fn perturbations(&self) -> &[Perturbation] {
        &self.perturbations
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Identified stars whose label agrees with the oracle label of the body star they
    /// sit on.
    pub fn count_correct(&self, identified: &[Star]) -> usize {
        identified
            .iter()
            .filter(|s| {
                s.label.is_some()
                    && self
                        .stars
                        .iter()
                        .any(|truth| truth == *s && truth.label == s.label)
            })
            .count()
    }
}
