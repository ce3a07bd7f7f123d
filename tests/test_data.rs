//! Shared synthetic catalogs for the integration tests.
//!
//! Everything here is generated from fixed seeds, so no data files or network access
//! are needed. The Hipparcos path is only used by ignored tests.

#![allow(dead_code)]

use hoku::{Star, StarCatalog};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Local Hipparcos new-reduction file, for the ignored real-catalog tests.
pub const HIPPARCOS_PATH: &str = "data/hip2.dat";

/// `n` labeled stars (labels `1..=n`) scattered uniformly within `radius_deg` of
/// `focus`.
pub fn clustered_stars(seed: u64, n: usize, focus: &Star, radius_deg: f64) -> Vec<Star> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stars = Vec::with_capacity(n);
    while stars.len() < n {
        if let Some(s) = Star::random_near(focus, radius_deg, &mut rng) {
            stars.push(s.with_label(stars.len() as u32 + 1));
        }
    }
    stars
}

/// `n` labeled stars scattered over the whole sphere.
pub fn all_sky_stars(seed: u64, n: usize) -> Vec<Star> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| Star::random(&mut rng).with_label(i as u32 + 1))
        .collect()
}

/// A compact catalog where every pair fits in a 20 degree field.
pub fn cluster_catalog(seed: u64, n: usize) -> StarCatalog {
    let focus = Star::from_radec_deg(40.0, 25.0);
    StarCatalog::new(clustered_stars(seed, n, &focus, 8.0), 6.0).expect("valid catalog")
}

/// Five stars with labels 1 to 5, all within 10 degrees of each other.
pub fn five_star_catalog() -> StarCatalog {
    let stars = [
        (100.0, 20.0),
        (103.0, 21.0),
        (101.0, 24.0),
        (98.5, 22.5),
        (102.0, 17.5),
    ]
    .iter()
    .enumerate()
    .map(|(i, &(ra, dec))| Star::from_radec_deg(ra, dec).with_label(i as u32 + 1))
    .collect();
    StarCatalog::new(stars, 6.0).expect("valid catalog")
}
