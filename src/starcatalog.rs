//! In-memory star catalog with label lookup and angular-proximity queries.
//!
//! The catalog is built once and is read-only afterwards. Stars are kept in label
//! order so that `all_bright` is stable across calls and across processes: offline
//! tools can correlate row positions of generated tables with labels.
//!
//! Proximity queries here are plain linear scans. They are the reference answer the
//! spatial trees in [`crate::tree`] must reproduce.

use std::collections::HashMap;
use std::path::Path;

use anyhow::bail;
use tracing::info;

use crate::catalogs::hipparcos::load_hipparcos_catalog_from_file;
use crate::catalogs::table::read_catalog_table;
use crate::star::{Label, Star};
use crate::tree::NearbyStars;

#[derive(Debug, Clone)]
pub struct StarCatalog {
    stars: Vec<Star>,
    by_label: HashMap<Label, usize>,
    bright: Vec<usize>,
    m_bright: f64,
}

impl StarCatalog {
    /// Build a catalog from labeled stars.
    ///
    /// Every star must carry a label and labels must be unique. Stars fainter than
    /// `m_bright` (by apparent magnitude) are excluded from the bright subset; stars with
    /// an unknown magnitude are treated as bright.
    pub fn new(mut stars: Vec<Star>, m_bright: f64) -> anyhow::Result<Self> {
        if let Some(s) = stars.iter().find(|s| s.label.is_none()) {
            bail!("catalog star at {:?} has no label", s.v);
        }
        if let Some(s) = stars.iter().find(|s| s.is_null()) {
            bail!("catalog star {:?} is the null vector", s.label);
        }
        stars.sort_by_key(|s| s.label);

        let mut by_label = HashMap::with_capacity(stars.len());
        for (idx, star) in stars.iter().enumerate() {
            let label = star.label.unwrap_or_default();
            if by_label.insert(label, idx).is_some() {
                bail!("duplicate catalog label {}", label);
            }
        }

        let bright = stars
            .iter()
            .enumerate()
            .filter(|(_, s)| s.magnitude.is_none_or(|m| m < m_bright))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();

        info!(
            "Built star catalog: {} stars, {} brighter than magnitude {:.2}",
            stars.len(),
            bright.len(),
            m_bright
        );

        Ok(Self {
            stars,
            by_label,
            bright,
            m_bright,
        })
    }

    /// Load the Hipparcos new reduction (`hip2.dat`), propagating proper motion to
    /// `epoch_year` when given.
    pub fn from_hipparcos_file<P: AsRef<Path>>(
        path: P,
        m_bright: f64,
        epoch_year: Option<f64>,
    ) -> anyhow::Result<Self> {
        info!("Loading Hipparcos catalog from {}", path.as_ref().display());
        let hip_stars = load_hipparcos_catalog_from_file(path)?;
        info!("Loaded {} raw Hipparcos entries", hip_stars.len());
        let stars = hip_stars
            .iter()
            .map(|h| h.to_star(epoch_year))
            .collect::<Vec<_>>();
        Self::new(stars, m_bright)
    }

    /// Load a catalog table written as CSV rows of `alpha, delta, i, j, k, m, label`.
    pub fn from_csv_file<P: AsRef<Path>>(path: P, m_bright: f64) -> anyhow::Result<Self> {
        info!("Loading catalog table from {}", path.as_ref().display());
        Self::new(read_catalog_table(path)?, m_bright)
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Magnitude limit of the bright subset.
    pub fn m_bright(&self) -> f64 {
        self.m_bright
    }

    /// All stars, in label order.
    pub fn stars(&self) -> &[Star] {
        &self.stars
    }

    /// Star with the given label, or [`Star::null`] when the label is not in the catalog.
    pub fn query_by_label(&self, label: Label) -> Star {
        self.by_label
            .get(&label)
            .map(|&idx| self.stars[idx])
            .unwrap_or_else(Star::null)
    }

    pub fn contains(&self, label: Label) -> bool {
        self.by_label.contains_key(&label)
    }

    /// Every catalog star within `radius_deg` (inclusive) of `focus`.
    ///
    /// `expected` only pre-sizes the output.
    pub fn nearby(&self, focus: &Star, radius_deg: f64, expected: usize) -> Vec<Star> {
        scan(self.stars.iter(), focus, radius_deg, expected)
    }

    /// Like [`StarCatalog::nearby`], restricted to the bright subset.
    pub fn nearby_bright(&self, focus: &Star, radius_deg: f64, expected: usize) -> Vec<Star> {
        scan(
            self.bright.iter().map(|&idx| &self.stars[idx]),
            focus,
            radius_deg,
            expected,
        )
    }

    /// The magnitude-limited subset used for table construction, in label order.
    pub fn all_bright(&self) -> Vec<Star> {
        self.bright.iter().map(|&idx| self.stars[idx]).collect()
    }
}

impl NearbyStars for StarCatalog {
    fn nearby_stars(&self, focus: &Star, radius_deg: f64, expected: usize) -> Vec<Star> {
        self.nearby(focus, radius_deg, expected)
    }
}

fn scan<'a>(
    stars: impl Iterator<Item = &'a Star>,
    focus: &Star,
    radius_deg: f64,
    expected: usize,
) -> Vec<Star> {
    let mut out = Vec::with_capacity(expected);
    out.extend(stars.filter(|s| Star::angle_between(s, focus) <= radius_deg));
    out
}
