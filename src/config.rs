//! Flat YAML configuration for catalog loading, table generation and identification.
//!
//! ```yaml
//! catalog:
//!   path: data/hip2.dat
//!   format: hipparcos
//!   m_bright: 6.0
//! tables:
//!   fov: 20.0
//! identification:
//!   sigma_1: 1.0e-9
//!   nu_max: 50000
//!   table_name: HOKU_ANGLE
//! ```
//!
//! Every key is optional and falls back to its documented default.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::identification::Parameters;
use crate::index::TableConfig;
use crate::starcatalog::StarCatalog;

/// Deepest spherical moment subdivision accepted.
pub const MAX_MOMENT_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogFormat {
    /// Hipparcos new reduction, fixed width.
    #[default]
    Hipparcos,
    /// CSV rows of `alpha, delta, i, j, k, m, label`.
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog file. Default `None`.
    pub path: Option<PathBuf>,
    /// Default [`CatalogFormat::Hipparcos`].
    pub format: CatalogFormat,
    /// Magnitude limit of the bright subset. Default 6.0.
    pub m_bright: f64,
    /// Epoch for proper-motion propagation, Hipparcos only. Default `None` (J1991.25).
    pub epoch_year: Option<f64>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: None,
            format: CatalogFormat::Hipparcos,
            m_bright: 6.0,
            epoch_year: None,
        }
    }
}

impl CatalogConfig {
    pub fn load(&self) -> anyhow::Result<StarCatalog> {
        let Some(path) = &self.path else {
            bail!("no catalog path configured");
        };
        match self.format {
            CatalogFormat::Hipparcos => {
                StarCatalog::from_hipparcos_file(path, self.m_bright, self.epoch_year)
            }
            CatalogFormat::Csv => StarCatalog::from_csv_file(path, self.m_bright),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub tables: TableConfig,
    pub identification: Parameters,
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yml::from_str(yaml).context("parsing configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading {}", path.as_ref().display()))?;
        let config = Self::from_yaml_str(&text)?;
        info!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Range checks on every numeric field.
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.identification;
        for (name, sigma) in [
            ("sigma_primary", p.sigma_primary),
            ("sigma_secondary", p.sigma_secondary),
            ("sigma_tertiary", p.sigma_tertiary),
            ("sigma_overlay", p.sigma_overlay),
        ] {
            if !sigma.is_finite() || sigma < 0.0 {
                bail!("{} must be finite and non-negative, got {}", name, sigma);
            }
        }
        if p.nu_max == 0 {
            bail!("nu_max must be positive");
        }
        for (name, u) in [
            ("u_tp", p.u_tp),
            ("u_fp", p.u_fp),
            ("u_tn", p.u_tn),
            ("u_fn", p.u_fn),
            ("k_accept", p.k_accept),
        ] {
            if u.is_nan() {
                bail!("{} must be a number", name);
            }
        }

        let fov = self.tables.fov;
        if !(fov > 0.0 && fov <= 180.0) {
            bail!("fov must lie in (0, 180] degrees, got {}", fov);
        }
        for depth in [self.tables.moment_depth, p.moment_depth] {
            if depth > MAX_MOMENT_DEPTH {
                bail!("moment_depth {} exceeds {}", depth, MAX_MOMENT_DEPTH);
            }
        }
        if self.catalog.m_bright.is_nan() {
            bail!("m_bright must be a number");
        }
        Ok(())
    }
}
