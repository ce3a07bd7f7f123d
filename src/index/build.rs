//! Offline construction of invariant tables from catalog stars.
//!
//! Every builder enumerates combinations of stars in label order, keeps those whose
//! members are pairwise within the field of view, computes the invariant, and skips
//! degenerate combinations. The finished table is polished before it is returned, so
//! building twice from the same stars yields identical tables.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{IndexError, InvariantTable, TableKind, TableStore};
use crate::geometry::{asterism, trio};
use crate::star::{Label, Star};
use crate::starcatalog::StarCatalog;

/// Parameters controlling table generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Field of view in degrees. Stars in one row are pairwise closer than this.
    /// Default 20.
    pub fov: f64,
    /// Subdivision depth of the spherical polar moment. Default 3.
    pub moment_depth: u32,
    /// Maximum number of asterisms a single star may take part in.
    /// Default `None` (unlimited).
    pub asterism_usage_limit: Option<u32>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            fov: 20.0,
            moment_depth: 3,
            asterism_usage_limit: None,
        }
    }
}

/// Labeled stars in label order, with the pairs that fit in the field.
struct Field {
    stars: Vec<Star>,
    labels: Vec<Label>,
    /// `near[i]` holds every `j > i` within the field of view of `i`.
    near: Vec<Vec<usize>>,
}

impl Field {
    fn new(stars: &[Star], fov: f64) -> Self {
        let mut labeled = stars
            .iter()
            .filter_map(|s| s.label.map(|l| (l, *s)))
            .collect::<Vec<_>>();
        labeled.sort_by_key(|(l, _)| *l);
        let (labels, stars): (Vec<_>, Vec<_>) = labeled.into_iter().unzip();

        let near = (0..stars.len())
            .map(|i| {
                (i + 1..stars.len())
                    .filter(|&j| Star::within_angle(&stars[i], &stars[j], fov))
                    .collect()
            })
            .collect();
        Self {
            stars,
            labels,
            near,
        }
    }

    fn close(&self, i: usize, j: usize) -> bool {
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        self.near[a].binary_search(&b).is_ok()
    }

    fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.stars.len()).flat_map(move |i| self.near[i].iter().map(move |&j| (i, j)))
    }

    fn trios(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.pairs().flat_map(move |(i, j)| {
            self.near[j]
                .iter()
                .filter(move |&&k| self.close(i, k))
                .map(move |&k| (i, j, k))
        })
    }

    fn quads(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        self.trios().flat_map(move |(i, j, k)| {
            self.near[k]
                .iter()
                .filter(move |&&m| self.close(i, m) && self.close(j, m))
                .map(move |&m| [i, j, k, m])
        })
    }
}

fn finish(mut table: InvariantTable) -> InvariantTable {
    table.polish();
    info!("Built table {} ({:?}): {} rows", table.name(), table.kind(), table.len());
    table
}

/// Pairwise angles: one row per pair `i < j` with `0 < theta < fov`.
pub fn build_angle_table(
    name: &str,
    stars: &[Star],
    config: &TableConfig,
) -> Result<InvariantTable, IndexError> {
    let field = Field::new(stars, config.fov);
    let mut table = InvariantTable::new(name, TableKind::Angle);
    for (i, j) in field.pairs() {
        let theta = Star::angle_between(&field.stars[i], &field.stars[j]);
        if theta > 0.0 {
            table.push(&[field.labels[i], field.labels[j]], &[theta])?;
        }
    }
    Ok(finish(table))
}

/// Dot-angle rows: for every trio in the field, one row per choice of center.
pub fn build_dot_angle_table(
    name: &str,
    stars: &[Star],
    config: &TableConfig,
) -> Result<InvariantTable, IndexError> {
    let field = Field::new(stars, config.fov);
    let mut table = InvariantTable::new(name, TableKind::DotAngle);
    for (i, j, k) in field.trios() {
        for (x, y, c) in [(j, k, i), (i, k, j), (i, j, k)] {
            let (sc, sx, sy) = (&field.stars[c], &field.stars[x], &field.stars[y]);
            let (mut t1, mut t2) = (Star::angle_between(sc, sx), Star::angle_between(sc, sy));
            let (mut x, mut y) = (x, y);
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
                std::mem::swap(&mut x, &mut y);
            }
            let phi = trio::dot_angle(&field.stars[x].uvec(), &field.stars[y].uvec(), &sc.uvec());
            if !phi.is_finite() {
                continue;
            }
            table.push(&[field.labels[x], field.labels[y], field.labels[c]], &[t1, t2, phi])?;
        }
    }
    Ok(finish(table))
}

/// Triangle area and polar moment for every trio `i < j < k` in the field.
/// `kind` selects the planar or spherical formulas.
pub fn build_triangle_table(
    name: &str,
    kind: TableKind,
    stars: &[Star],
    config: &TableConfig,
) -> Result<InvariantTable, IndexError> {
    let field = Field::new(stars, config.fov);
    let mut table = InvariantTable::new(name, kind);
    let spherical = kind == TableKind::SphericalTriangle;
    for (i, j, k) in field.trios() {
        let (b1, b2, b3) = (field.stars[i].uvec(), field.stars[j].uvec(), field.stars[k].uvec());
        let invariants = if spherical {
            trio::spherical_area(&b1, &b2, &b3)
                .zip(trio::spherical_moment(&b1, &b2, &b3, config.moment_depth))
        } else {
            Some((trio::planar_area(&b1, &b2, &b3), trio::planar_moment(&b1, &b2, &b3)))
        };
        match invariants {
            Some((area, moment)) if area > 0.0 && moment.is_finite() => {
                table.push(
                    &[field.labels[i], field.labels[j], field.labels[k]],
                    &[area, moment],
                )?;
            }
            _ => continue,
        }
    }
    Ok(finish(table))
}

/// Asterism hash codes and their centers, one row each per well-formed quad.
pub fn build_asterism_tables(
    hash_name: &str,
    center_name: &str,
    stars: &[Star],
    config: &TableConfig,
) -> Result<(InvariantTable, InvariantTable), IndexError> {
    let field = Field::new(stars, config.fov);
    let mut hashes = InvariantTable::new(hash_name, TableKind::AsterismHash);
    let mut centers = InvariantTable::new(center_name, TableKind::AsterismCenter);
    let mut usage: HashMap<Label, u32> = HashMap::new();

    for quad in field.quads() {
        let labels = quad.map(|q| field.labels[q]);
        if let Some(limit) = config.asterism_usage_limit {
            if labels.iter().any(|l| usage.get(l).copied().unwrap_or(0) >= limit) {
                continue;
            }
        }
        let members = quad.map(|q| field.stars[q]);
        let Some(hash) = asterism::hash(&members) else {
            continue;
        };
        let ordered = hash.arrange(&labels);
        let center = asterism::center(&members);
        hashes.push(&ordered, &hash.code)?;
        centers.push(&ordered, &center.v)?;
        for l in labels {
            *usage.entry(l).or_default() += 1;
        }
    }
    Ok((finish(hashes), finish(centers)))
}

/// Build one table of the given kind.
pub fn build_table(
    kind: TableKind,
    name: &str,
    stars: &[Star],
    config: &TableConfig,
) -> Result<InvariantTable, IndexError> {
    match kind {
        TableKind::Angle => build_angle_table(name, stars, config),
        TableKind::DotAngle => build_dot_angle_table(name, stars, config),
        TableKind::PlanarTriangle | TableKind::SphericalTriangle => {
            build_triangle_table(name, kind, stars, config)
        }
        TableKind::AsterismHash => {
            build_asterism_tables(name, TableKind::AsterismCenter.default_name(), stars, config)
                .map(|(hashes, _)| hashes)
        }
        TableKind::AsterismCenter => {
            build_asterism_tables(TableKind::AsterismHash.default_name(), name, stars, config)
                .map(|(_, centers)| centers)
        }
    }
}

/// Build every table kind over the catalog's bright stars, under default names.
pub fn build_store(catalog: &StarCatalog, config: &TableConfig) -> Result<TableStore, IndexError> {
    let stars = catalog.all_bright();
    info!(
        "Building index tables over {} bright stars, fov {:.2} deg",
        stars.len(),
        config.fov
    );
    let mut store = TableStore::new();
    for kind in [
        TableKind::Angle,
        TableKind::DotAngle,
        TableKind::PlanarTriangle,
        TableKind::SphericalTriangle,
    ] {
        store.create(build_table(kind, kind.default_name(), &stars, config)?)?;
    }
    let (hashes, centers) = build_asterism_tables(
        TableKind::AsterismHash.default_name(),
        TableKind::AsterismCenter.default_name(),
        &stars,
        config,
    )?;
    store.create(hashes)?;
    store.create(centers)?;
    Ok(store)
}
