//! CSV catalog table: one row per star as `alpha, delta, i, j, k, m, label`.
//!
//! `alpha` and `delta` are in degrees and `(i, j, k)` is the unit direction. The table
//! carries both so it can be inspected by hand; the direction is authoritative when
//! reading. An empty `m` column means the magnitude is unknown.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::star::{Label, Star};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CatalogRow {
    alpha: f64,
    delta: f64,
    i: f64,
    j: f64,
    k: f64,
    m: Option<f64>,
    label: Label,
}

impl From<&CatalogRow> for Star {
    fn from(row: &CatalogRow) -> Self {
        let star = Star::new(row.i, row.j, row.k).normalized().with_label(row.label);
        match row.m {
            Some(m) => star.with_magnitude(m),
            None => star,
        }
    }
}

/// Read a catalog table with a header row.
pub fn read_catalog_table<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Star>> {
    let mut rdr = csv::Reader::from_path(path)?;
    rdr.deserialize::<CatalogRow>()
        .map(|row| Ok(Star::from(&row?)))
        .collect()
}

/// Write stars as a catalog table. Unlabeled stars are rejected.
pub fn write_catalog_table<P: AsRef<Path>>(path: P, stars: &[Star]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for star in stars {
        let label = star
            .label
            .ok_or_else(|| anyhow::anyhow!("cannot write unlabeled star {:?}", star.v))?;
        wtr.serialize(CatalogRow {
            alpha: star.ra_deg(),
            delta: star.dec_deg(),
            i: star.v[0],
            j: star.v[1],
            k: star.v[2],
            m: star.magnitude,
            label,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_file_round_trip() {
        let path = std::env::temp_dir().join(format!("hoku-catalog-{}.csv", std::process::id()));
        let stars = vec![
            Star::from_radec_deg(10.0, 20.0).with_label(5).with_magnitude(3.5),
            Star::from_radec_deg(200.0, -45.0).with_label(9),
        ];
        write_catalog_table(&path, &stars).expect("write table");
        let back = read_catalog_table(&path).expect("read table");
        let _ = std::fs::remove_file(&path);

        assert_eq!(back, stars);
        assert_eq!(back[0].label, Some(5));
        assert_eq!(back[0].magnitude, Some(3.5));
        assert_eq!(back[1].magnitude, None);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_catalog_table("/nonexistent/hoku/catalog.csv").is_err());
    }

    #[test]
    fn unlabeled_star_is_rejected() {
        let path = std::env::temp_dir().join(format!("hoku-unlabeled-{}.csv", std::process::id()));
        let result = write_catalog_table(&path, &[Star::new(0.0, 0.0, 1.0)]);
        let _ = std::fs::remove_file(&path);
        assert!(result.is_err());
    }
}
