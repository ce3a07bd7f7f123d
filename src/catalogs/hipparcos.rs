//! Reader for the Hipparcos new reduction (I/311, `hip2.dat`).
//!
//! Only the columns needed to place a star on the sky are kept: identifier,
//! astrometry at J1991.25, proper motion, and photometry for a V magnitude.
//! The catalog can be downloaded from
//! <http://cdsarc.u-strasbg.fr/ftp/I/311/hip2.dat.gz>.

use crate::star::Star;

/// Hipparcos reference epoch, J1991.25.
const HIPPARCOS_EPOCH_YEAR: f64 = 1991.25;

/// Milliarcseconds per year to radians per year.
const MAS_PER_YR_TO_RAD_PER_YR: f64 = std::f64::consts::PI / (180.0 * 3600.0 * 1000.0);

/// Shortest record that still carries the B-V colour column.
const MIN_RECORD_LEN: usize = 158;

/// One Hipparcos entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HipparcosStar {
    pub hip: u32,
    pub ra_rad: f64,
    pub dec_rad: f64,
    /// Proper motion in RA, `mu_alpha * cos(delta)`, mas/yr.
    pub pm_ra: f64,
    /// Proper motion in declination, mas/yr.
    pub pm_dec: f64,
    pub hpmag: f64,
    pub b_v: f64,
}

impl HipparcosStar {
    /// Johnson V from Hp and B-V (ESA SP-1200, Vol. 1, Table 1.3.5).
    pub fn hp_to_v(&self) -> f64 {
        let b = self.b_v;
        self.hpmag - (0.304 * b - 0.202 * b * b + 0.107 * b.powi(3) - 0.045 * b.powi(4))
    }

    /// Labeled unit [`Star`], with proper motion applied up to `epoch_year` when given.
    ///
    /// Proper motion is skipped for |dec| above ~87 degrees where the RA term diverges.
    pub fn to_star(&self, epoch_year: Option<f64>) -> Star {
        let (ra, dec) = match epoch_year {
            Some(year) => {
                let dt = year - HIPPARCOS_EPOCH_YEAR;
                let cos_dec = self.dec_rad.cos();
                if cos_dec.abs() > 0.05 {
                    (
                        self.ra_rad + self.pm_ra * MAS_PER_YR_TO_RAD_PER_YR / cos_dec * dt,
                        self.dec_rad + self.pm_dec * MAS_PER_YR_TO_RAD_PER_YR * dt,
                    )
                } else {
                    (self.ra_rad, self.dec_rad)
                }
            }
            None => (self.ra_rad, self.dec_rad),
        };

        Star::from_radec_deg(ra.to_degrees(), dec.to_degrees())
            .with_label(self.hip)
            .with_magnitude(self.hp_to_v())
    }
}

fn column<T: std::str::FromStr>(record: &str, from: usize, to: usize) -> Option<T> {
    record.get(from..to)?.trim().parse().ok()
}

/// Parse one fixed-width record. Entries without a position are skipped.
fn parse_hipparcos_star(record: &str) -> Option<HipparcosStar> {
    if record.len() < MIN_RECORD_LEN {
        return None;
    }

    Some(HipparcosStar {
        hip: column(record, 0, 6)?,
        ra_rad: column(record, 15, 28)?,
        dec_rad: column(record, 29, 42)?,
        pm_ra: column(record, 51, 59).unwrap_or(0.0),
        pm_dec: column(record, 60, 68).unwrap_or(0.0),
        hpmag: column(record, 129, 136)?,
        b_v: column(record, 152, 158).unwrap_or(0.0),
    })
}

/// Load the Hipparcos catalog from an in-memory string.
pub fn load_hipparcos_catalog(data: &str) -> Vec<HipparcosStar> {
    data.lines().filter_map(parse_hipparcos_star).collect()
}

pub fn load_hipparcos_catalog_from_file<P: AsRef<std::path::Path>>(
    path: P,
) -> anyhow::Result<Vec<HipparcosStar>> {
    let data = std::fs::read_to_string(path)?;
    Ok(load_hipparcos_catalog(&data))
}
