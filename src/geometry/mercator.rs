//! Mercator projection of the sphere onto a `w x w` square centred at the origin.
//!
//! Longitude maps linearly onto `x` in `[-w/2, w/2]`. Latitude maps onto `y` with the
//! sign flipped (north is negative `y`) and is clamped to the square, so everything
//! above roughly 85 degrees of latitude lands on the top or bottom edge.

use std::f64::consts::{FRAC_PI_4, PI};

use crate::star::Star;

/// Extra angular slack, in degrees, added around search boxes.
const BOX_MARGIN_DEG: f64 = 1e-6;

/// A point on the projected square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorPoint {
    pub x: f64,
    pub y: f64,
}

/// Closed axis-aligned box on the projected square.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundingBox {
    /// The whole `w x w` square.
    pub fn square(w: f64) -> Self {
        Self::centered(0.0, 0.0, w)
    }

    /// Square of side `width` around `(cx, cy)`.
    pub fn centered(cx: f64, cy: f64, width: f64) -> Self {
        let h = 0.5 * width;
        Self {
            x_min: cx - h,
            x_max: cx + h,
            y_min: cy - h,
            y_max: cy + h,
        }
    }

    pub fn contains(&self, p: &MercatorPoint) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.x_min <= other.x_max
            && other.x_min <= self.x_max
            && self.y_min <= other.y_max
            && other.y_min <= self.y_max
    }
}

fn x_of(lon_deg: f64, w: f64) -> f64 {
    (lon_deg + 180.0) * w / 360.0 - 0.5 * w
}

fn y_of(lat_deg: f64, w: f64) -> f64 {
    // infinite at the poles, clamped onto the edges
    let y = -w * (FRAC_PI_4 + 0.5 * lat_deg.to_radians()).tan().ln() / (2.0 * PI);
    y.clamp(-0.5 * w, 0.5 * w)
}

/// Project a star onto the square of side `w`.
pub fn project(star: &Star, w: f64) -> MercatorPoint {
    let lon = star.v[1].atan2(star.v[0]).to_degrees();
    MercatorPoint {
        x: x_of(lon, w),
        y: y_of(star.dec_deg(), w),
    }
}

/// Projected width spanned by `theta_deg` degrees of longitude.
pub fn width_given_angle(theta_deg: f64, w: f64) -> f64 {
    theta_deg / 360.0 * w
}

/// Boxes on the square that together cover every direction within `radius_deg` of
/// `focus`.
///
/// The cover is conservative: it may include points outside the cap, never the
/// reverse. A cap crossing the +/-180 degree meridian yields two boxes; a cap holding a
/// pole spans the full longitude range.
pub fn search_boxes(focus: &Star, radius_deg: f64, w: f64) -> Vec<BoundingBox> {
    let r = radius_deg + BOX_MARGIN_DEG;
    if !r.is_finite() || r >= 90.0 {
        return vec![BoundingBox::square(w)];
    }
    let lat0 = focus.dec_deg();
    let lon0 = focus.v[1].atan2(focus.v[0]).to_degrees();
    let lat_hi = lat0 + r;
    let lat_lo = lat0 - r;

    // y decreases with latitude
    let y_min = y_of(lat_hi.min(90.0), w);
    let y_max = y_of(lat_lo.max(-90.0), w);
    let full = |x_min: f64, x_max: f64| BoundingBox {
        x_min,
        x_max,
        y_min,
        y_max,
    };

    if lat_hi >= 90.0 || lat_lo <= -90.0 {
        return vec![full(-0.5 * w, 0.5 * w)];
    }
    let s = r.to_radians().sin() / lat0.to_radians().cos();
    if s >= 1.0 {
        return vec![full(-0.5 * w, 0.5 * w)];
    }
    let dlon = s.asin().to_degrees() + BOX_MARGIN_DEG;
    if dlon >= 180.0 {
        return vec![full(-0.5 * w, 0.5 * w)];
    }

    let (lon_lo, lon_hi) = (lon0 - dlon, lon0 + dlon);
    if lon_lo < -180.0 {
        vec![
            full(x_of(lon_lo + 360.0, w), 0.5 * w),
            full(-0.5 * w, x_of(lon_hi, w)),
        ]
    } else if lon_hi > 180.0 {
        vec![
            full(x_of(lon_lo, w), 0.5 * w),
            full(-0.5 * w, x_of(lon_hi - 360.0, w)),
        ]
    } else {
        vec![full(x_of(lon_lo, w), x_of(lon_hi, w))]
    }
}
