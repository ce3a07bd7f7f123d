//! Triangle invariants over three star directions.
//!
//! Planar invariants treat the three unit vectors as points in space and measure the
//! flat triangle between them (chord lengths). Spherical invariants connect them with
//! great arcs. Side lengths and angles are in radians here; only [`dot_angle`] reports
//! degrees, matching the angle tables.

use crate::Vector3;

/// Chord lengths `|b1 - b2|`, `|b2 - b3|`, `|b3 - b1|`.
pub fn planar_lengths(b1: &Vector3, b2: &Vector3, b3: &Vector3) -> [f64; 3] {
    [(b1 - b2).norm(), (b2 - b3).norm(), (b3 - b1).norm()]
}

/// Great-arc lengths in radians, same order as [`planar_lengths`].
pub fn spherical_lengths(b1: &Vector3, b2: &Vector3, b3: &Vector3) -> [f64; 3] {
    [arc(b1, b2), arc(b2, b3), arc(b3, b1)]
}

fn arc(a: &Vector3, b: &Vector3) -> f64 {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Area of the flat triangle with vertices `b1, b2, b3`.
///
/// Equal to Heron's formula over the chord lengths, evaluated through the cross product
/// so that near-collinear trios give a small non-negative area instead of NaN.
pub fn planar_area(b1: &Vector3, b2: &Vector3, b3: &Vector3) -> f64 {
    0.5 * (b2 - b1).cross(&(b3 - b1)).norm()
}

/// Polar moment of the flat triangle: `area * (a^2 + b^2 + c^2) / 36`.
pub fn planar_moment(b1: &Vector3, b2: &Vector3, b3: &Vector3) -> f64 {
    let ell = planar_lengths(b1, b2, b3);
    planar_area(b1, b2, b3) * ell.iter().map(|l| l * l).sum::<f64>() / 36.0
}

/// Area (spherical excess, steradians) of the spherical triangle, by L'Huilier's formula.
///
/// Returns `Some(0.0)` when two vertices coincide and `None` when the formula has no
/// real solution.
pub fn spherical_area(b1: &Vector3, b2: &Vector3, b3: &Vector3) -> Option<f64> {
    if b1 == b2 || b2 == b3 || b3 == b1 {
        return Some(0.0);
    }
    let [a, b, c] = spherical_lengths(b1, b2, b3);
    let s = 0.5 * (a + b + c);
    let f = (0.5 * s).tan() * (0.5 * (s - a)).tan() * (0.5 * (s - b)).tan() * (0.5 * (s - c)).tan();
    if f.is_nan() || f < 0.0 {
        return None;
    }
    Some(4.0 * f.sqrt().atan())
}

/// Polar moment of the spherical triangle about its centroid.
///
/// The triangle is subdivided `depth` times into four children (three corner triangles
/// and the middle one, split at great-arc midpoints). Each leaf contributes its area
/// times the squared angle between the root centroid and the leaf centroid. Cost grows
/// as `4^depth`.
pub fn spherical_moment(b1: &Vector3, b2: &Vector3, b3: &Vector3, depth: u32) -> Option<f64> {
    let root = centroid(b1, b2, b3);
    let moment = recurse_moment(&root, [*b1, *b2, *b3], depth)?;
    if moment.is_nan() || moment < 0.0 {
        return None;
    }
    Some(moment)
}

fn recurse_moment(root: &Vector3, t: [Vector3; 3], depth: u32) -> Option<f64> {
    if depth == 0 {
        let theta = arc(root, &centroid(&t[0], &t[1], &t[2]));
        return spherical_area(&t[0], &t[1], &t[2]).map(|a| a * theta * theta);
    }
    let m01 = midpoint(&t[0], &t[1]);
    let m02 = midpoint(&t[0], &t[2]);
    let m12 = midpoint(&t[1], &t[2]);
    let children = [
        [t[0], m01, m02],
        [m01, t[1], m12],
        [m02, m12, t[2]],
        [m01, m02, m12],
    ];
    children
        .into_iter()
        .map(|c| recurse_moment(root, c, depth - 1))
        .sum()
}

/// Mean of the three vertices. Not normalized; only its direction is used.
fn centroid(b1: &Vector3, b2: &Vector3, b3: &Vector3) -> Vector3 {
    (b1 + b2 + b3) / 3.0
}

/// Great-arc midpoint of two unit vectors.
fn midpoint(a: &Vector3, b: &Vector3) -> Vector3 {
    (a + b).normalize()
}

/// Angle in degrees at `central` between the directions toward `b1` and `b2`, measured
/// after moving the origin to `central`.
pub fn dot_angle(b1: &Vector3, b2: &Vector3, central: &Vector3) -> f64 {
    let u = (b1 - central).normalize();
    let w = (b2 - central).normalize();
    arc(&u, &w).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::star::Star;
    use nalgebra::UnitQuaternion;

    fn v(ra: f64, dec: f64) -> Vector3 {
        Star::from_radec_deg(ra, dec).uvec()
    }

    #[test]
    fn planar_area_matches_heron() {
        let (a, b, c) = (v(10.0, 5.0), v(14.0, 6.0), v(11.0, 9.0));
        let [l1, l2, l3] = planar_lengths(&a, &b, &c);
        let s = 0.5 * (l1 + l2 + l3);
        let heron = (s * (s - l1) * (s - l2) * (s - l3)).sqrt();
        assert!((planar_area(&a, &b, &c) - heron).abs() < 1e-12);
    }

    #[test]
    fn invariants_ignore_vertex_order() {
        let (a, b, c) = (v(10.0, 5.0), v(14.0, 6.0), v(11.0, 9.0));
        let sa = spherical_area(&a, &b, &c).expect("valid area");
        let sm = spherical_moment(&a, &b, &c, 3).expect("valid moment");
        assert!((planar_area(&a, &b, &c) - planar_area(&c, &a, &b)).abs() < 1e-15);
        assert!((planar_moment(&a, &b, &c) - planar_moment(&b, &a, &c)).abs() < 1e-15);
        assert!((sa - spherical_area(&b, &c, &a).expect("valid area")).abs() < 1e-14);
        assert!((sm - spherical_moment(&b, &c, &a, 3).expect("valid moment")).abs() < 1e-12);
    }

    #[test]
    fn invariants_survive_rotation() {
        let (a, b, c) = (v(10.0, 5.0), v(14.0, 6.0), v(11.0, 9.0));
        let q = UnitQuaternion::from_euler_angles(0.3, -1.1, 2.0);
        let (ra, rb, rc) = (q * a, q * b, q * c);
        assert!((planar_area(&a, &b, &c) - planar_area(&ra, &rb, &rc)).abs() < 1e-14);
        let m0 = spherical_moment(&a, &b, &c, 2).expect("valid moment");
        let m1 = spherical_moment(&ra, &rb, &rc, 2).expect("valid moment");
        assert!((m0 - m1).abs() < 1e-12 * m0.max(1e-12));
    }

    #[test]
    fn octant_has_known_area() {
        let (x, y, z) = (Vector3::x(), Vector3::y(), Vector3::z());
        let area = spherical_area(&x, &y, &z).expect("valid area");
        assert!((area - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn duplicate_vertices_have_zero_area() {
        let (a, b) = (v(10.0, 5.0), v(14.0, 6.0));
        assert_eq!(spherical_area(&a, &a, &b), Some(0.0));
        assert!(planar_area(&a, &a, &b).abs() < 1e-15);
    }

    #[test]
    fn dot_angle_right_angle() {
        let c = Vector3::new(0.0, 0.0, 1.0);
        let b1 = Vector3::new(1.0, 0.0, 1.0).normalize();
        let b2 = Vector3::new(0.0, 1.0, 1.0).normalize();
        assert!((dot_angle(&b1, &b2, &c) - 90.0).abs() < 1e-9);
    }
}
