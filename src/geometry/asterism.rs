//! Four-star asterism hash.
//!
//! The four directions are projected gnomonically onto the plane tangent at their mean
//! direction. The two stars farthest apart become `A` and `B`, and a similarity
//! transform sends `A` to `(0, 0)` and `B` to `(1, 1)`. The remaining stars `C` and `D`
//! must land inside the circle with diameter `AB`; their coordinates `(cx, cy, dx, dy)`
//! are the code. Symmetry is broken by requiring `cx + dx <= 1` (otherwise `A` and `B`
//! swap) and `cx <= dx` (otherwise `C` and `D` swap).
//!
//! The code is invariant to rotation of the sphere and to the order in which the four
//! stars are given.

use crate::star::Star;
use crate::Vector3;

/// Hash code of a well-formed asterism.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsterismHash {
    /// Input positions of `A`, `B`, `C` and `D`.
    pub order: [usize; 4],
    /// `[cx, cy, dx, dy]`.
    pub code: [f64; 4],
}

impl AsterismHash {
    /// The input stars rearranged into canonical `A, B, C, D` order.
    pub fn arrange<T: Copy>(&self, items: &[T; 4]) -> [T; 4] {
        self.order.map(|i| items[i])
    }
}

// Complex arithmetic on (re, im) pairs; only what the similarity map needs.
type C2 = (f64, f64);

fn sub(a: C2, b: C2) -> C2 {
    (a.0 - b.0, a.1 - b.1)
}

fn mul(a: C2, b: C2) -> C2 {
    (a.0 * b.0 - a.1 * b.1, a.0 * b.1 + a.1 * b.0)
}

fn div(a: C2, b: C2) -> C2 {
    let d = b.0 * b.0 + b.1 * b.1;
    ((a.0 * b.0 + a.1 * b.1) / d, (a.1 * b.0 - a.0 * b.1) / d)
}

/// Unit mean direction of the given stars, or the null star if they cancel out.
pub fn center(stars: &[Star]) -> Star {
    let sum: Vector3 = stars.iter().map(Star::uvec).sum();
    let n = sum.norm();
    if n == 0.0 || !n.is_finite() {
        return Star::null();
    }
    Star::from_vector(&(sum / n))
}

/// Right-handed basis `(e1, e2, e3)` with `e3 = axis`.
fn tangent_basis(axis: &Vector3) -> (Vector3, Vector3) {
    let helper = if axis.x.abs() <= axis.y.abs() && axis.x.abs() <= axis.z.abs() {
        Vector3::x()
    } else if axis.y.abs() <= axis.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let e1 = helper.cross(axis).normalize();
    let e2 = axis.cross(&e1);
    (e1, e2)
}

/// Hash the four stars, or `None` when they do not form a well-formed asterism (a star
/// outside the `AB` circle, a star on the far hemisphere, or degenerate geometry).
pub fn hash(stars: &[Star; 4]) -> Option<AsterismHash> {
    let axis = center(stars);
    if axis.is_null() {
        return None;
    }
    let e3 = axis.uvec();
    let (e1, e2) = tangent_basis(&e3);

    let mut plane = [(0.0, 0.0); 4];
    for (p, s) in plane.iter_mut().zip(stars.iter()) {
        let u = s.uvec();
        let w = u.dot(&e3);
        if w <= 0.0 || !w.is_finite() {
            return None;
        }
        *p = (u.dot(&e1) / w, u.dot(&e2) / w);
    }

    // farthest pair, first maximum in lexicographic pair order
    let mut best = (0, 1, -1.0);
    for i in 0..4 {
        for j in i + 1..4 {
            let d = sub(plane[i], plane[j]);
            let d2 = d.0 * d.0 + d.1 * d.1;
            if d2 > best.2 {
                best = (i, j, d2);
            }
        }
    }
    let (mut a, mut b, span) = best;
    if span <= 0.0 || !span.is_finite() {
        return None;
    }
    let mut rest = (0..4).filter(|&k| k != a && k != b);
    let (mut c, mut d) = (rest.next()?, rest.next()?);

    let ab = sub(plane[b], plane[a]);
    let to_code = |p: C2| mul(div(sub(p, plane[a]), ab), (1.0, 1.0));
    let mut pc = to_code(plane[c]);
    let mut pd = to_code(plane[d]);

    let inside = |p: C2| (p.0 - 0.5).powi(2) + (p.1 - 0.5).powi(2) <= 0.5;
    if !inside(pc) || !inside(pd) {
        return None;
    }

    if pc.0 + pd.0 > 1.0 {
        std::mem::swap(&mut a, &mut b);
        pc = (1.0 - pc.0, 1.0 - pc.1);
        pd = (1.0 - pd.0, 1.0 - pd.1);
    }
    if pc.0 > pd.0 {
        std::mem::swap(&mut c, &mut d);
        std::mem::swap(&mut pc, &mut pd);
    }

    let code = [pc.0, pc.1, pd.0, pd.1];
    if code.iter().any(|x| !x.is_finite()) {
        return None;
    }
    Some(AsterismHash {
        order: [a, b, c, d],
        code,
    })
}
