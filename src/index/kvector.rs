//! K-vector rank side-table over a sorted column.
//!
//! For `n` sorted values a line `z(j) = m * j + q` is laid from just below the smallest
//! value to just above the largest, and `k[j]` records how many values are `<= z(j)`.
//! A range `[a, b]` then maps to a candidate slice with two multiplications, and a
//! short binary search inside that slice trims it to the exact answer.

use std::ops::Range;

use rkyv::{Archive, Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct KVector {
    m: f64,
    q: f64,
    k: Vec<u32>,
}

impl KVector {
    /// Build over `sorted`, which must be ascending and finite.
    pub fn build(sorted: &[f64]) -> Self {
        let n = sorted.len();
        if n < 2 {
            return Self {
                m: 1.0,
                q: 0.0,
                k: vec![n as u32; n],
            };
        }
        let (ymin, ymax) = (sorted[0], sorted[n - 1]);
        let xi = f64::EPSILON * ymin.abs().max(ymax.abs()).max(1.0);
        let m = (ymax - ymin + 2.0 * xi) / (n - 1) as f64;
        let q = ymin - xi;

        let mut k = Vec::with_capacity(n);
        let mut count = 0;
        for j in 0..n {
            let z = m * j as f64 + q;
            while count < n && sorted[count] <= z {
                count += 1;
            }
            k.push(count as u32);
        }
        // the last step sits above ymax by construction; rounding must not lose it
        if let Some(last) = k.last_mut() {
            *last = n as u32;
        }
        Self { m, q, k }
    }

    pub fn len(&self) -> usize {
        self.k.len()
    }

    pub fn is_empty(&self) -> bool {
        self.k.is_empty()
    }

    /// Rows of `sorted` with values in the closed interval `[lo, hi]`.
    ///
    /// `sorted` must be the column this side-table was built from. NaN bounds or
    /// `lo > hi` give an empty range.
    pub fn range(&self, sorted: &[f64], lo: f64, hi: f64) -> Range<usize> {
        let n = self.k.len();
        if n == 0 || lo.is_nan() || hi.is_nan() || lo > hi {
            return 0..0;
        }
        let last = (n - 1) as f64;
        // saturating casts; out-of-range steps clamp to the table ends
        let j_lo = ((lo - self.q) / self.m).floor().clamp(0.0, last) as usize;
        let j_hi = (((hi - self.q) / self.m).ceil() + 1.0).clamp(0.0, last) as usize;
        let start = if j_lo == 0 { 0 } else { self.k[j_lo - 1] as usize };
        let end = (self.k[j_hi] as usize).max(start);

        let slice = &sorted[start..end];
        let a = start + slice.partition_point(|v| *v < lo);
        let b = start + slice.partition_point(|v| *v <= hi);
        a..b.max(a)
    }
}
