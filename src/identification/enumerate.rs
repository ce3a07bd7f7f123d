//! Deterministic subset enumeration over observed star indices.
//!
//! Every method walks the image in a fixed order so that runs are repeatable. Plain
//! k-subsets come out in lexicographic order (`i` outermost, then `j = i + dj`,
//! `k = j + dk`, ...). The pyramid methods use their own offset-major order, which keeps
//! the last image star out of every trio so it can act as a witness.

/// Orderings of three items, identity first.
pub const PERMUTATIONS_3: [[usize; 3]; 6] = [
    [0, 1, 2],
    [0, 2, 1],
    [1, 0, 2],
    [1, 2, 0],
    [2, 0, 1],
    [2, 1, 0],
];

/// Lexicographic `K`-subsets of `0..n`, each strictly increasing.
#[derive(Debug, Clone)]
pub struct Combinations<const K: usize> {
    n: usize,
    next: Option<[usize; K]>,
}

impl<const K: usize> Combinations<K> {
    pub fn new(n: usize) -> Self {
        let next = (K > 0 && n >= K).then(|| std::array::from_fn(|i| i));
        Self { n, next }
    }
}

impl<const K: usize> Iterator for Combinations<K> {
    type Item = [usize; K];

    fn next(&mut self) -> Option<[usize; K]> {
        let current = self.next?;

        // Advance the rightmost position that still has room, then reset the tail.
        let mut successor = current;
        let mut pos = K;
        while pos > 0 {
            pos -= 1;
            if successor[pos] < self.n - K + pos {
                successor[pos] += 1;
                for t in pos + 1..K {
                    successor[t] = successor[t - 1] + 1;
                }
                self.next = Some(successor);
                return Some(current);
            }
        }
        self.next = None;
        Some(current)
    }
}

/// Pyramid trio order: `for dj in 1..n-1, dk in 1..n-dj-1, di in 0..n-dj-dk-1`, yielding
/// `(di, di + dj, di + dj + dk)`.
#[derive(Debug, Clone)]
pub struct PyramidTrios {
    n: usize,
    dj: usize,
    dk: usize,
    di: usize,
}

impl PyramidTrios {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            dj: 1,
            dk: 1,
            di: 0,
        }
    }
}

impl Iterator for PyramidTrios {
    type Item = [usize; 3];

    fn next(&mut self) -> Option<[usize; 3]> {
        let n = self.n;
        if n < 3 {
            return None;
        }
        while self.dj < n - 1 {
            while self.dk < n - self.dj - 1 {
                if self.di < n - self.dj - self.dk - 1 {
                    let i = self.di;
                    let j = i + self.dj;
                    let k = j + self.dk;
                    self.di += 1;
                    return Some([i, j, k]);
                }
                self.dk += 1;
                self.di = 0;
            }
            self.dj += 1;
            self.dk = 1;
            self.di = 0;
        }
        None
    }
}
