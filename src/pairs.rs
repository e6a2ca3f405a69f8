//! Pair and triple indexing over a set of `n` images.
//!
//! Arrays "indexed by pair" (`Rijs`, `vijs`, power-method signs) share one
//! lexicographic order: `(0,1), (0,2), …, (0,n-1), (1,2), …, (n-2,n-1)`.
//! [`PairIndex`] maps `(i, j)` to its slot in closed form.

/// Number of unordered pairs among `n` items.
pub fn num_pairs(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Closed-form lexicographic pair indexing for `n` images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairIndex {
    n: usize,
}

impl PairIndex {
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    /// Number of images.
    pub fn n_images(&self) -> usize {
        self.n
    }

    /// Number of pairs, `n·(n-1)/2`.
    pub fn len(&self) -> usize {
        num_pairs(self.n)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slot of the unordered pair `{i, j}`. Order of the arguments does not matter.
    ///
    /// Panics if `i == j` or either index is out of range.
    pub fn index(&self, i: usize, j: usize) -> usize {
        assert!(i != j, "pair index requires distinct images, got ({}, {})", i, j);
        let (a, b) = if i < j { (i, j) } else { (j, i) };
        assert!(b < self.n, "image index {} out of range for {} images", b, self.n);
        // Pairs whose first element precedes `a`, then the offset within row `a`.
        a * self.n - a * (a + 1) / 2 + (b - a - 1)
    }

    /// Inverse of [`index`](Self::index).
    pub fn pair(&self, idx: usize) -> (usize, usize) {
        assert!(idx < self.len(), "pair slot {} out of range", idx);
        let mut a = 0;
        let mut start = 0;
        loop {
            let row = self.n - a - 1;
            if idx < start + row {
                return (a, a + 1 + (idx - start));
            }
            start += row;
            a += 1;
        }
    }

    /// All pairs `i < j` in slot order.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.n).flat_map(move |i| (i + 1..self.n).map(move |j| (i, j)))
    }

    /// All triples `i < j < k` in lexicographic order.
    pub fn triples(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let n = self.n;
        (0..n).flat_map(move |i| {
            (i + 1..n).flat_map(move |j| (j + 1..n).map(move |k| (i, j, k)))
        })
    }
}
