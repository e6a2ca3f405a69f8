//! Common-line index matrix.
//!
//! Entry `(i, j)` is the index of the ray in image `i` that best matches a ray
//! of image `j`. For `i < j` a matrix produced by [`build_clmatrix`] holds
//! `cl[i][j] ∈ [0, n_theta/2)` and `cl[j][i] ∈ [0, n_theta)`, both naming the
//! same oriented 3D direction. The diagonal is unused and stored as `-1`.
//!
//! [`build_clmatrix`]: crate::estimator::common_lines::build_clmatrix

use anyhow::ensure;
use rkyv::{Archive, Deserialize, Serialize};

/// Dense `n × n` table of common-line ray indices.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub struct CommonLineMatrix {
    n_images: usize,
    n_theta: usize,
    /// Row-major entries, `-1` on the diagonal.
    entries: Vec<i32>,
}

impl CommonLineMatrix {
    /// Matrix with every off-diagonal entry set to 0 and `-1` on the diagonal.
    pub fn new(n_images: usize, n_theta: usize) -> Self {
        let mut entries = vec![0; n_images * n_images];
        for i in 0..n_images {
            entries[i * n_images + i] = -1;
        }
        Self {
            n_images,
            n_theta,
            entries,
        }
    }

    /// Build from row-major entries, validating shape and range.
    ///
    /// Diagonal values are ignored and reset to `-1`.
    pub fn from_entries(n_images: usize, n_theta: usize, entries: Vec<i32>) -> anyhow::Result<Self> {
        ensure!(
            entries.len() == n_images * n_images,
            "clmatrix needs {} entries for {} images, got {}",
            n_images * n_images,
            n_images,
            entries.len()
        );
        let mut cl = Self {
            n_images,
            n_theta,
            entries,
        };
        for i in 0..n_images {
            cl.entries[i * n_images + i] = -1;
            for j in 0..n_images {
                if i == j {
                    continue;
                }
                let v = cl.entries[i * n_images + j];
                ensure!(
                    v >= 0 && (v as usize) < n_theta,
                    "clmatrix entry ({}, {}) = {} outside [0, {})",
                    i,
                    j,
                    v,
                    n_theta
                );
            }
        }
        Ok(cl)
    }

    /// Build from nested rows.
    pub fn from_rows(n_theta: usize, rows: &[Vec<i32>]) -> anyhow::Result<Self> {
        let n = rows.len();
        ensure!(
            rows.iter().all(|r| r.len() == n),
            "clmatrix rows must all have length {}",
            n
        );
        Self::from_entries(n, n_theta, rows.concat())
    }

    pub fn n_images(&self) -> usize {
        self.n_images
    }

    pub fn n_theta(&self) -> usize {
        self.n_theta
    }

    /// Ray index in image `i` of its common line with image `j` (`i != j`).
    pub fn get(&self, i: usize, j: usize) -> usize {
        debug_assert!(i != j, "clmatrix diagonal is undefined");
        self.entries[i * self.n_images + j] as usize
    }

    /// Set the ray index in image `i` of its common line with image `j`.
    pub fn set(&mut self, i: usize, j: usize, ray: usize) {
        assert!(i != j, "clmatrix diagonal is fixed at -1");
        assert!(ray < self.n_theta, "ray index {} out of range", ray);
        self.entries[i * self.n_images + j] = ray as i32;
    }

    /// Common-line angle `2π·cl[i][j] / n_theta` in radians.
    pub fn angle(&self, i: usize, j: usize) -> f64 {
        self.get(i, j) as f64 * 2.0 * std::f64::consts::PI / self.n_theta as f64
    }

    /// Row-major raw entries including the `-1` diagonal.
    pub fn entries(&self) -> &[i32] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_negative_diagonal() {
        let cl = CommonLineMatrix::new(3, 36);
        assert_eq!(cl.entries()[0], -1);
        assert_eq!(cl.entries()[4], -1);
        assert_eq!(cl.entries()[8], -1);
        assert_eq!(cl.get(0, 1), 0);
    }

    #[test]
    fn test_set_and_angle() {
        let mut cl = CommonLineMatrix::new(2, 36);
        cl.set(0, 1, 9);
        cl.set(1, 0, 27);
        assert_eq!(cl.get(0, 1), 9);
        assert!((cl.angle(0, 1) - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((cl.angle(1, 0) - 1.5 * std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn test_from_rows_validates() {
        let ok = CommonLineMatrix::from_rows(8, &[vec![5, 1], vec![7, 0]]).unwrap();
        assert_eq!(ok.entries(), &[-1, 1, 7, -1]);

        assert!(CommonLineMatrix::from_rows(8, &[vec![-1, 8], vec![0, -1]]).is_err());
        assert!(CommonLineMatrix::from_rows(8, &[vec![-1, 2, 3], vec![0, -1]]).is_err());
        assert!(CommonLineMatrix::from_entries(2, 8, vec![-1, 2, 3]).is_err());
    }
}
