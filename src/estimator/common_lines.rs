//! Common-line matrix construction from polar Fourier transforms.
//!
//! For each pair `i<j` the half-circle rays of image `i` are correlated with
//! the full circle of image `j` over a bank of 1D shifts. All rays are
//! band-pass filtered and normalized first. Rays of the second half circle of
//! `j` are the conjugates of its stored rays, so a match there records
//! `cl[j][i] = l + n_theta/2`.

use rayon::prelude::*;
use tracing::info;

use crate::clmatrix::CommonLineMatrix;
use crate::pairs::PairIndex;
use crate::polar::{real_dot, real_dot_conj, PolarFourierStack, ShiftBank};
use crate::Complex;

/// The matrix together with per-pair diagnostics, in pair order.
#[derive(Debug, Clone)]
pub struct CommonLineSearch {
    pub clmatrix: CommonLineMatrix,
    /// Best correlation per pair.
    pub correlations: Vec<f64>,
    /// Shift (pixels) of image `j` at the best correlation, per pair.
    pub shifts: Vec<f64>,
}

/// Build the common-line matrix of a stack.
pub fn build_clmatrix(
    pf: &PolarFourierStack,
    max_shift: f64,
    shift_step: f64,
) -> anyhow::Result<CommonLineSearch> {
    let n = pf.n_images();
    let n_half = pf.n_half();
    let bank = ShiftBank::new(pf.n_rad(), max_shift, shift_step)?;
    let pair_index = PairIndex::new(n);
    info!(
        "Searching common lines of {} pairs over {} shifts",
        pair_index.len(),
        bank.len()
    );

    let rays: Vec<Vec<Vec<Complex>>> = (0..n)
        .into_par_iter()
        .map(|img| pf.normalized_half_rays(img, Some(&bank.filter)))
        .collect();

    let pairs: Vec<(usize, usize)> = pair_index.pairs().collect();
    let best: Vec<(usize, usize, f64, usize)> = pairs
        .par_iter()
        .map(|&(i, j)| best_common_line(&rays[i], &rays[j], &bank, n_half))
        .collect();

    let mut clmatrix = CommonLineMatrix::new(n, pf.n_theta());
    let mut correlations = Vec::with_capacity(best.len());
    let mut shifts = Vec::with_capacity(best.len());
    for (&(i, j), &(li, lj, corr, m)) in pairs.iter().zip(&best) {
        clmatrix.set(i, j, li);
        clmatrix.set(j, i, lj);
        correlations.push(corr);
        shifts.push(bank.shifts[m]);
    }
    Ok(CommonLineSearch {
        clmatrix,
        correlations,
        shifts,
    })
}

/// Exhaustive search for one pair. Returns `(l_i, l_j, correlation, shift)`.
fn best_common_line(
    rays_i: &[Vec<Complex>],
    rays_j: &[Vec<Complex>],
    bank: &ShiftBank,
    n_half: usize,
) -> (usize, usize, f64, usize) {
    let mut best = (0, 0, f64::NEG_INFINITY, 0);
    let mut shifted: Vec<Vec<Complex>> = rays_j.to_vec();
    for m in 0..bank.len() {
        for (dst, src) in shifted.iter_mut().zip(rays_j) {
            dst.copy_from_slice(src);
            bank.apply(m, dst);
        }
        for (li, a) in rays_i.iter().enumerate() {
            for (lj, b) in shifted.iter().enumerate() {
                let same = real_dot_conj(a, b);
                if same > best.2 {
                    best = (li, lj, same, m);
                }
                // Against conj(b): ray lj + n_half of image j
                let opposite = real_dot(a, b);
                if opposite > best.2 {
                    best = (li, lj + n_half, opposite, m);
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::SymmetryOrder;
    use crate::synthetic::{analytic_common_line, rotations_from_euler_deg, SymmetricVolume};

    fn circular_distance(a: f64, b: f64, n: f64) -> f64 {
        let d = (a - b).rem_euclid(n);
        d.min(n - d)
    }

    #[test]
    fn test_entries_have_documented_ranges() {
        let volume = SymmetricVolume::standard(SymmetryOrder::C3);
        let rots = rotations_from_euler_deg(&[(0.0, 40.0, 0.0), (70.0, 80.0, 20.0), (150.0, 110.0, 200.0)]);
        let pf = volume.polar_stack(&rots, 8, 36).unwrap();
        let search = build_clmatrix(&pf, 1.0, 1.0).unwrap();
        let cl = &search.clmatrix;
        assert_eq!(search.correlations.len(), 3);
        for i in 0..3 {
            assert_eq!(cl.entries()[i * 3 + i], -1);
            for j in i + 1..3 {
                assert!(cl.get(i, j) < 18);
                assert!(cl.get(j, i) < 36);
            }
        }
        assert!(search.shifts.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_finds_a_true_common_line() {
        // With C_n symmetry every pair has n genuine common lines, one per
        // group element; the search must land on one of them.
        for symmetry in [SymmetryOrder::C3, SymmetryOrder::C4] {
            let volume = SymmetricVolume::standard(symmetry);
            let rots = rotations_from_euler_deg(&[
                (30.0, 50.0, 10.0),
                (100.0, 75.0, 200.0),
                (215.0, 120.0, 65.0),
                (300.0, 35.0, 140.0),
            ]);
            let n_theta = 180;
            let pf = volume.polar_stack(&rots, 16, n_theta).unwrap();
            let search = build_clmatrix(&pf, 0.0, 1.0).unwrap();
            let cl = &search.clmatrix;
            let nt = n_theta as f64;

            for i in 0..rots.len() {
                for j in i + 1..rots.len() {
                    let (di, dj) = (cl.get(i, j) as f64, cl.get(j, i) as f64);
                    let best = symmetry
                        .group_elements()
                        .iter()
                        .map(|g| {
                            let (ai, aj) = analytic_common_line(&rots[i], &(g * rots[j]), n_theta);
                            let direct = circular_distance(ai, di, nt) + circular_distance(aj, dj, nt);
                            let flipped = circular_distance(ai + nt / 2.0, di, nt)
                                + circular_distance(aj + nt / 2.0, dj, nt);
                            direct.min(flipped)
                        })
                        .fold(f64::INFINITY, f64::min);
                    assert!(best <= 4.0, "{} pair ({}, {}) off by {} rays", symmetry, i, j, best);
                }
            }
            assert!(search.correlations.iter().all(|&c| c > 0.9));
        }
    }
}
