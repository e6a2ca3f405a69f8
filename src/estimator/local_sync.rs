//! Local J-synchronization of each pair.
//!
//! `Rii`, `Rjj` and `Rij` each carry their own handedness ambiguity. For every
//! pair we try the 8 combinations (transpose of `Rii` or not) × (J-conjugate
//! `Rii` or not) × (J-conjugate `Rjj` or not), symmetrize `Rij` over the group
//! with each, and keep the candidate whose singular values are closest to
//! `(1, 0, 0)`: the noiseless outer product `vi·vjᵀ` is exactly rank 1.

use anyhow::ensure;
use rayon::prelude::*;
use tracing::info;

use super::PairEstimate;
use crate::pairs::PairIndex;
use crate::rotation::{j_conjugate, matrix_power, singular_values};
use crate::symmetry::SymmetryOrder;
use crate::Matrix3;

/// `vii = (1/n)·Σ_{s<n} Rii^s` for every image.
pub fn self_outer_products(riis: &[Matrix3], symmetry: SymmetryOrder) -> Vec<Matrix3> {
    let n = symmetry.order();
    riis.iter()
        .map(|rii| (0..n).map(|s| matrix_power(rii, s)).sum::<Matrix3>() / n as f64)
        .collect()
}

/// Distance of the singular values of `m` from the rank-1 target `(1, 0, 0)`.
pub fn rank_one_score(m: &Matrix3) -> f64 {
    let sv = singular_values(m);
    ((sv[0] - 1.0).powi(2) + sv[1].powi(2) + sv[2].powi(2)).sqrt()
}

/// Best rank-1 symmetrization of one pair's `Rij`.
pub fn sync_pair(rij: &Matrix3, rii: &Matrix3, rjj: &Matrix3, symmetry: SymmetryOrder) -> Matrix3 {
    let rii_j = j_conjugate(rii);
    let rjj_j = j_conjugate(rjj);
    let options = [(rii, rjj), (&rii_j, rjj), (rii, &rjj_j), (&rii_j, &rjj_j)];

    let mut best = Matrix3::zeros();
    let mut best_score = f64::INFINITY;
    for transpose in [false, true] {
        for (a, b) in options {
            let a1 = if transpose { a.transpose() } else { *a };
            let candidate = symmetry.symmetrize(rij, &a1, b);
            let score = rank_one_score(&candidate);
            if score < best_score {
                best_score = score;
                best = candidate;
            }
        }
    }
    best
}

/// Local J-synchronization of all pairs.
///
/// Returns `(vijs, viis)`. Pairs without an `Rij` stay without a `vij`.
pub fn local_j_sync(
    rijs: &[PairEstimate],
    riis: &[Matrix3],
    symmetry: SymmetryOrder,
) -> anyhow::Result<(Vec<PairEstimate>, Vec<Matrix3>)> {
    let pair_index = PairIndex::new(riis.len());
    ensure!(
        rijs.len() == pair_index.len(),
        "expected {} relative rotations for {} images, got {}",
        pair_index.len(),
        riis.len(),
        rijs.len()
    );
    info!("Local J-synchronization of {} pairs", rijs.len());

    let pairs: Vec<(usize, usize)> = pair_index.pairs().collect();
    let vijs = pairs
        .par_iter()
        .zip(rijs.par_iter())
        .map(|(&(i, j), rij)| rij.map(|r| sync_pair(r, &riis[i], &riis[j], symmetry)))
        .collect();
    let viis = self_outer_products(riis, symmetry);
    Ok((vijs, viis))
}
