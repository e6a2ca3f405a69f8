//! Global J-synchronization.
//!
//! After local synchronization each `vij` may still be J-conjugated relative
//! to the others. For every triple `i<j<k` exactly one of four handedness
//! hypotheses makes `vij·vjk ≈ vik`; it fixes the relative signs of the three
//! edges `{ij, jk}`, `{ik, jk}`, `{ij, ik}`. These signs define a symmetric
//! `C(n,2) × C(n,2)` matrix whose leading eigenvector, found by power
//! iteration without ever forming the matrix, carries a consistent sign per
//! pair. Each `vii` is then matched to the synchronized `vij`s by vote.

use anyhow::ensure;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::PairEstimate;
use crate::pairs::PairIndex;
use crate::rotation::j_conjugate;
use crate::Matrix3;

/// Edge signs `(s_ij_jk, s_ik_jk, s_ij_ik)` for each of the four hypotheses:
/// nothing flipped, `vij` flipped, `vjk` flipped, `vik` flipped.
const HYPOTHESIS_SIGNS: [[f64; 3]; 4] = [
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, -1.0],
];

/// Convergence record of the sign power method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerMethodStats {
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the change of the iterate dropped below the tolerance.
    pub converged: bool,
    /// Norm of the last change of the iterate.
    pub residual: f64,
}

/// Pair slots of one triple together with its winning edge signs.
#[derive(Debug, Clone, Copy)]
struct TripleSigns {
    ij: usize,
    jk: usize,
    ik: usize,
    signs: [f64; 3],
}

/// Winning hypothesis for every triple whose three `vij` are all estimated.
fn triple_signs(vijs: &[PairEstimate], pair_index: &PairIndex) -> Vec<TripleSigns> {
    let triples: Vec<(usize, usize, usize)> = pair_index.triples().collect();
    triples
        .par_iter()
        .filter_map(|&(i, j, k)| {
            let ij = pair_index.index(i, j);
            let jk = pair_index.index(j, k);
            let ik = pair_index.index(i, k);
            let vij = vijs[ij].as_matrix()?;
            let vjk = vijs[jk].as_matrix()?;
            let vik = vijs[ik].as_matrix()?;

            let residuals = [
                (vij * vjk - vik).norm(),
                (j_conjugate(vij) * vjk - vik).norm(),
                (vij * j_conjugate(vjk) - vik).norm(),
                (vij * vjk - j_conjugate(vik)).norm(),
            ];
            let mut best = 0;
            for h in 1..4 {
                if residuals[h] < residuals[best] {
                    best = h;
                }
            }
            Some(TripleSigns {
                ij,
                jk,
                ik,
                signs: HYPOTHESIS_SIGNS[best],
            })
        })
        .collect()
}

/// One multiply by the implicit signed adjacency matrix.
fn signs_times_vector(triples: &[TripleSigns], v: &[f64]) -> Vec<f64> {
    triples
        .par_iter()
        .fold(
            || vec![0.0; v.len()],
            |mut acc, t| {
                let [s_ij_jk, s_ik_jk, s_ij_ik] = t.signs;
                acc[t.ij] += s_ij_jk * v[t.jk] + s_ij_ik * v[t.ik];
                acc[t.jk] += s_ij_jk * v[t.ij] + s_ik_jk * v[t.ik];
                acc[t.ik] += s_ij_ik * v[t.ij] + s_ik_jk * v[t.jk];
                acc
            },
        )
        .reduce(
            || vec![0.0; v.len()],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                a
            },
        )
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Relative handedness sign (`±1`) of every `vij`, from the leading
/// eigenvector of the triple-consistency sign matrix.
///
/// The start vector is a normalized standard-normal draw from `rng`. A zero
/// iterate (no informative triple) stops the iteration unconverged and all
/// signs default to `+1`.
pub fn power_method_signs<R: Rng + ?Sized>(
    vijs: &[PairEstimate],
    n_images: usize,
    tolerance: f64,
    max_iterations: usize,
    rng: &mut R,
) -> anyhow::Result<(Vec<f64>, PowerMethodStats)> {
    let pair_index = PairIndex::new(n_images);
    ensure!(
        vijs.len() == pair_index.len(),
        "expected {} vijs for {} images, got {}",
        pair_index.len(),
        n_images,
        vijs.len()
    );

    let triples = triple_signs(vijs, &pair_index);
    debug!("{} informative triples", triples.len());

    let mut v: Vec<f64> = (0..vijs.len())
        .map(|_| StandardNormal.sample(&mut *rng))
        .collect();
    let n0 = norm(&v);
    if n0 > 0.0 {
        v.iter_mut().for_each(|x| *x /= n0);
    }

    let mut stats = PowerMethodStats {
        iterations: 0,
        converged: false,
        residual: f64::INFINITY,
    };
    while stats.iterations < max_iterations {
        let mut next = signs_times_vector(&triples, &v);
        let n = norm(&next);
        if n == 0.0 {
            warn!("Power method iterate vanished; no triple carries sign information");
            v.iter_mut().for_each(|x| *x = 1.0);
            break;
        }
        next.iter_mut().for_each(|x| *x /= n);
        stats.iterations += 1;
        stats.residual = next
            .iter()
            .zip(&v)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f64>()
            .sqrt();
        v = next;
        if stats.residual <= tolerance {
            stats.converged = true;
            break;
        }
    }

    if stats.converged {
        info!("Power method converged after {} iterations", stats.iterations);
    } else if stats.iterations == max_iterations {
        warn!(
            "Power method stopped at the {} iteration cap (residual {:.3e})",
            max_iterations, stats.residual
        );
    }

    let signs = v.iter().map(|&x| if x < 0.0 { -1.0 } else { 1.0 }).collect();
    Ok((signs, stats))
}

/// Handedness vote for `vii` against its synchronized neighbours: `true` when
/// `J·vii·J` fits them better than `vii`.
fn vii_needs_flip(i: usize, vii: &Matrix3, vijs: &[PairEstimate], pair_index: &PairIndex) -> bool {
    let vii_j = j_conjugate(vii);
    let mut consensus = 0_i64;
    for j in 0..pair_index.n_images() {
        if j == i {
            continue;
        }
        let Some(v) = vijs[pair_index.index(i, j)].as_matrix() else {
            continue;
        };
        // For j < i the stored matrix is vji and vii acts from the right.
        let (e1, e2) = if j < i {
            ((v * vii - v).norm(), (v * vii_j - v).norm())
        } else {
            ((vii * v - v).norm(), (vii_j * v - v).norm())
        };
        consensus += if e1 < e2 { -1 } else { 1 };
    }
    consensus > 0
}

/// Bring all `vijs` and `viis` to one common handedness.
pub fn global_j_sync<R: Rng + ?Sized>(
    vijs: &[PairEstimate],
    viis: &[Matrix3],
    tolerance: f64,
    max_iterations: usize,
    rng: &mut R,
) -> anyhow::Result<(Vec<PairEstimate>, Vec<Matrix3>, PowerMethodStats)> {
    let n_images = viis.len();
    let pair_index = PairIndex::new(n_images);
    ensure!(
        vijs.len() == pair_index.len(),
        "there must be n_images-choose-2 = {} vijs, got {}",
        pair_index.len(),
        vijs.len()
    );

    let (signs, stats) = power_method_signs(vijs, n_images, tolerance, max_iterations, rng)?;
    let synced: Vec<PairEstimate> = vijs
        .iter()
        .zip(&signs)
        .map(|(v, &s)| if s < 0.0 { v.map(j_conjugate) } else { *v })
        .collect();
    let n_flipped = signs.iter().filter(|&&s| s < 0.0).count();

    let mut n_vii_flipped = 0;
    let synced_viis = viis
        .iter()
        .enumerate()
        .map(|(i, vii)| {
            if vii_needs_flip(i, vii, &synced, &pair_index) {
                n_vii_flipped += 1;
                j_conjugate(vii)
            } else {
                *vii
            }
        })
        .collect();
    info!(
        "Global J-sync flipped {} of {} vijs and {} of {} viis",
        n_flipped,
        synced.len(),
        n_vii_flipped,
        n_images
    );
    Ok((synced, synced_viis, stats))
}
