//! Pairwise common-line voting and relative rotation estimation.
//!
//! For a pair `(i, j)` every other image `k` closes a spherical triangle with
//! the three common lines among `i`, `j`, `k`. The in-plane angles between the
//! common lines of each image determine the dihedral angle `γ` between the
//! planes of `i` and `j`. Witnesses are histogrammed by `γ` with Gaussian
//! smoothing; the ones near the peak each yield an `Rij` estimate, and the
//! estimates are averaged and projected back onto SO(3).

use rayon::prelude::*;
use tracing::{info, warn};

use super::PairEstimate;
use crate::clmatrix::CommonLineMatrix;
use crate::pairs::PairIndex;
use crate::rotation::{euler_zyz, nearest_rotation};
use crate::Matrix3;

/// Triangles this close to degenerate (collinear lines) cast no vote.
const DEGENERATE_TRIANGLE_TOL: f64 = 1e-5;

/// A witness that survived the vote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Witness {
    /// Index of the third image.
    pub k: usize,
    /// Cosine of the dihedral angle between the planes of `i` and `j`.
    pub cos_gamma: f64,
}

/// Cosine of the angle between the planes of images `i` and `j` implied by
/// witness `k`, or `None` if the three common lines are (nearly) coplanar.
pub fn triangle_cos_gamma(cl: &CommonLineMatrix, i: usize, j: usize, k: usize) -> Option<f64> {
    let step = 2.0 * std::f64::consts::PI / cl.n_theta() as f64;
    let angle = |a: usize, b: usize| (a as f64 - b as f64) * step;

    let theta_i = angle(cl.get(i, k), cl.get(i, j));
    let theta_j = angle(cl.get(j, k), cl.get(j, i));
    let theta_k = angle(cl.get(k, j), cl.get(k, i));
    let (ci, cj, ck) = (theta_i.cos(), theta_j.cos(), theta_k.cos());

    let cond = 1.0 + 2.0 * ci * cj * ck - (ci * ci + cj * cj + ck * ck);
    if cond <= DEGENERATE_TRIANGLE_TOL {
        return None;
    }
    let cos_gamma = (ck - ci * cj) / (theta_i.sin() * theta_j.sin());
    Some(cos_gamma.clamp(-1.0, 1.0))
}

/// Vote among all witnesses of pair `(i, j)` and return those consistent with
/// the histogram peak.
///
/// The histogram has `bins` tics evenly spaced over [0°, 180°] (both ends
/// included); each witness adds a Gaussian of width `sigma_deg` centred on
/// its angle. Witnesses within `360°/bins` of the peak tic are kept.
pub fn vote_pair(
    cl: &CommonLineMatrix,
    i: usize,
    j: usize,
    bins: usize,
    sigma_deg: f64,
) -> Vec<Witness> {
    let candidates: Vec<(Witness, f64)> = (0..cl.n_images())
        .filter(|&k| k != i && k != j)
        .filter_map(|k| {
            triangle_cos_gamma(cl, i, j, k).map(|cos_gamma| {
                let deg = cos_gamma.acos().to_degrees();
                (Witness { k, cos_gamma }, deg)
            })
        })
        .collect();
    if candidates.is_empty() {
        return Vec::new();
    }

    let tic = |t: usize| 180.0 * t as f64 / (bins - 1) as f64;
    let two_sigma2 = 2.0 * sigma_deg * sigma_deg;
    let mut peak = 0;
    let mut peak_height = f64::NEG_INFINITY;
    for t in 0..bins {
        let x = tic(t);
        let h: f64 = candidates
            .iter()
            .map(|(_, a)| (-(a - x) * (a - x) / two_sigma2).exp())
            .sum();
        if h > peak_height {
            peak_height = h;
            peak = t;
        }
    }

    let peak_deg = tic(peak);
    let tolerance = 360.0 / bins as f64;
    candidates
        .into_iter()
        .filter(|(_, a)| (a - peak_deg).abs() < tolerance)
        .map(|(w, _)| w)
        .collect()
}

/// Relative rotation of pair `(i, j)` from its surviving witnesses.
///
/// Each witness gives `Rz(-φij - π/2)·Ry(γ)·Rz(φji + π/2)` with `φ` the common
/// line angles; the mean is projected to the nearest rotation.
pub fn relative_rotation(
    cl: &CommonLineMatrix,
    i: usize,
    j: usize,
    witnesses: &[Witness],
) -> PairEstimate {
    if witnesses.is_empty() {
        return PairEstimate::NoEstimate;
    }
    let phi_ij = cl.angle(i, j);
    let phi_ji = cl.angle(j, i);
    let alpha = -phi_ij - std::f64::consts::FRAC_PI_2;
    let gamma = phi_ji + std::f64::consts::FRAC_PI_2;

    let mut mean = Matrix3::zeros();
    for w in witnesses {
        mean += euler_zyz(alpha, w.cos_gamma.acos(), gamma);
    }
    mean /= witnesses.len() as f64;
    nearest_rotation(&mean).into()
}

/// `Rij` for every pair `i<j`, in pair order.
pub fn estimate_relative_rotations(
    cl: &CommonLineMatrix,
    bins: usize,
    sigma_deg: f64,
) -> Vec<PairEstimate> {
    let pair_index = PairIndex::new(cl.n_images());
    let pairs: Vec<(usize, usize)> = pair_index.pairs().collect();
    info!("Voting on {} image pairs", pairs.len());

    let rijs: Vec<PairEstimate> = pairs
        .par_iter()
        .map(|&(i, j)| {
            let witnesses = vote_pair(cl, i, j, bins, sigma_deg);
            relative_rotation(cl, i, j, &witnesses)
        })
        .collect();

    let missing = rijs.iter().filter(|r| !r.is_estimate()).count();
    if missing > 0 {
        warn!(
            "{} of {} pairs have no consistent voting witness; left without estimate",
            missing,
            rijs.len()
        );
    }
    rijs
}
