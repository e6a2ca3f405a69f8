//! Deterministic synthetic data for tests and demos.
//!
//! - [`SymmetricVolume`]: a sum of Gaussian blobs replicated by the `C_n`
//!   group, with a closed-form Fourier transform, so polar Fourier stacks of
//!   its projections can be sampled exactly (central slice theorem).
//! - Analytic common lines and self-common-lines of given rotations.
//! - Ground-truth `Rij`, `Rii`, third rows, and an error metric for
//!   estimated viewing directions that accounts for the inherent ambiguities.
//!
//! Rotations map image coordinates to volume coordinates: the projection
//! along `Rᵀ·e3` has Fourier slice `F(R·(x, y, 0))`.

use nalgebra::{Quaternion, UnitQuaternion};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

use crate::clmatrix::CommonLineMatrix;
use crate::estimator::PairEstimate;
use crate::pairs::PairIndex;
use crate::polar::PolarFourierStack;
use crate::rotation::euler_zyz;
use crate::symmetry::SymmetryOrder;
use crate::{Complex, Matrix3, Vector3};

/// Blob centres of [`SymmetricVolume::standard`] before replication.
const STANDARD_CENTRES: [[f64; 3]; 5] = [
    [3.0, 1.0, -2.0],
    [-1.5, 4.0, 1.0],
    [0.5, -2.5, 3.5],
    [2.0, 2.0, 0.0],
    [-3.0, -1.0, -1.5],
];

// ── Volume ──────────────────────────────────────────────────────────────────

/// Gaussian blobs of common width at `C_n`-symmetric positions.
#[derive(Debug, Clone)]
pub struct SymmetricVolume {
    /// All blob centres, already replicated by the group.
    pub points: Vec<Vector3>,
    /// Blob width in pixels.
    pub sigma: f64,
    pub symmetry: SymmetryOrder,
}

impl SymmetricVolume {
    /// Replicate `centres` by every group element.
    pub fn new(centres: &[Vector3], sigma: f64, symmetry: SymmetryOrder) -> Self {
        let group = symmetry.group_elements();
        let points = centres
            .iter()
            .flat_map(|p| group.iter().map(move |g| g * p))
            .collect();
        Self {
            points,
            sigma,
            symmetry,
        }
    }

    /// Five asymmetric blobs of width 0.35, replicated by the group.
    pub fn standard(symmetry: SymmetryOrder) -> Self {
        let centres: Vec<Vector3> = STANDARD_CENTRES
            .iter()
            .map(|c| Vector3::new(c[0], c[1], c[2]))
            .collect();
        Self::new(&centres, 0.35, symmetry)
    }

    /// 3D Fourier transform at angular frequency `xi`.
    pub fn fourier(&self, xi: &Vector3) -> Complex {
        let envelope = (-self.sigma * self.sigma * xi.norm_squared() / 2.0).exp();
        let sum: Complex = self
            .points
            .iter()
            .map(|p| Complex::from_polar(1.0, -xi.dot(p)))
            .sum();
        sum * envelope
    }

    /// Polar Fourier transforms of the projections along `rotations`.
    pub fn polar_stack(
        &self,
        rotations: &[Matrix3],
        n_rad: usize,
        n_theta: usize,
    ) -> anyhow::Result<PolarFourierStack> {
        let denom = (2 * n_rad + 1) as f64;
        PolarFourierStack::from_fn(rotations.len(), n_rad, n_theta, |img, ray, k| {
            let theta = 2.0 * PI * ray as f64 / n_theta as f64;
            let omega = 2.0 * PI * (k + 1) as f64 / denom;
            let dir = Vector3::new(omega * theta.cos(), -omega * theta.sin(), 0.0);
            self.fourier(&(rotations[img] * dir))
        })
    }
}

// ── Analytic common lines ───────────────────────────────────────────────────

/// In-plane angle of `u` under the ray convention `(cos θ, -sin θ)`, in `[0, 2π)`.
fn ray_angle(u: &Vector3) -> f64 {
    (-u.y).atan2(u.x).rem_euclid(2.0 * PI)
}

/// Continuous common-line positions (in rays, within `[0, n_theta)`) of two
/// images, for the direction `(Ri·e3) × (Rj·e3)`.
pub fn analytic_common_line(ri: &Matrix3, rj: &Matrix3, n_theta: usize) -> (f64, f64) {
    let d = ri.column(2).cross(&rj.column(2));
    let scale = n_theta as f64 / (2.0 * PI);
    (
        ray_angle(&(ri.transpose() * d)) * scale,
        ray_angle(&(rj.transpose() * d)) * scale,
    )
}

/// Noiseless common-line matrix of `rotations`, rounded to the ray grid.
/// Entries `cl[i][j]` with `i<j` are moved to the first half circle.
pub fn analytic_clmatrix(rotations: &[Matrix3], n_theta: usize) -> CommonLineMatrix {
    let n = rotations.len();
    let half = n_theta / 2;
    let mut cl = CommonLineMatrix::new(n, n_theta);
    for (i, j) in PairIndex::new(n).pairs() {
        let (a, b) = analytic_common_line(&rotations[i], &rotations[j], n_theta);
        let mut ia = a.round() as usize % n_theta;
        let mut ib = b.round() as usize % n_theta;
        if ia >= half {
            ia -= half;
            ib = (ib + half) % n_theta;
        }
        cl.set(i, j, ia);
        cl.set(j, i, ib);
    }
    cl
}

/// Continuous self-common-line angles `(θ1, θ2)` in radians of an image with
/// rotation `r`: `θ1` on the half circle, `θ2` on the full circle, their
/// separation inside the admissible window of `symmetry`.
pub fn analytic_self_common_line(r: &Matrix3, symmetry: SymmetryOrder) -> (f64, f64) {
    let g = symmetry.generator();
    let n = r.column(2).into_owned();
    let (lo, hi) = symmetry.self_common_line_window();

    let mut fallback = None;
    for gs in [g, g.transpose()] {
        for sign in [1.0, -1.0] {
            let d = n.cross(&(gs * n)) * sign;
            let t1 = ray_angle(&(r.transpose() * d));
            let t2 = (ray_angle(&(r.transpose() * gs.transpose() * d)) + PI).rem_euclid(2.0 * PI);
            if t1 >= PI {
                continue;
            }
            let sep = (t1 - t2).cos().clamp(-1.0, 1.0).acos();
            if lo < sep && sep < hi {
                return (t1, t2);
            }
            fallback.get_or_insert((t1, t2));
        }
    }
    fallback.unwrap_or((0.0, PI))
}

// ── Ground truth ────────────────────────────────────────────────────────────

/// Rotations from Z-Y-Z Euler angles in degrees.
pub fn rotations_from_euler_deg(angles: &[(f64, f64, f64)]) -> Vec<Matrix3> {
    angles
        .iter()
        .map(|&(a, b, c)| euler_zyz(a.to_radians(), b.to_radians(), c.to_radians()))
        .collect()
}

/// Uniformly distributed rotations from normalized Gaussian quaternions.
pub fn random_rotations<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<Matrix3> {
    (0..n)
        .map(|_| {
            let q = Quaternion::new(
                rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
                rng.sample::<f64, _>(StandardNormal),
            );
            UnitQuaternion::from_quaternion(q)
                .to_rotation_matrix()
                .into_inner()
        })
        .collect()
}

/// True `Rij = Riᵀ·Rj` for every pair, in pair order.
pub fn relative_rotations(rotations: &[Matrix3]) -> Vec<PairEstimate> {
    PairIndex::new(rotations.len())
        .pairs()
        .map(|(i, j)| PairEstimate::Estimate(rotations[i].transpose() * rotations[j]))
        .collect()
}

/// True `Rii = Riᵀ·g·Ri` for every image.
pub fn self_rotations(rotations: &[Matrix3], symmetry: SymmetryOrder) -> Vec<Matrix3> {
    let g = symmetry.generator();
    rotations.iter().map(|r| r.transpose() * g * r).collect()
}

/// Third row of every rotation.
pub fn viewing_directions(rotations: &[Matrix3]) -> Vec<Vector3> {
    rotations
        .iter()
        .map(|r| r.row(2).transpose().into_owned())
        .collect()
}

/// Per-image angular error in degrees between estimated and true viewing
/// directions.
///
/// The estimate is only defined up to a global sign and a global handedness
/// flip, so the truth is compared under `v`, `-v`, `(-x, -y, z)` and
/// `(x, y, -z)` and the flip with the smallest mean error is reported.
pub fn viewing_direction_errors_deg(estimated: &[Vector3], truth: &[Vector3]) -> Vec<f64> {
    let flips = [
        Vector3::new(1.0, 1.0, 1.0),
        Vector3::new(-1.0, -1.0, -1.0),
        Vector3::new(-1.0, -1.0, 1.0),
        Vector3::new(1.0, 1.0, -1.0),
    ];
    let mut best: Option<(f64, Vec<f64>)> = None;
    for flip in &flips {
        let errs: Vec<f64> = estimated
            .iter()
            .zip(truth)
            .map(|(e, t)| {
                let cos = e.dot(&t.component_mul(flip)) / (e.norm() * t.norm());
                cos.clamp(-1.0, 1.0).acos().to_degrees()
            })
            .collect();
        let mean = errs.iter().sum::<f64>() / errs.len().max(1) as f64;
        if best.as_ref().map_or(true, |(m, _)| mean < *m) {
            best = Some((mean, errs));
        }
    }
    best.map(|(_, errs)| errs).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::is_rotation;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_volume_is_symmetric() {
        let volume = SymmetricVolume::standard(SymmetryOrder::C4);
        assert_eq!(volume.points.len(), 20);
        let g = SymmetryOrder::C4.generator();
        let xi = Vector3::new(0.3, -0.7, 0.2);
        let a = volume.fourier(&xi);
        let b = volume.fourier(&(g * xi));
        assert!((a - b).norm() < 1e-10);
        // Real volume: F(-ξ) = conj(F(ξ))
        assert!((volume.fourier(&-xi) - a.conj()).norm() < 1e-10);
    }

    #[test]
    fn test_analytic_common_line_is_shared() {
        let rots = rotations_from_euler_deg(&[(10.0, 40.0, 20.0), (120.0, 80.0, 300.0)]);
        let volume = SymmetricVolume::standard(SymmetryOrder::C3);
        let (a, b) = analytic_common_line(&rots[0], &rots[1], 360);
        let dir = |r: &Matrix3, pos: f64| {
            let t = pos * 2.0 * PI / 360.0;
            r * Vector3::new(t.cos(), -t.sin(), 0.0)
        };
        let fa = volume.fourier(&(dir(&rots[0], a) * 0.8));
        let fb = volume.fourier(&(dir(&rots[1], b) * 0.8));
        assert!((fa - fb).norm() < 1e-9);
    }

    #[test]
    fn test_analytic_clmatrix_ranges() {
        let rots = rotations_from_euler_deg(&[(0.0, 30.0, 0.0), (60.0, 90.0, 10.0), (120.0, 130.0, 50.0)]);
        let cl = analytic_clmatrix(&rots, 72);
        for (i, j) in PairIndex::new(3).pairs() {
            assert!(cl.get(i, j) < 36);
            assert!(cl.get(j, i) < 72);
        }
    }

    #[test]
    fn test_self_common_line_lies_on_both_slices() {
        for symmetry in [SymmetryOrder::C3, SymmetryOrder::C4] {
            let r = euler_zyz(0.4, 1.2, 2.2);
            let volume = SymmetricVolume::standard(symmetry);
            let (t1, t2) = analytic_self_common_line(&r, symmetry);
            assert!((0.0..PI).contains(&t1));
            let (lo, hi) = symmetry.self_common_line_window();
            let sep = (t1 - t2).cos().acos();
            assert!(lo < sep && sep < hi);
            // Ray t1 and the conjugate of ray t2 carry the same Fourier data
            let f1 = volume.fourier(&(r * Vector3::new(t1.cos(), -t1.sin(), 0.0)));
            let f2 = volume.fourier(&(r * Vector3::new(t2.cos(), -t2.sin(), 0.0)));
            assert!((f1 - f2.conj()).norm() < 1e-9, "{}", symmetry);
        }
    }

    #[test]
    fn test_random_rotations_are_rotations() {
        let mut rng = StdRng::seed_from_u64(7);
        for r in random_rotations(20, &mut rng) {
            assert!(is_rotation(&r, 1e-12));
        }
    }

    #[test]
    fn test_error_metric_ignores_handedness() {
        let truth = viewing_directions(&rotations_from_euler_deg(&[(0.0, 30.0, 0.0), (50.0, 70.0, 0.0)]));
        let flipped: Vec<Vector3> = truth.iter().map(|v| Vector3::new(-v.x, -v.y, v.z)).collect();
        let errs = viewing_direction_errors_deg(&flipped, &truth);
        assert!(errs.iter().all(|&e| e < 1e-6));
    }
}
