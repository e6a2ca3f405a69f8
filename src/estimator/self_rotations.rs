//! Self relative rotations `Rii` from self-common-line pairs.
//!
//! With the line angles `θ1, θ2` of a self-common-line pair (radians; whole
//! rays times `2π/n_theta` unless refined):
//!
//! - `cos_diff = cos(θ2 - θ1)`, clamped to the symmetry order's bound,
//! - `γ` from [`SymmetryOrder::gamma_from_cos_diff`],
//! - `α = θ1 + π/2`, `β = θ2 - π/2`,
//! - `Rii = Rz(-β)·Ry(γ)·Rz(α)`.

use std::f64::consts::FRAC_PI_2;

use tracing::warn;

use super::SelfCommonLine;
use crate::rotation::euler_zyz;
use crate::symmetry::SymmetryOrder;
use crate::Matrix3;

/// Closed-form self relative rotation of one image.
///
/// Returns the rotation and how far `cos_diff` exceeded the bound (0 when no
/// clamping was needed).
pub fn self_rotation(theta1: f64, theta2: f64, symmetry: SymmetryOrder) -> (Matrix3, f64) {
    let raw = (theta2 - theta1).cos();
    let bound = symmetry.max_cos_diff();
    let excess = (raw - bound).max(0.0);
    let cos_diff = raw.min(bound);

    let gamma = symmetry.gamma_from_cos_diff(cos_diff);
    let alpha = theta1 + FRAC_PI_2;
    let beta = theta2 - FRAC_PI_2;
    (euler_zyz(-beta, gamma, alpha), excess)
}

/// `Rii` for every image. Clamped cosines are reported once, with their
/// count and largest violation.
pub fn estimate_self_rotations(scls: &[SelfCommonLine], symmetry: SymmetryOrder) -> Vec<Matrix3> {
    let mut n_clamped = 0;
    let mut max_excess = 0.0_f64;
    let riis = scls
        .iter()
        .map(|s| {
            let (rii, excess) = self_rotation(s.theta1, s.theta2, symmetry);
            if excess > 0.0 {
                n_clamped += 1;
                max_excess = max_excess.max(excess);
            }
            rii
        })
        .collect();

    if n_clamped > 0 {
        warn!(
            "{} of {} self-common-line cosines exceeded {} for {} (max excess {:.3e}); clamped",
            n_clamped,
            scls.len(),
            symmetry.max_cos_diff(),
            symmetry,
            max_excess
        );
    }
    riis
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    use crate::rotation::{is_rotation, j_conjugate};

    const STEP: f64 = 2.0 * PI / 72.0;

    fn scl(ray1: usize, ray2: usize) -> SelfCommonLine {
        SelfCommonLine::from_rays(ray1, ray2, 72, 1.0, 0)
    }

    fn rays(r1: usize, r2: usize) -> (f64, f64) {
        (r1 as f64 * STEP, r2 as f64 * STEP)
    }

    #[test]
    fn test_outputs_are_rotations() {
        for symmetry in [SymmetryOrder::C3, SymmetryOrder::C4] {
            let scls: Vec<_> = (0..36).map(|r| scl(r, (r + 25) % 72)).collect();
            for rii in estimate_self_rotations(&scls, symmetry) {
                assert!(is_rotation(&rii, 1e-12));
            }
        }
    }

    #[test]
    fn test_in_range_cosine_is_not_clamped() {
        // 120° separation: cos = -0.5, valid for both orders
        let (t1, t2) = rays(0, 24);
        let (_, excess3) = self_rotation(t1, t2, SymmetryOrder::C3);
        let (_, excess4) = self_rotation(t1, t2, SymmetryOrder::C4);
        assert_eq!(excess3, 0.0);
        assert_eq!(excess4, 0.0);
    }

    #[test]
    fn test_exact_closed_form_angles() {
        // C3 with cos_diff = -0.5 gives γ = acos(-1/3)
        let (t1, t2) = rays(6, 30);
        let (rii, _) = self_rotation(t1, t2, SymmetryOrder::C3);
        let gamma = (-1.0_f64 / 3.0).acos();
        let expected = euler_zyz(-(t2 - FRAC_PI_2), gamma, t1 + FRAC_PI_2);
        assert!((rii - expected).norm() < 1e-14);
        assert!((rii[(2, 2)] - gamma.cos()).abs() < 1e-14);
    }

    #[test]
    fn test_order4_clamps_to_zero() {
        // 60° separation has cos 0.5: outside the C4 range, clamped to 0 → γ = 0
        let (t1, t2) = rays(0, 12);
        let (rii, excess) = self_rotation(t1, t2, SymmetryOrder::C4);
        assert!((excess - 0.5).abs() < 1e-12);
        assert!((rii[(2, 2)] - 1.0).abs() < 1e-12);

        // Same input under C3 sits exactly on the C3 bound
        let (_, excess3) = self_rotation(t1, t2, SymmetryOrder::C3);
        assert!(excess3 < 1e-12);
    }

    #[test]
    fn test_matches_true_self_rotation() {
        use crate::synthetic::{analytic_self_common_line, self_rotations};
        let symmetry = SymmetryOrder::C4;
        let rots = vec![euler_zyz(0.4, 1.2, 2.2)];
        let truth = self_rotations(&rots, symmetry)[0];
        // Continuous self-common-line angles reproduce Rii up to J and transpose
        let (a1, a2) = analytic_self_common_line(&rots[0], symmetry);
        let (rii, _) = self_rotation(a1, a2, symmetry);
        let best = distance_to_candidates(&rii, &truth);
        assert!(best < 1e-8, "closest candidate differs by {}", best);
    }

    fn distance_to_candidates(rii: &Matrix3, truth: &Matrix3) -> f64 {
        let candidates = [
            *truth,
            truth.transpose(),
            j_conjugate(truth),
            j_conjugate(truth).transpose(),
        ];
        candidates
            .iter()
            .map(|c| (c - rii).norm())
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_refined_angles_sharpen_rii() {
        use crate::estimator::self_common_lines::detect_self_common_lines;
        use crate::synthetic::{self_rotations, SymmetricVolume};

        for symmetry in [SymmetryOrder::C3, SymmetryOrder::C4] {
            let rots = vec![
                euler_zyz(0.5, 0.9, 0.2),
                euler_zyz(1.7, 1.3, 3.5),
                euler_zyz(3.8, 2.1, 1.1),
            ];
            let pf = SymmetricVolume::standard(symmetry)
                .polar_stack(&rots, 16, 72)
                .unwrap();
            let truth = self_rotations(&rots, symmetry);
            let refined = detect_self_common_lines(&pf, symmetry, 0.0, 1.0, true).unwrap();
            for (rii, t) in estimate_self_rotations(&refined, symmetry).iter().zip(&truth) {
                let d = distance_to_candidates(rii, t);
                assert!(d < 5e-3, "{}: refined Rii off by {}", symmetry, d);
            }
        }
    }
}
