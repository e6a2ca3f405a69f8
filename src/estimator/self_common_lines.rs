//! Self-common-line detection.
//!
//! A molecule with C_n symmetry makes two rays of each image's own Fourier
//! transform coincide. For every image we correlate each shifted half-circle
//! ray against every ray of the unshifted full circle and keep the best
//! (shift, ray₁, ray₂) whose angular separation lies in the admissible window
//! of the symmetry order.
//!
//! The winning pair can then be refined below the ray spacing: the angular
//! Fourier series of the image ([`AngularSpectrum`]) evaluates rays at any
//! angle, and a shrinking pattern search maximizes the same correlation
//! within one ray of the grid winner. `Rii` depends on the cosine of the
//! separation, which near 90° (C4) is too sensitive for whole-ray angles.

use std::f64::consts::PI;

use anyhow::ensure;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::polar::{normalize_ray, real_dot, AngularSpectrum, PolarFourierStack, ShiftBank};
use crate::symmetry::SymmetryOrder;

/// The self-common-line pair detected in one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelfCommonLine {
    /// Ray index on the half circle, in `[0, n_theta/2)`.
    pub ray1: usize,
    /// Ray index on the full circle, in `[0, n_theta)`.
    pub ray2: usize,
    /// Real part of the winning correlation.
    pub correlation: f64,
    /// Index of the winning shift in the shift bank.
    pub shift_index: usize,
    /// Angle of the first line in radians; `ray1·2π/n_theta` unless refined.
    pub theta1: f64,
    /// Angle of the second line in radians; `ray2·2π/n_theta` unless refined.
    pub theta2: f64,
}

impl SelfCommonLine {
    /// Grid-aligned pair, angles taken from the ray indices.
    pub fn from_rays(ray1: usize, ray2: usize, n_theta: usize, correlation: f64, shift_index: usize) -> Self {
        let step = 2.0 * PI / n_theta as f64;
        Self {
            ray1,
            ray2,
            correlation,
            shift_index,
            theta1: ray1 as f64 * step,
            theta2: ray2 as f64 * step,
        }
    }
}

/// Admissibility mask over (half-circle ray, full-circle ray), row-major with
/// `n_theta` columns.
///
/// A cell is admissible when the unsigned angle between the two rays lies
/// strictly inside the symmetry order's window.
pub fn self_common_line_mask(n_theta: usize, symmetry: SymmetryOrder) -> Vec<bool> {
    let (lo, hi) = symmetry.self_common_line_window();
    let step = 2.0 * PI / n_theta as f64;
    let mut mask = Vec::with_capacity(n_theta / 2 * n_theta);
    for l1 in 0..n_theta / 2 {
        for l2 in 0..n_theta {
            // Unsigned separation in whole rays, wrapped to [0, n_theta/2]
            let d = l1.abs_diff(l2) % n_theta;
            let unsigned = d.min(n_theta - d) as f64 * step;
            mask.push(lo < unsigned && unsigned < hi);
        }
    }
    mask
}

/// Detect the self-common-line pair of every image.
///
/// `max_shift` is the 2D shift bound in pixels; the 1D search range along a
/// line is `ceil(2√2 · max_shift)`. With `refine`, the angles of each pair are
/// refined below the ray spacing.
pub fn detect_self_common_lines(
    pf: &PolarFourierStack,
    symmetry: SymmetryOrder,
    max_shift: f64,
    shift_step: f64,
    refine: bool,
) -> anyhow::Result<Vec<SelfCommonLine>> {
    let n_theta = pf.n_theta();
    let mask = self_common_line_mask(n_theta, symmetry);
    ensure!(
        mask.iter().any(|&m| m),
        "n_theta = {} leaves no admissible self-common-line angle for {}",
        n_theta,
        symmetry
    );

    let max_shift_1d = (2.0 * std::f64::consts::SQRT_2 * max_shift).ceil();
    let bank = ShiftBank::new(pf.n_rad(), max_shift_1d, shift_step)?;
    info!(
        "Detecting self-common-lines in {} images ({}, {} shifts)",
        pf.n_images(),
        symmetry,
        bank.len()
    );

    let scls: Vec<SelfCommonLine> = (0..pf.n_images())
        .into_par_iter()
        .map(|img| {
            let best = detect_in_image(pf, img, &bank, &mask);
            if refine {
                refine_in_image(pf, img, &bank, best)
            } else {
                best
            }
        })
        .collect();

    let mean_corr = scls.iter().map(|s| s.correlation).sum::<f64>() / scls.len().max(1) as f64;
    debug!("Mean self-common-line correlation: {:.4}", mean_corr);
    if refine {
        let step = 2.0 * PI / n_theta as f64;
        let max_move = scls
            .iter()
            .map(|s| {
                let d1 = (s.theta1 - s.ray1 as f64 * step).abs();
                let d2 = (s.theta2 - s.ray2 as f64 * step).abs();
                d1.max(d2) / step
            })
            .fold(0.0_f64, f64::max);
        debug!("Sub-ray refinement moved angles by at most {:.3} rays", max_move);
    }
    Ok(scls)
}

/// Exhaustive masked search over (shift, half ray, full ray) for one image.
/// Ties keep the first maximum in that iteration order.
fn detect_in_image(
    pf: &PolarFourierStack,
    img: usize,
    bank: &ShiftBank,
    mask: &[bool],
) -> SelfCommonLine {
    let n_theta = pf.n_theta();
    let n_half = pf.n_half();
    let full = pf.normalized_full_rays(img, None);

    let mut best = SelfCommonLine::from_rays(0, 0, n_theta, f64::NEG_INFINITY, 0);
    let mut shifted = vec![Vec::new(); n_half];
    for m in 0..bank.len() {
        for (l1, ray) in shifted.iter_mut().enumerate() {
            *ray = pf.ray(img, l1).to_vec();
            bank.apply(m, ray);
            normalize_ray(ray);
        }
        for (l1, ray1) in shifted.iter().enumerate() {
            let row = &mask[l1 * n_theta..(l1 + 1) * n_theta];
            for (l2, ray2) in full.iter().enumerate() {
                if !row[l2] {
                    continue;
                }
                let c = real_dot(ray1, ray2);
                if c > best.correlation {
                    best = SelfCommonLine::from_rays(l1, l2, n_theta, c, m);
                }
            }
        }
    }
    best
}

/// Pattern search over continuous `(θ₁, θ₂)` starting from the grid winner.
///
/// Steps start at half a ray and halve whenever none of the eight neighbours
/// improves the correlation. Both angles stay within one ray of the start.
fn refine_in_image(
    pf: &PolarFourierStack,
    img: usize,
    bank: &ShiftBank,
    best: SelfCommonLine,
) -> SelfCommonLine {
    let step = 2.0 * PI / pf.n_theta() as f64;
    let spectrum = AngularSpectrum::new(pf, img);
    let correlate = |t1: f64, t2: f64| {
        let mut first = spectrum.ray_at(t1);
        bank.apply(best.shift_index, &mut first);
        normalize_ray(&mut first);
        let mut second = spectrum.ray_at(t2);
        normalize_ray(&mut second);
        real_dot(&first, &second)
    };

    let (start1, start2) = (best.theta1, best.theta2);
    let (mut t1, mut t2) = (start1, start2);
    let mut corr = correlate(t1, t2);
    let mut h = step / 2.0;
    while h > step / 200.0 {
        let moves = [
            (h, 0.0),
            (-h, 0.0),
            (0.0, h),
            (0.0, -h),
            (h, h),
            (-h, -h),
            (h, -h),
            (-h, h),
        ];
        let improved = moves.iter().find_map(|&(d1, d2)| {
            let (n1, n2) = (t1 + d1, t2 + d2);
            if (n1 - start1).abs() > step || (n2 - start2).abs() > step {
                return None;
            }
            let c = correlate(n1, n2);
            (c > corr).then_some((n1, n2, c))
        });
        match improved {
            Some((n1, n2, c)) => {
                t1 = n1;
                t2 = n2;
                corr = c;
            }
            None => h /= 2.0,
        }
    }

    SelfCommonLine {
        theta1: t1,
        theta2: t2,
        ..best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::euler_zyz;
    use crate::synthetic::SymmetricVolume;

    fn wrapped_angle_deg(r1: usize, r2: usize, n_theta: usize) -> f64 {
        let diff = (r1 as f64 - r2 as f64) * 360.0 / n_theta as f64;
        diff.to_radians().cos().clamp(-1.0, 1.0).acos().to_degrees()
    }

    #[test]
    fn test_mask_windows() {
        let n_theta = 72; // 5° per ray
        let mask = self_common_line_mask(n_theta, SymmetryOrder::C4);
        // 85° separation is outside the window, 95° is inside
        assert!(!mask[17]);
        assert!(mask[19]);
        assert!(mask[72 - 19]);
        // 165° is outside, 155° inside
        assert!(!mask[33]);
        assert!(mask[31]);

        let mask3 = self_common_line_mask(n_theta, SymmetryOrder::C3);
        assert!(!mask3[10 * n_theta + 21]); // 55°
        assert!(mask3[10 * n_theta + 23]); // 65°
        assert!(mask3[10 * n_theta + 42]); // 160°
        assert!(!mask3[10 * n_theta + 44]); // 170°
        assert!(!mask3[10 * n_theta + 10]); // same ray
    }

    #[test]
    fn test_no_admissible_angle_is_an_error() {
        // With 4 rays only 90° and 180° separations exist, both outside the C4 window.
        let pf = PolarFourierStack::from_fn(1, 3, 4, |_, _, _| crate::Complex::new(1.0, 0.0))
            .unwrap();
        assert!(detect_self_common_lines(&pf, SymmetryOrder::C4, 0.0, 1.0, true).is_err());
    }

    #[test]
    fn test_detected_pairs_respect_window() {
        for symmetry in [SymmetryOrder::C3, SymmetryOrder::C4] {
            let volume = SymmetricVolume::standard(symmetry);
            let rots = vec![
                euler_zyz(0.5, 0.9, 0.2),
                euler_zyz(1.7, 1.3, 3.5),
                euler_zyz(3.8, 2.1, 1.1),
            ];
            let n_theta = 72;
            let pf = volume.polar_stack(&rots, 16, n_theta).unwrap();
            let scls = detect_self_common_lines(&pf, symmetry, 1.0, 1.0, true).unwrap();
            assert_eq!(scls.len(), 3);
            let (lo, hi) = symmetry.self_common_line_window();
            for s in &scls {
                assert!(s.ray1 < n_theta / 2);
                assert!(s.ray2 < n_theta);
                let a = wrapped_angle_deg(s.ray1, s.ray2, n_theta);
                assert!(
                    a > lo.to_degrees() - 1e-6 && a < hi.to_degrees() + 1e-6,
                    "angle {} outside window",
                    a
                );
                // 1D range ceil(2√2) = 3 pixels at step 1 gives 7 shifts
                assert!(s.shift_index < 7);
            }
        }
    }

    #[test]
    fn test_clean_data_correlates_strongly() {
        let symmetry = SymmetryOrder::C4;
        let volume = SymmetricVolume::standard(symmetry);
        let rots = vec![euler_zyz(0.3, 1.0, 0.7), euler_zyz(2.0, 0.6, 4.0)];
        let pf = volume.polar_stack(&rots, 16, 180).unwrap();
        let scls = detect_self_common_lines(&pf, symmetry, 0.0, 1.0, false).unwrap();
        for s in &scls {
            assert_eq!(s.shift_index, 0);
            assert!(s.correlation > 0.9, "correlation {}", s.correlation);
        }
    }

    #[test]
    fn test_refined_separation_matches_geometry() {
        use crate::synthetic::analytic_self_common_line;

        let n_theta = 72;
        let step_deg = 360.0 / n_theta as f64;
        for symmetry in [SymmetryOrder::C3, SymmetryOrder::C4] {
            let volume = SymmetricVolume::standard(symmetry);
            let rots = vec![
                euler_zyz(0.5, 0.9, 0.2),
                euler_zyz(1.7, 1.3, 3.5),
                euler_zyz(3.8, 2.1, 1.1),
            ];
            let pf = volume.polar_stack(&rots, 16, n_theta).unwrap();
            let refined = detect_self_common_lines(&pf, symmetry, 0.0, 1.0, true).unwrap();
            let grid = detect_self_common_lines(&pf, symmetry, 0.0, 1.0, false).unwrap();

            for ((r, g), rot) in refined.iter().zip(&grid).zip(&rots) {
                // Refinement starts from the grid winner and stays within a ray of it
                assert_eq!((r.ray1, r.ray2), (g.ray1, g.ray2));
                assert!((r.theta1 - g.theta1).abs().to_degrees() <= step_deg + 1e-9);
                assert!((r.theta2 - g.theta2).abs().to_degrees() <= step_deg + 1e-9);

                let (a1, a2) = analytic_self_common_line(rot, symmetry);
                let truth = (a2 - a1).cos().acos().to_degrees();
                let sep = (r.theta2 - r.theta1).cos().acos().to_degrees();
                assert!(
                    (sep - truth).abs() < 0.1,
                    "{}: refined separation {:.3}° vs {:.3}°",
                    symmetry,
                    sep,
                    truth
                );
            }
        }
    }

    #[test]
    fn test_unrefined_angles_follow_rays() {
        let volume = SymmetricVolume::standard(SymmetryOrder::C3);
        let pf = volume.polar_stack(&[euler_zyz(0.5, 0.9, 0.2)], 8, 36).unwrap();
        let scls = detect_self_common_lines(&pf, SymmetryOrder::C3, 0.0, 1.0, false).unwrap();
        let step = 2.0 * PI / 36.0;
        assert_eq!(scls[0].theta1, scls[0].ray1 as f64 * step);
        assert_eq!(scls[0].theta2, scls[0].ray2 as f64 * step);
    }
}
