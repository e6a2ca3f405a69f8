//! End-to-end driver: polar Fourier stack (and optionally a common-line
//! matrix) in, viewing directions out.

use std::time::Instant;

use anyhow::ensure;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use super::common_lines::build_clmatrix;
use super::global_sync::global_j_sync;
use super::local_sync::local_j_sync;
use super::self_common_lines::detect_self_common_lines;
use super::self_rotations::estimate_self_rotations;
use super::third_rows::{estimate_third_rows, isolated_images};
use super::voting::estimate_relative_rotations;
use super::{EstimationResult, EstimatorConfig, PairEstimate, SyncResult};
use crate::clmatrix::CommonLineMatrix;
use crate::polar::PolarFourierStack;
use crate::Matrix3;

/// Estimate the viewing direction of every image of `pf`.
///
/// When `clmatrix` is `None` it is built from `pf` with the configured shift
/// range. A supplied matrix must match the stack's image count and `n_theta`.
pub fn estimate_viewing_directions(
    pf: &PolarFourierStack,
    clmatrix: Option<&CommonLineMatrix>,
    config: &EstimatorConfig,
) -> anyhow::Result<EstimationResult> {
    let t0 = Instant::now();
    config.validate()?;
    let n = pf.n_images();
    ensure!(n >= 3, "need at least 3 images for voting, got {}", n);

    let clmatrix = match clmatrix {
        Some(cl) => {
            ensure!(
                cl.n_images() == n,
                "clmatrix is {}x{} but the stack has {} images",
                cl.n_images(),
                cl.n_images(),
                n
            );
            ensure!(
                cl.n_theta() == pf.n_theta(),
                "clmatrix uses n_theta = {} but the stack has {}",
                cl.n_theta(),
                pf.n_theta()
            );
            cl.clone()
        }
        None => build_clmatrix(pf, config.max_shift, config.shift_step)?.clmatrix,
    };

    info!(
        "Estimating {} viewing directions ({}, n_theta = {}, n_rad = {})",
        n,
        config.symmetry,
        pf.n_theta(),
        pf.n_rad()
    );

    let self_common_lines = detect_self_common_lines(
        pf,
        config.symmetry,
        config.max_shift,
        config.shift_step,
        config.refine_self_common_lines,
    )?;
    let riis = estimate_self_rotations(&self_common_lines, config.symmetry);
    let rijs = estimate_relative_rotations(
        &clmatrix,
        config.histogram_bins,
        config.histogram_sigma_deg,
    );
    let num_missing_pairs = rijs.iter().filter(|r| !r.is_estimate()).count();

    let sync = synchronize(&rijs, &riis, config)?;
    let solve_time_ms = elapsed_ms(t0);
    info!(
        "Estimated {} viewing directions in {:.1}ms",
        n, solve_time_ms
    );

    Ok(EstimationResult {
        clmatrix,
        self_common_lines,
        riis,
        rijs,
        vijs: sync.vijs,
        viis: sync.viis,
        power_method: sync.power_method,
        viewing_directions: sync.viewing_directions,
        isolated_images: sync.isolated_images,
        num_missing_pairs,
        solve_time_ms,
    })
}

/// Local J-sync, global J-sync and third-row recovery from given `Rij` and
/// `Rii`. Cached relative rotations can be fed here directly.
pub fn synchronize(
    rijs: &[PairEstimate],
    riis: &[Matrix3],
    config: &EstimatorConfig,
) -> anyhow::Result<SyncResult> {
    config.validate()?;
    let (vijs, viis) = local_j_sync(rijs, riis, config.symmetry)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let (vijs, viis, power_method) = global_j_sync(
        &vijs,
        &viis,
        config.power_tolerance,
        config.power_max_iterations,
        &mut rng,
    )?;
    if !power_method.converged {
        warn!(
            "Sign power method did not converge after {} iterations (residual {:.3e})",
            power_method.iterations, power_method.residual
        );
    }

    let viewing_directions = estimate_third_rows(&vijs, &viis)?;
    let isolated_images = isolated_images(&vijs, viis.len());
    Ok(SyncResult {
        vijs,
        viis,
        power_method,
        viewing_directions,
        isolated_images,
    })
}

fn elapsed_ms(t0: Instant) -> f32 {
    t0.elapsed().as_secs_f32() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::SymmetryOrder;
    use crate::Vector3;
    use crate::synthetic::{
        relative_rotations, rotations_from_euler_deg, self_rotations, viewing_direction_errors_deg,
        viewing_directions, SymmetricVolume,
    };

    fn rots() -> Vec<Matrix3> {
        rotations_from_euler_deg(&[
            (30.0, 50.0, 10.0),
            (100.0, 75.0, 200.0),
            (215.0, 120.0, 65.0),
            (300.0, 35.0, 140.0),
        ])
    }

    #[test]
    fn test_synchronize_exact_inputs() {
        for symmetry in [SymmetryOrder::C3, SymmetryOrder::C4] {
            let rots = rots();
            let config = EstimatorConfig {
                symmetry,
                ..Default::default()
            };
            let sync =
                synchronize(&relative_rotations(&rots), &self_rotations(&rots, symmetry), &config)
                    .unwrap();
            let errs = viewing_direction_errors_deg(&sync.viewing_directions, &viewing_directions(&rots));
            assert!(errs.iter().all(|&e| e < 1e-4), "{}: {:?}", symmetry, errs);
        }
    }

    #[test]
    fn test_rejects_too_few_images() {
        let volume = SymmetricVolume::standard(SymmetryOrder::C4);
        let pf = volume.polar_stack(&rots()[..2], 8, 36).unwrap();
        assert!(estimate_viewing_directions(&pf, None, &EstimatorConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_mismatched_clmatrix() {
        let volume = SymmetricVolume::standard(SymmetryOrder::C4);
        let pf = volume.polar_stack(&rots(), 8, 36).unwrap();
        let wrong_size = CommonLineMatrix::new(3, 36);
        assert!(estimate_viewing_directions(&pf, Some(&wrong_size), &EstimatorConfig::default()).is_err());
        let wrong_theta = CommonLineMatrix::new(4, 72);
        assert!(estimate_viewing_directions(&pf, Some(&wrong_theta), &EstimatorConfig::default()).is_err());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EstimatorConfig {
            histogram_bins: 1,
            ..Default::default()
        };
        let rots = rots();
        assert!(synchronize(&relative_rotations(&rots), &self_rotations(&rots, config.symmetry), &config).is_err());
    }

    #[test]
    fn test_isolated_image_still_gets_a_unit_direction() {
        let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();

        let rots = rots();
        let truth = viewing_directions(&rots);
        let mut rijs = relative_rotations(&rots);
        // Pairs (0,1), (0,2), (0,3)
        for rij in rijs.iter_mut().take(3) {
            *rij = PairEstimate::NoEstimate;
        }
        let config = EstimatorConfig::default();
        let sync = synchronize(&rijs, &self_rotations(&rots, config.symmetry), &config).unwrap();

        assert_eq!(sync.isolated_images, vec![0]);
        for (v, t) in sync.viewing_directions.iter().zip(&truth) {
            assert!((v.norm() - 1.0).abs() < 1e-9);
            // Either handedness, either sign
            let t_j = Vector3::new(-t.x, -t.y, t.z);
            let agreement = v.dot(t).abs().max(v.dot(&t_j).abs());
            assert!(agreement > 1.0 - 1e-6, "{} vs {}", v, t);
        }
    }
}
