//! Viewing directions from synchronized third-row outer products.
//!
//! The `3n × 3n` block matrix `V` with `vij` above the diagonal, `vijᵀ` below
//! and `vii` on the diagonal equals `w·wᵀ` for `w = [v1; v2; …; vn]` in the
//! noiseless case, so its leading eigenvector is `w` up to scale and sign.
//!
//! An image without any estimated `vij` forms its own block of `V` and gets a
//! zero chunk. Its direction falls back to the leading eigenvector of its own
//! `vii` (`≈ vi·viᵀ`), with a sign that nothing ties to the other images.

use anyhow::ensure;
use nalgebra::{DMatrix, SymmetricEigen};
use tracing::{debug, warn};

use super::PairEstimate;
use crate::pairs::PairIndex;
use crate::{Matrix3, Vector3};

/// Assemble the symmetric block matrix. Pairs without an estimate leave a
/// zero block.
pub fn assemble_outer_product_matrix(vijs: &[PairEstimate], viis: &[Matrix3]) -> DMatrix<f64> {
    let n = viis.len();
    let pair_index = PairIndex::new(n);
    let mut v = DMatrix::<f64>::zeros(3 * n, 3 * n);
    for ((i, j), vij) in pair_index.pairs().zip(vijs) {
        if let Some(m) = vij.as_matrix() {
            v.fixed_view_mut::<3, 3>(3 * i, 3 * j).copy_from(m);
            v.fixed_view_mut::<3, 3>(3 * j, 3 * i).copy_from(&m.transpose());
        }
    }
    for (i, vii) in viis.iter().enumerate() {
        v.fixed_view_mut::<3, 3>(3 * i, 3 * i).copy_from(vii);
    }
    v
}

/// Images that have no estimated `vij` with any other image.
pub fn isolated_images(vijs: &[PairEstimate], n: usize) -> Vec<usize> {
    let mut linked = vec![false; n];
    for ((i, j), vij) in PairIndex::new(n).pairs().zip(vijs) {
        if vij.is_estimate() {
            linked[i] = true;
            linked[j] = true;
        }
    }
    (0..n).filter(|&i| !linked[i]).collect()
}

/// Unit viewing direction per image from the leading eigenvector of the
/// assembled matrix. Isolated images, and any image whose chunk vanishes,
/// take the leading eigenvector of their own `vii` instead.
pub fn estimate_third_rows(vijs: &[PairEstimate], viis: &[Matrix3]) -> anyhow::Result<Vec<Vector3>> {
    let n = viis.len();
    ensure!(n > 0, "no images to estimate third rows for");
    ensure!(
        vijs.len() == PairIndex::new(n).len(),
        "expected {} vijs for {} images, got {}",
        PairIndex::new(n).len(),
        n,
        vijs.len()
    );

    let v = assemble_outer_product_matrix(vijs, viis);
    let eig = SymmetricEigen::new(v);
    let lead = eig.eigenvalues.imax();
    debug!(
        "Leading eigenvalue {:.4} of {} (ideal {})",
        eig.eigenvalues[lead],
        3 * n,
        n
    );
    let w = eig.eigenvectors.column(lead);

    let chunks: Vec<Vector3> = (0..n)
        .map(|i| Vector3::new(w[3 * i], w[3 * i + 1], w[3 * i + 2]))
        .collect();
    let max_norm = chunks.iter().map(|c| c.norm()).fold(0.0_f64, f64::max);
    let isolated = isolated_images(vijs, n);

    let mut fallback = Vec::new();
    let directions = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let norm = chunk.norm();
            if isolated.contains(&i) || norm <= VANISHING_CHUNK * max_norm {
                fallback.push(i);
                own_direction(&viis[i])
            } else {
                chunk / norm
            }
        })
        .collect();

    if !fallback.is_empty() {
        warn!(
            "{} of {} images are not linked to the others by any estimated pair; \
             their directions come from their own vii: {:?}",
            fallback.len(),
            n,
            fallback
        );
    }
    Ok(directions)
}

/// Chunks this small relative to the largest are treated as disconnected.
const VANISHING_CHUNK: f64 = 1e-9;

/// Leading eigenvector of the symmetric part of `vii`.
fn own_direction(vii: &Matrix3) -> Vector3 {
    let eig = SymmetricEigen::new((vii + vii.transpose()) / 2.0);
    let lead = eig.eigenvalues.imax();
    eig.eigenvectors.column(lead).into_owned()
}
