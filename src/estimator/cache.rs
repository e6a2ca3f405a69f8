//! On-disk cache of the expensive intermediates of a run.
//!
//! The common-line matrix and the voted relative rotations only depend on the
//! images, so callers re-running synchronization with other settings can
//! reload them instead of recomputing. Serialized with rkyv.

use anyhow::{ensure, Context};
use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use super::PairEstimate;
use crate::clmatrix::CommonLineMatrix;
use crate::pairs::num_pairs;
use crate::symmetry::SymmetryOrder;
use crate::Matrix3;

/// Serializable snapshot of `clmatrix` and `Rijs`.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RotationCache {
    /// Symmetry order the rotations were voted for.
    pub symmetry_order: u8,
    /// Common-line matrix.
    pub clmatrix: CommonLineMatrix,
    /// Relative rotations in pair order, row-major; `None` = no estimate.
    pub rijs: Vec<Option<[f64; 9]>>,
}

impl RotationCache {
    pub fn new(symmetry: SymmetryOrder, clmatrix: &CommonLineMatrix, rijs: &[PairEstimate]) -> anyhow::Result<Self> {
        ensure!(
            rijs.len() == num_pairs(clmatrix.n_images()),
            "expected {} relative rotations for {} images, got {}",
            num_pairs(clmatrix.n_images()),
            clmatrix.n_images(),
            rijs.len()
        );
        Ok(Self {
            symmetry_order: symmetry.order() as u8,
            clmatrix: clmatrix.clone(),
            rijs: rijs
                .iter()
                .map(|r| {
                    r.as_matrix().map(|m| {
                        let mut out = [0.0; 9];
                        for (k, v) in out.iter_mut().enumerate() {
                            *v = m[(k / 3, k % 3)];
                        }
                        out
                    })
                })
                .collect(),
        })
    }

    pub fn symmetry(&self) -> anyhow::Result<SymmetryOrder> {
        SymmetryOrder::from_order(self.symmetry_order as usize)
    }

    /// Relative rotations as pair estimates.
    pub fn relative_rotations(&self) -> Vec<PairEstimate> {
        self.rijs
            .iter()
            .map(|r| r.map(|a| Matrix3::from_row_slice(&a)).into())
            .collect()
    }

    /// Serialize the cache to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Deserialize a cache from rkyv bytes.
    pub fn from_rkyv_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))
    }

    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes).with_context(|| format!("writing cache to {}", path))?;
        info!("Saved rotation cache to {} ({} bytes)", path, bytes.len());
        Ok(())
    }

    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading cache from {}", path))?;
        let cache = Self::from_rkyv_bytes(&bytes)?;
        info!(
            "Loaded rotation cache: {} images, {} relative rotations",
            cache.clmatrix.n_images(),
            cache.rijs.len()
        );
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{analytic_clmatrix, relative_rotations, rotations_from_euler_deg};

    fn sample_cache() -> RotationCache {
        let rots = rotations_from_euler_deg(&[(0.0, 30.0, 0.0), (60.0, 90.0, 10.0), (120.0, 130.0, 50.0)]);
        let cl = analytic_clmatrix(&rots, 72);
        let mut rijs = relative_rotations(&rots);
        rijs[2] = PairEstimate::NoEstimate;
        RotationCache::new(SymmetryOrder::C3, &cl, &rijs).unwrap()
    }

    #[test]
    fn test_bytes_survive_serialization() {
        let cache = sample_cache();
        let bytes = cache.to_rkyv_bytes().unwrap();
        let back = RotationCache::from_rkyv_bytes(&bytes).unwrap();
        assert_eq!(back, cache);
        assert_eq!(back.symmetry().unwrap(), SymmetryOrder::C3);
        let rijs = back.relative_rotations();
        assert!(rijs[0].is_estimate());
        assert_eq!(rijs[2], PairEstimate::NoEstimate);
    }

    #[test]
    fn test_save_and_load_file() {
        let cache = sample_cache();
        let path = std::env::temp_dir().join(format!("clsym_cache_{}.rkyv", std::process::id()));
        let path = path.to_str().unwrap().to_string();
        cache.save_to_file(&path).unwrap();
        let loaded = RotationCache::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.clmatrix, cache.clmatrix);
        assert_eq!(loaded.rijs, cache.rijs);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = RotationCache::load_from_file("/nonexistent/clsym.rkyv").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/clsym.rkyv"));
    }

    #[test]
    fn test_rejects_wrong_pair_count() {
        let rots = rotations_from_euler_deg(&[(0.0, 30.0, 0.0), (60.0, 90.0, 10.0), (120.0, 130.0, 50.0)]);
        let cl = analytic_clmatrix(&rots, 72);
        let rijs = relative_rotations(&rots);
        assert!(RotationCache::new(SymmetryOrder::C4, &cl, &rijs[..1]).is_err());
    }
}
