//! Viewing-direction estimation for C3/C4 symmetric molecules by common lines.
//!
//! The pipeline runs strictly forward:
//!
//! 1. **Self-common-lines** ([`self_common_lines`]): per image, the pair of
//!    rays that coincide because of the cyclic symmetry.
//! 2. **Self relative rotations** ([`self_rotations`]): closed-form `Rii` from
//!    each self-common-line pair, using its sub-ray refined angles.
//! 3. **Voting** ([`voting`]): per pair `i<j`, witnesses `k` vote on the angle
//!    between the common lines; the consistent witnesses give `Rij`.
//! 4. **Local J-sync** ([`local_sync`]): per pair, pick the handedness
//!    combination of `Rii`, `Rjj`, `Rij` whose symmetrized product is closest
//!    to rank 1, giving `vij ≈ vi·vjᵀ`; `vii` is the mean of the powers of `Rii`.
//! 5. **Global J-sync** ([`global_sync`]): power iteration over triple
//!    consistency signs makes every `vij` share one handedness, then a
//!    neighbour vote fixes each `vii`.
//! 6. **Third rows** ([`third_rows`]): the leading eigenvector of the stacked
//!    `3n × 3n` outer-product matrix yields the viewing directions.
//!
//! When no common-line matrix is supplied, [`common_lines::build_clmatrix`]
//! builds one from the polar Fourier stack first.

pub mod cache;
pub mod common_lines;
pub mod global_sync;
pub mod local_sync;
pub mod pipeline;
pub mod self_common_lines;
pub mod self_rotations;
pub mod third_rows;
pub mod voting;

use crate::clmatrix::CommonLineMatrix;
use crate::symmetry::SymmetryOrder;
use crate::{Matrix3, Vector3};

pub use global_sync::PowerMethodStats;
pub use self_common_lines::SelfCommonLine;

// ── Per-pair estimates ──────────────────────────────────────────────────────

/// A per-pair 3×3 estimate (`Rij` or `vij`), or the explicit absence of one.
///
/// `NoEstimate` arises when voting finds no consistent witness, typically
/// because the two images share a viewing direction. Downstream stages skip
/// such pairs instead of treating them as data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PairEstimate {
    Estimate(Matrix3),
    NoEstimate,
}

impl PairEstimate {
    pub fn as_matrix(&self) -> Option<&Matrix3> {
        match self {
            PairEstimate::Estimate(m) => Some(m),
            PairEstimate::NoEstimate => None,
        }
    }

    pub fn is_estimate(&self) -> bool {
        matches!(self, PairEstimate::Estimate(_))
    }

    /// Transform the contained matrix, keeping `NoEstimate` as is.
    pub fn map<F: FnOnce(&Matrix3) -> Matrix3>(&self, f: F) -> Self {
        match self {
            PairEstimate::Estimate(m) => PairEstimate::Estimate(f(m)),
            PairEstimate::NoEstimate => PairEstimate::NoEstimate,
        }
    }
}

impl From<Option<Matrix3>> for PairEstimate {
    fn from(m: Option<Matrix3>) -> Self {
        match m {
            Some(m) => PairEstimate::Estimate(m),
            None => PairEstimate::NoEstimate,
        }
    }
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Parameters controlling an estimation run.
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    /// Cyclic symmetry of the molecule. Default C4.
    pub symmetry: SymmetryOrder,
    /// Maximum 2D shift of the images in pixels. The self-common-line search
    /// covers 1D shifts up to `ceil(2√2 · max_shift)`. Default 2.
    pub max_shift: f64,
    /// Shift resolution in pixels. Default 1.
    pub shift_step: f64,
    /// Refine self-common-line angles below the ray spacing before computing
    /// `Rii`. Default true.
    pub refine_self_common_lines: bool,
    /// Number of tics of the voting histogram over [0°, 180°]. Default 60.
    pub histogram_bins: usize,
    /// Width (degrees) of the Gaussian each vote contributes. Default 3.
    pub histogram_sigma_deg: f64,
    /// Power-method stopping threshold on the change of the iterate. Default 5e-3.
    pub power_tolerance: f64,
    /// Power-method iteration cap. Default 1000.
    pub power_max_iterations: usize,
    /// Seed for the power-method start vector. Default 0.
    pub seed: u64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            symmetry: SymmetryOrder::C4,
            max_shift: 2.0,
            shift_step: 1.0,
            refine_self_common_lines: true,
            histogram_bins: 60,
            histogram_sigma_deg: 3.0,
            power_tolerance: 5e-3,
            power_max_iterations: 1000,
            seed: 0,
        }
    }
}

impl EstimatorConfig {
    /// Reject parameter combinations no stage can work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.shift_step > 0.0, "shift_step must be positive");
        anyhow::ensure!(self.max_shift >= 0.0, "max_shift must be non-negative");
        anyhow::ensure!(self.histogram_bins >= 2, "histogram needs at least 2 bins");
        anyhow::ensure!(
            self.histogram_sigma_deg > 0.0,
            "histogram_sigma_deg must be positive"
        );
        anyhow::ensure!(self.power_tolerance > 0.0, "power_tolerance must be positive");
        anyhow::ensure!(
            self.power_max_iterations > 0,
            "power_max_iterations must be at least 1"
        );
        Ok(())
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// Output of the synchronization stages (local J-sync through third rows).
#[derive(Debug, Clone)]
pub struct SyncResult {
    /// Globally synchronized `vij`, in pair order.
    pub vijs: Vec<PairEstimate>,
    /// Globally synchronized `vii`.
    pub viis: Vec<Matrix3>,
    /// Convergence record of the sign power method.
    pub power_method: PowerMethodStats,
    /// Unit viewing direction (third row of the rotation) per image.
    pub viewing_directions: Vec<Vector3>,
    /// Images without any estimated pair; their directions come from their
    /// own `vii` and their signs are not synchronized with the rest.
    pub isolated_images: Vec<usize>,
}

/// Everything produced by a full estimation run.
#[derive(Debug, Clone)]
pub struct EstimationResult {
    /// Common-line matrix used for voting (supplied or built).
    pub clmatrix: CommonLineMatrix,
    /// Detected self-common-lines, with correlation and winning shift index.
    pub self_common_lines: Vec<SelfCommonLine>,
    /// Self relative rotation per image.
    pub riis: Vec<Matrix3>,
    /// Relative rotation per pair, in pair order.
    pub rijs: Vec<PairEstimate>,
    /// Globally synchronized `vij`, in pair order.
    pub vijs: Vec<PairEstimate>,
    /// Globally synchronized `vii`.
    pub viis: Vec<Matrix3>,
    /// Convergence record of the sign power method.
    pub power_method: PowerMethodStats,
    /// Unit viewing direction per image; the terminal output.
    pub viewing_directions: Vec<Vector3>,
    /// Images without any estimated pair (see [`SyncResult::isolated_images`]).
    pub isolated_images: Vec<usize>,
    /// Number of pairs voting could not estimate.
    pub num_missing_pairs: usize,
    /// Wall-clock time of the run in milliseconds.
    pub solve_time_ms: f32,
}
