//! # clsym
//!
//! **Common-lines orientation estimation** for cryo-EM images of molecules with
//! cyclic C3 or C4 symmetry, written in Rust.
//!
//! Given the polar Fourier transforms of `n` projection images, `clsym`
//! estimates the viewing direction (the third row of the unknown rotation) of
//! every image, up to the global handedness ambiguity inherent to the problem.
//!
//! ## Features
//!
//! - **Self-common-lines**: exploits the symmetry inside every single image
//! - **Voting**: robust per-pair relative rotations from all third images
//! - **J-synchronization**: local rank-1 selection plus a global sign power method
//! - **Parallel**: per image, per pair and per triple loops run on rayon
//! - **Caching**: common-line matrix and relative rotations serialize with
//!   [rkyv](https://docs.rs/rkyv) for reuse across runs
//!
//! ## Example
//!
//! ```no_run
//! use clsym::synthetic::{random_rotations, SymmetricVolume};
//! use clsym::{estimate_viewing_directions, EstimatorConfig, SymmetryOrder};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(1);
//! let rotations = random_rotations(20, &mut rng);
//! let volume = SymmetricVolume::standard(SymmetryOrder::C4);
//! let pf = volume.polar_stack(&rotations, 32, 360).unwrap();
//!
//! let config = EstimatorConfig {
//!     symmetry: SymmetryOrder::C4,
//!     max_shift: 0.0,
//!     ..Default::default()
//! };
//! let result = estimate_viewing_directions(&pf, None, &config).unwrap();
//! println!(
//!     "{} directions in {:.1} ms, power method converged: {}",
//!     result.viewing_directions.len(),
//!     result.solve_time_ms,
//!     result.power_method.converged
//! );
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Self-common-lines**: per image, the two rays that coincide under the
//!    symmetry, found by a masked, shift-searched correlation
//! 2. **Self relative rotations** `Rii` in closed form
//! 3. **Relative rotations** `Rij` by voting over third images `k`
//! 4. **Local J-sync**: rank-1 symmetrized outer products `vij ≈ vi·vjᵀ`
//! 5. **Global J-sync**: consistent handedness through triple signs
//! 6. **Third rows**: leading eigenvector of the stacked `vij` matrix

pub mod clmatrix;
pub mod estimator;
pub mod pairs;
pub mod polar;
pub mod rotation;
pub mod symmetry;
pub mod synthetic;

pub use clmatrix::CommonLineMatrix;
pub use estimator::cache::RotationCache;
pub use estimator::common_lines::{build_clmatrix, CommonLineSearch};
pub use estimator::pipeline::{estimate_viewing_directions, synchronize};
pub use estimator::{
    EstimationResult, EstimatorConfig, PairEstimate, PowerMethodStats, SelfCommonLine,
    SyncResult,
};
pub use pairs::PairIndex;
pub use polar::{PolarFourierStack, ShiftBank};
pub use symmetry::SymmetryOrder;

// All geometry is double precision; single-precision stacks are promoted on input.
pub type Matrix3 = nalgebra::Matrix3<f64>;
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Complex = nalgebra::Complex<f64>;
