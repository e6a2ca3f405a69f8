//! Cyclic symmetry order (C3 or C4) and the constants that depend on it.
//!
//! Every step of the pipeline that behaves differently for order 3 and order 4
//! asks [`SymmetryOrder`] instead of branching on a raw integer.

use std::fmt;
use std::str::FromStr;

use crate::rotation::rot_z;
use crate::Matrix3;

/// Supported cyclic symmetry groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymmetryOrder {
    /// Three-fold rotational symmetry about the z-axis.
    C3,
    /// Four-fold rotational symmetry about the z-axis.
    C4,
}

impl SymmetryOrder {
    /// Build from an integer order. Only 3 and 4 are supported.
    pub fn from_order(n_symm: usize) -> anyhow::Result<Self> {
        match n_symm {
            3 => Ok(SymmetryOrder::C3),
            4 => Ok(SymmetryOrder::C4),
            _ => anyhow::bail!("symmetry order must be 3 or 4, got {}", n_symm),
        }
    }

    /// The group order `n`.
    pub fn order(self) -> usize {
        match self {
            SymmetryOrder::C3 => 3,
            SymmetryOrder::C4 => 4,
        }
    }

    /// Admissible angular separation between the two self-common-lines of an
    /// image, as an open interval `(min, max)` in radians.
    ///
    /// Antipodal lines correlate perfectly, so the windows stop short of 180°.
    pub fn self_common_line_window(self) -> (f64, f64) {
        let (lo, hi) = match self {
            SymmetryOrder::C3 => (60.0_f64, 165.0_f64),
            SymmetryOrder::C4 => (90.0_f64, 160.0_f64),
        };
        (lo.to_radians(), hi.to_radians())
    }

    /// Upper bound on the cosine of the self-common-line angle.
    pub fn max_cos_diff(self) -> f64 {
        match self {
            SymmetryOrder::C3 => 0.5,
            SymmetryOrder::C4 => 0.0,
        }
    }

    /// Tilt angle γ of the self relative rotation from an (already clamped)
    /// self-common-line cosine.
    pub fn gamma_from_cos_diff(self, cos_diff: f64) -> f64 {
        let c = match self {
            SymmetryOrder::C3 => cos_diff / (1.0 - cos_diff),
            SymmetryOrder::C4 => (1.0 + cos_diff) / (1.0 - cos_diff),
        };
        c.clamp(-1.0, 1.0).acos()
    }

    /// Symmetrized third-row outer product candidate used by local
    /// J-synchronization.
    ///
    /// `a` is the (possibly transposed and J-conjugated) self rotation of the
    /// first image, `b` the (possibly J-conjugated) self rotation of the second.
    pub fn symmetrize(self, rij: &Matrix3, a: &Matrix3, b: &Matrix3) -> Matrix3 {
        match self {
            SymmetryOrder::C3 => {
                (rij + a * rij * b + a.transpose() * rij * b.transpose()) / 3.0
            }
            SymmetryOrder::C4 => (rij + a * rij * b) / 2.0,
        }
    }

    /// Generator of the group: rotation by `2π/n` about the z-axis.
    pub fn generator(self) -> Matrix3 {
        rot_z(2.0 * std::f64::consts::PI / self.order() as f64)
    }

    /// All group elements `g^0 .. g^(n-1)`.
    pub fn group_elements(self) -> Vec<Matrix3> {
        let g = self.generator();
        let mut out = Vec::with_capacity(self.order());
        let mut cur = Matrix3::identity();
        for _ in 0..self.order() {
            out.push(cur);
            cur = g * cur;
        }
        out
    }
}

impl fmt::Display for SymmetryOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C{}", self.order())
    }
}

impl FromStr for SymmetryOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C3" | "3" => Ok(SymmetryOrder::C3),
            "C4" | "4" => Ok(SymmetryOrder::C4),
            other => anyhow::bail!("unsupported symmetry '{}', expected C3 or C4", other),
        }
    }
}
