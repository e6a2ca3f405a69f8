//! Python bindings for clsym via PyO3.
//!
//! Exposes the C3/C4 common-lines estimator to Python as the `clsymrs` module.

mod estimator;
mod helpers;

use numpy::ndarray;
use numpy::{Complex64, PyArray1, PyArray2, PyReadonlyArray3};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use clsym::estimator::self_common_lines::detect_self_common_lines;

use crate::helpers::{clmatrix_to_array, parse_polar_stack, parse_symmetry, value_error};

// ═══════════════════════════════════════════════════════════════════════════
// Stage functions
// ═══════════════════════════════════════════════════════════════════════════

/// Build the common-line matrix of a polar Fourier stack.
///
/// Args:
///     pf: complex128 array of shape (n_images, n_rad, n_theta/2).
///     max_shift: Maximum 1D shift in pixels. Default 2.
///     shift_step: Shift resolution in pixels. Default 1.
///
/// Returns:
///     dict with keys:
///         'clmatrix': (n_images, n_images) int64, diagonal -1.
///         'correlations': best correlation per pair, in pair order.
///         'shifts': shift (pixels) at the best correlation, per pair.
#[pyfunction]
#[pyo3(signature = (pf, max_shift = 2.0, shift_step = 1.0))]
fn build_clmatrix<'py>(
    py: Python<'py>,
    pf: PyReadonlyArray3<Complex64>,
    max_shift: f64,
    shift_step: f64,
) -> PyResult<Bound<'py, PyDict>> {
    let stack = parse_polar_stack(pf)?;
    let search = py
        .allow_threads(|| clsym::build_clmatrix(&stack, max_shift, shift_step))
        .map_err(value_error)?;

    let dict = PyDict::new(py);
    dict.set_item("clmatrix", clmatrix_to_array(py, &search.clmatrix))?;
    dict.set_item("correlations", PyArray1::from_vec(py, search.correlations))?;
    dict.set_item("shifts", PyArray1::from_vec(py, search.shifts))?;
    Ok(dict)
}

/// Detect the self-common-line pair of every image.
///
/// Args:
///     pf: complex128 array of shape (n_images, n_rad, n_theta/2).
///     symmetry: "C3" or "C4". Default "C4".
///     max_shift: Maximum 2D shift in pixels. Default 2.
///     shift_step: Shift resolution in pixels. Default 1.
///     refine: Refine the line angles below the ray spacing. Default True.
///
/// Returns:
///     (n_images, 6) float64 array of (ray1, ray2, correlation, shift_index,
///     theta1, theta2), angles in radians.
#[pyfunction]
#[pyo3(signature = (pf, symmetry = "C4", max_shift = 2.0, shift_step = 1.0, refine = true))]
fn self_common_lines<'py>(
    py: Python<'py>,
    pf: PyReadonlyArray3<Complex64>,
    symmetry: &str,
    max_shift: f64,
    shift_step: f64,
    refine: bool,
) -> PyResult<Bound<'py, PyArray2<f64>>> {
    let stack = parse_polar_stack(pf)?;
    let symmetry = parse_symmetry(symmetry)?;
    let scls = py
        .allow_threads(|| detect_self_common_lines(&stack, symmetry, max_shift, shift_step, refine))
        .map_err(value_error)?;

    let mut out = ndarray::Array2::<f64>::zeros((scls.len(), 6));
    for (i, s) in scls.iter().enumerate() {
        out[[i, 0]] = s.ray1 as f64;
        out[[i, 1]] = s.ray2 as f64;
        out[[i, 2]] = s.correlation;
        out[[i, 3]] = s.shift_index as f64;
        out[[i, 4]] = s.theta1;
        out[[i, 5]] = s.theta2;
    }
    Ok(PyArray2::from_owned_array(py, out))
}

// ═══════════════════════════════════════════════════════════════════════════
// Module definition
// ═══════════════════════════════════════════════════════════════════════════

/// clsymrs: common-lines orientation estimation for C3/C4 symmetric molecules
///
/// A Rust implementation exposed to Python via PyO3.
#[pymodule]
fn clsymrs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    estimator::register(m)?;
    m.add_function(wrap_pyfunction!(build_clmatrix, m)?)?;
    m.add_function(wrap_pyfunction!(self_common_lines, m)?)?;
    Ok(())
}
