use numpy::ndarray;
use numpy::{Complex64, PyArray2, PyArray3, PyReadonlyArray2, PyReadonlyArray3};
use pyo3::prelude::*;

use clsym::{CommonLineMatrix, Complex, Matrix3, PairEstimate, PolarFourierStack, SymmetryOrder};

pub(crate) fn value_error(e: anyhow::Error) -> PyErr {
    pyo3::exceptions::PyValueError::new_err(format!("{:#}", e))
}

pub(crate) fn io_error(e: anyhow::Error) -> PyErr {
    pyo3::exceptions::PyIOError::new_err(format!("{:#}", e))
}

pub(crate) fn parse_symmetry(symmetry: &str) -> PyResult<SymmetryOrder> {
    symmetry.parse::<SymmetryOrder>().map_err(value_error)
}

/// Convert a `(n_images, n_rad, n_theta/2)` complex array to a polar stack.
pub(crate) fn parse_polar_stack(pf: PyReadonlyArray3<Complex64>) -> PyResult<PolarFourierStack> {
    let arr = pf.as_array();
    let (n_images, n_rad, n_half) = arr.dim();
    PolarFourierStack::from_fn(n_images, n_rad, 2 * n_half, |img, ray, k| {
        let c = arr[[img, k, ray]];
        Complex::new(c.re, c.im)
    })
    .map_err(value_error)
}

pub(crate) fn parse_clmatrix(clmatrix: PyReadonlyArray2<i64>, n_theta: usize) -> PyResult<CommonLineMatrix> {
    let arr = clmatrix.as_array();
    let (rows, cols) = arr.dim();
    if rows != cols {
        return Err(pyo3::exceptions::PyValueError::new_err(format!(
            "clmatrix must be square, got {}x{}",
            rows, cols
        )));
    }
    let entries = arr.iter().map(|&v| v as i32).collect();
    CommonLineMatrix::from_entries(rows, n_theta, entries).map_err(value_error)
}

pub(crate) fn clmatrix_to_array<'py>(py: Python<'py>, cl: &CommonLineMatrix) -> Bound<'py, PyArray2<i64>> {
    let n = cl.n_images();
    let mut out = ndarray::Array2::<i64>::zeros((n, n));
    for (idx, &v) in cl.entries().iter().enumerate() {
        out[[idx / n, idx % n]] = v as i64;
    }
    PyArray2::from_owned_array(py, out)
}

/// Stack 3x3 matrices into an `(m, 3, 3)` array.
pub(crate) fn matrices_to_array<'py>(py: Python<'py>, ms: &[Matrix3]) -> Bound<'py, PyArray3<f64>> {
    let mut out = ndarray::Array3::<f64>::zeros((ms.len(), 3, 3));
    for (i, m) in ms.iter().enumerate() {
        for r in 0..3 {
            for c in 0..3 {
                out[[i, r, c]] = m[(r, c)];
            }
        }
    }
    PyArray3::from_owned_array(py, out)
}

/// Pair estimates as an `(m, 3, 3)` array; missing estimates are all-NaN.
pub(crate) fn pair_estimates_to_array<'py>(
    py: Python<'py>,
    ps: &[PairEstimate],
) -> Bound<'py, PyArray3<f64>> {
    let nan = Matrix3::from_element(f64::NAN);
    let ms: Vec<Matrix3> = ps.iter().map(|p| *p.as_matrix().unwrap_or(&nan)).collect();
    matrices_to_array(py, &ms)
}

/// Inverse of [`pair_estimates_to_array`]: any NaN marks a missing estimate.
pub(crate) fn parse_pair_estimates(arr: PyReadonlyArray3<f64>) -> PyResult<Vec<PairEstimate>> {
    let arr = arr.as_array();
    let (m, r, c) = arr.dim();
    if (r, c) != (3, 3) {
        return Err(pyo3::exceptions::PyValueError::new_err(format!(
            "expected an (m, 3, 3) array, got ({}, {}, {})",
            m, r, c
        )));
    }
    Ok((0..m)
        .map(|i| {
            let mat = Matrix3::from_fn(|r, c| arr[[i, r, c]]);
            if mat.iter().any(|x| x.is_nan()) {
                PairEstimate::NoEstimate
            } else {
                PairEstimate::Estimate(mat)
            }
        })
        .collect())
}

pub(crate) fn parse_matrices(arr: PyReadonlyArray3<f64>) -> PyResult<Vec<Matrix3>> {
    parse_pair_estimates(arr)?
        .into_iter()
        .map(|p| {
            p.as_matrix().copied().ok_or_else(|| {
                pyo3::exceptions::PyValueError::new_err("matrices must not contain NaN")
            })
        })
        .collect()
}
