use numpy::ndarray;
use numpy::{Complex64, PyArray1, PyArray2, PyArray3, PyReadonlyArray2, PyReadonlyArray3};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use clsym::{
    estimate_viewing_directions, synchronize, EstimatorConfig, RotationCache, SyncResult,
    Vector3,
};

use crate::helpers::{
    clmatrix_to_array, io_error, matrices_to_array, pair_estimates_to_array, parse_clmatrix,
    parse_matrices, parse_pair_estimates, parse_polar_stack, parse_symmetry, value_error,
};

fn directions_to_array<'py>(py: Python<'py>, vs: &[Vector3]) -> Bound<'py, PyArray2<f64>> {
    let mut out = ndarray::Array2::<f64>::zeros((vs.len(), 3));
    for (i, v) in vs.iter().enumerate() {
        for c in 0..3 {
            out[[i, c]] = v[c];
        }
    }
    PyArray2::from_owned_array(py, out)
}

fn set_sync_items(dict: &Bound<'_, PyDict>, py: Python<'_>, sync: &SyncResult) -> PyResult<()> {
    dict.set_item("viewing_directions", directions_to_array(py, &sync.viewing_directions))?;
    dict.set_item("vijs", pair_estimates_to_array(py, &sync.vijs))?;
    dict.set_item("viis", matrices_to_array(py, &sync.viis))?;
    dict.set_item("power_method_iterations", sync.power_method.iterations)?;
    dict.set_item("power_method_converged", sync.power_method.converged)?;
    dict.set_item("power_method_residual", sync.power_method.residual)?;
    dict.set_item(
        "isolated_images",
        PyArray1::from_vec(py, sync.isolated_images.iter().map(|&i| i as i64).collect()),
    )?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// PyOrientationEstimator — wraps EstimatorConfig and the pipeline driver
// ═══════════════════════════════════════════════════════════════════════════

/// Viewing-direction estimator for C3/C4 symmetric molecules.
///
/// Example:
///     est = clsymrs.OrientationEstimator(symmetry="C4", max_shift=2.0)
///     res = est.estimate(pf)
///     res["viewing_directions"]  # (n_images, 3)
#[pyclass(name = "OrientationEstimator")]
struct PyOrientationEstimator {
    config: EstimatorConfig,
}

#[pymethods]
impl PyOrientationEstimator {
    /// Args:
    ///     symmetry: "C3" or "C4". Default "C4".
    ///     max_shift: Maximum 2D image shift in pixels. Default 2.
    ///     shift_step: Shift resolution in pixels. Default 1.
    ///     refine_self_common_lines: Refine self-common-line angles below the
    ///         ray spacing. Default True.
    ///     histogram_bins: Voting histogram tics over [0°, 180°]. Default 60.
    ///     histogram_sigma_deg: Width of each vote in degrees. Default 3.
    ///     power_tolerance: Power-method stopping threshold. Default 5e-3.
    ///     power_max_iterations: Power-method iteration cap. Default 1000.
    ///     seed: Seed of the power-method start vector. Default 0.
    #[new]
    #[pyo3(signature = (
        symmetry = "C4",
        max_shift = 2.0,
        shift_step = 1.0,
        refine_self_common_lines = true,
        histogram_bins = 60,
        histogram_sigma_deg = 3.0,
        power_tolerance = 5e-3,
        power_max_iterations = 1000,
        seed = 0,
    ))]
    fn new(
        symmetry: &str,
        max_shift: f64,
        shift_step: f64,
        refine_self_common_lines: bool,
        histogram_bins: usize,
        histogram_sigma_deg: f64,
        power_tolerance: f64,
        power_max_iterations: usize,
        seed: u64,
    ) -> PyResult<Self> {
        let config = EstimatorConfig {
            symmetry: parse_symmetry(symmetry)?,
            max_shift,
            shift_step,
            refine_self_common_lines,
            histogram_bins,
            histogram_sigma_deg,
            power_tolerance,
            power_max_iterations,
            seed,
        };
        config.validate().map_err(value_error)?;
        Ok(PyOrientationEstimator { config })
    }

    /// Estimate viewing directions from polar Fourier transforms.
    ///
    /// Args:
    ///     pf: complex128 array of shape (n_images, n_rad, n_theta/2).
    ///     clmatrix: Optional (n_images, n_images) integer common-line matrix.
    ///         Built from pf when None.
    ///
    /// Returns:
    ///     dict with keys: 'viewing_directions', 'clmatrix',
    ///     'self_common_lines', 'self_common_line_angles',
    ///     'self_common_line_correlations', 'self_common_line_shift_indices',
    ///     'riis', 'rijs', 'vijs', 'viis', 'num_missing_pairs',
    ///     'isolated_images', 'power_method_iterations',
    ///     'power_method_converged', 'power_method_residual', 'solve_time_ms'.
    ///     Missing relative rotations are all-NaN 3x3 blocks.
    #[pyo3(signature = (pf, clmatrix = None))]
    fn estimate<'py>(
        &self,
        py: Python<'py>,
        pf: PyReadonlyArray3<Complex64>,
        clmatrix: Option<PyReadonlyArray2<i64>>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let stack = parse_polar_stack(pf)?;
        let cl = match clmatrix {
            Some(c) => Some(parse_clmatrix(c, stack.n_theta())?),
            None => None,
        };
        let config = self.config.clone();
        let result = py
            .allow_threads(|| estimate_viewing_directions(&stack, cl.as_ref(), &config))
            .map_err(value_error)?;

        let dict = PyDict::new(py);
        let sync = SyncResult {
            vijs: result.vijs,
            viis: result.viis,
            power_method: result.power_method,
            viewing_directions: result.viewing_directions,
            isolated_images: result.isolated_images,
        };
        set_sync_items(&dict, py, &sync)?;
        dict.set_item("clmatrix", clmatrix_to_array(py, &result.clmatrix))?;

        let scls = &result.self_common_lines;
        let mut rays = ndarray::Array2::<i64>::zeros((scls.len(), 2));
        let mut angles = ndarray::Array2::<f64>::zeros((scls.len(), 2));
        for (i, s) in scls.iter().enumerate() {
            rays[[i, 0]] = s.ray1 as i64;
            rays[[i, 1]] = s.ray2 as i64;
            angles[[i, 0]] = s.theta1;
            angles[[i, 1]] = s.theta2;
        }
        dict.set_item("self_common_lines", PyArray2::from_owned_array(py, rays))?;
        dict.set_item("self_common_line_angles", PyArray2::from_owned_array(py, angles))?;
        dict.set_item(
            "self_common_line_correlations",
            PyArray1::from_vec(py, scls.iter().map(|s| s.correlation).collect()),
        )?;
        dict.set_item(
            "self_common_line_shift_indices",
            PyArray1::from_vec(py, scls.iter().map(|s| s.shift_index as i64).collect()),
        )?;
        dict.set_item("riis", matrices_to_array(py, &result.riis))?;
        dict.set_item("rijs", pair_estimates_to_array(py, &result.rijs))?;
        dict.set_item("num_missing_pairs", result.num_missing_pairs)?;
        dict.set_item("solve_time_ms", result.solve_time_ms as f64)?;
        Ok(dict)
    }

    /// Run only the synchronization stages on given relative rotations.
    ///
    /// Args:
    ///     rijs: (n_pairs, 3, 3) array in pair order; NaN blocks are missing.
    ///     riis: (n_images, 3, 3) self relative rotations.
    ///
    /// Returns:
    ///     dict with keys: 'viewing_directions', 'vijs', 'viis',
    ///     'isolated_images', 'power_method_iterations',
    ///     'power_method_converged', 'power_method_residual'.
    fn synchronize<'py>(
        &self,
        py: Python<'py>,
        rijs: PyReadonlyArray3<f64>,
        riis: PyReadonlyArray3<f64>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let rijs = parse_pair_estimates(rijs)?;
        let riis = parse_matrices(riis)?;
        let config = self.config.clone();
        let sync = py
            .allow_threads(|| synchronize(&rijs, &riis, &config))
            .map_err(value_error)?;
        let dict = PyDict::new(py);
        set_sync_items(&dict, py, &sync)?;
        Ok(dict)
    }

    /// Symmetry order as a string ("C3" or "C4").
    #[getter]
    fn symmetry(&self) -> String {
        self.config.symmetry.to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "OrientationEstimator(symmetry={}, max_shift={}, shift_step={}, refine={}, seed={})",
            self.config.symmetry,
            self.config.max_shift,
            self.config.shift_step,
            self.config.refine_self_common_lines,
            self.config.seed
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PyRotationCache — wraps RotationCache
// ═══════════════════════════════════════════════════════════════════════════

/// Saved common-line matrix and relative rotations for reuse across runs.
///
/// Example:
///     res = est.estimate(pf)
///     cache = clsymrs.RotationCache("C4", res["clmatrix"], res["rijs"], n_theta)
///     cache.save_to_file("run.rkyv")
#[pyclass(name = "RotationCache")]
struct PyRotationCache {
    inner: RotationCache,
}

#[pymethods]
impl PyRotationCache {
    #[new]
    fn new(
        symmetry: &str,
        clmatrix: PyReadonlyArray2<i64>,
        rijs: PyReadonlyArray3<f64>,
        n_theta: usize,
    ) -> PyResult<Self> {
        let cl = parse_clmatrix(clmatrix, n_theta)?;
        let rijs = parse_pair_estimates(rijs)?;
        let inner = RotationCache::new(parse_symmetry(symmetry)?, &cl, &rijs).map_err(value_error)?;
        Ok(PyRotationCache { inner })
    }

    /// Save the cache to a file.
    fn save_to_file(&self, path: &str) -> PyResult<()> {
        self.inner.save_to_file(path).map_err(io_error)
    }

    /// Load a cache from a file.
    #[staticmethod]
    fn load_from_file(path: &str) -> PyResult<Self> {
        let inner = RotationCache::load_from_file(path).map_err(io_error)?;
        Ok(PyRotationCache { inner })
    }

    #[getter]
    fn clmatrix<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<i64>> {
        clmatrix_to_array(py, &self.inner.clmatrix)
    }

    /// Relative rotations, (n_pairs, 3, 3); NaN blocks are missing.
    #[getter]
    fn rijs<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<f64>> {
        pair_estimates_to_array(py, &self.inner.relative_rotations())
    }

    #[getter]
    fn symmetry(&self) -> PyResult<String> {
        Ok(self.inner.symmetry().map_err(value_error)?.to_string())
    }

    fn __repr__(&self) -> String {
        format!(
            "RotationCache(images={}, n_theta={}, order={})",
            self.inner.clmatrix.n_images(),
            self.inner.clmatrix.n_theta(),
            self.inner.symmetry_order
        )
    }
}

pub(crate) fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyOrientationEstimator>()?;
    m.add_class::<PyRotationCache>()?;
    Ok(())
}
