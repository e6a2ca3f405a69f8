//! Polar Fourier transforms of projection images.
//!
//! Each image is stored as `n_theta / 2` rays spanning the half circle
//! `[0, π)`, each ray holding `n_rad` complex samples ordered by increasing
//! radial frequency. Ray `l` samples the in-plane direction
//! `(cos θ_l, -sin θ_l)` with `θ_l = 2πl / n_theta`. Rays of the other half
//! circle follow from conjugate symmetry: `ray(l + n_theta/2) = conj(ray(l))`.
//!
//! Radial sample `k` (0-based) lies at angular frequency
//! `2π(k+1) / (2·n_rad + 1)` radians per pixel, which is the frequency grid the
//! shift phases of [`ShiftBank`] are built for.

use std::f64::consts::PI;

use anyhow::ensure;

use crate::Complex;

/// Stack of half-circle polar Fourier transforms, one per image.
#[derive(Debug, Clone)]
pub struct PolarFourierStack {
    n_images: usize,
    n_rad: usize,
    n_theta: usize,
    /// Layout: `[image][ray][radial]`, radial fastest.
    data: Vec<Complex>,
}

impl PolarFourierStack {
    /// Wrap image-major data laid out as `[image][ray][radial]`.
    pub fn new(n_rad: usize, n_theta: usize, data: Vec<Complex>) -> anyhow::Result<Self> {
        ensure!(n_rad > 0, "polar transform needs at least one radial sample");
        ensure!(
            n_theta >= 4 && n_theta % 2 == 0,
            "n_theta must be even and at least 4, got {}",
            n_theta
        );
        let per_image = n_rad * n_theta / 2;
        ensure!(
            data.len() % per_image == 0,
            "data length {} is not a multiple of n_rad * n_theta / 2 = {}",
            data.len(),
            per_image
        );
        Ok(Self {
            n_images: data.len() / per_image,
            n_rad,
            n_theta,
            data,
        })
    }

    /// Single-precision input, promoted to `f64` for the computation.
    pub fn from_f32(
        n_rad: usize,
        n_theta: usize,
        data: &[nalgebra::Complex<f32>],
    ) -> anyhow::Result<Self> {
        let promoted = data
            .iter()
            .map(|c| Complex::new(c.re as f64, c.im as f64))
            .collect();
        Self::new(n_rad, n_theta, promoted)
    }

    /// Build by evaluating `f(image, ray, radial)` for every sample.
    pub fn from_fn<F>(
        n_images: usize,
        n_rad: usize,
        n_theta: usize,
        mut f: F,
    ) -> anyhow::Result<Self>
    where
        F: FnMut(usize, usize, usize) -> Complex,
    {
        let mut data = Vec::with_capacity(n_images * n_rad * n_theta / 2);
        for img in 0..n_images {
            for ray in 0..n_theta / 2 {
                for k in 0..n_rad {
                    data.push(f(img, ray, k));
                }
            }
        }
        Self::new(n_rad, n_theta, data)
    }

    pub fn n_images(&self) -> usize {
        self.n_images
    }

    pub fn n_rad(&self) -> usize {
        self.n_rad
    }

    /// Number of rays over the full circle.
    pub fn n_theta(&self) -> usize {
        self.n_theta
    }

    /// Stored rays per image (`n_theta / 2`).
    pub fn n_half(&self) -> usize {
        self.n_theta / 2
    }

    /// Ray `l` of image `img`, `l < n_theta / 2`.
    pub fn ray(&self, img: usize, l: usize) -> &[Complex] {
        let start = (img * self.n_half() + l) * self.n_rad;
        &self.data[start..start + self.n_rad]
    }

    /// Half-circle rays of one image, each scaled by `weights` (if given) and
    /// normalized to unit L2 norm.
    pub fn normalized_half_rays(&self, img: usize, weights: Option<&[f64]>) -> Vec<Vec<Complex>> {
        (0..self.n_half())
            .map(|l| {
                let mut ray: Vec<Complex> = match weights {
                    Some(w) => self.ray(img, l).iter().zip(w).map(|(c, &h)| *c * h).collect(),
                    None => self.ray(img, l).to_vec(),
                };
                normalize_ray(&mut ray);
                ray
            })
            .collect()
    }

    /// Full-circle rays of one image, normalized. Rays `n_theta/2 ..` are the
    /// conjugates of the stored rays.
    pub fn normalized_full_rays(&self, img: usize, weights: Option<&[f64]>) -> Vec<Vec<Complex>> {
        let half = self.normalized_half_rays(img, weights);
        let conj: Vec<Vec<Complex>> = half
            .iter()
            .map(|ray| ray.iter().map(|c| c.conj()).collect())
            .collect();
        half.into_iter().chain(conj).collect()
    }
}

// ── Angular interpolation ───────────────────────────────────────────────────

/// Angular Fourier series of one image's polar transform.
///
/// Every radial circle is periodic in θ and sampled at `n_theta` angles, so
/// its DFT gives a trigonometric interpolant that reproduces the stored rays
/// exactly and evaluates rays between them. The Nyquist term uses
/// `cos(n_theta/2 · θ)` to stay real-symmetric.
#[derive(Debug, Clone)]
pub struct AngularSpectrum {
    n_rad: usize,
    n_theta: usize,
    /// Layout: `[radial][frequency]`, frequency index `m` in `0..n_theta`.
    coeffs: Vec<Complex>,
}

impl AngularSpectrum {
    pub fn new(pf: &PolarFourierStack, img: usize) -> Self {
        let n_theta = pf.n_theta();
        let n_half = pf.n_half();
        let n_rad = pf.n_rad();
        let twiddle: Vec<Complex> = (0..n_theta)
            .map(|t| Complex::from_polar(1.0, -2.0 * PI * t as f64 / n_theta as f64))
            .collect();

        let mut coeffs = vec![Complex::new(0.0, 0.0); n_rad * n_theta];
        for l in 0..n_theta {
            let stored = pf.ray(img, l % n_half);
            for (k, &s) in stored.iter().enumerate() {
                let sample = if l < n_half { s } else { s.conj() };
                let row = &mut coeffs[k * n_theta..(k + 1) * n_theta];
                for (m, c) in row.iter_mut().enumerate() {
                    *c += sample * twiddle[(m * l) % n_theta];
                }
            }
        }
        let scale = 1.0 / n_theta as f64;
        for c in coeffs.iter_mut() {
            *c *= scale;
        }
        Self {
            n_rad,
            n_theta,
            coeffs,
        }
    }

    /// The ray at angle `theta` (radians), `n_rad` samples.
    pub fn ray_at(&self, theta: f64) -> Vec<Complex> {
        let nyquist = self.n_theta / 2;
        let basis: Vec<Complex> = (0..self.n_theta)
            .map(|m| {
                if m == nyquist {
                    Complex::new((nyquist as f64 * theta).cos(), 0.0)
                } else {
                    let f = if m < nyquist {
                        m as f64
                    } else {
                        m as f64 - self.n_theta as f64
                    };
                    Complex::from_polar(1.0, f * theta)
                }
            })
            .collect();
        (0..self.n_rad)
            .map(|k| {
                self.coeffs[k * self.n_theta..(k + 1) * self.n_theta]
                    .iter()
                    .zip(&basis)
                    .map(|(c, b)| c * b)
                    .sum()
            })
            .collect()
    }
}

/// Scale `ray` to unit L2 norm. All-zero rays are left untouched.
pub fn normalize_ray(ray: &mut [Complex]) {
    let norm = ray.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 {
        for c in ray.iter_mut() {
            *c /= norm;
        }
    }
}

/// `Re Σ a_k · b_k` (no conjugation).
pub fn real_dot(a: &[Complex], b: &[Complex]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x.re * y.re - x.im * y.im).sum()
}

/// `Re Σ a_k · conj(b_k)`.
pub fn real_dot_conj(a: &[Complex], b: &[Complex]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x.re * y.re + x.im * y.im).sum()
}

// ── Shift bank ──────────────────────────────────────────────────────────────

/// Discrete bank of 1D in-line shifts and the radial band-pass filter used by
/// the common-line searches.
#[derive(Debug, Clone)]
pub struct ShiftBank {
    /// Shift values in pixels, `-max_shift + m·step`.
    pub shifts: Vec<f64>,
    /// `phases[m][k]`: phase factor of shift `m` at radial sample `k`.
    pub phases: Vec<Vec<Complex>>,
    /// Radial filter weight per sample.
    pub filter: Vec<f64>,
}

impl ShiftBank {
    /// Shifts over `[-max_shift, max_shift]` at `step`, for rays with `n_rad`
    /// samples.
    pub fn new(n_rad: usize, max_shift: f64, step: f64) -> anyhow::Result<Self> {
        ensure!(step > 0.0, "shift step must be positive, got {}", step);
        ensure!(max_shift >= 0.0, "max shift must be non-negative, got {}", max_shift);

        let n_shifts = (2.0 * max_shift / step + 1.0).ceil() as usize;
        let denom = (2 * n_rad + 1) as f64;
        let shifts: Vec<f64> = (0..n_shifts)
            .map(|m| -max_shift + m as f64 * step)
            .collect();
        let phases = shifts
            .iter()
            .map(|&s| {
                (0..n_rad)
                    .map(|k| {
                        let arg = -2.0 * PI * (k + 1) as f64 * s / denom;
                        Complex::from_polar(1.0, arg)
                    })
                    .collect()
            })
            .collect();

        let sigma = n_rad as f64 / 4.0;
        let filter = (0..n_rad)
            .map(|k| {
                let r = (k + 1) as f64;
                r.sqrt() * (-r * r / (2.0 * sigma * sigma)).exp()
            })
            .collect();

        Ok(Self {
            shifts,
            phases,
            filter,
        })
    }

    pub fn len(&self) -> usize {
        self.shifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    /// Apply shift `m` to a ray in place.
    pub fn apply(&self, m: usize, ray: &mut [Complex]) {
        for (c, p) in ray.iter_mut().zip(&self.phases[m]) {
            *c *= *p;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_stack(n_images: usize, n_rad: usize, n_theta: usize) -> PolarFourierStack {
        PolarFourierStack::from_fn(n_images, n_rad, n_theta, |img, ray, k| {
            Complex::new((img + 1) as f64, (ray * n_rad + k) as f64)
        })
        .unwrap()
    }

    #[test]
    fn test_layout_and_accessors() {
        let pf = ramp_stack(3, 4, 8);
        assert_eq!(pf.n_images(), 3);
        assert_eq!(pf.n_half(), 4);
        assert_eq!(pf.ray(2, 1)[3], Complex::new(3.0, 7.0));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(PolarFourierStack::new(4, 7, vec![Complex::new(0.0, 0.0); 14]).is_err());
        assert!(PolarFourierStack::new(4, 8, vec![Complex::new(0.0, 0.0); 15]).is_err());
        assert!(PolarFourierStack::new(0, 8, vec![]).is_err());
    }

    #[test]
    fn test_from_f32_promotes() {
        let data = vec![nalgebra::Complex::new(1.5_f32, -0.25_f32); 2 * 4];
        let pf = PolarFourierStack::from_f32(2, 8, &data).unwrap();
        assert_eq!(pf.n_images(), 1);
        assert_eq!(pf.ray(0, 3)[1], Complex::new(1.5, -0.25));
    }

    #[test]
    fn test_full_rays_are_conjugate_and_unit() {
        let pf = ramp_stack(1, 5, 12);
        let full = pf.normalized_full_rays(0, None);
        assert_eq!(full.len(), 12);
        for l in 0..6 {
            let n: f64 = full[l].iter().map(|c| c.norm_sqr()).sum();
            assert!((n - 1.0).abs() < 1e-12);
            for k in 0..5 {
                assert_eq!(full[l + 6][k], full[l][k].conj());
            }
        }
    }

    #[test]
    fn test_normalize_zero_ray_is_noop() {
        let mut ray = vec![Complex::new(0.0, 0.0); 3];
        normalize_ray(&mut ray);
        assert!(ray.iter().all(|c| c.norm() == 0.0));
    }

    #[test]
    fn test_dot_products() {
        let a = vec![Complex::new(1.0, 2.0), Complex::new(0.0, -1.0)];
        let b = vec![Complex::new(3.0, -1.0), Complex::new(2.0, 2.0)];
        // a·b = (1+2i)(3-i) + (-i)(2+2i) = (5+5i) + (2-2i) = 7+3i
        assert!((real_dot(&a, &b) - 7.0).abs() < 1e-12);
        // a·conj(b) = (1+2i)(3+i) + (-i)(2-2i) = (1+7i) + (-2-2i) = -1+5i
        assert!((real_dot_conj(&a, &b) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_shift_bank() {
        let bank = ShiftBank::new(8, 2.0, 1.0).unwrap();
        assert_eq!(bank.len(), 5);
        assert_eq!(bank.shifts, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        // Zero shift is the identity phase
        assert!(bank.phases[2].iter().all(|p| (p - Complex::new(1.0, 0.0)).norm() < 1e-15));
        // Opposite shifts are conjugate
        for k in 0..8 {
            assert!((bank.phases[0][k] - bank.phases[4][k].conj()).norm() < 1e-12);
        }
        assert!(bank.filter.iter().all(|&h| h > 0.0));
    }

    #[test]
    fn test_shift_bank_without_shifts() {
        let bank = ShiftBank::new(8, 0.0, 1.0).unwrap();
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.shifts, vec![0.0]);
        assert!(ShiftBank::new(8, 1.0, 0.0).is_err());
        assert!(ShiftBank::new(8, -1.0, 1.0).is_err());
    }

    #[test]
    fn test_angular_spectrum_reproduces_grid_rays() {
        let pf = ramp_stack(2, 3, 12);
        let spectrum = AngularSpectrum::new(&pf, 1);
        let step = 2.0 * PI / 12.0;
        for l in 0..12 {
            let ray = spectrum.ray_at(l as f64 * step);
            for (k, c) in ray.iter().enumerate() {
                let stored = pf.ray(1, l % 6)[k];
                let expected = if l < 6 { stored } else { stored.conj() };
                assert!((c - expected).norm() < 1e-9, "ray {} sample {}", l, k);
            }
        }
    }

    #[test]
    fn test_angular_spectrum_interpolates_between_rays() {
        use crate::rotation::euler_zyz;
        use crate::symmetry::SymmetryOrder;
        use crate::synthetic::SymmetricVolume;
        use crate::Vector3;

        let volume = SymmetricVolume::standard(SymmetryOrder::C4);
        let rot = euler_zyz(0.5, 0.9, 0.2);
        let (n_rad, n_theta) = (16, 72);
        let pf = volume.polar_stack(&[rot], n_rad, n_theta).unwrap();
        let spectrum = AngularSpectrum::new(&pf, 0);

        // Off-grid angle, compared with the analytic transform
        let theta = 0.123;
        let ray = spectrum.ray_at(theta);
        let denom = (2 * n_rad + 1) as f64;
        for (k, c) in ray.iter().enumerate() {
            let omega = 2.0 * PI * (k + 1) as f64 / denom;
            let dir = Vector3::new(omega * theta.cos(), -omega * theta.sin(), 0.0);
            let exact = volume.fourier(&(rot * dir));
            assert!((c - exact).norm() < 1e-8, "sample {}: {} vs {}", k, c, exact);
        }
    }
}
