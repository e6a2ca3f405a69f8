//! Small rotation-matrix toolkit shared by every pipeline stage.
//!
//! Conventions: `rot_z(a)` and `rot_y(a)` are right-handed active rotations,
//! Euler angles follow the Z-Y-Z convention `R = Rz(a)·Ry(b)·Rz(c)`, and `J`
//! is the handedness flip `diag(-1, -1, 1)`.

use crate::Matrix3;

/// The handedness operator `J = diag(-1, -1, 1)`.
pub fn j_matrix() -> Matrix3 {
    Matrix3::from_diagonal(&crate::Vector3::new(-1.0, -1.0, 1.0))
}

/// `J·M·J`: negates the four entries that mix the xy-plane with the z-axis.
pub fn j_conjugate(m: &Matrix3) -> Matrix3 {
    let mut out = *m;
    out[(0, 2)] = -out[(0, 2)];
    out[(1, 2)] = -out[(1, 2)];
    out[(2, 0)] = -out[(2, 0)];
    out[(2, 1)] = -out[(2, 1)];
    out
}

/// Rotation by `angle` about the z-axis.
pub fn rot_z(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Rotation by `angle` about the y-axis.
pub fn rot_y(angle: f64) -> Matrix3 {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

/// Z-Y-Z Euler rotation `Rz(alpha)·Ry(beta)·Rz(gamma)`.
pub fn euler_zyz(alpha: f64, beta: f64, gamma: f64) -> Matrix3 {
    rot_z(alpha) * rot_y(beta) * rot_z(gamma)
}

/// Integer power `m^p` (`m^0` is the identity).
pub fn matrix_power(m: &Matrix3, p: usize) -> Matrix3 {
    let mut out = Matrix3::identity();
    for _ in 0..p {
        out = out * m;
    }
    out
}

/// Closest proper rotation to `m` in the Frobenius norm.
///
/// Computed as `U·diag(1, 1, det(U·Vᵀ))·Vᵀ` from the SVD of `m`. Returns
/// `None` only if the decomposition fails to produce singular vectors.
pub fn nearest_rotation(m: &Matrix3) -> Option<Matrix3> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let d = (u * v_t).determinant();
    let fix = Matrix3::from_diagonal(&crate::Vector3::new(1.0, 1.0, d.signum()));
    Some(u * fix * v_t)
}

/// True when `m` is orthogonal with determinant +1 to within `tol`.
pub fn is_rotation(m: &Matrix3, tol: f64) -> bool {
    let ortho = (m.transpose() * m - Matrix3::identity()).norm();
    ortho < tol && (m.determinant() - 1.0).abs() < tol
}

/// Singular values of `m` in descending order.
pub fn singular_values(m: &Matrix3) -> [f64; 3] {
    let sv = m.singular_values();
    let mut out = [sv[0], sv[1], sv[2]];
    out.sort_by(|a, b| b.total_cmp(a));
    out
}
