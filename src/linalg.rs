// SVD backend seam. The solver treats the decomposition as a black-box
// primitive: orthonormal factors and non-negative singular values in
// descending order.

use ndarray::{s, Array1, Array2};
use ndarray_linalg::SVDInto;

use crate::SparsePcaError;

/// Output of a thin singular value decomposition, `M = U * diag(s) * Vt`
/// for an n x m input with `r = min(n, m)`.
#[derive(Debug)]
pub struct SvdOutput {
    /// Left singular vectors as columns, shape (n, r), present when
    /// requested.
    pub u: Option<Array2<f64>>,
    /// Singular values, length r, non-negative, descending.
    pub s: Array1<f64>,
    /// Right singular vectors as rows, shape (r, m), present when
    /// requested.
    pub vt: Option<Array2<f64>>,
}

/// Trait for thin singular value decomposition.
pub trait BackendSvd {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SvdOutput, SparsePcaError>;
}

/// LAPACK-backed implementation via `ndarray-linalg`.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

impl BackendSvd for NdarrayLinAlgBackend {
    fn svd_into(
        &self,
        matrix: Array2<f64>,
        compute_u: bool,
        compute_v: bool,
    ) -> Result<SvdOutput, SparsePcaError> {
        let (u, s, vt) = matrix
            .svd_into(compute_u, compute_v)
            .map_err(|e| SparsePcaError::NumericalFailure(format!("SVD failed: {}", e)))?;
        // LAPACK returns the full factors (U n x n, Vt m x m); narrow both
        // to the thin contract so consumers can form products directly.
        let rank = s.len();
        let u = u.map(|u| {
            if u.ncols() > rank {
                u.slice(s![.., ..rank]).to_owned()
            } else {
                u
            }
        });
        let vt = vt.map(|vt| {
            if vt.nrows() > rank {
                vt.slice(s![..rank, ..]).to_owned()
            } else {
                vt
            }
        });
        Ok(SvdOutput { u, s, vt })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn svd_returns_thin_descending_orthonormal_factors() {
        let m = array![[3.0, 1.0], [1.0, 3.0], [0.0, 2.0]];
        let out = NdarrayLinAlgBackend
            .svd_into(m.clone(), true, true)
            .expect("SVD of a small well-formed matrix");

        assert_eq!(out.s.len(), 2);
        assert!(out.s[0] >= out.s[1]);
        assert!(out.s.iter().all(|&v| v >= 0.0));

        // Thin contract: U is (n, r) and Vt is (r, m), never the full
        // square factors, so products like U * Vt are well-formed.
        let u = out.u.expect("U requested");
        let vt = out.vt.expect("V^T requested");
        assert_eq!(u.dim(), (3, 2));
        assert_eq!(vt.dim(), (2, 2));

        let gram = u.t().dot(&u);
        assert_eq!(gram.dim(), (2, 2));
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[[i, j]], expected, epsilon = 1e-12);
            }
        }

        // The thin factors reproduce the input.
        let mut us = u.clone();
        for (mut column, &sv) in us.columns_mut().into_iter().zip(out.s.iter()) {
            column.mapv_inplace(|v| v * sv);
        }
        let reconstruction = us.dot(&vt);
        for (a, b) in reconstruction.iter().zip(m.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn svd_without_factors_still_yields_singular_values() {
        let m = array![[2.0, 0.0], [0.0, 1.0]];
        let out = NdarrayLinAlgBackend.svd_into(m, false, false).unwrap();
        assert!(out.u.is_none());
        assert!(out.vt.is_none());
        assert_abs_diff_eq!(out.s[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out.s[1], 1.0, epsilon = 1e-12);
    }
}
