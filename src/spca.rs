// Robust sparse PCA solver: alternating variable projection over the
// rotation A, the sparse loadings B, and the sparse outlier matrix S.

use log::{debug, info, warn};
use ndarray::{s, Array1, Array2};

use crate::linalg::{BackendSvd, NdarrayLinAlgBackend};
use crate::preprocess::{preprocess, total_variance};
use crate::SparsePcaError;

/// Configuration for a robust sparse PCA fit.
///
/// Hyperparameters are taken as given; the solver does not tune them.
/// `alpha` and `beta` are rescaled internally by the squared dominant
/// singular value of the preprocessed data before use.
///
/// # Examples
///
/// ```no_run
/// use ndarray::array;
/// use robust_spca::RobustSparsePcaParams;
///
/// let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 7.0]];
/// let result = RobustSparsePcaParams::default().rank(1).fit(x).unwrap();
/// assert_eq!(result.loadings().ncols(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RobustSparsePcaParams {
    k: Option<usize>,
    alpha: f64,
    beta: f64,
    gamma: f64,
    center: bool,
    scale: bool,
    max_iter: usize,
    tol: f64,
    verbose: bool,
}

impl Default for RobustSparsePcaParams {
    fn default() -> Self {
        Self {
            k: None,
            alpha: 1e-4,
            beta: 1e-4,
            gamma: 100.0,
            center: true,
            scale: false,
            max_iter: 1000,
            tol: 1e-5,
            verbose: false,
        }
    }
}

impl RobustSparsePcaParams {
    /// Target rank (number of components). Defaults to `min(n, p)`; values
    /// larger than that are clamped during the fit.
    pub fn rank(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Sparsity weight on the loadings (L1 penalty).
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Ridge weight on the loadings (L2 penalty).
    pub fn beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    /// Sparsity threshold on the outlier matrix. Residual entries with
    /// magnitude at most `gamma` are treated as noise, larger ones as
    /// outliers.
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Subtract column means before fitting.
    pub fn center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    /// Divide columns by their sample standard deviation before fitting.
    pub fn scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    /// Iteration budget. Exhausting it is not an error; the best state
    /// reached is returned.
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Relative-improvement stopping tolerance for the objective.
    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Emit a progress line per iteration.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn validate(&self) -> Result<(), SparsePcaError> {
        if let Some(k) = self.k {
            if k < 1 {
                return Err(SparsePcaError::InvalidParameter(
                    "target rank must be at least 1".to_string(),
                ));
            }
        }
        for (name, value) in [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SparsePcaError::InvalidParameter(format!(
                    "{} must be a non-negative finite number, got {}",
                    name, value
                )));
            }
        }
        if self.max_iter == 0 {
            return Err(SparsePcaError::InvalidParameter(
                "max_iter must be at least 1".to_string(),
            ));
        }
        if !self.tol.is_finite() || self.tol <= 0.0 {
            return Err(SparsePcaError::InvalidParameter(format!(
                "tol must be a positive finite number, got {}",
                self.tol
            )));
        }
        Ok(())
    }

    /// Fits the robust sparse PCA model to `x` (n rows of observations,
    /// p columns of variables).
    ///
    /// Rows containing missing (NaN) values are dropped with a warning and
    /// surfaced via [`RobustSparsePca::dropped_rows`]. The preprocessed
    /// matrix is decomposed once to initialize the iteration, then the
    /// rotation, loadings, and outlier updates alternate until the relative
    /// objective improvement drops to `tol` or `max_iter` is reached.
    ///
    /// # Errors
    ///
    /// [`SparsePcaError::InvalidParameter`] for an out-of-range
    /// hyperparameter, [`SparsePcaError::InvalidInput`] when fewer than two
    /// complete rows remain, and [`SparsePcaError::NumericalFailure`] if an
    /// underlying decomposition does not converge.
    pub fn fit(&self, x: Array2<f64>) -> Result<RobustSparsePca, SparsePcaError> {
        self.validate()?;

        let pre = preprocess(x, self.center, self.scale)?;
        let x = pre.data;
        let n_rows = x.nrows();
        let n_cols = x.ncols();

        let max_rank = n_rows.min(n_cols);
        let k = match self.k {
            Some(k) if k > max_rank => {
                warn!(
                    "Requested rank {} exceeds min(n, p) = {}; clamping.",
                    k, max_rank
                );
                max_rank
            }
            Some(k) => k,
            None => max_rank,
        };

        info!(
            "Fitting robust sparse PCA: {} rows x {} cols, rank {}, alpha={:e}, beta={:e}, gamma={:e}.",
            n_rows, n_cols, k, self.alpha, self.beta, self.gamma
        );

        let backend = NdarrayLinAlgBackend;

        // Initialization: leading k right-singular vectors seed both the
        // rotation and the loadings; hyperparameters are rescaled by the
        // squared dominant singular value.
        let init_svd = backend.svd_into(x.clone(), false, true)?;
        let vt = init_svd.vt.ok_or_else(|| {
            SparsePcaError::NumericalFailure("initial SVD did not return V^T".to_string())
        })?;
        let dominant = init_svd.s[0];
        if !dominant.is_finite() || dominant <= 0.0 {
            return Err(SparsePcaError::InvalidInput(
                "input matrix has no variance to decompose".to_string(),
            ));
        }
        let dominant_sq = dominant * dominant;

        let mut rotation: Array2<f64> = vt.slice(s![..k, ..]).t().to_owned();
        let mut loadings = rotation.clone();
        let mut outliers = Array2::<f64>::zeros((n_rows, n_cols));

        let alpha_scaled = self.alpha * dominant_sq;
        let beta_scaled = self.beta * dominant_sq;
        let step_size = 1.0 / (dominant_sq + beta_scaled);
        let threshold = step_size * alpha_scaled;

        let mut objective_trace: Vec<f64> = Vec::with_capacity(self.max_iter);
        let mut procrustes_singular_values = Array1::<f64>::zeros(k);
        let mut converged = false;

        for iteration in 1..=self.max_iter {
            // Rotation update: closed-form orthogonal Procrustes. A = U V^T
            // of (X - S)^T (X B), which keeps A^T A = I exactly.
            let inlier_data = &x - &outliers;
            let projected = x.dot(&loadings);
            let cross = inlier_data.t().dot(&projected);
            let svd = backend.svd_into(cross, true, true)?;
            let u = svd.u.ok_or_else(|| {
                SparsePcaError::NumericalFailure("Procrustes SVD did not return U".to_string())
            })?;
            let vt = svd.vt.ok_or_else(|| {
                SparsePcaError::NumericalFailure("Procrustes SVD did not return V^T".to_string())
            })?;
            rotation = u.dot(&vt);
            procrustes_singular_values = svd.s;

            // Loadings update: one gradient step on the smooth part, then
            // the elastic-net proximal shrinkage.
            let residual = &inlier_data - &projected.dot(&rotation.t());
            let mut gradient = x.t().dot(&residual.dot(&rotation));
            gradient.scaled_add(-beta_scaled, &loadings);
            loadings.scaled_add(step_size, &gradient);
            loadings = soft_threshold(&loadings, threshold);

            // Outlier update: entries of the reconstruction residual whose
            // magnitude exceeds gamma are absorbed into S, all others zeroed.
            let reconstruction_residual = &x - &x.dot(&loadings).dot(&rotation.t());
            outliers = soft_threshold(&reconstruction_residual, self.gamma);
            let residual = reconstruction_residual - &outliers;

            let objective = 0.5 * residual.iter().map(|v| v * v).sum::<f64>()
                + alpha_scaled * loadings.iter().map(|v| v.abs()).sum::<f64>()
                + 0.5 * beta_scaled * loadings.iter().map(|v| v * v).sum::<f64>()
                + self.gamma * outliers.iter().map(|v| v.abs()).sum::<f64>();

            let improvement = match objective_trace.last() {
                Some(&previous) if objective > 0.0 => (previous - objective) / objective,
                Some(_) => 0.0,
                None => f64::INFINITY,
            };
            objective_trace.push(objective);

            if self.verbose {
                info!(
                    "iteration {:>4}: objective {:.8e}, relative improvement {:.4e}",
                    iteration, objective, improvement
                );
            } else {
                debug!(
                    "iteration {}: objective {:.8e}, relative improvement {:.4e}",
                    iteration, objective, improvement
                );
            }

            if improvement <= self.tol {
                info!(
                    "Converged after {} iterations (relative improvement {:.4e} <= tol {:.4e}).",
                    iteration, improvement, self.tol
                );
                converged = true;
                break;
            }
        }

        if !converged {
            debug!(
                "Iteration budget of {} exhausted without convergence; returning the state reached.",
                self.max_iter
            );
        }

        // The eigenvalue estimate comes from the Procrustes singular values
        // of the last executed iteration, i.e. the half-step before that
        // iteration's loadings and outlier updates.
        let eigenvalues = procrustes_singular_values.mapv(|d| d / (n_rows as f64 - 1.0));
        let sdev = eigenvalues.mapv(f64::sqrt);
        let scores = x.dot(&loadings);
        let variance = total_variance(&x.view());

        Ok(RobustSparsePca {
            loadings,
            transform: rotation,
            scores,
            sparse: outliers,
            eigenvalues,
            sdev,
            objective: objective_trace,
            center: pre.center,
            scale: pre.scale,
            variance,
            dropped_rows: pre.dropped_rows,
        })
    }
}

/// Result of a robust sparse PCA fit. All fields are fixed once the
/// iteration terminates and are exposed read-only.
#[derive(Debug)]
pub struct RobustSparsePca {
    loadings: Array2<f64>,
    transform: Array2<f64>,
    scores: Array2<f64>,
    sparse: Array2<f64>,
    eigenvalues: Array1<f64>,
    sdev: Array1<f64>,
    objective: Vec<f64>,
    center: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
    variance: f64,
    dropped_rows: Vec<usize>,
}

impl RobustSparsePca {
    /// Sparse loadings matrix B, shape (p, k).
    pub fn loadings(&self) -> &Array2<f64> {
        &self.loadings
    }

    /// Orthonormal rotation A, shape (p, k), with `A^T A = I_k`.
    pub fn transform(&self) -> &Array2<f64> {
        &self.transform
    }

    /// Scores `X * loadings` on the preprocessed data, shape (n, k).
    pub fn scores(&self) -> &Array2<f64> {
        &self.scores
    }

    /// Sparse outlier matrix S, shape (n, p). Zero wherever the final
    /// reconstruction residual magnitude is at most `gamma`.
    pub fn sparse(&self) -> &Array2<f64> {
        &self.sparse
    }

    /// Eigenvalue estimate per component, non-negative, descending.
    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    /// Standard deviation per component (square root of the eigenvalues).
    pub fn sdev(&self) -> &Array1<f64> {
        &self.sdev
    }

    /// Objective value per iteration, in order. Never empty after a fit.
    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    /// Column means subtracted during preprocessing, if centering was on.
    pub fn center(&self) -> Option<&Array1<f64>> {
        self.center.as_ref()
    }

    /// Column standard deviations divided out during preprocessing, if
    /// scaling was on.
    pub fn scale(&self) -> Option<&Array1<f64>> {
        self.scale.as_ref()
    }

    /// Total variance of the preprocessed data (sum of per-column sample
    /// variances).
    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Original indices of input rows dropped for containing missing values.
    pub fn dropped_rows(&self) -> &[usize] {
        &self.dropped_rows
    }
}

/// Elementwise proximal operator of the L1 norm scaled by `t`: entries with
/// magnitude at most `t` become exactly zero, all others shrink toward zero
/// by `t`.
pub(crate) fn soft_threshold(m: &Array2<f64>, t: f64) -> Array2<f64> {
    debug_assert!(t >= 0.0, "soft-threshold parameter must be non-negative");
    m.mapv(|v| {
        if v > t {
            v - t
        } else if v < -t {
            v + t
        } else {
            0.0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn sample_matrix() -> Array2<f64> {
        array![
            [1.0, 2.0, 3.0],
            [4.0, 5.0, 6.0],
            [7.0, 8.0, 10.0],
            [2.0, 1.0, 0.0],
        ]
    }

    #[test]
    fn soft_threshold_zeroes_small_entries_exactly() {
        let m = array![[0.5, -0.3], [1.5, -2.0], [0.7, -0.7]];
        let out = soft_threshold(&m, 0.7);
        assert_eq!(out[[0, 0]], 0.0);
        assert_eq!(out[[0, 1]], 0.0);
        assert_eq!(out[[2, 0]], 0.0); // |m| == t maps to exact zero
        assert_eq!(out[[2, 1]], 0.0);
        assert_abs_diff_eq!(out[[1, 0]], 0.8, epsilon = 1e-15);
        assert_abs_diff_eq!(out[[1, 1]], -1.3, epsilon = 1e-15);
    }

    #[test]
    fn soft_threshold_with_zero_threshold_is_identity() {
        let m = array![[0.5, -0.3], [1.5, -2.0]];
        let out = soft_threshold(&m, 0.0);
        assert_eq!(out, m);
    }

    #[test]
    fn rank_zero_is_an_invalid_parameter() {
        let err = RobustSparsePcaParams::default()
            .rank(0)
            .fit(sample_matrix())
            .unwrap_err();
        assert!(matches!(err, SparsePcaError::InvalidParameter(_)));
    }

    #[test]
    fn negative_hyperparameters_are_rejected() {
        let err = RobustSparsePcaParams::default()
            .alpha(-0.1)
            .fit(sample_matrix())
            .unwrap_err();
        assert!(matches!(err, SparsePcaError::InvalidParameter(_)));
    }

    #[test]
    fn zero_iteration_budget_is_rejected() {
        let err = RobustSparsePcaParams::default()
            .max_iter(0)
            .fit(sample_matrix())
            .unwrap_err();
        assert!(matches!(err, SparsePcaError::InvalidParameter(_)));
    }

    #[test]
    fn fit_with_rank_below_column_count_produces_conforming_factors() {
        let result = RobustSparsePcaParams::default()
            .rank(1)
            .center(false)
            .max_iter(3)
            .fit(sample_matrix())
            .unwrap();
        assert_eq!(result.transform().dim(), (3, 1));
        assert_eq!(result.loadings().dim(), (3, 1));
        assert_eq!(result.scores().dim(), (4, 1));
        assert_eq!(result.sparse().dim(), (4, 3));
        assert_eq!(result.eigenvalues().len(), 1);
        let gram = result.transform().t().dot(result.transform());
        assert_abs_diff_eq!(gram[[0, 0]], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn oversized_rank_is_clamped_to_min_dimension() {
        let result = RobustSparsePcaParams::default()
            .rank(10)
            .center(false)
            .fit(sample_matrix())
            .unwrap();
        assert_eq!(result.loadings().ncols(), 3);
        assert_eq!(result.transform().ncols(), 3);
        assert_eq!(result.eigenvalues().len(), 3);
    }

    #[test]
    fn scores_equal_data_times_loadings() {
        let x = sample_matrix();
        let result = RobustSparsePcaParams::default()
            .rank(2)
            .center(false)
            .max_iter(25)
            .fit(x.clone())
            .unwrap();
        let expected = x.dot(result.loadings());
        assert_eq!(result.scores(), &expected);
    }

    #[test]
    fn objective_trace_is_finite_and_bounded_by_budget() {
        let result = RobustSparsePcaParams::default()
            .rank(2)
            .max_iter(50)
            .fit(sample_matrix())
            .unwrap();
        assert!(!result.objective().is_empty());
        assert!(result.objective().len() <= 50);
        assert!(result.objective().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn sdev_is_square_root_of_eigenvalues() {
        let result = RobustSparsePcaParams::default()
            .rank(2)
            .fit(sample_matrix())
            .unwrap();
        for (sd, eig) in result.sdev().iter().zip(result.eigenvalues().iter()) {
            assert_abs_diff_eq!(sd * sd, *eig, epsilon = 1e-10);
        }
    }
}
