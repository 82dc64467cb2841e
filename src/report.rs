// Human-readable reporting over a finished fit. Formatting only; nothing in
// here feeds back into the solver.

use std::fmt;

use crate::spca::RobustSparsePca;

/// Per-component row of the explained-variance summary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentVariance {
    /// Eigenvalue (variance captured by the component).
    pub variance: f64,
    /// Standard deviation (square root of the eigenvalue).
    pub sdev: f64,
    /// Fraction of the total variance attributed to the component.
    pub proportion: f64,
    /// Running sum of the proportions up to and including this component.
    pub cumulative: f64,
}

/// Explained-variance table for a fit, one row per component.
#[derive(Debug, Clone)]
pub struct VarianceSummary {
    components: Vec<ComponentVariance>,
}

impl VarianceSummary {
    /// Rows in component order (largest eigenvalue first).
    pub fn components(&self) -> &[ComponentVariance] {
        &self.components
    }
}

/// Builds the per-component variance table from a finished fit.
///
/// Proportions are eigenvalue over total variance of the preprocessed data;
/// the cumulative column is their running sum, so it is non-decreasing. When
/// the total variance is not strictly positive (degenerate input) all
/// proportions are reported as zero.
pub fn variance_summary(result: &RobustSparsePca) -> VarianceSummary {
    let total = result.variance();
    let mut cumulative = 0.0;
    let components = result
        .eigenvalues()
        .iter()
        .zip(result.sdev().iter())
        .map(|(&variance, &sdev)| {
            let proportion = if total > 0.0 { variance / total } else { 0.0 };
            cumulative += proportion;
            ComponentVariance {
                variance,
                sdev,
                proportion,
                cumulative,
            }
        })
        .collect();
    VarianceSummary { components }
}

impl fmt::Display for VarianceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4}  {:>12}  {:>12}  {:>12}  {:>12}",
            "PC", "Var", "Sdev", "Prop", "Cumulative"
        )?;
        for (index, row) in self.components.iter().enumerate() {
            writeln!(
                f,
                "{:>4}  {:>12.4}  {:>12.4}  {:>12.4}  {:>12.4}",
                index + 1,
                row.variance,
                row.sdev,
                row.proportion,
                row.cumulative
            )?;
        }
        Ok(())
    }
}

/// Compact printable view: rounded standard deviations, eigenvalues, and the
/// sparse loadings matrix.
impl fmt::Display for RobustSparsePca {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Robust sparse PCA ({} components, {} iterations)",
            self.eigenvalues().len(),
            self.objective().len()
        )?;
        write!(f, "Standard deviations:")?;
        for sd in self.sdev() {
            write!(f, " {:.4}", sd)?;
        }
        writeln!(f)?;
        write!(f, "Eigenvalues:")?;
        for eig in self.eigenvalues() {
            write!(f, " {:.4}", eig)?;
        }
        writeln!(f)?;
        writeln!(f, "Loadings:")?;
        for row in self.loadings().rows() {
            for value in row {
                write!(f, " {:>10.4}", value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RobustSparsePcaParams;
    use ndarray::Array2;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(n: usize, p: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((n, p), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn proportions_sum_to_at_most_one_and_cumulative_is_monotone() {
        let x = random_matrix(40, 6, 7);
        let result = RobustSparsePcaParams::default()
            .rank(4)
            .alpha(0.0)
            .beta(0.0)
            .gamma(1e6)
            .max_iter(200)
            .fit(x)
            .unwrap();
        let summary = variance_summary(&result);
        let rows = summary.components();
        assert_eq!(rows.len(), 4);

        let total_proportion: f64 = rows.iter().map(|r| r.proportion).sum();
        assert!(total_proportion <= 1.0 + 1e-9, "sum {}", total_proportion);
        for pair in rows.windows(2) {
            assert!(pair[1].cumulative >= pair[0].cumulative - 1e-12);
        }
        for row in rows {
            assert!(row.proportion >= 0.0);
        }
    }

    #[test]
    fn display_outputs_one_row_per_component() {
        let x = random_matrix(10, 4, 3);
        let result = RobustSparsePcaParams::default()
            .rank(2)
            .max_iter(20)
            .fit(x)
            .unwrap();
        let summary = variance_summary(&result);
        let table = summary.to_string();
        // Header plus one line per component.
        assert_eq!(table.lines().count(), 3);

        let view = result.to_string();
        assert!(view.contains("Standard deviations:"));
        assert!(view.contains("Loadings:"));
    }
}
