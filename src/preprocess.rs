// Input preprocessing: missing-value row removal and column centering/scaling.
// The solver core consumes the output of this module and never sees NaNs.

use log::warn;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::SparsePcaError;

/// Threshold below which a column standard deviation is treated as zero and
/// replaced by 1.0 so scaling never divides by a vanishing value.
const SCALE_SANITIZATION_THRESHOLD: f64 = 1e-9;

/// A preprocessed data matrix together with the transform that produced it.
///
/// `center` and `scale` are `None` when the corresponding transform was not
/// applied, so callers can back-transform results without guessing.
/// `dropped_rows` lists the original row indices removed because they
/// contained missing (NaN) values; an empty list means the input was complete.
#[derive(Debug)]
pub struct Preprocessed {
    /// Centered/scaled data, shape (n_complete_rows, n_features).
    pub data: Array2<f64>,
    /// Column means subtracted from the data, if centering was requested.
    pub center: Option<Array1<f64>>,
    /// Sanitized column standard deviations the data was divided by, if
    /// scaling was requested. Always strictly positive.
    pub scale: Option<Array1<f64>>,
    /// Original indices of rows dropped for containing NaN entries.
    pub dropped_rows: Vec<usize>,
}

/// Removes rows containing NaN entries and applies optional centering and
/// scaling, in that order.
///
/// Dropping rows is a recoverable condition surfaced through
/// [`Preprocessed::dropped_rows`] and a `warn!` line, not an error. An input
/// left with fewer than two rows (or zero columns) cannot be decomposed and
/// fails with [`SparsePcaError::InvalidInput`].
pub fn preprocess(
    x: Array2<f64>,
    center: bool,
    scale: bool,
) -> Result<Preprocessed, SparsePcaError> {
    let (data, dropped_rows) = drop_incomplete_rows(x);

    let n_rows = data.nrows();
    let n_cols = data.ncols();
    if n_cols == 0 {
        return Err(SparsePcaError::InvalidInput(
            "input matrix has zero columns".to_string(),
        ));
    }
    if n_rows < 2 {
        return Err(SparsePcaError::InvalidInput(format!(
            "need at least 2 complete rows, found {} ({} dropped for missing values)",
            n_rows,
            dropped_rows.len()
        )));
    }

    let mut data = data;

    let center_vector = if center {
        let mean_vector = data
            .mean_axis(Axis(0))
            .ok_or_else(|| SparsePcaError::InvalidInput("failed to compute column means".to_string()))?;
        data -= &mean_vector;
        Some(mean_vector)
    } else {
        None
    };

    let scale_vector = if scale {
        let std_dev_vector = data.map_axis(Axis(0), |column| column.std(1.0));
        let sanitized = std_dev_vector.mapv(|v| {
            if v.is_finite() && v.abs() > SCALE_SANITIZATION_THRESHOLD {
                v
            } else {
                1.0
            }
        });
        data /= &sanitized;
        Some(sanitized)
    } else {
        None
    };

    Ok(Preprocessed {
        data,
        center: center_vector,
        scale: scale_vector,
        dropped_rows,
    })
}

/// Removes every row that contains at least one NaN entry.
/// Returns the filtered matrix and the original indices of the dropped rows.
fn drop_incomplete_rows(x: Array2<f64>) -> (Array2<f64>, Vec<usize>) {
    let dropped_rows: Vec<usize> = x
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| row.iter().any(|v| v.is_nan()))
        .map(|(i, _)| i)
        .collect();

    if dropped_rows.is_empty() {
        return (x, dropped_rows);
    }

    warn!(
        "Dropping {} of {} rows containing missing (NaN) values.",
        dropped_rows.len(),
        x.nrows()
    );
    let kept: Vec<usize> = (0..x.nrows()).filter(|i| !dropped_rows.contains(i)).collect();
    (x.select(Axis(0), &kept), dropped_rows)
}

/// Total variance of a matrix: the sum of per-column sample variances
/// (denominator n - 1). Returns 0.0 for fewer than two rows.
pub(crate) fn total_variance(x: &ArrayView2<f64>) -> f64 {
    if x.nrows() < 2 {
        return 0.0;
    }
    x.map_axis(Axis(0), |column| column.std(1.0).powi(2)).sum()
}
