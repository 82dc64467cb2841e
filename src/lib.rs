// Robust sparse principal component analysis (PCA) via variable projection

#![doc = include_str!("../README.md")]

mod linalg;
mod preprocess;
mod report;
mod spca;

pub use preprocess::{preprocess, Preprocessed};
pub use report::{variance_summary, ComponentVariance, VarianceSummary};
pub use spca::{RobustSparsePca, RobustSparsePcaParams};

use thiserror::Error;

/// The error type for robust sparse PCA operations.
#[derive(Debug, Error)]
pub enum SparsePcaError {
    /// A caller-supplied parameter is outside its valid range. Raised before
    /// any computation starts.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The input matrix cannot be decomposed (empty, too few complete rows).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// An underlying decomposition failed to converge. Not retried.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),
}
