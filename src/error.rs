//! Defines the error type for the bayou library.
//!
//! Every fallible operation in the crate surfaces a [`Error`] to the caller;
//! no operation panics on user input. Errors carry the offending variable
//! name(s) and a short cause.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all bayou operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Graph or network structure violation. Raised for cycles on edge
    /// insertion, unknown variables, CPDs whose declared parents disagree
    /// with the graph, and nodes missing a CPD.
    #[error("structural error: {0}")]
    Structural(String),

    /// Dimension mismatch. Raised when a value array does not match the
    /// declared cardinalities, a CPD has the wrong row count, or two factors
    /// disagree on the cardinality of a shared variable.
    #[error("shape error: {0}")]
    Shape(String),

    /// Invalid parameter value. Raised for CPD rows that do not sum to one,
    /// non-positive variances, and evidence states out of range.
    #[error("domain error: {0}")]
    Domain(String),

    /// Numerical failure in matrix routines. Raised for singular matrices
    /// and covariance matrices that are not positive definite.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Malformed inference query. Raised for unknown query variables, empty
    /// factor pools after elimination, and unsupported query shapes.
    #[error("query error: {0}")]
    Query(String),

    /// Problem with observed data. Raised for insufficient regression data
    /// and unparseable CSV cells.
    #[error("data error: {0}")]
    Data(String),
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Data(err.to_string())
    }
}
