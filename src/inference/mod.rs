//! Exact inference engines.
//!
//! [`VariableElimination`] answers marginal and MAP queries on
//! all-discrete networks; [`MixedVariableElimination`] dispatches across
//! discrete, Gaussian and conditional-linear-Gaussian networks. Both
//! engines allocate fresh factors per query and never mutate the model,
//! so a shared network reference can serve concurrent queries.

pub mod mixed;
pub mod variable_elimination;

pub use mixed::{MixedVariableElimination, QueryResult};
pub use variable_elimination::VariableElimination;
