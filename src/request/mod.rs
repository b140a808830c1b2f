//! Request assembly and execution.

mod builder;
mod cookies;
mod executor;

pub use builder::{build_request, BuiltRequest};
pub use executor::{ExecuteOptions, RequestExecutor};
