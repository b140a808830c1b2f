//! Multi-request orchestration over collections and folders.

mod collection;
mod data;
mod gather;

pub use collection::{CollectionRunner, RunHandle, RunOptions, RunTarget};
pub use data::DataTable;
pub use gather::gather_requests;
