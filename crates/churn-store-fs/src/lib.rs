//! Flat-file backend for the churn pipeline state.
//!
//! Tables are CSV files, counters a JSON document, artifacts one file per
//! user. Every replacement goes through a temporary file in the target
//! directory followed by a rename, and all file access runs on tokio's
//! blocking pool.

mod encode;
mod layout;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use layout::Layout;
pub use store::FsStore;
