//! appgrid-core: the desired-state model shared by every appgrid crate.
//!
//! - **`path`**: relative/absolute id algebra and task-id decoding
//! - **`tree`**: path-addressed insert/find/update/delete over a group tree
//! - **`types`**: `Group` and `Application` in the scheduler's JSON shape
//! - **`config`**: `appgrid.toml` parsing

pub mod config;
pub mod path;
pub mod tree;
pub mod types;

pub use config::AppgridConfig;
pub use path::{AppPath, PathError};
pub use tree::TreeError;
pub use types::*;
