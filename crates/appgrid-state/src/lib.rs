//! appgrid-state: document store for appgrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for appsets (with their whole group tree), repair policies and
//! repair records.
//!
//! # Architecture
//!
//! Every document is JSON-serialized into a `&[u8]` value column under a
//! string key. Collections are queried with a structured [`Selector`]
//! (`Eq`, `Ne`, `Lt`, `Gt`, `And`, `Or`) evaluated against the JSON form,
//! plus skip/limit paging and an optional sort field.
//!
//! Appsets carry a `version` token: [`StateStore::replace_appset`] refuses
//! to overwrite a document another writer replaced in the meantime.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod selector;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use selector::{Page, Selector, Sort};
pub use store::{Document, StateStore};
pub use types::*;
