//! oniontree: read access to an OnionTree repository.
//!
//! An OnionTree is a directory of YAML service records. Each record lists
//! the onion addresses a service is reachable at:
//!
//! ```text
//! <dir>/
//!   unsorted/<service-id>.yaml   one record per service
//! ```
//!
//! The scanner only needs to enumerate services and read their URLs, so
//! the seam it consumes is the [`ServiceRepository`] trait. [`OnionTree`]
//! is the directory-backed implementation.

pub mod error;
pub mod repository;
pub mod service;

pub use error::{Error, Result};
pub use repository::{OnionTree, ServiceRepository};
pub use service::{PublicKey, Service, validate_id};
