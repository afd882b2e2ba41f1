//! Artifact storage for the veilkey service.
//!
//! Every stored file is named by a server-generated [`Handle`]. Paths are
//! always derived from a parsed handle and checked against the root
//! directory of its kind; caller-supplied path strings never reach the
//! filesystem.

mod error;
mod handle;
mod store;

pub use error::{Result, StorageError};
pub use handle::{ArtifactKind, Handle};
pub use store::{Allocation, ScopedStore, StoreRoots};
