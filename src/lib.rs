//! Integrity of component version graphs.
//!
//! This crate provides cycle-safe traversal of component versions, canonical
//! digests over component descriptors and artifacts, recursive signing and
//! verification, and digest-indexed artifact archives.

/// Typed access specifications and the access type registry
pub mod access;

/// Artifact set archives and their synthesis
pub mod artifact_set;

/// Blob storage backends (local filesystem, in-memory)
pub mod blob_store;

/// Component descriptor model and normalisation
pub mod compdesc;

/// Descriptor and blob digests, hash algorithms
pub mod digest;

/// Error taxonomy
pub mod errors;

/// Traversal history and cycle detection
pub mod history;

/// Algorithm registries
pub mod registry;

/// Digital signature implementations (rsa, ed25519, p256) and key material
pub mod signer;

/// Recursive signing and verification pipeline
pub mod signing;

pub use errors::{Error, ErrorKind, Result};
pub use history::{History, NameVersion};
