//! Recursive signing and verification of component graphs.
//!
//! [`SignFlags`] turn user switches into [`SigningOptions`]; a
//! [`SigningPipeline`] walks the graph through a [`Resolver`] and returns a
//! [`SigningReport`] with one [`NodeOutcome`] per component version.

/// Cooperative cancellation
pub mod cancel;
/// User-facing signing switches
pub mod flags;
/// Keyless signing collaborator
pub mod keyless;
/// Options of a signing run
pub mod options;
/// The recursive walk
pub mod pipeline;
/// Per-node outcomes
pub mod report;
/// Component version and blob lookup
pub mod resolver;
/// Timestamp authority collaborator
pub mod tsa;

pub use cancel::CancellationToken;
pub use flags::{SignFlags, DEFAULT_SIGNING_ALGORITHM};
pub use keyless::KeylessProvider;
pub use options::{SigningOptions, DEFAULT_RESOLVE_TIMEOUT};
pub use pipeline::{SigningPipeline, KIND_COMPONENT_VERSION};
pub use report::{NodeOutcome, Outcome, SigningReport, Trust};
pub use resolver::{InMemoryRepository, Resolver};
pub use tsa::{TimestampAuthority, DEFAULT_TSA_URL};
