use anyhow::Result;
use async_trait::async_trait;

use crate::{compdesc::TimestampSpec, digest::Digest};

/// Timestamp authority used when none is configured.
pub const DEFAULT_TSA_URL: &str = "http://timestamp.digicert.com";

/// Source of RFC 3161 style timestamp tokens over a digest.
#[async_trait]
pub trait TimestampAuthority: Send + Sync {
    /// Obtains a timestamp token for `digest` from the authority at `url`.
    async fn timestamp(&self, url: &str, digest: &Digest) -> Result<TimestampSpec>;
}
