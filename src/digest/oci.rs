//! OCI content digests (`sha256:<hex>`), the keys of blob stores and
//! artifact sets.

use sha2::{Digest as _, Sha256, Sha512};

use crate::errors::{Error, Result};

pub const OCI_SHA256: &str = "sha256";
pub const OCI_SHA512: &str = "sha512";

/// SHA-256 digest of `data` in OCI form.
pub fn oci_digest(data: &[u8]) -> String {
    format!("{OCI_SHA256}:{}", hex::encode(Sha256::digest(data)))
}

/// Splits a digest string into algorithm and hex value.
pub fn parse(digest: &str) -> Result<(&str, &str)> {
    let (algo, value) = digest
        .split_once(':')
        .ok_or_else(|| Error::invalid("digest", digest))?;
    if algo.is_empty()
        || value.is_empty()
        || !value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(Error::invalid("digest", digest));
    }
    Ok((algo, value))
}

/// Tells digest references apart from tags.
pub fn is_digest(reference: &str) -> bool {
    parse(reference).is_ok()
}

/// Digest of `data` with the named OCI algorithm.
pub fn digest_with(algorithm: &str, data: &[u8]) -> Result<String> {
    let value = match algorithm {
        OCI_SHA256 => hex::encode(Sha256::digest(data)),
        OCI_SHA512 => hex::encode(Sha512::digest(data)),
        _ => return Err(Error::not_found("digest algorithm", algorithm)),
    };
    Ok(format!("{algorithm}:{value}"))
}

/// Fails with a digest mismatch if `data` does not hash to `expected`, using
/// the algorithm `expected` names.
pub fn verify(data: &[u8], expected: &str) -> Result<String> {
    let (algorithm, _) = parse(expected)?;
    let computed = digest_with(algorithm, data)?;
    if computed != expected {
        return Err(Error::digest_mismatch("blob", expected, &computed));
    }
    Ok(computed)
}
