//! Integrity verification for downloaded toolchain archives.
//!
//! Two checks are available:
//!
//! - SHA-256 checksum comparison against a digest published in the catalog;
//! - Ed25519 detached signatures. The signature covers the 32-byte SHA-256
//!   digest of the archive and is published next to it as `<archive>.sig`,
//!   either as 64 raw bytes or as hex text.

use std::io::Read;
use std::path::Path;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, Result};

/// Release signing keys, hex encoded. Overridable with the `trusted_keys`
/// setting.
const EMBEDDED_KEYS: &[&str] = &["d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"];

/// Computes the SHA-256 digest of a file.
///
/// # Errors
///
/// Returns `Io` if the file cannot be opened or read.
pub fn sha256_digest(file_path: &Path) -> Result<[u8; 32]> {
    let mut file = std::fs::File::open(file_path).map_err(|e| {
        EngineError::io(
            format!("Failed to open file for checksum: {}", file_path.display()),
            e,
        )
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|e| {
            EngineError::io(
                format!("Failed to read file for checksum: {}", file_path.display()),
                e,
            )
        })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().into())
}

/// Computes the SHA-256 hash of a file as a lowercase hex string.
///
/// # Errors
///
/// Returns `Io` if the file cannot be opened or read.
pub fn compute_sha256(file_path: &Path) -> Result<String> {
    sha256_digest(file_path).map(hex::encode)
}

/// Verifies that a file matches the expected SHA-256 checksum.
///
/// # Errors
///
/// Returns `ChecksumMismatch` if the digests differ, or `Io` if the file
/// cannot be read.
pub fn verify_checksum(file_path: &Path, expected: &str) -> Result<()> {
    let computed = compute_sha256(file_path)?;
    let expected = expected.trim().to_lowercase();

    if computed != expected {
        return Err(EngineError::checksum_mismatch(file_path, expected, computed));
    }

    Ok(())
}

/// Parses a detached signature: 64 raw bytes, or 128 hex characters with
/// optional surrounding whitespace.
fn parse_signature(path: &Path, bytes: &[u8]) -> Result<Signature> {
    if let Ok(raw) = <[u8; 64]>::try_from(bytes) {
        return Ok(Signature::from_bytes(&raw));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|_| EngineError::signature_invalid(path, "signature is neither raw nor hex"))?;
    let decoded = hex::decode(text.trim())
        .map_err(|e| EngineError::signature_invalid(path, format!("malformed hex signature: {e}")))?;
    Signature::from_slice(&decoded)
        .map_err(|e| EngineError::signature_invalid(path, format!("malformed signature: {e}")))
}

/// Public keys whose signatures are accepted.
#[derive(Debug, Clone)]
pub struct TrustedKeys {
    keys: Vec<VerifyingKey>,
}

impl TrustedKeys {
    /// The release signing keys compiled into swup.
    #[must_use]
    pub fn embedded() -> Self {
        let keys = EMBEDDED_KEYS
            .iter()
            .filter_map(|k| match decode_key(k) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!("ignoring malformed embedded key: {e}");
                    None
                }
            })
            .collect();
        Self { keys }
    }

    #[must_use]
    pub fn from_keys(keys: Vec<VerifyingKey>) -> Self {
        Self { keys }
    }

    /// Parses hex-encoded public keys.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` naming the first malformed key.
    pub fn from_hex<S: AsRef<str>>(keys: &[S]) -> Result<Self> {
        let keys = keys
            .iter()
            .map(|k| decode_key(k.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(EngineError::invariant)?;
        Ok(Self { keys })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Checks `signature` over `digest` against every trusted key.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` if the signature is malformed or no trusted
    /// key accepts it.
    pub fn verify_digest(&self, path: &Path, digest: &[u8; 32], signature: &[u8]) -> Result<()> {
        let signature = parse_signature(path, signature)?;
        if self
            .keys
            .iter()
            .any(|key| key.verify(digest, &signature).is_ok())
        {
            Ok(())
        } else {
            Err(EngineError::signature_invalid(
                path,
                "no trusted key accepts the signature",
            ))
        }
    }
}

fn decode_key(hex_key: &str) -> std::result::Result<VerifyingKey, String> {
    let bytes = hex::decode(hex_key.trim()).map_err(|e| format!("key {hex_key}: {e}"))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| format!("key {hex_key}: expected 32 bytes"))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| format!("key {hex_key}: {e}"))
}
