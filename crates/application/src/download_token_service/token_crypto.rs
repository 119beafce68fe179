use std::fmt::Write;

use super::*;

const TOKEN_BYTES: usize = 32;

/// Generates a cryptographically random token and its SHA-256 hash.
///
/// Returns `(raw_token_hex, sha256_hash_hex)`.
pub(super) fn generate_token() -> AppResult<(String, String)> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::fill(&mut bytes).map_err(|error| {
        AppError::Internal(format!("failed to generate download token: {error}"))
    })?;

    let raw_token = to_hex(&bytes);
    let hash = hash_token(&raw_token);
    Ok((raw_token, hash))
}

/// Computes the SHA-256 hash of a token string for storage.
pub(super) fn hash_token(raw_token: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    to_hex(&hasher.finalize())
}

/// Whether the value has the shape of an issued token.
pub(super) fn is_well_formed_token(raw_token: &str) -> bool {
    raw_token.len() == TOKEN_BYTES * 2
        && raw_token
            .bytes()
            .all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}
