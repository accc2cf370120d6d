//! Secret generation for store keys that must never be guessable.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::error::EnvError;

/// Raw entropy per generated secret.
pub const SECRET_BYTES: usize = 32;

/// Generate a secret from the operating system's CSPRNG.
pub fn generate_secret() -> Result<String, EnvError> {
    generate_secret_with(&mut OsRng)
}

/// Generate a secret from `rng`: 32 bytes, base64, padding and newlines stripped.
///
/// Uses `try_fill_bytes` so an exhausted or unavailable source surfaces as
/// [`EnvError::Entropy`] instead of a panic.
pub fn generate_secret_with<R>(rng: &mut R) -> Result<String, EnvError>
where
    R: RngCore + CryptoRng + ?Sized,
{
    let mut bytes = [0u8; SECRET_BYTES];
    rng.try_fill_bytes(&mut bytes)
        .map_err(|e| EnvError::Entropy(e.to_string()))?;
    let encoded = BASE64.encode(bytes);
    Ok(encoded
        .trim_end_matches('=')
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .collect())
}
