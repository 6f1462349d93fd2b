//! Ed25519 sign/verify primitives and keypair generation.
//!
//! This is the crate's only cryptographic dependency on a signature scheme.
//! Everything above this module deals in base64 URL-safe strings and raw
//! bytes; only this module touches `ed25519_dalek` types directly.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

/// A signing or verifying operation could not be completed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignatureError {
    #[error("public key is not valid base64url")]
    PublicKeyEncoding,
    #[error("public key is not a valid Ed25519 point")]
    PublicKeyFormat,
    #[error("signature is not valid base64url")]
    SignatureEncoding,
    #[error("signature is not a well-formed 64-byte Ed25519 signature")]
    SignatureFormat,
    #[error("private key is not a valid 32-byte Ed25519 seed")]
    PrivateKeyFormat,
}

/// An Ed25519 keypair. The private half never derives `Debug`/`Display`
/// and is never passed to a logging macro anywhere in this crate.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Keypair { signing_key: SigningKey::generate(&mut OsRng) }
    }

    /// Reconstruct a keypair from a 32-byte seed.
    pub fn from_seed_bytes(seed: &[u8]) -> Result<Self, SignatureError> {
        let arr: [u8; 32] = seed.try_into().map_err(|_| SignatureError::PrivateKeyFormat)?;
        Ok(Keypair { signing_key: SigningKey::from_bytes(&arr) })
    }

    /// The base64url-encoded public key, suitable for the `signer_id` /
    /// `public_key` fields carried at the boundary.
    pub fn public_key_b64(&self) -> String {
        encode_public_key(&self.signing_key.verifying_key())
    }

    /// Sign `message` (the canonical seal bytes of whatever is being
    /// signed), returning a base64url-encoded 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> String {
        let sig: Signature = self.signing_key.sign(message);
        URL_SAFE_NO_PAD.encode(sig.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

/// Base64url-encode a public key.
pub fn encode_public_key(key: &VerifyingKey) -> String {
    URL_SAFE_NO_PAD.encode(key.to_bytes())
}

/// Decode a base64url public key. Fails with `PublicKeyEncoding` if the
/// string isn't valid base64url, `PublicKeyFormat` if the decoded bytes
/// aren't a valid Ed25519 point.
pub fn decode_public_key(s: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|_| SignatureError::PublicKeyEncoding)?;
    let arr: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::PublicKeyFormat)?;
    VerifyingKey::from_bytes(&arr).map_err(|_| SignatureError::PublicKeyFormat)
}

/// Verify a base64url-encoded signature over `message` under `public_key_b64`.
///
/// Malformed key or signature *encoding* is a hard error
/// (`SIGNATURE_INVALID`); a well-formed signature that simply does not
/// match returns `Ok(false)`, never an error.
pub fn verify(public_key_b64: &str, message: &[u8], signature_b64: &str) -> Result<bool, SignatureError> {
    let key = decode_public_key(public_key_b64)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| SignatureError::SignatureEncoding)?;
    let sig_arr: [u8; 64] = sig_bytes.try_into().map_err(|_| SignatureError::SignatureFormat)?;
    let sig = Signature::from_bytes(&sig_arr);
    Ok(key.verify(message, &sig).is_ok())
}
