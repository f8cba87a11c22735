//! Encryption at rest for the provenance archive
//!
//! Keys are derived from an operator passphrase and a per-database salt with
//! Argon2id, then used with AES-256-GCM. Every sealed blob carries its own
//! random 96-bit nonce. Decryption either authenticates or fails; it never
//! hands back unauthenticated plaintext.

pub mod passphrase;

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

pub use passphrase::{passphrase_from_env, resolve_passphrase, Passphrase, DEFAULT_PASSPHRASE_ENV};

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("encryption failed")]
    Encrypt,

    #[error("authentication failed: wrong passphrase or corrupted ciphertext")]
    AuthenticationFailed,

    #[error("invalid nonce length {0} (expected 12)")]
    InvalidNonce(usize),
}

/// Argon2id cost parameters.
///
/// A database records the parameters it was created with; later runs always
/// derive with the recorded values, never with whatever the config says today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Fresh random salt for a new database.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// 256-bit key, wiped on drop.
pub struct DerivedKey(Zeroizing<[u8; KEY_LEN]>);

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

pub fn derive_key(
    passphrase: &Passphrase,
    salt: &[u8],
    params: &KdfParams,
) -> Result<DerivedKey, CryptoError> {
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase.expose().as_bytes(), salt, key.as_mut_slice())
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;

    Ok(DerivedKey(key))
}

/// Ciphertext (with GCM tag appended) and the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// AES-256-GCM sealing under a single derived key.
pub struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    pub fn new(key: &DerivedKey) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key.0.as_slice());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        Ok(SealedBlob {
            ciphertext,
            nonce: nonce.to_vec(),
        })
    }

    pub fn open(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidNonce(nonce.len()));
        }
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    pub fn open_blob(&self, blob: &SealedBlob) -> Result<Vec<u8>, CryptoError> {
        self.open(&blob.ciphertext, &blob.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal cost keeps the suite fast; production parameters are covered by
    // the defaults test below.
    const FAST: KdfParams = KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    };

    fn sealer_for(pass: &str, salt: &[u8]) -> Sealer {
        let pass = Passphrase::new(pass).unwrap();
        Sealer::new(&derive_key(&pass, salt, &FAST).unwrap())
    }

    #[test]
    fn test_round_trip_restores_plaintext() {
        let salt = generate_salt();
        let sealer = sealer_for("correct horse", &salt);

        let blob = sealer.seal(b"summaryDate,2024-05-01").unwrap();
        assert_ne!(blob.ciphertext, b"summaryDate,2024-05-01");
        assert_eq!(blob.nonce.len(), NONCE_LEN);

        let plain = sealer.open_blob(&blob).unwrap();
        assert_eq!(plain, b"summaryDate,2024-05-01");
    }

    #[test]
    fn test_wrong_passphrase_fails_authentication() {
        let salt = generate_salt();
        let blob = sealer_for("correct horse", &salt).seal(b"payload").unwrap();

        let err = sealer_for("battery staple", &salt)
            .open_blob(&blob)
            .unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
    }

    #[test]
    fn test_different_salt_yields_different_key() {
        let blob = sealer_for("same", &[1u8; SALT_LEN]).seal(b"payload").unwrap();
        let err = sealer_for("same", &[2u8; SALT_LEN])
            .open_blob(&blob)
            .unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let salt = generate_salt();
        let sealer = sealer_for("pw", &salt);
        let mut blob = sealer.seal(b"do not touch").unwrap();
        blob.ciphertext[0] ^= 0x01;

        assert!(matches!(
            sealer.open_blob(&blob),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_each_seal_uses_a_fresh_nonce() {
        let sealer = sealer_for("pw", &generate_salt());
        let a = sealer.seal(b"same bytes").unwrap();
        let b = sealer.seal(b"same bytes").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_short_nonce_is_an_error_not_a_panic() {
        let sealer = sealer_for("pw", &generate_salt());
        let err = sealer.open(b"whatever", &[0u8; 4]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidNonce(4)));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let blob = sealer_for("pw", &salt).seal(b"abc").unwrap();
        assert_eq!(sealer_for("pw", &salt).open_blob(&blob).unwrap(), b"abc");
    }

    #[test]
    fn test_default_params_are_accepted_by_argon2() {
        let p = KdfParams::default();
        assert!(Params::new(p.memory_kib, p.iterations, p.parallelism, Some(KEY_LEN)).is_ok());
    }

    #[test]
    fn test_invalid_params_surface_as_kdf_error() {
        let pass = Passphrase::new("pw").unwrap();
        let bad = KdfParams {
            memory_kib: 1,
            iterations: 0,
            parallelism: 1,
        };
        assert!(matches!(
            derive_key(&pass, &generate_salt(), &bad),
            Err(CryptoError::Kdf(_))
        ));
    }
}
