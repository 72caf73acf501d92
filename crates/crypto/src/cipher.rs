//! Password-based authenticated encryption.
//!
//! Every call to [`seal`] draws a fresh random salt and a fresh random IV from
//! the operating system, derives a 256-bit key from the password and that
//! salt with Argon2id, and encrypts with AES-256-GCM. Salt and IV are not
//! secret; they are returned alongside the ciphertext so that the caller can
//! store them in the clear and [`open`] can re-derive the same key.
//!
//! AES-GCM authenticates as it decrypts, so a wrong password can never
//! produce a plausible-looking plaintext: it fails with
//! [`AuthenticationFailed`](ErrorKind::AuthenticationFailed), exactly like a
//! tampered ciphertext would.

use crate::error::{ErrorKind, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tracing::instrument;
use zeroize::Zeroize;

/// Length of the random key-derivation salt, in bytes.
pub const SALT_LEN: usize = 16;
/// Length of the random AES-GCM initialization vector, in bytes.
pub const IV_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Argon2id cost parameters.
///
/// These are recorded in every backup's metadata, so a backup stays
/// decryptable after the configured defaults change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    /// 1 GiB. Parameters read from a file header are untrusted input.
    pub const MAX_MEMORY_KIB: u32 = 1024 * 1024;
    pub const MAX_ITERATIONS: u32 = 64;
    pub const MAX_PARALLELISM: u32 = 64;

    /// Check the parameters against Argon2's limits and the caps above,
    /// without deriving anything.
    pub fn validate(&self) -> Result<()> {
        self.to_argon2().map(|_| ())
    }

    fn to_argon2(self) -> Result<Params> {
        if self.memory_kib > Self::MAX_MEMORY_KIB
            || self.iterations > Self::MAX_ITERATIONS
            || self.parallelism > Self::MAX_PARALLELISM
        {
            exn::bail!(ErrorKind::KeyDerivation);
        }
        Params::new(self.memory_kib, self.iterations, self.parallelism, Some(KEY_LEN))
            .map_err(|_| exn::Exn::from(ErrorKind::KeyDerivation))
    }
}

struct Key([u8; KEY_LEN]);

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("Key(<redacted>)")
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[instrument(level = "debug", skip_all, fields(memory_kib = params.memory_kib, iterations = params.iterations))]
fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<Key> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
    let mut key = Key([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key.0)
        .map_err(|_| exn::Exn::from(ErrorKind::KeyDerivation))?;
    Ok(key)
}

fn cipher_for(key: &Key) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(&key.0).map_err(|_| exn::Exn::from(ErrorKind::Encryption))
}

/// The output of [`seal`]: everything needed to store a ciphertext.
#[derive(Clone, PartialEq, Eq)]
pub struct Sealed {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl Debug for Sealed {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Sealed")
            .field("salt", &self.salt)
            .field("iv", &self.iv)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

/// Encrypt `plaintext` under a key derived from `password`.
///
/// `aad` is authenticated but not encrypted; the same bytes must be passed to
/// [`open`].
///
/// ```
/// use strongbox_crypto::{KdfParams, open, seal};
///
/// let params = KdfParams { memory_kib: 64, iterations: 1, parallelism: 1 };
/// let sealed = seal("hunter2", b"reading progress", b"backup-1", &params).unwrap();
/// let plain = open("hunter2", &sealed.salt, &sealed.iv, &sealed.ciphertext, b"backup-1", &params).unwrap();
/// assert_eq!(plain, b"reading progress");
/// ```
#[instrument(skip(password, plaintext, aad), fields(plaintext_size = plaintext.len()))]
pub fn seal(password: &str, plaintext: &[u8], aad: &[u8], params: &KdfParams) -> Result<Sealed> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);
    let key = derive_key(password, &salt, params)?;
    let ciphertext = cipher_for(&key)?
        .encrypt(Nonce::from_slice(&iv), Payload { msg: plaintext, aad })
        .map_err(|_| exn::Exn::from(ErrorKind::Encryption))?;
    Ok(Sealed { salt, iv, ciphertext })
}

/// Decrypt and authenticate a ciphertext produced by [`seal`].
#[instrument(skip(password, salt, iv, ciphertext, aad), fields(ciphertext_size = ciphertext.len()))]
pub fn open(
    password: &str,
    salt: &[u8; SALT_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
    aad: &[u8],
    params: &KdfParams,
) -> Result<Vec<u8>> {
    let key = derive_key(password, salt, params)?;
    cipher_for(&key)?
        .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
        .map_err(|_| exn::Exn::from(ErrorKind::AuthenticationFailed))
}
