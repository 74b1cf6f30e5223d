//! Sealed usernames.
//!
//! A username is stored twice: as a keyed HMAC-SHA256 lookup hash (hex) that
//! supports equality search, and as ChaCha20-Poly1305 ciphertext
//! (`base64(nonce || ciphertext || tag)`) that only this process can open.
//!
//! The nonce is the first 12 bytes of the owner's UUID. That is only sound
//! while every owner encrypts exactly one username over its lifetime, so the
//! only way to produce ciphertext through [`IdentityCipher`] is to consume an
//! [`UnassignedUsername`] into a [`SealedUsername`]. There is no update path.

use crate::models::{NewProfile, ProfileType};
use crate::services::error::CipherError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hmac::{Hmac, Mac};
use rand::Rng;
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// ChaCha20-Poly1305 key size.
pub const KEY_SIZE: usize = 32;
/// ChaCha20-Poly1305 nonce size.
pub const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

const USERNAME_LETTERS: usize = 4;
const USERNAME_DIGITS: usize = 6;

/// Hex HMAC-SHA256 of `plaintext` under `key`.
pub fn hash_username(plaintext: &str, key: &[u8]) -> Result<String, CipherError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CipherError::HashFailed)?;
    mac.update(plaintext.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Encrypt `plaintext` with a nonce taken from `owner_id`.
pub fn encrypt_username(plaintext: &str, key: &[u8], owner_id: Uuid) -> Result<String, CipherError> {
    let cipher = aead(key)?;
    if owner_id.is_nil() {
        return Err(CipherError::InvalidOwnerId);
    }

    let nonce_bytes = &owner_id.as_bytes()[..NONCE_SIZE];
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce_bytes), plaintext.as_bytes())
        .map_err(|_| CipherError::InvalidKey {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(sealed))
}

/// Open ciphertext produced by [`encrypt_username`].
pub fn decrypt_username(cipher_text: &str, key: &[u8]) -> Result<String, CipherError> {
    let cipher = aead(key)?;
    let raw = STANDARD
        .decode(cipher_text)
        .map_err(|_| CipherError::DecryptionFailed)?;
    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CipherError::DecryptionFailed);
    }

    let (nonce, ciphertext) = raw.split_at(NONCE_SIZE);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)?;
    String::from_utf8(plaintext).map_err(|_| CipherError::DecryptionFailed)
}

/// Recompute the lookup hash and compare it with `stored_hash` in constant time.
pub fn verify_username_hash(plaintext: &str, stored_hash: &str, key: &[u8]) -> bool {
    match hash_username(plaintext, key) {
        Ok(computed) => computed.as_bytes().ct_eq(stored_hash.as_bytes()).into(),
        Err(_) => false,
    }
}

/// Random username: four uppercase ASCII letters followed by six digits.
pub fn generate_username() -> String {
    let mut rng = rand::thread_rng();
    let mut username: String = (0..USERNAME_LETTERS)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect();
    username.extend((0..USERNAME_DIGITS).map(|_| char::from(rng.gen_range(b'0'..=b'9'))));
    username
}

fn aead(key: &[u8]) -> Result<ChaCha20Poly1305, CipherError> {
    <ChaCha20Poly1305 as KeyInit>::new_from_slice(key).map_err(|_| CipherError::InvalidKey {
        expected: KEY_SIZE,
        actual: key.len(),
    })
}

/// Process-wide username keys, loaded once at startup.
pub struct UsernameKeys {
    encryption: SecretVec<u8>,
    lookup: SecretVec<u8>,
}

impl UsernameKeys {
    pub fn new(encryption: Vec<u8>, lookup: Vec<u8>) -> Result<Self, CipherError> {
        if encryption.len() != KEY_SIZE {
            return Err(CipherError::InvalidKey {
                expected: KEY_SIZE,
                actual: encryption.len(),
            });
        }
        if lookup.is_empty() {
            return Err(CipherError::HashFailed);
        }
        Ok(Self {
            encryption: SecretVec::new(encryption),
            lookup: SecretVec::new(lookup),
        })
    }

    /// Decode both keys from standard base64.
    pub fn from_base64(encryption: &str, lookup: &str) -> Result<Self, CipherError> {
        let encryption = STANDARD
            .decode(encryption.trim())
            .map_err(|_| CipherError::InvalidKey {
                expected: KEY_SIZE,
                actual: 0,
            })?;
        let lookup = STANDARD
            .decode(lookup.trim())
            .map_err(|_| CipherError::HashFailed)?;
        Self::new(encryption, lookup)
    }
}

impl std::fmt::Debug for UsernameKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsernameKeys")
            .field("encryption", &"[REDACTED]")
            .field("lookup", &"[REDACTED]")
            .finish()
    }
}

/// Username hashing and decryption bound to the process keys.
#[derive(Clone, Debug)]
pub struct IdentityCipher {
    keys: Arc<UsernameKeys>,
}

impl IdentityCipher {
    pub fn new(keys: UsernameKeys) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, CipherError> {
        hash_username(plaintext, self.keys.lookup.expose_secret())
    }

    pub fn decrypt(&self, cipher_text: &str) -> Result<String, CipherError> {
        decrypt_username(cipher_text, self.keys.encryption.expose_secret())
    }

    pub fn verify(&self, plaintext: &str, stored_hash: &str) -> bool {
        verify_username_hash(plaintext, stored_hash, self.keys.lookup.expose_secret())
    }

    fn encrypt(&self, plaintext: &str, owner_id: Uuid) -> Result<String, CipherError> {
        encrypt_username(plaintext, self.keys.encryption.expose_secret(), owner_id)
    }
}

/// A username not yet bound to any owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnassignedUsername(String);

impl UnassignedUsername {
    pub fn generate() -> Self {
        Self(generate_username())
    }

    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bind the username to `owner_id`. Consumes the value, so the same
    /// plaintext cannot be sealed twice through this path.
    pub fn seal(self, cipher: &IdentityCipher, owner_id: Uuid) -> Result<SealedUsername, CipherError> {
        let lookup_hash = cipher.hash(&self.0)?;
        let cipher_text = cipher.encrypt(&self.0, owner_id)?;
        Ok(SealedUsername {
            owner_id,
            plaintext: self.0,
            lookup_hash,
            cipher_text,
        })
    }
}

/// A username encrypted for exactly one owner.
#[derive(Debug, Clone)]
pub struct SealedUsername {
    owner_id: Uuid,
    plaintext: String,
    lookup_hash: String,
    cipher_text: String,
}

impl SealedUsername {
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn plaintext(&self) -> &str {
        &self.plaintext
    }

    pub fn lookup_hash(&self) -> &str {
        &self.lookup_hash
    }

    pub fn into_new_profile(self, name: String, profile_type: ProfileType) -> NewProfile {
        NewProfile {
            id: self.owner_id,
            lookup_hash: self.lookup_hash,
            cipher_text: self.cipher_text,
            name,
            profile_type,
        }
    }
}
