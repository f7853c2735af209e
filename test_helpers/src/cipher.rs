//! An in-memory key store and a deterministic authenticated cipher.
//!
//! The cipher XORs the plaintext with a SHA-256 keystream and appends a
//! truncated SHA-256 tag over key, module, AAD and ciphertext. It is only
//! meant to make encrypted trees testable: a wrong key, a different module
//! or a different AAD all fail authentication.
use std::{collections::HashMap, sync::Arc};

use block_index::{Cipher, CipherProvider, DynError, EncryptionKey, KeyStore, ModuleTag};
use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

const TAG_LEN: usize = 16;
const BLOCK_LEN: usize = 32;

/// Errors raised by the test key store and cipher.
#[derive(Debug, thiserror::Error)]
pub enum TestCipherError {
    /// No key is stored under the requested name.
    #[error("unknown key '{0}'")]
    UnknownKey(String),

    /// Ciphers cannot be built from empty key material.
    #[error("empty key material")]
    EmptyKey,

    /// The ciphertext is shorter than the tag.
    #[error("ciphertext too short: {0} bytes")]
    TooShort(usize),

    /// Wrong key, module or AAD, or tampered ciphertext.
    #[error("authentication tag mismatch")]
    TagMismatch,
}

/// Keys by name.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    keys: HashMap<String, EncryptionKey>,
}

impl InMemoryKeyStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `material` under `name`.
    #[must_use]
    pub fn with_key(mut self, name: impl Into<String>, material: impl Into<Bytes>) -> Self {
        self.keys.insert(name.into(), EncryptionKey::new(material));
        self
    }
}

impl KeyStore for InMemoryKeyStore {
    fn get_key(&self, name: &str) -> Result<EncryptionKey, DynError> {
        self.keys
            .get(name)
            .cloned()
            .ok_or_else(|| TestCipherError::UnknownKey(name.to_owned()).into())
    }
}

/// SHA-256 keystream cipher bound to one key and module.
#[derive(Debug)]
pub struct Sha256Cipher {
    key: Bytes,
    module: ModuleTag,
    encrypted_aads: Option<Arc<Mutex<Vec<Vec<u8>>>>>,
}

impl Sha256Cipher {
    /// Creates a cipher for `key` and `module`.
    pub fn new(key: &EncryptionKey, module: ModuleTag) -> Result<Self, TestCipherError> {
        if key.as_bytes().is_empty() {
            return Err(TestCipherError::EmptyKey);
        }
        Ok(Self {
            key: Bytes::copy_from_slice(key.as_bytes()),
            module,
            encrypted_aads: None,
        })
    }

    fn keyed(&self, domain: &[u8]) -> Sha256 {
        Sha256::new()
            .chain_update(domain)
            .chain_update(&self.key)
            .chain_update([self.module.code()])
    }

    fn apply_keystream(&self, aad: &[u8], data: &[u8]) -> Vec<u8> {
        let aad_digest = Sha256::digest(aad);
        let mut out = Vec::with_capacity(data.len());
        for (counter, chunk) in data.chunks(BLOCK_LEN).enumerate() {
            let block = self
                .keyed(b"keystream")
                .chain_update(aad_digest)
                .chain_update((counter as u64).to_be_bytes())
                .finalize();
            out.extend(chunk.iter().zip(block.iter()).map(|(b, k)| b ^ k));
        }
        out
    }

    fn tag(&self, aad: &[u8], body: &[u8]) -> [u8; TAG_LEN] {
        let digest = self
            .keyed(b"tag")
            .chain_update((aad.len() as u64).to_be_bytes())
            .chain_update(aad)
            .chain_update(body)
            .finalize();
        let mut tag = [0; TAG_LEN];
        tag.copy_from_slice(&digest[..TAG_LEN]);
        tag
    }
}

impl Cipher for Sha256Cipher {
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Bytes, DynError> {
        if let Some(aads) = &self.encrypted_aads {
            aads.lock().push(aad.to_vec());
        }
        let mut out = self.apply_keystream(aad, plaintext);
        let tag = self.tag(aad, &out);
        out.extend_from_slice(&tag);
        Ok(out.into())
    }

    fn decrypt(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Bytes, DynError> {
        let body_len = ciphertext
            .len()
            .checked_sub(TAG_LEN)
            .ok_or(TestCipherError::TooShort(ciphertext.len()))?;
        let (body, tag) = ciphertext.split_at(body_len);
        if self.tag(aad, body) != tag {
            return Err(TestCipherError::TagMismatch.into());
        }
        Ok(self.apply_keystream(aad, body).into())
    }
}

/// Builds [`Sha256Cipher`]s and records what they were asked to do.
#[derive(Debug, Default)]
pub struct TestCipherProvider {
    encrypted_aads: Arc<Mutex<Vec<Vec<u8>>>>,
    modules: Mutex<Vec<ModuleTag>>,
}

impl TestCipherProvider {
    /// A provider with empty records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every AAD passed to `encrypt` by ciphers from this provider, in order.
    pub fn encrypted_aads(&self) -> Vec<Vec<u8>> {
        self.encrypted_aads.lock().clone()
    }

    /// Modules of the ciphers built so far, in order.
    pub fn modules(&self) -> Vec<ModuleTag> {
        self.modules.lock().clone()
    }
}

impl CipherProvider for TestCipherProvider {
    fn cipher(&self, key: &EncryptionKey, module: ModuleTag) -> Result<Arc<dyn Cipher>, DynError> {
        let mut cipher = Sha256Cipher::new(key, module)?;
        cipher.encrypted_aads = Some(Arc::clone(&self.encrypted_aads));
        self.modules.lock().push(module);
        Ok(Arc::new(cipher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher(material: &'static [u8], module: ModuleTag) -> Sha256Cipher {
        Sha256Cipher::new(&EncryptionKey::new(material), module).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let c = cipher(b"secret", ModuleTag::BlockIndex);
        let plaintext: Vec<u8> = (0..100).collect();
        let ciphertext = c.encrypt(&plaintext, b"aad").unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + TAG_LEN);
        assert_ne!(&ciphertext[..plaintext.len()], plaintext.as_slice());
        assert_eq!(c.decrypt(&ciphertext, b"aad").unwrap().as_ref(), plaintext);
    }

    #[test]
    fn test_authentication() {
        let c = cipher(b"secret", ModuleTag::BlockIndex);
        let ciphertext = c.encrypt(b"payload", b"aad").unwrap();

        assert!(c.decrypt(&ciphertext, b"other").is_err());
        assert!(cipher(b"Secret", ModuleTag::BlockIndex)
            .decrypt(&ciphertext, b"aad")
            .is_err());
        assert!(cipher(b"secret", ModuleTag::ColumnData)
            .decrypt(&ciphertext, b"aad")
            .is_err());

        let mut tampered = ciphertext.to_vec();
        tampered[0] ^= 1;
        assert!(c.decrypt(&tampered, b"aad").is_err());
        assert!(c.decrypt(&ciphertext[..3], b"aad").is_err());
    }

    #[test]
    fn test_key_store() {
        let store = InMemoryKeyStore::new().with_key("k", &b"abc"[..]);
        assert_eq!(store.get_key("k").unwrap().as_bytes(), b"abc");
        assert_eq!(
            store.get_key("nope").unwrap_err().to_string(),
            "unknown key 'nope'"
        );
        assert!(Sha256Cipher::new(&EncryptionKey::new(Bytes::new()), ModuleTag::BlockIndex).is_err());
    }
}
