//! Value pipeline: gzip compression then AES-256-GCM encryption.
//!
//! Encrypted payloads are laid out as `[nonce: 12 bytes][ciphertext]`. The
//! entry metadata records which stages were applied so `decode` can invert
//! exactly what `encode` did, even after the configuration changes.

use std::io::{Read, Write};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use rand::RngCore;
use tiercache_core::{CacheConfig, CacheError, CacheResult, CodecError};

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Output of [`ValueCodec::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    pub bytes: Vec<u8>,
    pub compressed: bool,
    pub encrypted: bool,
}

/// Compression and encryption applied to every stored payload.
pub struct ValueCodec {
    compression: bool,
    compression_threshold: usize,
    compression_level: u32,
    cipher: Option<Aes256Gcm>,
}

impl std::fmt::Debug for ValueCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCodec")
            .field("compression", &self.compression)
            .field("compression_threshold", &self.compression_threshold)
            .field("compression_level", &self.compression_level)
            .field("encryption", &self.cipher.is_some())
            .finish()
    }
}

impl ValueCodec {
    /// Build the codec described by `config`.
    ///
    /// With encryption on and no configured key, a random key is generated;
    /// entries encrypted with it are unreadable by any other process.
    pub fn from_config(config: &CacheConfig) -> CacheResult<Self> {
        let cipher = if config.encryption {
            let key = match config.encryption_key_bytes()? {
                Some(key) => key,
                None => {
                    tracing::info!("No encryption key configured, generating a process-local key");
                    let mut key = [0u8; 32];
                    rand::rng().fill_bytes(&mut key);
                    key
                }
            };
            Some(new_cipher(&key)?)
        } else {
            None
        };

        Ok(Self {
            compression: config.compression,
            compression_threshold: config.compression_threshold,
            compression_level: config.compression_level,
            cipher,
        })
    }

    /// A codec that stores payloads untouched.
    pub fn passthrough() -> Self {
        Self {
            compression: false,
            compression_threshold: 0,
            compression_level: 0,
            cipher: None,
        }
    }

    pub fn compression_enabled(&self) -> bool {
        self.compression
    }

    pub fn encryption_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn encode(&self, value: &[u8]) -> CacheResult<EncodedValue> {
        let mut bytes = value.to_vec();

        let compressed = self.compression && value.len() >= self.compression_threshold;
        if compressed {
            bytes = self.compress(&bytes)?;
        }

        let encrypted = match &self.cipher {
            Some(cipher) => {
                bytes = encrypt(cipher, &bytes)?;
                true
            }
            None => false,
        };

        Ok(EncodedValue {
            bytes,
            compressed,
            encrypted,
        })
    }

    /// Invert `encode` according to the flags stored with the entry.
    pub fn decode(&self, bytes: &[u8], compressed: bool, encrypted: bool) -> CacheResult<Vec<u8>> {
        let mut value = if encrypted {
            let cipher = self
                .cipher
                .as_ref()
                .ok_or(CodecError::EncryptionKeyMissing)?;
            decrypt(cipher, bytes)?
        } else {
            bytes.to_vec()
        };

        if compressed {
            value = decompress(&value)?;
        }

        Ok(value)
    }

    fn compress(&self, data: &[u8]) -> CacheResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.compression_level));
        encoder
            .write_all(data)
            .map_err(|e| CacheError::serialization(format!("compression failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| CacheError::serialization(format!("compression failed: {}", e)))
    }
}

fn decompress(data: &[u8]) -> CacheResult<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::serialization(format!("decompression failed: {}", e)))?;
    Ok(out)
}

fn new_cipher(key: &[u8; 32]) -> CacheResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| CacheError::serialization(format!("invalid key: {}", e)))
}

fn encrypt(cipher: &Aes256Gcm, plaintext: &[u8]) -> CacheResult<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CacheError::serialization(format!("encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn decrypt(cipher: &Aes256Gcm, data: &[u8]) -> CacheResult<Vec<u8>> {
    if data.len() < NONCE_SIZE {
        return Err(CacheError::serialization("ciphertext shorter than nonce"));
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CacheError::serialization(format!("decryption failed: {}", e)))
}
