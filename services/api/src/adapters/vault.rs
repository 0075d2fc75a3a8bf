//! services/api/src/adapters/vault.rs
//!
//! The key vault: concrete implementation of the `Encryption` port.
//!
//! Each identity gets an X25519 keypair whose secret half is derived
//! from the codename (HKDF-SHA256 with domain separation) and is never
//! written to disk; only the public half and its fingerprint live under
//! `key_dir`. Sealing uses an ephemeral-static Diffie-Hellman sealed
//! box with ChaCha20-Poly1305, so material at rest can be produced with
//! the public half alone while opening always requires the codename.
//!
//! Wire format: `eph_pub (32) || nonce (12) || ciphertext`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use curve25519_dalek::montgomery::MontgomeryPoint;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tipline_core::ports::{CryptoError, Encryption};

const SECRET_SALT: &[u8] = b"tipline/reply-secret/v1";
const SECRET_INFO: &[u8] = b"reply-secret";
const BOX_SALT: &[u8] = b"tipline/reply-box/v1";

const EPH_PUB_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// File-backed key vault.
pub struct KeyVault {
    key_dir: PathBuf,
}

impl KeyVault {
    pub fn new(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
        }
    }

    fn pub_path(&self, filesystem_id: &str) -> PathBuf {
        self.key_dir.join(format!("{filesystem_id}.pub"))
    }

    /// The codename-derived secret half. Deterministic, never stored.
    fn secret_from_codename(codename: &str) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(Some(SECRET_SALT), codename.as_bytes());
        let mut secret = [0u8; 32];
        hk.expand(SECRET_INFO, &mut secret)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        secret
    }

    /// Symmetric message key from the DH shared point, bound to the
    /// ephemeral public half.
    fn message_key(shared: &MontgomeryPoint, eph_pub: &[u8; 32]) -> [u8; 32] {
        let hk = Hkdf::<Sha256>::new(Some(BOX_SALT), shared.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(eph_pub, &mut key)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        key
    }

    async fn read_public(&self, path: &Path) -> Result<[u8; 32], CryptoError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(CryptoError::KeyNotFound)
            }
            Err(err) => return Err(CryptoError::Backend(err.to_string())),
        };
        let bytes = hex::decode(raw.trim())
            .map_err(|e| CryptoError::Malformed(format!("public key file: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| CryptoError::Malformed("public key file has wrong length".into()))
    }
}

#[async_trait]
impl Encryption for KeyVault {
    async fn gen_key_pair(&self, filesystem_id: &str, codename: &str) -> Result<(), CryptoError> {
        let secret = Self::secret_from_codename(codename);
        let public = MontgomeryPoint::mul_base_clamped(secret);
        tokio::fs::create_dir_all(&self.key_dir)
            .await
            .map_err(|e| CryptoError::Backend(e.to_string()))?;
        tokio::fs::write(self.pub_path(filesystem_id), hex::encode(public.as_bytes()))
            .await
            .map_err(|e| CryptoError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn fingerprint(&self, filesystem_id: &str) -> Result<Option<String>, CryptoError> {
        match self.read_public(&self.pub_path(filesystem_id)).await {
            Ok(public) => Ok(Some(hex::encode(Sha256::digest(public)))),
            Err(CryptoError::KeyNotFound) => Ok(None),
            Err(other) => Err(other),
        }
    }

    async fn seal(&self, filesystem_id: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let public = MontgomeryPoint(self.read_public(&self.pub_path(filesystem_id)).await?);

        let mut eph_secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut eph_secret);
        let eph_pub = MontgomeryPoint::mul_base_clamped(eph_secret).to_bytes();
        let shared = public.mul_clamped(eph_secret);
        let key = Self::message_key(&shared, &eph_pub);

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Backend(e.to_string()))?;

        let mut out = Vec::with_capacity(EPH_PUB_LEN + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&eph_pub);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    async fn open(&self, codename: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < EPH_PUB_LEN + NONCE_LEN {
            return Err(CryptoError::Malformed("ciphertext too short".into()));
        }
        let (header, body) = ciphertext.split_at(EPH_PUB_LEN + NONCE_LEN);
        let eph_pub: [u8; 32] = header[..EPH_PUB_LEN]
            .try_into()
            .map_err(|_| CryptoError::Malformed("bad ephemeral key".into()))?;
        let nonce = &header[EPH_PUB_LEN..];

        let secret = Self::secret_from_codename(codename);
        let shared = MontgomeryPoint(eph_pub).mul_clamped(secret);
        let key = Self::message_key(&shared, &eph_pub);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| CryptoError::Malformed("decryption failed".into()))
    }

    async fn delete_key_pair(&self, filesystem_id: &str) -> Result<(), CryptoError> {
        match tokio::fs::remove_file(self.pub_path(filesystem_id)).await {
            Ok(()) => Ok(()),
            // Absent key material: already clean.
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CryptoError::Backend(err.to_string())),
        }
    }
}
