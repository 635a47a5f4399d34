//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Laenge eines AES-256-Schluessels in Bytes
pub const KEY_LEN: usize = 32;

/// Verwendungszweck eines Schluessels
///
/// Auf dem Draht als Zahl kodiert (`0` = Encryption), wie es die
/// Endpoint-API liefert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum KeyType {
    /// Aktiver Schluessel fuer ausgehende Frames
    Encryption,
    /// Nur zum Entschluesseln
    Other,
}

impl From<u8> for KeyType {
    fn from(value: u8) -> Self {
        if value == 0 {
            Self::Encryption
        } else {
            Self::Other
        }
    }
}

impl From<KeyType> for u8 {
    fn from(value: KeyType) -> Self {
        match value {
            KeyType::Encryption => 0,
            KeyType::Other => 1,
        }
    }
}

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone, PartialEq, Eq)]
pub struct SecretBytes(Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Symmetrischer Frame-Schluessel
///
/// Nach dem Einfuegen in den `KeyStore` unveraenderlich (liegt dort hinter `Arc`).
#[derive(Debug, Clone)]
pub struct Key {
    /// Eindeutig innerhalb eines Schluesselsatzes, reist im Frame-Trailer mit
    pub key_id: String,
    /// Rohes Schluesselmaterial (32 Bytes fuer AES-256-GCM)
    pub key: SecretBytes,
    pub key_type: KeyType,
}

impl Key {
    pub fn new(key_id: impl Into<String>, key: Vec<u8>, key_type: KeyType) -> Self {
        Self {
            key_id: key_id.into(),
            key: SecretBytes::new(key),
            key_type,
        }
    }

    /// Schluessel, der zum Verschluesseln ausgewaehlt wird
    pub fn encryption(key_id: impl Into<String>, key: Vec<u8>) -> Self {
        Self::new(key_id, key, KeyType::Encryption)
    }

    /// Schluessel, der nur zum Entschluesseln vorgehalten wird
    pub fn other(key_id: impl Into<String>, key: Vec<u8>) -> Self {
        Self::new(key_id, key, KeyType::Other)
    }

    /// Erzeugt einen zufaelligen 32-Byte-Schluessel
    pub fn generate(key_id: impl Into<String>, key_type: KeyType) -> Self {
        let mut key_bytes = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key_bytes);
        Self::new(key_id, key_bytes, key_type)
    }

    pub fn is_encryption_key(&self) -> bool {
        self.key_type == KeyType::Encryption
    }
}
