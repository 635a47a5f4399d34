//! Frame-Verschluesselung
//!
//! Verschluesselt den Body eines kodierten Frames mit dem aktiven Schluessel.
//! Der Header (Opus TOC bzw. VP8 Payload Descriptor) bleibt lesbar und wird
//! als AAD authentifiziert.
//!
//! ## Ablauf
//! 1. Frame in `header` (N Bytes laut Tabelle) und `body` teilen
//! 2. Frische zufaellige IV pro Frame
//! 3. `ciphertext = AES-256-GCM(key, iv, body, aad = header)`
//! 4. `header || ciphertext || iv || iv_len || key_id || key_id_len`

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key as AesKey, Nonce as AesNonce,
};
use bytes::Bytes;
use mediaseal_core::{EncodedFrame, MediaKind};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::e2e::key_store::KeyStore;
use crate::e2e::wire::{WireFrame, IV_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::types::{Key, KEY_LEN};

/// Verschluesselt rohe Frame-Bytes ins Wire-Format
///
/// Ist der Frame kuerzer als `header_len`, ist der ganze Frame Header und
/// der Body leer.
pub fn encrypt_frame(data: &[u8], header_len: usize, key: &Key) -> CryptoResult<Bytes> {
    let (header, body) = data.split_at(header_len.min(data.len()));

    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = encrypt_aes256gcm(body, key.key.as_bytes(), &iv, header)?;

    WireFrame {
        header,
        ciphertext: &ciphertext,
        iv: &iv,
        key_id: &key.key_id,
    }
    .to_bytes()
}

/// Sender-Transform: verschluesselt einen Frame mit dem aktiven Schluessel
///
/// Schlaegt fehl mit `NoEncryptionKey`, wenn kein Schluessel aktiv ist. Der
/// Aufrufer darf den Frame dann nicht weiterreichen.
pub fn encode_frame(
    frame: EncodedFrame,
    kind: MediaKind,
    keys: &KeyStore,
) -> CryptoResult<EncodedFrame> {
    let key = keys.get_encryption_key()?;
    let header_len = frame.header_len(kind);
    let data = encrypt_frame(&frame.data, header_len, &key)?;
    Ok(frame.with_data(data))
}

fn encrypt_aes256gcm(
    plaintext: &[u8],
    key_bytes: &[u8],
    iv: &[u8; IV_LEN],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    if key_bytes.len() != KEY_LEN {
        return Err(CryptoError::EncryptionFailed(format!(
            "Schluessel nicht importierbar: erwartet {KEY_LEN} Bytes, erhalten {}",
            key_bytes.len()
        )));
    }

    let key = AesKey::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = AesNonce::from_slice(iv);

    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
