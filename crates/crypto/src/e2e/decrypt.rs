//! Frame-Entschluesselung
//!
//! Liest den Trailer von hinten, sucht den Schluessel per Key-ID und
//! verifiziert Auth-Tag und Header (AAD).
//!
//! ## Degradation
//! Fehlt der Schluessel, ist der Trailer kaputt oder schlaegt die
//! Authentifizierung fehl, wird der Frame unveraendert weitergereicht statt
//! den Stream abzubrechen. Der Decoder bekommt dann Ciphertext zu sehen.
//! Das haelt den Stream bei Key-Distribution-Races am Leben, laesst aber
//! auch manipulierte Payloads bis zum Decoder durch.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key as AesKey, Nonce as AesNonce,
};
use bytes::{BufMut, Bytes, BytesMut};
use mediaseal_core::{EncodedFrame, MediaKind};

use crate::e2e::key_store::KeyStore;
use crate::e2e::wire::{WireFrame, IV_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::types::{Key, KEY_LEN};

/// Grund fuer eine unveraenderte Weitergabe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassThroughReason {
    /// Key-ID nicht im aktuellen Satz (noch nicht empfangen oder veraltet)
    UnknownKey(String),
    /// Auth-Tag oder AAD passt nicht
    AuthenticationFailed(String),
    /// Trailer nicht parsebar
    Malformed,
}

/// Ergebnis des Receiver-Transforms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Decrypted(EncodedFrame),
    PassedThrough {
        frame: EncodedFrame,
        reason: PassThroughReason,
    },
}

impl DecodeOutcome {
    /// Der Frame, der weitergereicht wird
    pub fn into_frame(self) -> EncodedFrame {
        match self {
            Self::Decrypted(frame) | Self::PassedThrough { frame, .. } => frame,
        }
    }

    pub fn is_decrypted(&self) -> bool {
        matches!(self, Self::Decrypted(_))
    }
}

/// Entschluesselt rohe Wire-Bytes mit einem bekannten Schluessel
///
/// Gibt `header || plaintext` zurueck.
pub fn decrypt_frame(data: &[u8], header_len: usize, key: &Key) -> CryptoResult<Bytes> {
    let wire = WireFrame::parse(data, header_len)?;
    decrypt_wire(&wire, key)
}

/// Receiver-Transform: entschluesselt einen Frame oder reicht ihn durch
pub fn decode_frame(frame: EncodedFrame, kind: MediaKind, keys: &KeyStore) -> DecodeOutcome {
    let header_len = frame.header_len(kind);

    let wire = match WireFrame::parse(&frame.data, header_len) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::debug!(fehler = %e, "Frame nicht parsebar, reiche unveraendert durch");
            return DecodeOutcome::PassedThrough {
                frame,
                reason: PassThroughReason::Malformed,
            };
        }
    };

    let Some(key) = keys.get_key(wire.key_id) else {
        let key_id = wire.key_id.to_string();
        tracing::debug!(key_id = %key_id, "Schluessel unbekannt, reiche Frame unveraendert durch");
        return DecodeOutcome::PassedThrough {
            frame,
            reason: PassThroughReason::UnknownKey(key_id),
        };
    };

    match decrypt_wire(&wire, &key) {
        Ok(data) => DecodeOutcome::Decrypted(frame.with_data(data)),
        Err(e) => {
            tracing::warn!(
                key_id = %key.key_id,
                fehler = %e,
                "Frame-Authentifizierung fehlgeschlagen, reiche unveraendert durch"
            );
            let key_id = key.key_id.clone();
            DecodeOutcome::PassedThrough {
                frame,
                reason: PassThroughReason::AuthenticationFailed(key_id),
            }
        }
    }
}

fn decrypt_wire(wire: &WireFrame<'_>, key: &Key) -> CryptoResult<Bytes> {
    let plaintext = decrypt_aes256gcm(wire.ciphertext, key.key.as_bytes(), wire.iv, wire.header)?;

    let mut out = BytesMut::with_capacity(wire.header.len() + plaintext.len());
    out.put_slice(wire.header);
    out.put_slice(&plaintext);
    Ok(out.freeze())
}

fn decrypt_aes256gcm(
    ciphertext: &[u8],
    key_bytes: &[u8],
    iv: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    if key_bytes.len() != KEY_LEN {
        return Err(CryptoError::DecryptionFailed(format!(
            "Schluessel nicht importierbar: erwartet {KEY_LEN} Bytes, erhalten {}",
            key_bytes.len()
        )));
    }
    if iv.len() != IV_LEN {
        return Err(CryptoError::DecryptionFailed(format!(
            "IV-Laenge {} wird nicht unterstuetzt",
            iv.len()
        )));
    }

    let key = AesKey::<Aes256Gcm>::from_slice(key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = AesNonce::from_slice(iv);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e2e::encrypt::{encode_frame, encrypt_frame};
    use crate::types::KeyType;
    use mediaseal_core::FrameType;

    fn store_mit(keys: Vec<Key>) -> KeyStore {
        let store = KeyStore::new();
        store.set_keys(keys);
        store
    }

    #[test]
    fn roundtrip_alle_header_klassen() {
        let store = store_mit(vec![Key::generate("k1", KeyType::Encryption)]);
        let body: Vec<u8> = (0..=255u8).cycle().take(300).collect();

        let frames = [
            (MediaKind::Audio, EncodedFrame::audio(1, body.clone())),
            (MediaKind::Video, EncodedFrame::video(2, FrameType::Key, body.clone())),
            (MediaKind::Video, EncodedFrame::video(3, FrameType::Delta, body.clone())),
            (MediaKind::Video, EncodedFrame::video(4, FrameType::Unclassified, body.clone())),
        ];

        for (kind, frame) in frames {
            let encoded = encode_frame(frame.clone(), kind, &store).unwrap();
            let decoded = decode_frame(encoded, kind, &store);
            assert!(decoded.is_decrypted(), "{kind} {:?}", frame.frame_type);
            assert_eq!(decoded.into_frame(), frame);
        }
    }

    #[test]
    fn keyframe_142_bytes_roundtrip() {
        let key = Key::generate("k1", KeyType::Encryption);
        let mut data = vec![0x10u8; 10];
        data.extend((0..100u8).collect::<Vec<_>>());

        let encrypted = encrypt_frame(&data, 10, &key).unwrap();
        assert_eq!(encrypted.len(), 142);

        let decrypted = decrypt_frame(&encrypted, 10, &key).unwrap();
        assert_eq!(decrypted.as_ref(), data.as_slice());
    }

    #[test]
    fn leerer_body_roundtrip() {
        let store = store_mit(vec![Key::generate("k1", KeyType::Encryption)]);
        let frame = EncodedFrame::audio(0, vec![0xF8u8]);
        let encoded = encode_frame(frame.clone(), MediaKind::Audio, &store).unwrap();
        assert_eq!(decode_frame(encoded, MediaKind::Audio, &store).into_frame(), frame);
    }

    #[test]
    fn manipulierter_header_wird_durchgereicht() {
        let store = store_mit(vec![Key::generate("k1", KeyType::Encryption)]);
        let frame = EncodedFrame::video(0, FrameType::Delta, vec![1u8; 40]);
        let encoded = encode_frame(frame, MediaKind::Video, &store).unwrap();

        let mut bytes = encoded.data.to_vec();
        bytes[0] ^= 0x01;
        let manipuliert = encoded.with_data(bytes);

        let outcome = decode_frame(manipuliert.clone(), MediaKind::Video, &store);
        assert_eq!(
            outcome,
            DecodeOutcome::PassedThrough {
                frame: manipuliert,
                reason: PassThroughReason::AuthenticationFailed("k1".into()),
            }
        );
    }

    #[test]
    fn manipulierter_ciphertext_wird_durchgereicht() {
        let store = store_mit(vec![Key::generate("k1", KeyType::Encryption)]);
        let encoded =
            encode_frame(EncodedFrame::audio(0, vec![3u8; 30]), MediaKind::Audio, &store).unwrap();

        let mut bytes = encoded.data.to_vec();
        bytes[5] ^= 0xFF;
        let outcome = decode_frame(encoded.with_data(bytes), MediaKind::Audio, &store);
        assert!(!outcome.is_decrypted());
    }

    #[test]
    fn fehlender_schluessel_liefert_ciphertext_unveraendert() {
        let sender = store_mit(vec![Key::generate("k1", KeyType::Encryption)]);
        let empfaenger = store_mit(vec![Key::generate("anderer", KeyType::Encryption)]);

        let encoded =
            encode_frame(EncodedFrame::audio(0, vec![7u8; 50]), MediaKind::Audio, &sender).unwrap();
        let outcome = decode_frame(encoded.clone(), MediaKind::Audio, &empfaenger);

        assert_eq!(
            outcome,
            DecodeOutcome::PassedThrough {
                frame: encoded,
                reason: PassThroughReason::UnknownKey("k1".into()),
            }
        );
    }

    #[test]
    fn gleiche_key_id_falsches_material() {
        let sender = store_mit(vec![Key::generate("k1", KeyType::Encryption)]);
        let empfaenger = store_mit(vec![Key::generate("k1", KeyType::Encryption)]);

        let encoded =
            encode_frame(EncodedFrame::audio(0, vec![7u8; 50]), MediaKind::Audio, &sender).unwrap();
        let outcome = decode_frame(encoded, MediaKind::Audio, &empfaenger);
        assert!(matches!(
            outcome,
            DecodeOutcome::PassedThrough {
                reason: PassThroughReason::AuthenticationFailed(_),
                ..
            }
        ));
    }

    #[test]
    fn kaputter_trailer_wird_durchgereicht() {
        let store = store_mit(vec![Key::generate("k1", KeyType::Encryption)]);
        let frame = EncodedFrame::audio(0, vec![1u8, 2, 200]);
        let outcome = decode_frame(frame.clone(), MediaKind::Audio, &store);
        assert_eq!(
            outcome,
            DecodeOutcome::PassedThrough {
                frame,
                reason: PassThroughReason::Malformed,
            }
        );
    }

    #[test]
    fn rotation_neue_frames_tragen_neue_key_id() {
        let store = KeyStore::new();
        let k1 = Key::generate("k1", KeyType::Encryption);
        let k2 = Key::generate("k2", KeyType::Encryption);

        store.set_keys(vec![k1.clone()]);
        store.set_keys(vec![k2.clone()]);

        let frame = EncodedFrame::audio(0, vec![9u8; 25]);
        let encoded = encode_frame(frame.clone(), MediaKind::Audio, &store).unwrap();
        let wire = WireFrame::parse(&encoded.data, 1).unwrap();
        assert_eq!(wire.key_id, "k2");

        let nur_k1 = store_mit(vec![k1.clone()]);
        assert!(!decode_frame(encoded.clone(), MediaKind::Audio, &nur_k1).is_decrypted());

        let mit_k2 = store_mit(vec![Key::other("k1", k1.key.as_bytes().to_vec()), k2]);
        assert_eq!(
            decode_frame(encoded, MediaKind::Audio, &mit_k2).into_frame(),
            frame
        );
    }
}
