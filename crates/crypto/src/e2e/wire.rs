//! Wire-Format eines verschluesselten Frames
//!
//! ```text
//! [header(H)] [ciphertext + auth_tag(16)] [iv(iv_len)] [iv_len(1)] [key_id] [key_id_len(1)]
//! ```
//!
//! Der Header bleibt im Klartext und geht als AAD in die Verschluesselung ein.
//! Der Trailer wird von hinten gelesen und ist damit unabhaengig von der
//! Payload-Groesse parsebar.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CryptoError, CryptoResult};

/// IV-Laenge fuer AES-GCM
pub const IV_LEN: usize = 12;
/// Laenge des GCM Auth-Tags (128 Bit)
pub const TAG_LEN: usize = 16;
/// Groesste Laenge, die ein Laengen-Byte im Trailer ausdruecken kann
pub const MAX_TRAILER_FIELD: usize = u8::MAX as usize;

/// Zerlegte Sicht auf einen verschluesselten Frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFrame<'a> {
    pub header: &'a [u8],
    pub ciphertext: &'a [u8],
    pub iv: &'a [u8],
    pub key_id: &'a str,
}

impl<'a> WireFrame<'a> {
    /// Zerlegt einen Frame anhand der Header-Laenge und des Trailers
    pub fn parse(data: &'a [u8], header_len: usize) -> CryptoResult<Self> {
        let len = data.len();
        let key_id_len = *data
            .last()
            .ok_or_else(|| CryptoError::UngueltigesFrame("leerer Frame".into()))?
            as usize;

        let key_id_start = (len - 1)
            .checked_sub(key_id_len)
            .ok_or_else(|| zu_kurz("key_id", len))?;
        let iv_len_pos = key_id_start
            .checked_sub(1)
            .ok_or_else(|| zu_kurz("iv_len", len))?;
        let iv_len = data[iv_len_pos] as usize;
        let iv_start = iv_len_pos
            .checked_sub(iv_len)
            .filter(|start| *start >= header_len)
            .ok_or_else(|| zu_kurz("iv", len))?;

        let key_id = std::str::from_utf8(&data[key_id_start..len - 1])
            .map_err(|e| CryptoError::UngueltigesFrame(format!("key_id kein UTF-8: {e}")))?;

        Ok(Self {
            header: &data[..header_len],
            ciphertext: &data[header_len..iv_start],
            iv: &data[iv_start..iv_len_pos],
            key_id,
        })
    }

    /// Gesamtlaenge des serialisierten Frames
    pub fn encoded_len(&self) -> usize {
        self.header.len() + self.ciphertext.len() + self.iv.len() + 1 + self.key_id.len() + 1
    }

    /// Serialisiert den Frame ins Wire-Format
    pub fn to_bytes(&self) -> CryptoResult<Bytes> {
        if self.iv.len() > MAX_TRAILER_FIELD {
            return Err(CryptoError::EncryptionFailed(format!(
                "IV zu lang fuer den Trailer: {} Bytes",
                self.iv.len()
            )));
        }
        if self.key_id.len() > MAX_TRAILER_FIELD {
            return Err(CryptoError::EncryptionFailed(format!(
                "Key-ID zu lang fuer den Trailer: {} Bytes",
                self.key_id.len()
            )));
        }

        let mut out = BytesMut::with_capacity(self.encoded_len());
        out.put_slice(self.header);
        out.put_slice(self.ciphertext);
        out.put_slice(self.iv);
        out.put_u8(self.iv.len() as u8);
        out.put_slice(self.key_id.as_bytes());
        out.put_u8(self.key_id.len() as u8);
        Ok(out.freeze())
    }
}

fn zu_kurz(feld: &str, len: usize) -> CryptoError {
    CryptoError::UngueltigesFrame(format!("Trailer-Feld '{feld}' passt nicht in {len} Bytes"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
