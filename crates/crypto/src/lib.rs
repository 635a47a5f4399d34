//! # mediaseal-crypto
//!
//! Ende-zu-Ende Verschluesselung einzelner kodierter Media-Frames.
//!
//! ## Module
//! - `e2e` - Frame-Codec (Wire-Format, Verschluesselung, Entschluesselung)
//!   und der rotierende `KeyStore`
//! - `types` - Schluessel-Typen (`Key`, `KeyType`, `SecretBytes`)
//! - `error` - Fehlertypen

pub mod e2e;
pub mod error;
pub mod types;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use types::{Key, KeyType, SecretBytes};

pub use e2e::{
    decode_frame, decrypt_frame, encode_frame, encrypt_frame, DecodeOutcome, KeySnapshot,
    KeyStore, PassThroughReason, WireFrame,
};
