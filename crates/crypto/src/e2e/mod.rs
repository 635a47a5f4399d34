//! E2E Frame-Verschluesselung
//!
//! Der SFU leitet die Frames weiter, sieht aber nur Header und Ciphertext.
//!
//! ## Ablauf
//! 1. Die Anwendung setzt per `KeyStore::set_keys` einen kompletten Schluesselsatz
//! 2. Der Sender verschluesselt jeden Frame mit dem aktiven `Encryption`-Schluessel
//! 3. Die Key-ID reist im Trailer mit, der Empfaenger sucht den Schluessel danach
//! 4. Bei Rotation wird der Satz atomar ersetzt, alte IDs bleiben entschluesselbar
//!    solange sie im neuen Satz enthalten sind

pub mod decrypt;
pub mod encrypt;
pub mod key_store;
pub mod wire;

pub use decrypt::{decode_frame, decrypt_frame, DecodeOutcome, PassThroughReason};
pub use encrypt::{encode_frame, encrypt_frame};
pub use key_store::{KeySnapshot, KeyStore};
pub use wire::WireFrame;
