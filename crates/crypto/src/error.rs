//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Kein Schluessel mit Typ `Encryption` im aktuellen Satz
    #[error("Kein Verschluesselungs-Schluessel gesetzt")]
    NoEncryptionKey,

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    EncryptionFailed(String),

    #[error("Entschluesselung fehlgeschlagen: {0}")]
    DecryptionFailed(String),

    #[error("Ungueltiges Frame-Format: {0}")]
    UngueltigesFrame(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
