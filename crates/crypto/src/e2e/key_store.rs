//! Schluessel-Verwaltung (Key Store)
//!
//! Haelt den aktuellen Schluesselsatz als unveraenderlichen Snapshot.
//! `set_keys` baut einen neuen Snapshot und tauscht ihn mit einem einzigen
//! Pointer-Update aus; laufende Encode/Decode-Closures lesen entweder den
//! alten oder den neuen Satz, nie einen halb ersetzten.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CryptoError, CryptoResult};
use crate::types::Key;

/// Unveraenderlicher Schluesselsatz
#[derive(Debug, Default)]
pub struct KeySnapshot {
    keys: HashMap<String, Arc<Key>>,
    encryption_key_id: Option<String>,
}

impl KeySnapshot {
    /// Baut den Satz; bei doppelter Key-ID gilt der spaetere Eintrag
    ///
    /// Der aktive Encryption-Schluessel wird erst nach dem Aufbau der Map
    /// bestimmt, damit er nie auf einen ueberschriebenen Eintrag zeigt.
    fn build(keys: Vec<Key>) -> Self {
        let mut snapshot = Self::default();
        let mut encryption_ids = Vec::new();
        for key in keys {
            if key.is_encryption_key() {
                encryption_ids.push(key.key_id.clone());
            }
            if let Some(vorher) = snapshot.keys.insert(key.key_id.clone(), Arc::new(key)) {
                tracing::warn!(key_id = %vorher.key_id, "Doppelte Key-ID im Satz, der spaetere Eintrag gilt");
            }
        }

        let mut gueltig = encryption_ids
            .into_iter()
            .rev()
            .filter(|id| snapshot.keys.get(id).is_some_and(|k| k.is_encryption_key()));
        snapshot.encryption_key_id = gueltig.next();
        if let Some(aktiv) = &snapshot.encryption_key_id {
            for verworfen in gueltig.filter(|id| id != aktiv) {
                tracing::warn!(
                    verworfen = %verworfen,
                    aktiv = %aktiv,
                    "Mehrere Encryption-Schluessel im Satz, der letzte gewinnt"
                );
            }
        }
        snapshot
    }

    /// Gibt den aktiven Verschluesselungs-Schluessel zurueck
    pub fn encryption_key(&self) -> CryptoResult<Arc<Key>> {
        self.encryption_key_id
            .as_ref()
            .and_then(|id| self.keys.get(id))
            .cloned()
            .ok_or(CryptoError::NoEncryptionKey)
    }

    pub fn get(&self, key_id: &str) -> Option<Arc<Key>> {
        self.keys.get(key_id).cloned()
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Rotierender Schluessel-Speicher einer Client-Instanz
#[derive(Debug, Default)]
pub struct KeyStore {
    current: RwLock<Arc<KeySnapshot>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ersetzt den gesamten Schluesselsatz (kein Merge)
    ///
    /// Ein vorher aktiver Encryption-Schluessel gilt nur weiter, wenn der neue
    /// Satz wieder einen Schluessel als `Encryption` markiert.
    pub fn set_keys(&self, keys: Vec<Key>) {
        let snapshot = Arc::new(KeySnapshot::build(keys));
        tracing::debug!(
            anzahl = snapshot.len(),
            encryption_key = ?snapshot.encryption_key_id,
            "Schluesselsatz ersetzt"
        );
        *self.current.write() = snapshot;
    }

    /// Aktueller Snapshot fuer eine zusammenhaengende Leseoperation
    pub fn snapshot(&self) -> Arc<KeySnapshot> {
        self.current.read().clone()
    }

    /// Gibt den aktiven Verschluesselungs-Schluessel zurueck
    pub fn get_encryption_key(&self) -> CryptoResult<Arc<Key>> {
        self.snapshot().encryption_key()
    }

    pub fn get_key(&self, key_id: &str) -> Option<Arc<Key>> {
        self.snapshot().get(key_id)
    }

    pub fn has_key(&self, key_id: &str) -> bool {
        self.snapshot().contains(key_id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
