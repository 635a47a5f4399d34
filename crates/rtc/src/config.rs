//! Client-Konfiguration
//!
//! Wird aus einer TOML-Datei geladen. Alle Felder haben Standardwerte,
//! sodass der Client ohne Konfigurationsdatei lauffaehig ist.

use std::time::Duration;

use mediaseal_observability::LogFormat;
use mediaseal_worker::WorkerConfig;
use serde::{Deserialize, Serialize};

use crate::platform::{IceServer, IceTransportPolicy, PeerConnectionConfig};
use crate::signaling::TurnCredentials;

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub webrtc: WebRtcEinstellungen,
    /// E2EE-Worker
    pub worker: WorkerEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Transport-Einstellungen der Peer-Connections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcEinstellungen {
    pub ice_transport_policy: IceTransportPolicy,
    pub encoded_insertable_streams: bool,
    /// TURN-URLs ohne Zugangsdaten, solange keine Credentials bekannt sind
    pub turn_server_fallback: Vec<String>,
}

impl Default for WebRtcEinstellungen {
    fn default() -> Self {
        Self {
            ice_transport_policy: IceTransportPolicy::All,
            encoded_insertable_streams: true,
            turn_server_fallback: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerEinstellungen {
    pub thread_name: String,
    /// Timeout fuer Bestaetigungen des Workers in Millisekunden
    pub ack_timeout_ms: u64,
    /// Puffergroesse des Event-Kanals
    pub event_capacity: usize,
}

impl Default for WorkerEinstellungen {
    fn default() -> Self {
        Self {
            thread_name: "e2ee-worker".into(),
            ack_timeout_ms: 5000,
            event_capacity: 256,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    ///
    /// Fehlt die Datei, werden Standardwerte verwendet.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                if !mediaseal_observability::log_level_gueltig(&config.logging.level) {
                    anyhow::bail!(
                        "Ungueltiges Log-Level '{}' in '{pfad}'",
                        config.logging.level
                    );
                }
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Initialisiert das Logging mit Level und Format dieser Konfiguration
    pub fn logging_initialisieren(&self) -> anyhow::Result<()> {
        mediaseal_observability::logging_initialisieren(&self.logging.level, self.logging.format)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            thread_name: self.worker.thread_name.clone(),
            ack_timeout: Duration::from_millis(self.worker.ack_timeout_ms),
            event_capacity: self.worker.event_capacity,
        }
    }
}

impl WebRtcEinstellungen {
    /// Baut die Transport-Konfiguration aus TURN-Zugangsdaten
    ///
    /// Ohne Zugangsdaten werden die Fallback-URLs ohne Credentials genutzt.
    pub fn generate_turn_configuration(&self, credentials: &[TurnCredentials]) -> PeerConnectionConfig {
        let ice_servers = if credentials.is_empty() {
            self.turn_server_fallback
                .iter()
                .map(|url| IceServer {
                    urls: vec![url.clone()],
                    username: None,
                    credential: None,
                })
                .collect()
        } else {
            credentials
                .iter()
                .map(|c| IceServer {
                    urls: vec![c.url.clone()],
                    username: Some(c.username.clone()),
                    credential: Some(c.password.clone()),
                })
                .collect()
        };

        PeerConnectionConfig {
            ice_servers,
            ice_transport_policy: self.ice_transport_policy,
            encoded_insertable_streams: self.encoded_insertable_streams,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
