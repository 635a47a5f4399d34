//! Fehlertypen fuer den WebRTC-Client

use mediaseal_core::{ConnectionRole, RoomId};
use mediaseal_worker::TransformError;
use thiserror::Error;

use crate::platform::IceConnectionState;

/// Fehler bei Verbindungs- und Client-Operationen
#[derive(Debug, Error)]
pub enum RtcError {
    /// `initialize` fuer ein bereits offenes `(room, role)`
    #[error("Verbindung {role} fuer {room} ist bereits initialisiert")]
    AlreadyInitialized { room: RoomId, role: ConnectionRole },

    #[error("Verbindung {role} fuer {room} wurde nicht initialisiert")]
    NotInitialized { room: RoomId, role: ConnectionRole },

    /// ICE hat `failed`/`closed` erreicht, bevor eine Verbindung stand
    #[error("ICE-Verbindung nie hergestellt (Zustand: {state})")]
    IceNeverConnected { state: IceConnectionState },

    #[error("Keine Session fuer {role} in {room} gesetzt")]
    NoSession { room: RoomId, role: ConnectionRole },

    /// Kein offener Data-Channel mit diesem Label
    #[error("Data-Channel '{label}' ist nicht offen")]
    DataChannelNotOpen { label: String },

    #[error("Transform-Fehler: {0}")]
    Transform(#[from] TransformError),

    #[error("Plattform-Fehler: {0}")]
    Platform(String),

    #[error("Signaling-Fehler: {0}")]
    Signaling(String),

    #[error("TURN-Zugangsdaten nicht verfuegbar: {0}")]
    Turn(String),

    #[error("Methode '{0}' ist nicht implementiert")]
    MethodNotImplemented(String),

    #[error("Ungueltige Parameter: {0}")]
    InvalidParams(String),
}

pub type RtcResult<T> = Result<T, RtcError>;
