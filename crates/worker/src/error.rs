//! Fehlertypen fuer den E2EE-Worker

use mediaseal_core::TrackId;
use std::time::Duration;
use thiserror::Error;

/// Fehler bei Pipeline-Uebergaengen und Worker-Kommunikation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("Pipeline {0} ist bereits registriert")]
    AlreadyRegistered(TrackId),

    /// Aktivierung ohne vorherige Registrierung
    #[error("Pipeline {0} ist nicht registriert")]
    NotRegistered(TrackId),

    #[error("Pipeline {0} ist bereits aktiv")]
    AlreadyActive(TrackId),

    #[error("E2EE-Worker nicht erreichbar")]
    WorkerUnavailable,

    #[error("Keine Bestaetigung vom E2EE-Worker innerhalb von {0:?}")]
    AckTimeout(Duration),

    #[error("E2EE-Worker konnte nicht gestartet werden: {0}")]
    WorkerStart(String),
}

pub type TransformResult<T> = Result<T, TransformError>;
