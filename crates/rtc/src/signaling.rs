//! Kollaborateure auf Signaling-Seite
//!
//! Der Client ruft nur in diese Richtung; das Signaling ruft nie in den
//! Client zurueck.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaseal_core::SessionId;
use serde::{Deserialize, Serialize};

use crate::error::RtcResult;
use crate::platform::{IceCandidate, SessionDescription};

#[async_trait]
pub trait SignalingEndpoint: Send + Sync {
    /// Liefert einen lokalen ICE-Kandidaten aus (fire-and-forget)
    fn trickle(&self, session: SessionId, candidate: IceCandidate) -> RtcResult<()>;

    /// Uebergibt eine neu ausgehandelte Beschreibung an das Signaling
    async fn accept_offer(&self, session: SessionId, answer: SessionDescription) -> RtcResult<()>;
}

/// Zeitlich begrenzte Relay-Zugangsdaten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
    pub expiration_time: DateTime<Utc>,
}

impl TurnCredentials {
    pub fn ist_abgelaufen(&self, jetzt: DateTime<Utc>) -> bool {
        self.expiration_time <= jetzt
    }
}

#[async_trait]
pub trait TurnCredentialsProvider: Send + Sync {
    async fn get_turn_credentials(&self) -> RtcResult<Vec<TurnCredentials>>;
}
