//! Plattform-Abstraktion fuer Peer-Connections
//!
//! Der Client spricht die eigentliche WebRTC-Implementierung nur ueber diese
//! Traits an. Events einer Verbindung kommen ueber einen eigenen Kanal, der
//! bei der Erzeugung zurueckgegeben wird.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mediaseal_core::{MediaKind, RoomId, TrackId};
use mediaseal_worker::{EncodedStreams, Operation, WorkerHandle};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::RtcResult;

// ---------------------------------------------------------------------------
// Datentypen
// ---------------------------------------------------------------------------

/// ICE-Verbindungszustand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl IceConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Completed)
    }

    /// Zustaende, aus denen keine Verbindung mehr entsteht
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// SDP samt Typ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Lokal entdeckter ICE-Kandidat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    #[default]
    All,
    Relay,
}

/// Transport-Konfiguration einer Peer-Connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerConnectionConfig {
    pub ice_servers: Vec<IceServer>,
    pub ice_transport_policy: IceTransportPolicy,
    /// Kodierte Frames ueber Insertable Streams zugaenglich machen
    pub encoded_insertable_streams: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OfferOptions {
    pub ice_restart: bool,
}

// ---------------------------------------------------------------------------
// Tracks, Sender, Empfaenger
// ---------------------------------------------------------------------------

pub trait MediaTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> TrackId;
    fn kind(&self) -> MediaKind;
}

/// Lokaler Stream mit einem oder mehreren Tracks
#[derive(Debug, Clone)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<Arc<dyn MediaTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }
}

/// Stelle, an der kodierte Frames abgegriffen werden koennen
pub trait EncodedTransformTarget: Send + Sync {
    /// Liefert das Readable/Writable-Paar fuer einen expliziten Transfer
    fn create_encoded_streams(&self) -> RtcResult<EncodedStreams>;

    /// Haengt einen deklarativen Script-Transform an
    fn set_script_transform(&self, transform: ScriptTransform) -> RtcResult<()>;
}

pub trait RtpSender: EncodedTransformTarget {
    fn track(&self) -> Option<Arc<dyn MediaTrack>>;
}

pub trait RtpReceiver: EncodedTransformTarget {
    fn track(&self) -> Arc<dyn MediaTrack>;
}

/// Eingehender Remote-Track
#[derive(Clone)]
pub struct TrackEvent {
    pub track: Arc<dyn MediaTrack>,
    pub receiver: Arc<dyn RtpReceiver>,
    pub stream_ids: Vec<String>,
}

impl fmt::Debug for TrackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackEvent")
            .field("track", &self.track)
            .field("stream_ids", &self.stream_ids)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Data-Channels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Ein Data-Channel einer Peer-Connection
pub trait DataChannel: Send + Sync + fmt::Debug {
    fn label(&self) -> String;
    fn ready_state(&self) -> DataChannelState;
    fn send(&self, message: &str) -> RtcResult<()>;
}

/// Events einer Peer-Connection
#[derive(Debug, Clone)]
pub enum PeerConnectionEvent {
    IceCandidate(IceCandidate),
    IceConnectionStateChange(IceConnectionState),
    NegotiationNeeded,
    Track(TrackEvent),
    /// Die Gegenseite hat einen Data-Channel geoeffnet
    DataChannel(Arc<dyn DataChannel>),
}

// ---------------------------------------------------------------------------
// Script-Transform
// ---------------------------------------------------------------------------

/// Deklarativer Transform, den die Plattform selbst mit Streams versorgt
///
/// Sobald die Plattform das Stream-Paar bereit hat, ruft sie [`deliver`]
/// auf. Die Aktivierung im Worker wird dann ohne Bestaetigung angestossen.
///
/// [`deliver`]: ScriptTransform::deliver
#[derive(Debug, Clone)]
pub struct ScriptTransform {
    worker: WorkerHandle,
    pub track_id: TrackId,
    pub operation: Operation,
    pub kind: MediaKind,
}

impl ScriptTransform {
    pub fn new(worker: WorkerHandle, track_id: TrackId, operation: Operation, kind: MediaKind) -> Self {
        Self {
            worker,
            track_id,
            operation,
            kind,
        }
    }

    pub fn deliver(&self, streams: EncodedStreams) -> RtcResult<()> {
        self.worker
            .activate_detached(self.track_id.clone(), self.operation, self.kind, streams)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Peer-Connection
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self, options: OfferOptions) -> RtcResult<SessionDescription>;
    async fn create_answer(&self) -> RtcResult<SessionDescription>;
    async fn set_local_description(&self, description: SessionDescription) -> RtcResult<()>;
    async fn set_remote_description(&self, description: SessionDescription) -> RtcResult<()>;
    fn local_description(&self) -> Option<SessionDescription>;

    async fn add_track(
        &self,
        track: Arc<dyn MediaTrack>,
        stream_id: &str,
    ) -> RtcResult<Arc<dyn RtpSender>>;
    async fn remove_track(&self, sender: Arc<dyn RtpSender>) -> RtcResult<()>;
    fn senders(&self) -> Vec<Arc<dyn RtpSender>>;

    async fn set_configuration(&self, config: PeerConnectionConfig) -> RtcResult<()>;

    fn create_data_channel(&self, label: &str) -> RtcResult<Arc<dyn DataChannel>>;

    /// Beobachtet den ICE-Zustand (aktueller Wert plus Aenderungen)
    fn ice_connection_state(&self) -> watch::Receiver<IceConnectionState>;

    /// Ob Sender/Empfaenger deklarative Script-Transforms unterstuetzen
    fn supports_script_transform(&self) -> bool;

    async fn close(&self) -> RtcResult<()>;
}

/// Neu erzeugte Peer-Connection samt Event-Kanal
pub struct CreatedPeerConnection {
    pub connection: Arc<dyn PeerConnection>,
    pub events: mpsc::UnboundedReceiver<PeerConnectionEvent>,
}

/// Erzeugt Peer-Connections (synchron, kein Suspend)
pub trait PeerConnectionFactory: Send + Sync {
    fn create(&self, room: &RoomId, config: &PeerConnectionConfig)
        -> RtcResult<CreatedPeerConnection>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
