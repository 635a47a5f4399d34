//! In-Memory-Plattform fuer Integrationstests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mediaseal_core::{MediaKind, RoomId, SessionId, TrackId};
use mediaseal_rtc::config::ClientConfig;
use mediaseal_rtc::platform::{
    CreatedPeerConnection, DataChannel, DataChannelState, EncodedTransformTarget, IceCandidate,
    IceConnectionState, MediaTrack, OfferOptions, PeerConnection, PeerConnectionConfig, PeerConnectionEvent,
    PeerConnectionFactory, RtpReceiver, RtpSender, ScriptTransform, SessionDescription,
    TrackEvent,
};
use mediaseal_rtc::{RtcError, RtcResult, SignalingEndpoint, TurnCredentials, TurnCredentialsProvider, WebRtcClient};
use mediaseal_worker::{EncodedStreams, StreamEnds};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------------
// Tracks, Sender, Empfaenger
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeTrack {
    pub id: TrackId,
    pub kind: MediaKind,
}

impl FakeTrack {
    pub fn audio(id: &str) -> Arc<dyn MediaTrack> {
        Arc::new(Self {
            id: TrackId::from(id),
            kind: MediaKind::Audio,
        })
    }

    pub fn video(id: &str) -> Arc<dyn MediaTrack> {
        Arc::new(Self {
            id: TrackId::from(id),
            kind: MediaKind::Video,
        })
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> TrackId {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }
}

/// Haelt die Plattform-Seite der kodierten Streams
#[derive(Default)]
pub struct FrameTap {
    ends: Mutex<Option<StreamEnds>>,
}

impl FrameTap {
    fn oeffnen(&self) -> EncodedStreams {
        let (streams, ends) = EncodedStreams::pair(16);
        *self.ends.lock() = Some(ends);
        streams
    }

    /// Entnimmt die Stream-Enden (einmalig)
    pub fn take(&self) -> StreamEnds {
        self.ends.lock().take().expect("keine Streams angelegt")
    }

    pub fn ist_verdrahtet(&self) -> bool {
        self.ends.lock().is_some()
    }

    fn create(&self) -> RtcResult<EncodedStreams> {
        Ok(self.oeffnen())
    }

    fn script(&self, transform: ScriptTransform) -> RtcResult<()> {
        // Die Plattform liefert die Streams sofort an den Transform
        transform.deliver(self.oeffnen())
    }
}

pub struct FakeSender {
    pub track: Arc<dyn MediaTrack>,
    pub tap: FrameTap,
}

impl EncodedTransformTarget for FakeSender {
    fn create_encoded_streams(&self) -> RtcResult<EncodedStreams> {
        self.tap.create()
    }

    fn set_script_transform(&self, transform: ScriptTransform) -> RtcResult<()> {
        self.tap.script(transform)
    }
}

impl RtpSender for FakeSender {
    fn track(&self) -> Option<Arc<dyn MediaTrack>> {
        Some(Arc::clone(&self.track))
    }
}

pub struct FakeReceiver {
    pub track: Arc<dyn MediaTrack>,
    pub tap: FrameTap,
}

impl EncodedTransformTarget for FakeReceiver {
    fn create_encoded_streams(&self) -> RtcResult<EncodedStreams> {
        self.tap.create()
    }

    fn set_script_transform(&self, transform: ScriptTransform) -> RtcResult<()> {
        self.tap.script(transform)
    }
}

impl RtpReceiver for FakeReceiver {
    fn track(&self) -> Arc<dyn MediaTrack> {
        Arc::clone(&self.track)
    }
}

// ---------------------------------------------------------------------------
// Data-Channels
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FakeDataChannel {
    pub label: String,
    pub state: Mutex<DataChannelState>,
    pub sent: Mutex<Vec<String>>,
}

impl FakeDataChannel {
    pub fn new(label: &str, state: DataChannelState) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            state: Mutex::new(state),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn oeffnen(&self) {
        *self.state.lock() = DataChannelState::Open;
    }
}

impl DataChannel for FakeDataChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn ready_state(&self) -> DataChannelState {
        *self.state.lock()
    }

    fn send(&self, message: &str) -> RtcResult<()> {
        self.sent.lock().push(message.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Peer-Connection
// ---------------------------------------------------------------------------

pub struct FakePeerConnection {
    pub room: RoomId,
    ice: watch::Sender<IceConnectionState>,
    events: mpsc::UnboundedSender<PeerConnectionEvent>,
    script_transform: bool,
    pub senders: Mutex<Vec<Arc<FakeSender>>>,
    pub local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub config: Mutex<PeerConnectionConfig>,
    pub offers: Mutex<Vec<OfferOptions>>,
    /// Reihenfolge der SDP-Operationen
    pub log: Mutex<Vec<String>>,
    pub closed: AtomicBool,
    /// Lokal angelegte Data-Channels
    pub channels: Mutex<Vec<Arc<FakeDataChannel>>>,
    /// Kuenstliche Verzoegerung in `set_remote_description`
    pub remote_delay: Duration,
}

impl FakePeerConnection {
    pub fn set_ice(&self, state: IceConnectionState) {
        self.ice.send_replace(state);
        let _ = self
            .events
            .send(PeerConnectionEvent::IceConnectionStateChange(state));
    }

    pub fn emit(&self, event: PeerConnectionEvent) {
        let _ = self.events.send(event);
    }

    /// Simuliert einen eingehenden Remote-Track
    pub fn remote_track(&self, track: Arc<dyn MediaTrack>) -> Arc<FakeReceiver> {
        let receiver = Arc::new(FakeReceiver {
            track: Arc::clone(&track),
            tap: FrameTap::default(),
        });
        self.emit(PeerConnectionEvent::Track(TrackEvent {
            track,
            receiver: Arc::clone(&receiver) as Arc<dyn RtpReceiver>,
            stream_ids: vec!["remote".into()],
        }));
        receiver
    }

    pub fn track_event(&self, track: Arc<dyn MediaTrack>) -> (TrackEvent, Arc<FakeReceiver>) {
        let receiver = Arc::new(FakeReceiver {
            track: Arc::clone(&track),
            tap: FrameTap::default(),
        });
        let event = TrackEvent {
            track,
            receiver: Arc::clone(&receiver) as Arc<dyn RtpReceiver>,
            stream_ids: vec!["remote".into()],
        };
        (event, receiver)
    }

    pub fn sender(&self, id: &str) -> Option<Arc<FakeSender>> {
        self.senders
            .lock()
            .iter()
            .find(|s| s.track.id() == TrackId::from(id))
            .cloned()
    }

    pub fn sender_ids(&self) -> Vec<String> {
        self.senders
            .lock()
            .iter()
            .map(|s| s.track.id().as_str().to_string())
            .collect()
    }

    /// Simuliert einen von der Gegenseite geoeffneten Data-Channel
    pub fn remote_data_channel(&self, label: &str) -> Arc<FakeDataChannel> {
        let channel = FakeDataChannel::new(label, DataChannelState::Open);
        self.emit(PeerConnectionEvent::DataChannel(
            Arc::clone(&channel) as Arc<dyn DataChannel>
        ));
        channel
    }

    pub fn channel(&self, label: &str) -> Option<Arc<FakeDataChannel>> {
        self.channels
            .lock()
            .iter()
            .find(|c| c.label == label)
            .cloned()
    }

    fn protokoll(&self, eintrag: String) {
        self.log.lock().push(eintrag);
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn create_offer(&self, options: OfferOptions) -> RtcResult<SessionDescription> {
        let n = {
            let mut offers = self.offers.lock();
            offers.push(options);
            offers.len()
        };
        self.protokoll(format!("offer:{n}"));
        Ok(SessionDescription::offer(format!("offer-{n}")))
    }

    async fn create_answer(&self) -> RtcResult<SessionDescription> {
        let remote = self
            .remote
            .lock()
            .clone()
            .ok_or_else(|| RtcError::Platform("keine Remote-Beschreibung".into()))?;
        self.protokoll(format!("answer:{}", remote.sdp));
        Ok(SessionDescription::answer(format!("answer-{}", remote.sdp)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> RtcResult<()> {
        self.protokoll(format!("local:{}", description.sdp));
        *self.local.lock() = Some(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> RtcResult<()> {
        self.protokoll(format!("remote:{}", description.sdp));
        if !self.remote_delay.is_zero() {
            tokio::time::sleep(self.remote_delay).await;
        }
        *self.remote.lock() = Some(description);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    async fn add_track(
        &self,
        track: Arc<dyn MediaTrack>,
        _stream_id: &str,
    ) -> RtcResult<Arc<dyn RtpSender>> {
        let sender = Arc::new(FakeSender {
            track,
            tap: FrameTap::default(),
        });
        self.senders.lock().push(Arc::clone(&sender));
        Ok(sender as Arc<dyn RtpSender>)
    }

    async fn remove_track(&self, sender: Arc<dyn RtpSender>) -> RtcResult<()> {
        let id = sender
            .track()
            .map(|t| t.id())
            .ok_or_else(|| RtcError::Platform("Sender ohne Track".into()))?;
        self.senders.lock().retain(|s| s.track.id() != id);
        Ok(())
    }

    fn senders(&self) -> Vec<Arc<dyn RtpSender>> {
        self.senders
            .lock()
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn RtpSender>)
            .collect()
    }

    async fn set_configuration(&self, config: PeerConnectionConfig) -> RtcResult<()> {
        *self.config.lock() = config;
        Ok(())
    }

    fn create_data_channel(&self, label: &str) -> RtcResult<Arc<dyn DataChannel>> {
        self.protokoll(format!("channel:{label}"));
        let channel = FakeDataChannel::new(label, DataChannelState::Connecting);
        self.channels.lock().push(Arc::clone(&channel));
        Ok(channel as Arc<dyn DataChannel>)
    }

    fn ice_connection_state(&self) -> watch::Receiver<IceConnectionState> {
        self.ice.subscribe()
    }

    fn supports_script_transform(&self) -> bool {
        self.script_transform
    }

    async fn close(&self) -> RtcResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.ice.send_replace(IceConnectionState::Closed);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeFactory {
    pub script_transform: bool,
    pub remote_delay: Duration,
    pub created: Mutex<Vec<Arc<FakePeerConnection>>>,
}

impl FakeFactory {
    pub fn with_script_transform() -> Self {
        Self {
            script_transform: true,
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.created.lock().len()
    }

    pub fn connection(&self, index: usize) -> Arc<FakePeerConnection> {
        Arc::clone(&self.created.lock()[index])
    }

    pub fn last(&self) -> Arc<FakePeerConnection> {
        Arc::clone(self.created.lock().last().expect("keine Verbindung erzeugt"))
    }
}

impl PeerConnectionFactory for FakeFactory {
    fn create(
        &self,
        room: &RoomId,
        config: &PeerConnectionConfig,
    ) -> RtcResult<CreatedPeerConnection> {
        let (events, rx) = mpsc::unbounded_channel();
        let (ice, _) = watch::channel(IceConnectionState::New);
        let pc = Arc::new(FakePeerConnection {
            room: room.clone(),
            ice,
            events,
            script_transform: self.script_transform,
            senders: Mutex::new(Vec::new()),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            config: Mutex::new(config.clone()),
            offers: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            channels: Mutex::new(Vec::new()),
            remote_delay: self.remote_delay,
        });
        self.created.lock().push(Arc::clone(&pc));
        Ok(CreatedPeerConnection {
            connection: pc,
            events: rx,
        })
    }
}

// ---------------------------------------------------------------------------
// Signaling und TURN
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSignaling {
    pub trickled: Mutex<Vec<(SessionId, IceCandidate)>>,
    pub accepted: Mutex<Vec<(SessionId, SessionDescription)>>,
}

#[async_trait]
impl SignalingEndpoint for RecordingSignaling {
    fn trickle(&self, session: SessionId, candidate: IceCandidate) -> RtcResult<()> {
        self.trickled.lock().push((session, candidate));
        Ok(())
    }

    async fn accept_offer(&self, session: SessionId, answer: SessionDescription) -> RtcResult<()> {
        self.accepted.lock().push((session, answer));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTurn {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Kuenstliche Antwortzeit des Providers
    pub delay: Duration,
}

impl FakeTurn {
    pub fn langsam(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

pub fn turn_credentials(user: &str) -> TurnCredentials {
    TurnCredentials {
        url: "turn:turn.example.org:3478".into(),
        username: user.into(),
        password: "geheim".into(),
        expiration_time: Utc::now() + chrono::Duration::hours(1),
    }
}

#[async_trait]
impl TurnCredentialsProvider for FakeTurn {
    async fn get_turn_credentials(&self) -> RtcResult<Vec<TurnCredentials>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(RtcError::Turn("Provider nicht erreichbar".into()));
        }
        Ok(vec![turn_credentials(&format!("user-{n}"))])
    }
}

// ---------------------------------------------------------------------------
// Aufbau
// ---------------------------------------------------------------------------

pub struct Umgebung {
    pub client: WebRtcClient,
    pub factory: Arc<FakeFactory>,
    pub signaling: Arc<RecordingSignaling>,
    pub turn: Arc<FakeTurn>,
}

pub fn umgebung_mit(factory: FakeFactory) -> Umgebung {
    umgebung_mit_turn(factory, FakeTurn::default())
}

pub fn umgebung_mit_turn(factory: FakeFactory, turn: FakeTurn) -> Umgebung {
    let factory = Arc::new(factory);
    let signaling = Arc::new(RecordingSignaling::default());
    let turn = Arc::new(turn);
    let client = WebRtcClient::new(
        ClientConfig::default(),
        Arc::clone(&factory) as Arc<dyn PeerConnectionFactory>,
        Arc::clone(&signaling) as Arc<dyn SignalingEndpoint>,
        Arc::clone(&turn) as Arc<dyn TurnCredentialsProvider>,
    )
    .expect("Client konnte nicht erstellt werden");
    Umgebung {
        client,
        factory,
        signaling,
        turn,
    }
}

pub fn umgebung() -> Umgebung {
    umgebung_mit(FakeFactory::default())
}

/// Wartet, bis die Bedingung erfuellt ist (max. 2 Sekunden)
pub async fn warte_bis(bedingung: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if bedingung() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bedingung()
}
