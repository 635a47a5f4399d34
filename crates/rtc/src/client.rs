//! WebRTC-Client mit Ende-zu-Ende-Verschluesselung
//!
//! Verdrahtet Sender und Empfaenger der Peer-Connections mit den
//! Pipelines des E2EE-Workers und reicht Schluessel an ihn weiter.
//!
//! ## Ablauf Remote-Track
//! 1. Track-Event der Verbindung
//! 2. Warten auf ICE `connected`/`completed`
//! 3. Decode-Pipeline registrieren und aktivieren
//! 4. Remote-Track-Listener benachrichtigen
//!
//! Pipelines, die der Worker selbst beendet (Quelle oder Senke geschlossen),
//! werden ueber seine Events auch aus den Verbindungen ausgetragen.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use chrono::Utc;
use dashmap::DashMap;
use mediaseal_core::{ConnectionRole, MediaKind, RoomId, SessionId, TrackId};
use mediaseal_crypto::{Key, KeyStore};
use mediaseal_worker::{E2eeWorker, Operation, StopReason, WorkerEvent, WorkerHandle};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::connection_manager::{PeerConnectionManager, RoomConnection, RoomEvent, TrickleFn};
use crate::error::{RtcError, RtcResult};
use crate::ice::wait_for_connected;
use crate::platform::{
    DataChannel, DataChannelState, EncodedTransformTarget, MediaStream, MediaTrack, OfferOptions,
    PeerConnectionConfig, PeerConnectionEvent, PeerConnectionFactory, ScriptTransform,
    SessionDescription, TrackEvent,
};
use crate::signaling::{SignalingEndpoint, TurnCredentials, TurnCredentialsProvider};

/// Label-Praefix der Data-Channels, die fuer Daten-Streams eines Subscriber-Offers
/// angelegt werden
pub const SUBSCRIBER_DATA_CHANNEL_PREFIX: &str = "JanusDataChannel/";

/// Callback fuer bestaetigte Remote-Tracks
pub type RemoteTrackListener = Arc<dyn Fn(&RoomId, &TrackEvent) + Send + Sync>;

#[derive(Clone)]
pub struct WebRtcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    uniq_id: Uuid,
    config: ClientConfig,
    signaling: Arc<dyn SignalingEndpoint>,
    turn: Arc<dyn TurnCredentialsProvider>,
    manager: PeerConnectionManager,
    worker: WorkerHandle,
    keys: Arc<KeyStore>,
    peer_config: Arc<RwLock<PeerConnectionConfig>>,
    turn_credentials: RwLock<Vec<TurnCredentials>>,
    listeners: RwLock<Vec<RemoteTrackListener>>,
    /// Serialisiert Rekonfigurationen pro Raum
    reconfigure_locks: DashMap<RoomId, Arc<tokio::sync::Mutex<()>>>,
    data_channels: DashMap<RoomId, Vec<Arc<dyn DataChannel>>>,
}

impl WebRtcClient {
    /// Erstellt den Client und startet den E2EE-Worker
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden.
    pub fn new(
        config: ClientConfig,
        factory: Arc<dyn PeerConnectionFactory>,
        signaling: Arc<dyn SignalingEndpoint>,
        turn: Arc<dyn TurnCredentialsProvider>,
    ) -> RtcResult<Self> {
        let uniq_id = Uuid::new_v4();
        let keys = Arc::new(KeyStore::new());
        let worker = E2eeWorker::spawn(config.worker_config(), Arc::clone(&keys))?;

        let peer_config = Arc::new(RwLock::new(
            config.webrtc.generate_turn_configuration(&[]),
        ));

        let trickle_signaling = Arc::clone(&signaling);
        let on_trickle: TrickleFn =
            Arc::new(move |session, candidate| trickle_signaling.trickle(session, candidate));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager =
            PeerConnectionManager::new(factory, Arc::clone(&peer_config), on_trickle, events_tx);

        let inner = Arc::new(ClientInner {
            uniq_id,
            config,
            signaling,
            turn,
            manager,
            worker: worker.clone(),
            keys,
            peer_config,
            turn_credentials: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            reconfigure_locks: DashMap::new(),
            data_channels: DashMap::new(),
        });

        spawn_event_loop(Arc::downgrade(&inner), events_rx);
        spawn_worker_log(worker.subscribe(), Arc::downgrade(&inner), uniq_id);

        tracing::info!(client = %uniq_id, "WebRTC-Client erstellt");
        Ok(Self { inner })
    }

    pub fn uniq_id(&self) -> Uuid {
        self.inner.uniq_id
    }

    pub fn connection_manager(&self) -> &PeerConnectionManager {
        &self.inner.manager
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.inner.worker
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.inner.keys
    }

    pub fn add_remote_track_listener<F>(&self, listener: F)
    where
        F: Fn(&RoomId, &TrackEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.write().push(Arc::new(listener));
    }

    // -----------------------------------------------------------------------
    // Publish
    // -----------------------------------------------------------------------

    /// Publiziert alle Tracks eines lokalen Streams ueber die Publisher-Verbindung
    pub async fn create_connection_with_local_stream(
        &self,
        room: &RoomId,
        stream: &MediaStream,
    ) -> RtcResult<Arc<RoomConnection>> {
        let conn = self.open_connection(room, ConnectionRole::Publisher).await?;

        for track in &stream.tracks {
            self.publish_track(&conn, track, &stream.id).await?;
        }
        tracing::info!(
            room = %room,
            stream = %stream.id,
            tracks = stream.tracks.len(),
            "Lokaler Stream publiziert"
        );
        Ok(conn)
    }

    /// Fuegt neue Tracks hinzu und entfernt veraltete, ohne die Verbindung neu
    /// aufzubauen
    pub async fn update_connection_with_local_stream(
        &self,
        room: &RoomId,
        stream: &MediaStream,
        tracks_to_remove: &[TrackId],
    ) -> RtcResult<()> {
        let conn = self
            .inner
            .manager
            .get_connection_with_session(room, ConnectionRole::Publisher)?;
        let pc = conn.peer_connection();
        let senders = pc.senders();

        let vorhandene: HashSet<TrackId> = senders
            .iter()
            .filter_map(|sender| sender.track())
            .map(|track| track.id())
            .collect();

        for track in &stream.tracks {
            if !vorhandene.contains(&track.id()) {
                self.publish_track(&conn, track, &stream.id).await?;
            }
        }

        for id in tracks_to_remove {
            let sender = senders
                .iter()
                .find(|sender| sender.track().is_some_and(|track| track.id() == *id));
            if let Some(sender) = sender {
                pc.remove_track(Arc::clone(sender)).await?;
            }
            if conn.remove_pipeline(id) {
                self.inner.worker.stop(id.clone()).await?;
            }
            tracing::debug!(room = %room, track = %id, "Track entfernt");
        }
        Ok(())
    }

    async fn publish_track(
        &self,
        conn: &RoomConnection,
        track: &Arc<dyn MediaTrack>,
        stream_id: &str,
    ) -> RtcResult<()> {
        let sender = conn
            .peer_connection()
            .add_track(Arc::clone(track), stream_id)
            .await?;
        self.wire_transform(conn, track.id(), Operation::Encode, track.kind(), sender.as_ref())
            .await
    }

    // -----------------------------------------------------------------------
    // Remote-Tracks
    // -----------------------------------------------------------------------

    /// Verdrahtet einen Remote-Track, sobald ICE verbunden ist
    ///
    /// Erreicht die Verbindung vorher `failed`/`closed`, endet der Aufruf mit
    /// `IceNeverConnected` und kein Listener wird benachrichtigt.
    pub async fn handle_remote_track(
        &self,
        conn: &RoomConnection,
        event: TrackEvent,
    ) -> RtcResult<()> {
        let track_id = event.track.id();
        if let Err(e) = wait_for_connected(conn.peer_connection().ice_connection_state()).await {
            tracing::warn!(
                room = %conn.room(),
                track = %track_id,
                fehler = %e,
                "Remote-Track verworfen"
            );
            return Err(e);
        }

        self.wire_transform(
            conn,
            track_id.clone(),
            Operation::Decode,
            event.track.kind(),
            event.receiver.as_ref(),
        )
        .await?;

        let listeners = self.inner.listeners.read().clone();
        for listener in listeners {
            listener(conn.room(), &event);
        }
        tracing::info!(room = %conn.room(), track = %track_id, "Remote-Track bereit");
        Ok(())
    }

    /// Registriert die Pipeline und uebergibt die Streams an den Worker
    ///
    /// Die Registrierung wird bestaetigt, bevor die Streams uebergeben werden.
    async fn wire_transform<T>(
        &self,
        conn: &RoomConnection,
        id: TrackId,
        operation: Operation,
        kind: MediaKind,
        target: &T,
    ) -> RtcResult<()>
    where
        T: EncodedTransformTarget + ?Sized,
    {
        let worker = &self.inner.worker;
        worker.register(id.clone()).await?;

        let result = if conn.peer_connection().supports_script_transform() {
            target.set_script_transform(ScriptTransform::new(
                worker.clone(),
                id.clone(),
                operation,
                kind,
            ))
        } else {
            match target.create_encoded_streams() {
                Ok(streams) => worker
                    .activate(id.clone(), operation, kind, streams)
                    .await
                    .map_err(RtcError::from),
                Err(e) => Err(e),
            }
        };

        if let Err(e) = result {
            tracing::warn!(track = %id, %operation, fehler = %e, "Transform nicht verdrahtet");
            if let Err(stop) = worker.stop(id).await {
                tracing::warn!(fehler = %stop, "Pipeline konnte nicht entfernt werden");
            }
            return Err(e);
        }

        conn.add_pipeline(id.clone());
        tracing::debug!(room = %conn.room(), track = %id, %operation, %kind, "Transform verdrahtet");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Aushandlung
    // -----------------------------------------------------------------------

    /// Erzeugt ein lokales Offer und setzt es als lokale Beschreibung
    ///
    /// Das Offer wird nicht automatisch ans Signaling geschickt.
    pub async fn renegotiate(
        &self,
        conn: &RoomConnection,
        ice_restart: bool,
    ) -> RtcResult<SessionDescription> {
        let pc = conn.peer_connection();
        let offer = pc.create_offer(OfferOptions { ice_restart }).await?;
        pc.set_local_description(offer.clone()).await?;
        tracing::debug!(room = %conn.room(), role = %conn.role(), ice_restart, "Offer gesetzt");
        Ok(offer)
    }

    pub async fn create_offer_and_set_local_description(&self, room: &RoomId) -> RtcResult<String> {
        let conn = self
            .inner
            .manager
            .get_connection_with_session(room, ConnectionRole::Publisher)?;
        Ok(self.renegotiate(&conn, false).await?.sdp)
    }

    /// Setzt die Antwort des SFU auf der Publisher-Verbindung
    pub async fn set_answer_and_set_remote_description(
        &self,
        room: &RoomId,
        answer: SessionDescription,
    ) -> RtcResult<()> {
        let conn = self
            .inner
            .manager
            .get_connection_with_session(room, ConnectionRole::Publisher)?;
        conn.peer_connection().set_remote_description(answer).await
    }

    /// Wendet ein eingehendes Offer auf die Subscriber-Verbindung an
    ///
    /// Rekonfigurationen desselben Raums laufen nacheinander. Fehlt der
    /// Subscriber-Slot, wird er angelegt.
    pub async fn on_subscription_updated(
        &self,
        room: &RoomId,
        offer: SessionDescription,
    ) -> RtcResult<SessionDescription> {
        let lock = self.reconfigure_lock(room);
        let _guard = lock.lock().await;

        let conn = self.open_connection(room, ConnectionRole::Subscriber).await?;
        let pc = conn.peer_connection();

        let mids = data_mids(&offer.sdp);
        pc.set_remote_description(offer).await?;
        for mid in mids {
            let label = format!("{SUBSCRIBER_DATA_CHANNEL_PREFIX}{mid}");
            if self.find_data_channel(room, &label).is_none() {
                let channel = pc.create_data_channel(&label)?;
                self.register_data_channel(room, channel);
            }
        }
        let answer = pc.create_answer().await?;
        pc.set_local_description(answer.clone()).await?;

        tracing::debug!(room = %room, "Subscriber-Verbindung rekonfiguriert");
        Ok(answer)
    }

    /// Wie [`on_subscription_updated`], uebergibt die Antwort ans Signaling
    ///
    /// Ohne gesetzte Session bleibt die Verbindung unangetastet.
    ///
    /// [`on_subscription_updated`]: WebRtcClient::on_subscription_updated
    pub async fn accept_subscription_offer(
        &self,
        room: &RoomId,
        offer: SessionDescription,
    ) -> RtcResult<SessionDescription> {
        let session = self
            .inner
            .manager
            .session(room, ConnectionRole::Subscriber)
            .ok_or_else(|| RtcError::NoSession {
                room: room.clone(),
                role: ConnectionRole::Subscriber,
            })?;
        let answer = self.on_subscription_updated(room, offer).await?;
        self.inner
            .signaling
            .accept_offer(session, answer.clone())
            .await?;
        Ok(answer)
    }

    pub fn update_session_id(&self, room: &RoomId, role: ConnectionRole, session: SessionId) {
        self.inner.manager.update_session(room, role, session);
    }

    fn reconfigure_lock(&self, room: &RoomId) -> Arc<tokio::sync::Mutex<()>> {
        let entry = self.inner.reconfigure_locks.entry(room.clone()).or_default();
        Arc::clone(&entry)
    }

    /// Legt den Slot bei Bedarf an und materialisiert die Verbindung
    ///
    /// Die TURN-Zugangsdaten werden vor dem Anlegen geholt; ein Slot, den ein
    /// paralleler Aufruf oder `update_session_id` inzwischen angelegt hat,
    /// wird uebernommen.
    async fn open_connection(
        &self,
        room: &RoomId,
        role: ConnectionRole,
    ) -> RtcResult<Arc<RoomConnection>> {
        let manager = &self.inner.manager;
        if !manager.is_established(room, role) {
            self.ensure_turn_credentials().await;
        }
        manager.ensure_initialized(room, role);
        manager.get_connection_with_session(room, role)
    }

    // -----------------------------------------------------------------------
    // Data-Channels
    // -----------------------------------------------------------------------

    /// Oeffnet einen Data-Channel auf der Publisher-Verbindung des Raums
    pub fn create_data_channel(
        &self,
        room: &RoomId,
        label: &str,
    ) -> RtcResult<Arc<dyn DataChannel>> {
        let conn = self
            .inner
            .manager
            .get_connection_with_session(room, ConnectionRole::Publisher)?;
        let channel = conn.peer_connection().create_data_channel(label)?;
        self.register_data_channel(room, Arc::clone(&channel));
        Ok(channel)
    }

    /// Sendet ueber den offenen Data-Channel mit diesem Label
    pub fn send_to_channel(&self, room: &RoomId, label: &str, message: &str) -> RtcResult<()> {
        let channel = self
            .find_data_channel(room, label)
            .filter(|channel| channel.ready_state() == DataChannelState::Open)
            .ok_or_else(|| RtcError::DataChannelNotOpen {
                label: label.to_string(),
            })?;
        channel.send(message)
    }

    /// Labels der bekannten Data-Channels eines Raums
    pub fn data_channels(&self, room: &RoomId) -> Vec<String> {
        self.inner
            .data_channels
            .get(room)
            .map(|channels| channels.iter().map(|c| c.label()).collect())
            .unwrap_or_default()
    }

    fn register_data_channel(&self, room: &RoomId, channel: Arc<dyn DataChannel>) {
        tracing::debug!(room = %room, label = %channel.label(), "Data-Channel registriert");
        self.inner
            .data_channels
            .entry(room.clone())
            .or_default()
            .push(channel);
    }

    /// Bevorzugt einen offenen Channel, falls mehrere das Label tragen
    fn find_data_channel(&self, room: &RoomId, label: &str) -> Option<Arc<dyn DataChannel>> {
        let channels = self.inner.data_channels.get(room)?;
        let passend: Vec<&Arc<dyn DataChannel>> =
            channels.iter().filter(|c| c.label() == label).collect();
        passend
            .iter()
            .find(|c| c.ready_state() == DataChannelState::Open)
            .or(passend.first())
            .map(|c| Arc::clone(c))
    }

    // -----------------------------------------------------------------------
    // Schluessel und TURN
    // -----------------------------------------------------------------------

    /// Ersetzt den Schluesselsatz; unabhaengig vom Verbindungszustand
    pub async fn update_keys(&self, keys: Vec<Key>) -> RtcResult<()> {
        let anzahl = keys.len();
        self.inner.worker.set_keys(keys).await?;
        tracing::info!(client = %self.inner.uniq_id, anzahl, "Schluessel aktualisiert");
        Ok(())
    }

    /// Baut die Transport-Konfiguration neu und startet ICE auf allen
    /// Publisher-Verbindungen neu
    pub async fn update_turn_credentials(&self, credentials: Vec<TurnCredentials>) -> RtcResult<()> {
        let config = self
            .inner
            .config
            .webrtc
            .generate_turn_configuration(&credentials);
        *self.inner.turn_credentials.write() = credentials;
        *self.inner.peer_config.write() = config.clone();

        for conn in self.inner.manager.established() {
            conn.peer_connection()
                .set_configuration(config.clone())
                .await?;
            if conn.role() == ConnectionRole::Publisher {
                self.renegotiate(&conn, true).await?;
            }
        }
        tracing::info!(server = config.ice_servers.len(), "TURN-Konfiguration aktualisiert");
        Ok(())
    }

    /// Holt frische Zugangsdaten vom Provider und wendet sie an
    pub async fn refresh_turn_credentials(&self) -> RtcResult<()> {
        let credentials = self.inner.turn.get_turn_credentials().await?;
        self.update_turn_credentials(credentials).await
    }

    pub fn turn_credentials(&self) -> Vec<TurnCredentials> {
        self.inner.turn_credentials.read().clone()
    }

    /// Holt Zugangsdaten, wenn keine gueltigen bekannt sind
    async fn ensure_turn_credentials(&self) {
        let jetzt = Utc::now();
        let gueltig = self
            .inner
            .turn_credentials
            .read()
            .iter()
            .any(|c| !c.ist_abgelaufen(jetzt));
        if gueltig {
            return;
        }
        if let Err(e) = self.refresh_turn_credentials().await {
            tracing::warn!(fehler = %e, "Keine TURN-Zugangsdaten, verwende Fallback-Konfiguration");
        }
    }

    // -----------------------------------------------------------------------
    // Schliessen
    // -----------------------------------------------------------------------

    /// Schliesst beide Verbindungen des Raums und stoppt ihre Pipelines
    pub async fn close(&self, room: &RoomId) -> RtcResult<()> {
        let closed = self.inner.manager.close_room(room).await;
        for conn in closed {
            for id in conn.pipelines() {
                conn.remove_pipeline(&id);
                self.inner.worker.stop(id).await?;
            }
        }
        self.inner.reconfigure_locks.remove(room);
        self.inner.data_channels.remove(room);
        tracing::info!(room = %room, "Raum geschlossen");
        Ok(())
    }

    /// Schliesst alle Raeume und beendet den Worker
    pub async fn shutdown(&self) -> RtcResult<()> {
        for room in self.inner.manager.rooms() {
            self.close(&room).await?;
        }
        self.inner.worker.shutdown().await?;
        tracing::info!(client = %self.inner.uniq_id, "WebRTC-Client beendet");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hintergrund-Tasks
// ---------------------------------------------------------------------------

fn spawn_event_loop(client: Weak<ClientInner>, mut events: mpsc::UnboundedReceiver<RoomEvent>) {
    tokio::spawn(async move {
        while let Some(RoomEvent { connection, event }) = events.recv().await {
            let Some(inner) = client.upgrade() else {
                break;
            };
            let client = WebRtcClient { inner };

            match event {
                PeerConnectionEvent::Track(track_event) => {
                    tokio::spawn(async move {
                        // Fehler sind bereits geloggt
                        let _ = client.handle_remote_track(&connection, track_event).await;
                    });
                }
                PeerConnectionEvent::NegotiationNeeded => {
                    tokio::spawn(async move {
                        if let Err(e) = client.renegotiate(&connection, false).await {
                            tracing::warn!(
                                room = %connection.room(),
                                role = %connection.role(),
                                fehler = %e,
                                "Neuverhandlung fehlgeschlagen"
                            );
                        }
                    });
                }
                PeerConnectionEvent::IceConnectionStateChange(state) => {
                    tracing::debug!(
                        room = %connection.room(),
                        role = %connection.role(),
                        %state,
                        "ICE-Zustand geaendert"
                    );
                }
                PeerConnectionEvent::DataChannel(channel) => {
                    client.register_data_channel(connection.room(), channel);
                }
                PeerConnectionEvent::IceCandidate(_) => {}
            }
        }
    });
}

/// Leitet Events des Workers ins Logging des Haupt-Kontexts
///
/// Vom Worker selbst beendete Pipelines werden aus ihren Verbindungen
/// ausgetragen.
fn spawn_worker_log(
    mut events: broadcast::Receiver<WorkerEvent>,
    inner: Weak<ClientInner>,
    client: Uuid,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    log_worker_event(client, &event);
                    if let WorkerEvent::PipelineStopped { id, reason } = &event {
                        if *reason != StopReason::Stopped {
                            let Some(inner) = inner.upgrade() else {
                                break;
                            };
                            prune_pipeline(&inner.manager, id);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(verpasst)) => {
                    tracing::warn!(client = %client, verpasst, "Worker-Events verpasst");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn prune_pipeline(manager: &PeerConnectionManager, id: &TrackId) {
    for conn in manager.established() {
        if conn.remove_pipeline(id) {
            tracing::debug!(room = %conn.room(), track = %id, "Beendete Pipeline ausgetragen");
        }
    }
}

/// `a=mid`-Werte aller `m=application`-Abschnitte eines SDP
fn data_mids(sdp: &str) -> Vec<String> {
    let mut mids = Vec::new();
    let mut in_data = false;
    for line in sdp.lines().map(str::trim) {
        if let Some(media) = line.strip_prefix("m=") {
            in_data = media.starts_with("application");
        } else if in_data {
            if let Some(mid) = line.strip_prefix("a=mid:") {
                mids.push(mid.to_string());
            }
        }
    }
    mids
}

fn log_worker_event(client: Uuid, event: &WorkerEvent) {
    match event {
        WorkerEvent::FrameDropped { id, error } => {
            tracing::warn!(client = %client, track = %id, fehler = %error, "Worker: Frame verworfen");
        }
        WorkerEvent::FramePassedThrough { id, reason } => {
            tracing::debug!(client = %client, track = %id, ?reason, "Worker: Frame durchgereicht");
        }
        WorkerEvent::ActivationFailed { id, error } => {
            tracing::error!(client = %client, track = %id, fehler = %error, "Worker: Aktivierung fehlgeschlagen");
        }
        anderes => tracing::debug!(client = %client, event = ?anderes, "Worker-Event"),
    }
}
