//! Verwaltung der Peer-Connections pro Raum und Rolle
//!
//! Pro `(room, role)` gibt es hoechstens eine lebende Verbindung. Ein Slot
//! durchlaeuft `initializing -> established -> closed`; die eigentliche
//! Peer-Connection entsteht erst beim ersten Zugriff.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use mediaseal_core::{ConnectionRole, RoomId, SessionId, TrackId};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::error::{RtcError, RtcResult};
use crate::platform::{
    IceCandidate, PeerConnection, PeerConnectionConfig, PeerConnectionEvent, PeerConnectionFactory,
};

/// Callback fuer lokal entdeckte ICE-Kandidaten
pub type TrickleFn = Arc<dyn Fn(SessionId, IceCandidate) -> RtcResult<()> + Send + Sync>;

/// Eine materialisierte Verbindung
pub struct RoomConnection {
    room: RoomId,
    role: ConnectionRole,
    pc: Arc<dyn PeerConnection>,
    session: RwLock<Option<SessionId>>,
    /// Track-IDs, deren Pipelines zu dieser Verbindung gehoeren
    pipelines: Mutex<HashSet<TrackId>>,
}

impl RoomConnection {
    fn new(
        room: RoomId,
        role: ConnectionRole,
        pc: Arc<dyn PeerConnection>,
        session: Option<SessionId>,
    ) -> Self {
        Self {
            room,
            role,
            pc,
            session: RwLock::new(session),
            pipelines: Mutex::new(HashSet::new()),
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    pub fn peer_connection(&self) -> &Arc<dyn PeerConnection> {
        &self.pc
    }

    pub fn session(&self) -> Option<SessionId> {
        *self.session.read()
    }

    pub fn set_session(&self, session: SessionId) {
        *self.session.write() = Some(session);
    }

    pub fn add_pipeline(&self, id: TrackId) {
        self.pipelines.lock().insert(id);
    }

    pub fn remove_pipeline(&self, id: &TrackId) -> bool {
        self.pipelines.lock().remove(id)
    }

    pub fn pipelines(&self) -> Vec<TrackId> {
        self.pipelines.lock().iter().cloned().collect()
    }
}

impl std::fmt::Debug for RoomConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomConnection")
            .field("room", &self.room)
            .field("role", &self.role)
            .field("session", &self.session())
            .finish()
    }
}

/// Event einer Verbindung, weitergereicht an den Client
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub connection: Arc<RoomConnection>,
    pub event: PeerConnectionEvent,
}

enum Slot {
    Initializing { session: Option<SessionId> },
    Established(Arc<RoomConnection>),
    Closed,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct PeerConnectionManager {
    slots: DashMap<(RoomId, ConnectionRole), Slot>,
    factory: Arc<dyn PeerConnectionFactory>,
    config: Arc<RwLock<PeerConnectionConfig>>,
    on_trickle: TrickleFn,
    events: mpsc::UnboundedSender<RoomEvent>,
}

impl PeerConnectionManager {
    pub fn new(
        factory: Arc<dyn PeerConnectionFactory>,
        config: Arc<RwLock<PeerConnectionConfig>>,
        on_trickle: TrickleFn,
        events: mpsc::UnboundedSender<RoomEvent>,
    ) -> Self {
        Self {
            slots: DashMap::new(),
            factory,
            config,
            on_trickle,
            events,
        }
    }

    /// Legt den Platzhalter fuer `(room, role)` an
    pub fn initialize(&self, room: &RoomId, role: ConnectionRole) -> RtcResult<()> {
        match self.slots.entry((room.clone(), role)) {
            Entry::Occupied(mut entry) => {
                if !matches!(entry.get(), Slot::Closed) {
                    return Err(RtcError::AlreadyInitialized {
                        room: room.clone(),
                        role,
                    });
                }
                entry.insert(Slot::Initializing { session: None });
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::Initializing { session: None });
            }
        }
        tracing::debug!(room = %room, role = %role, "Verbindung initialisiert");
        Ok(())
    }

    /// Wie `initialize`, aber ein bereits offener Slot ist kein Fehler
    ///
    /// Pruefen und Anlegen passieren unter derselben Shard-Sperre. Gibt
    /// `true` zurueck, wenn der Slot neu angelegt wurde.
    pub fn ensure_initialized(&self, room: &RoomId, role: ConnectionRole) -> bool {
        let angelegt = match self.slots.entry((room.clone(), role)) {
            Entry::Occupied(mut entry) => {
                if !matches!(entry.get(), Slot::Closed) {
                    return false;
                }
                entry.insert(Slot::Initializing { session: None });
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::Initializing { session: None });
                true
            }
        };
        tracing::debug!(room = %room, role = %role, "Verbindung initialisiert");
        angelegt
    }

    pub fn has_connection(&self, room: &RoomId, role: ConnectionRole) -> bool {
        self.slots
            .get(&(room.clone(), role))
            .map(|slot| !matches!(*slot, Slot::Closed))
            .unwrap_or(false)
    }

    /// Ob die Peer-Connection bereits materialisiert ist
    pub fn is_established(&self, room: &RoomId, role: ConnectionRole) -> bool {
        self.slots
            .get(&(room.clone(), role))
            .is_some_and(|slot| matches!(*slot, Slot::Established(_)))
    }

    /// Gesetzte Session, ohne die Verbindung zu materialisieren
    pub fn session(&self, room: &RoomId, role: ConnectionRole) -> Option<SessionId> {
        let slot = self.slots.get(&(room.clone(), role))?;
        match &*slot {
            Slot::Initializing { session } => *session,
            Slot::Established(conn) => conn.session(),
            Slot::Closed => None,
        }
    }

    /// Liefert die Verbindung und materialisiert sie beim ersten Zugriff
    pub fn get_connection_with_session(
        &self,
        room: &RoomId,
        role: ConnectionRole,
    ) -> RtcResult<Arc<RoomConnection>> {
        let not_initialized = || RtcError::NotInitialized {
            room: room.clone(),
            role,
        };

        let mut slot = self
            .slots
            .get_mut(&(room.clone(), role))
            .ok_or_else(|| not_initialized())?;

        let session = match &*slot {
            Slot::Established(conn) => return Ok(Arc::clone(conn)),
            Slot::Closed => return Err(not_initialized()),
            Slot::Initializing { session } => *session,
        };

        let config = self.config.read().clone();
        let created = self.factory.create(room, &config)?;
        let conn = Arc::new(RoomConnection::new(
            room.clone(),
            role,
            created.connection,
            session,
        ));
        self.spawn_event_task(Arc::clone(&conn), created.events);
        *slot = Slot::Established(Arc::clone(&conn));

        tracing::info!(room = %room, role = %role, "Peer-Connection erzeugt");
        Ok(conn)
    }

    /// Setzt die Session fuer Trickle; legt den Slot bei Bedarf an
    pub fn update_session(&self, room: &RoomId, role: ConnectionRole, session: SessionId) {
        let mut slot = self
            .slots
            .entry((room.clone(), role))
            .or_insert(Slot::Initializing { session: None });

        let neu = match &mut *slot {
            Slot::Established(conn) => {
                conn.set_session(session);
                None
            }
            Slot::Initializing { session: s } => {
                *s = Some(session);
                None
            }
            Slot::Closed => Some(Slot::Initializing {
                session: Some(session),
            }),
        };
        if let Some(neu) = neu {
            *slot = neu;
        }
        tracing::debug!(room = %room, role = %role, %session, "Session gesetzt");
    }

    /// Schliesst die Verbindung; ein spaeteres `initialize` ist wieder erlaubt
    pub async fn close(&self, room: &RoomId, role: ConnectionRole) -> Option<Arc<RoomConnection>> {
        let vorher = self
            .slots
            .get_mut(&(room.clone(), role))
            .map(|mut slot| std::mem::replace(&mut *slot, Slot::Closed));

        match vorher {
            Some(Slot::Established(conn)) => {
                if let Err(e) = conn.pc.close().await {
                    tracing::warn!(room = %room, role = %role, fehler = %e, "Schliessen fehlgeschlagen");
                }
                tracing::info!(room = %room, role = %role, "Peer-Connection geschlossen");
                Some(conn)
            }
            _ => None,
        }
    }

    /// Schliesst Publisher- und Subscriber-Verbindung eines Raums
    pub async fn close_room(&self, room: &RoomId) -> Vec<Arc<RoomConnection>> {
        let mut closed = Vec::new();
        for role in [ConnectionRole::Publisher, ConnectionRole::Subscriber] {
            if let Some(conn) = self.close(room, role).await {
                closed.push(conn);
            }
        }
        closed
    }

    /// Alle materialisierten Verbindungen
    pub fn established(&self) -> Vec<Arc<RoomConnection>> {
        self.slots
            .iter()
            .filter_map(|slot| match slot.value() {
                Slot::Established(conn) => Some(Arc::clone(conn)),
                _ => None,
            })
            .collect()
    }

    /// Raeume mit mindestens einem nicht geschlossenen Slot
    pub fn rooms(&self) -> Vec<RoomId> {
        let rooms: HashSet<RoomId> = self
            .slots
            .iter()
            .filter(|slot| !matches!(slot.value(), Slot::Closed))
            .map(|slot| slot.key().0.clone())
            .collect();
        rooms.into_iter().collect()
    }

    fn spawn_event_task(
        &self,
        conn: Arc<RoomConnection>,
        mut events: mpsc::UnboundedReceiver<PeerConnectionEvent>,
    ) {
        let on_trickle = Arc::clone(&self.on_trickle);
        let forward = self.events.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    PeerConnectionEvent::IceCandidate(candidate) => match conn.session() {
                        Some(session) => {
                            if let Err(e) = on_trickle(session, candidate) {
                                tracing::warn!(
                                    room = %conn.room,
                                    role = %conn.role,
                                    fehler = %e,
                                    "Trickle fehlgeschlagen"
                                );
                            }
                        }
                        None => tracing::warn!(
                            room = %conn.room,
                            role = %conn.role,
                            "Kein Trickle moeglich: Session nicht gesetzt"
                        ),
                    },
                    event => {
                        let room_event = RoomEvent {
                            connection: Arc::clone(&conn),
                            event,
                        };
                        if forward.send(room_event).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(room = %conn.room, role = %conn.role, "Event-Kanal beendet");
        });
    }
}
