//! mediaseal-rtc – WebRTC-Client mit E2EE-Verdrahtung
//!
//! ## Module
//! - [`platform`] – Traits fuer Peer-Connections, Tracks, Sender, Empfaenger
//! - [`connection_manager`] – eine Verbindung pro Raum und Rolle
//! - [`ice`] – Warten auf ICE-Konnektivitaet
//! - [`client`] – Publish, Remote-Tracks, Aushandlung, Schluessel
//! - [`interface`] – Methodenaufruf-Fassade mit JSON-Parametern
//! - [`signaling`] – Signaling- und TURN-Kollaborateure
//! - [`config`] – TOML-Konfiguration

pub mod client;
pub mod config;
pub mod connection_manager;
pub mod error;
pub mod ice;
pub mod interface;
pub mod platform;
pub mod signaling;

pub use client::{RemoteTrackListener, WebRtcClient};
pub use config::ClientConfig;
pub use connection_manager::{PeerConnectionManager, RoomConnection, RoomEvent, TrickleFn};
pub use error::{RtcError, RtcResult};
pub use interface::WebRtcInterface;
pub use signaling::{SignalingEndpoint, TurnCredentials, TurnCredentialsProvider};
