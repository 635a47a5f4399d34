//! mediaseal-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die Bausteine bereit, die von Krypto-, Worker- und
//! RTC-Crate gemeinsam genutzt werden: ID-Newtypes, Verbindungsrollen und
//! das kodierte Media-Frame, das durch die Transform-Pipelines laeuft.

pub mod frame;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use frame::{header_len, EncodedFrame, FrameType, MediaKind};
pub use types::{ConnectionRole, RoomId, SessionId, TrackId};
