//! Kodierte Media-Frames
//!
//! Ein `EncodedFrame` ist ein bereits vom Codec komprimierter Audio- oder
//! Video-Frame, so wie ihn die Encoded-Streams-Schnittstelle der Plattform
//! liefert. Die Transform-Pipelines ersetzen nur `data`; Zeitstempel und
//! Metadaten bleiben unveraendert.
//!
//! ## Unverschluesselter Header
//! ```text
//! audio                 -> 1 Byte  (Opus TOC)
//! video / key frame     -> 10 Bytes
//! video / delta frame   -> 3 Bytes
//! video / unklassifiert -> 1 Byte
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Art des Media-Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Keyframe-Klassifikation eines Video-Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Key,
    Delta,
    /// Plattform meldet keinen Typ
    Unclassified,
}

/// Laenge des unverschluesselten Headers fuer Art und Frame-Typ
pub fn header_len(kind: MediaKind, frame_type: Option<FrameType>) -> usize {
    match (kind, frame_type) {
        (MediaKind::Audio, _) => 1,
        (MediaKind::Video, Some(FrameType::Key)) => 10,
        (MediaKind::Video, Some(FrameType::Delta)) => 3,
        (MediaKind::Video, Some(FrameType::Unclassified) | None) => 1,
    }
}

/// Ein kodierter Frame aus dem Sender- bzw. Empfaenger-Stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// RTP-Zeitstempel
    pub timestamp: u32,
    /// Synchronization Source des Senders
    pub ssrc: u32,
    /// Nur bei Video gesetzt
    pub frame_type: Option<FrameType>,
    /// Payload (Header + Body bzw. Wire-Format)
    pub data: Bytes,
}

impl EncodedFrame {
    /// Erstellt einen Audio-Frame
    pub fn audio(timestamp: u32, data: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            ssrc: 0,
            frame_type: None,
            data: data.into(),
        }
    }

    /// Erstellt einen Video-Frame
    pub fn video(timestamp: u32, frame_type: FrameType, data: impl Into<Bytes>) -> Self {
        Self {
            timestamp,
            ssrc: 0,
            frame_type: Some(frame_type),
            data: data.into(),
        }
    }

    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
        self
    }

    /// Header-Laenge dieses Frames, begrenzt auf die Payload-Laenge
    pub fn header_len(&self, kind: MediaKind) -> usize {
        header_len(kind, self.frame_type).min(self.data.len())
    }

    /// Ersetzt die Payload, alle uebrigen Felder bleiben erhalten
    pub fn with_data(self, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..self
        }
    }
}
