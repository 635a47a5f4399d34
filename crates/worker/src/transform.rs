//! Frame-Transforms und die Pipe-Schleife
//!
//! Sender-Richtung verschluesselt (`Encode`), Empfaenger-Richtung
//! entschluesselt (`Decode`). Jeder Frame liest den Schluesselsatz, der zum
//! Zeitpunkt seiner Verarbeitung aktuell ist.

use std::fmt;
use std::sync::Arc;

use mediaseal_core::{EncodedFrame, MediaKind, TrackId};
use mediaseal_crypto::{
    decode_frame, encode_frame, CryptoError, DecodeOutcome, KeyStore, PassThroughReason,
};
use mediaseal_observability::PipelineZaehler;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::pipeline::StopReason;
use crate::streams::EncodedStreams;
use crate::worker::WorkerEvent;

/// Richtung einer Pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Encode,
    Decode,
}

impl Operation {
    /// Label-Wert in Logs und Metriken
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encode => "encode",
            Self::Decode => "decode",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Was mit einem Frame nach dem Transform passiert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    /// Erfolgreich transformiert
    Forward(EncodedFrame),
    /// Unveraendert weitergereicht (nur Decode)
    PassThrough(EncodedFrame, PassThroughReason),
    /// Verworfen (nur Encode)
    Drop(CryptoError),
}

/// Zustandsloser Transform ueber einem gemeinsamen Schluesselsatz
#[derive(Debug, Clone)]
pub struct FrameTransform {
    operation: Operation,
    kind: MediaKind,
    keys: Arc<KeyStore>,
}

impl FrameTransform {
    pub fn new(operation: Operation, kind: MediaKind, keys: Arc<KeyStore>) -> Self {
        Self {
            operation,
            kind,
            keys,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Wendet den Transform auf einen einzelnen Frame an
    pub fn apply(&self, frame: EncodedFrame) -> TransformOutput {
        match self.operation {
            Operation::Encode => match encode_frame(frame, self.kind, &self.keys) {
                Ok(frame) => TransformOutput::Forward(frame),
                Err(e) => TransformOutput::Drop(e),
            },
            Operation::Decode => match decode_frame(frame, self.kind, &self.keys) {
                DecodeOutcome::Decrypted(frame) => TransformOutput::Forward(frame),
                DecodeOutcome::PassedThrough { frame, reason } => {
                    TransformOutput::PassThrough(frame, reason)
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Pipe-Schleife
// ---------------------------------------------------------------------------

pub(crate) struct PipeContext {
    pub id: TrackId,
    pub transform: FrameTransform,
    pub streams: EncodedStreams,
    pub cancel: CancellationToken,
    pub counters: PipelineZaehler,
    pub events: broadcast::Sender<WorkerEvent>,
}

/// Liest Frames aus `readable`, transformiert und schreibt nach `writable`
///
/// Laeuft bis zum Abbruch ueber das Token oder bis eine Seite geschlossen
/// wird. Ein Frame, der beim Abbruch gerade transformiert wird, wird nicht
/// mehr geschrieben.
pub(crate) async fn run_pipe(ctx: PipeContext) -> StopReason {
    let PipeContext {
        id,
        transform,
        streams,
        cancel,
        counters,
        events,
    } = ctx;
    let EncodedStreams {
        mut readable,
        writable,
    } = streams;

    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StopReason::Stopped,
            frame = readable.recv() => match frame {
                Some(frame) => frame,
                None => return StopReason::SourceClosed,
            },
        };
        counters.frames_in.inc();

        let out = match transform.apply(frame) {
            TransformOutput::Forward(frame) => frame,
            TransformOutput::PassThrough(frame, reason) => {
                counters.passed_through.inc();
                let _ = events.send(WorkerEvent::FramePassedThrough {
                    id: id.clone(),
                    reason,
                });
                frame
            }
            TransformOutput::Drop(error) => {
                counters.dropped.inc();
                tracing::warn!(track = %id, fehler = %error, "Frame verworfen");
                let _ = events.send(WorkerEvent::FrameDropped {
                    id: id.clone(),
                    error,
                });
                continue;
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return StopReason::Stopped,
            result = writable.send(out) => {
                if result.is_err() {
                    return StopReason::SinkClosed;
                }
            }
        }
        counters.frames_out.inc();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
