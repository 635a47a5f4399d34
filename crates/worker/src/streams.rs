//! Kodierte Frame-Streams eines Senders oder Empfaengers
//!
//! Die Plattform liefert pro Sender/Empfaenger ein Paar aus `readable`
//! (Frames vom Encoder bzw. aus dem Netz) und `writable` (Frames Richtung
//! Netz bzw. Decoder). Die Pipeline im Worker verbindet beide.

use mediaseal_core::EncodedFrame;
use tokio::sync::mpsc;

/// Stream-Paar, das an den Worker uebergeben wird
#[derive(Debug)]
pub struct EncodedStreams {
    pub readable: mpsc::Receiver<EncodedFrame>,
    pub writable: mpsc::Sender<EncodedFrame>,
}

/// Gegenstueck zu [`EncodedStreams`] auf Plattform-Seite
#[derive(Debug)]
pub struct StreamEnds {
    /// Speist Frames in die Pipeline ein
    pub input: mpsc::Sender<EncodedFrame>,
    /// Empfaengt transformierte Frames
    pub output: mpsc::Receiver<EncodedFrame>,
}

impl EncodedStreams {
    /// Erzeugt ein verbundenes Stream-Paar mit begrenzter Kapazitaet
    pub fn pair(capacity: usize) -> (Self, StreamEnds) {
        let (input, readable) = mpsc::channel(capacity);
        let (writable, output) = mpsc::channel(capacity);
        (Self { readable, writable }, StreamEnds { input, output })
    }
}
