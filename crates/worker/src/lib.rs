//! mediaseal-worker – E2EE-Worker
//!
//! Ein einzelner Hintergrund-Thread beherbergt alle Transform-Pipelines und
//! den gemeinsamen `KeyStore`. Der Haupt-Kontext spricht ihn nur ueber
//! Nachrichten an (`WorkerHandle`).
//!
//! ## Module
//! - [`streams`] – Readable/Writable-Paar eines Senders bzw. Empfaengers
//! - [`transform`] – Sender- (Encode) und Receiver-Transform (Decode)
//! - [`pipeline`] – Pipeline-Zustandsmaschine pro Track-ID
//! - [`worker`] – Worker-Thread, Kommandos und Side-Channel-Events

pub mod error;
pub mod pipeline;
pub mod streams;
pub mod transform;
pub mod worker;

pub use error::{TransformError, TransformResult};
pub use pipeline::{PipelineStats, StopReason};
pub use streams::{EncodedStreams, StreamEnds};
pub use transform::{FrameTransform, Operation, TransformOutput};
pub use worker::{E2eeWorker, WorkerConfig, WorkerEvent, WorkerHandle};
