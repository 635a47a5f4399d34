//! E2EE-Worker
//!
//! Ein dedizierter Thread mit eigener Current-Thread-Runtime. Alle
//! Pipelines und Schluessel-Updates werden dort sequentiell ueber eine
//! Kommando-Queue abgearbeitet. Register/Activate/Stop/SetKeys werden
//! bestaetigt, damit der Aufrufer erst weitermacht, wenn der Worker den
//! Uebergang tatsaechlich vollzogen hat.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use mediaseal_core::{MediaKind, TrackId};
use mediaseal_crypto::{CryptoError, Key, KeyStore, PassThroughReason};
use mediaseal_observability::MediasealMetrics;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{TransformError, TransformResult};
use crate::pipeline::{PipelineRegistry, PipelineStats, StopReason};
use crate::streams::EncodedStreams;
use crate::transform::{run_pipe, FrameTransform, Operation, PipeContext};

/// Laufzeit-Parameter des Workers
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub thread_name: String,
    /// Wie lange auf eine Bestaetigung gewartet wird
    pub ack_timeout: Duration,
    /// Puffergroesse des Event-Kanals
    pub event_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "e2ee-worker".into(),
            ack_timeout: Duration::from_millis(5000),
            event_capacity: 256,
        }
    }
}

/// Ereignisse auf dem Side-Channel des Workers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    PipelineRegistered {
        id: TrackId,
    },
    PipelineStarted {
        id: TrackId,
        operation: Operation,
        kind: MediaKind,
    },
    PipelineStopped {
        id: TrackId,
        reason: StopReason,
    },
    ActivationFailed {
        id: TrackId,
        error: TransformError,
    },
    FrameDropped {
        id: TrackId,
        error: CryptoError,
    },
    FramePassedThrough {
        id: TrackId,
        reason: PassThroughReason,
    },
    KeysUpdated {
        count: usize,
    },
}

pub(crate) enum WorkerCommand {
    Register {
        id: TrackId,
        ack: oneshot::Sender<TransformResult<()>>,
    },
    Activate {
        id: TrackId,
        operation: Operation,
        kind: MediaKind,
        streams: EncodedStreams,
        ack: Option<oneshot::Sender<TransformResult<()>>>,
    },
    Stop {
        id: TrackId,
        ack: oneshot::Sender<()>,
    },
    SetKeys {
        keys: Vec<Key>,
        ack: oneshot::Sender<()>,
    },
    Stats {
        id: TrackId,
        reply: oneshot::Sender<Option<PipelineStats>>,
    },
    Pipelines {
        reply: oneshot::Sender<Vec<TrackId>>,
    },
    PipeFinished {
        id: TrackId,
        generation: u64,
        reason: StopReason,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle auf den Worker-Thread (clonebar)
#[derive(Clone)]
pub struct WorkerHandle {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    events: broadcast::Sender<WorkerEvent>,
    ack_timeout: Duration,
    metrics: MediasealMetrics,
    /// Vom ersten `shutdown` entnommen und gejoint
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("ack_timeout", &self.ack_timeout)
            .field("geschlossen", &self.commands.is_closed())
            .finish()
    }
}

impl WorkerHandle {
    /// Legt eine Pipeline im Zustand `registered` an
    pub async fn register(&self, id: TrackId) -> TransformResult<()> {
        let (ack, rx) = oneshot::channel();
        self.send(WorkerCommand::Register { id, ack })?;
        self.await_ack(rx).await?
    }

    /// Uebergang `registered -> active`, wartet auf Bestaetigung
    pub async fn activate(
        &self,
        id: TrackId,
        operation: Operation,
        kind: MediaKind,
        streams: EncodedStreams,
    ) -> TransformResult<()> {
        let (ack, rx) = oneshot::channel();
        self.send(WorkerCommand::Activate {
            id,
            operation,
            kind,
            streams,
            ack: Some(ack),
        })?;
        self.await_ack(rx).await?
    }

    /// Aktivierung ohne Bestaetigung
    ///
    /// Fehler erscheinen nur als [`WorkerEvent::ActivationFailed`].
    pub fn activate_detached(
        &self,
        id: TrackId,
        operation: Operation,
        kind: MediaKind,
        streams: EncodedStreams,
    ) -> TransformResult<()> {
        self.send(WorkerCommand::Activate {
            id,
            operation,
            kind,
            streams,
            ack: None,
        })
    }

    /// Beendet und entfernt eine Pipeline; unbekannte IDs sind kein Fehler
    pub async fn stop(&self, id: TrackId) -> TransformResult<()> {
        let (ack, rx) = oneshot::channel();
        self.send(WorkerCommand::Stop { id, ack })?;
        self.await_ack(rx).await
    }

    /// Ersetzt den Schluesselsatz des Workers
    pub async fn set_keys(&self, keys: Vec<Key>) -> TransformResult<()> {
        let (ack, rx) = oneshot::channel();
        self.send(WorkerCommand::SetKeys { keys, ack })?;
        self.await_ack(rx).await
    }

    pub async fn stats(&self, id: TrackId) -> TransformResult<Option<PipelineStats>> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerCommand::Stats { id, reply })?;
        self.await_ack(rx).await
    }

    /// IDs aller registrierten oder aktiven Pipelines
    pub async fn pipelines(&self) -> TransformResult<Vec<TrackId>> {
        let (reply, rx) = oneshot::channel();
        self.send(WorkerCommand::Pipelines { reply })?;
        self.await_ack(rx).await
    }

    /// Stoppt alle Pipelines, beendet den Worker-Thread und wartet auf ihn
    pub async fn shutdown(&self) -> TransformResult<()> {
        let (ack, rx) = oneshot::channel();
        self.send(WorkerCommand::Shutdown { ack })?;
        self.await_ack(rx).await?;

        let Some(thread) = self.thread.lock().take() else {
            return Ok(());
        };
        let joined = tokio::time::timeout(
            self.ack_timeout,
            tokio::task::spawn_blocking(move || thread.join()),
        )
        .await
        .map_err(|_| TransformError::AckTimeout(self.ack_timeout))?;
        if !matches!(joined, Ok(Ok(()))) {
            tracing::error!("E2EE-Worker-Thread ist abgestuerzt");
            return Err(TransformError::WorkerUnavailable);
        }
        Ok(())
    }

    /// Frame-Zaehler aller Pipelines dieses Workers
    pub fn metrics(&self) -> &MediasealMetrics {
        &self.metrics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn send(&self, cmd: WorkerCommand) -> TransformResult<()> {
        self.commands
            .send(cmd)
            .map_err(|_| TransformError::WorkerUnavailable)
    }

    async fn await_ack<T>(&self, rx: oneshot::Receiver<T>) -> TransformResult<T> {
        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(TransformError::WorkerUnavailable),
            Err(_) => Err(TransformError::AckTimeout(self.ack_timeout)),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker-Thread
// ---------------------------------------------------------------------------

/// Startet den E2EE-Worker
pub struct E2eeWorker;

impl E2eeWorker {
    /// Startet den Worker-Thread mit dem gemeinsamen Schluesselsatz und
    /// eigener Metrik-Registry
    pub fn spawn(config: WorkerConfig, keys: Arc<KeyStore>) -> TransformResult<WorkerHandle> {
        let metrics =
            MediasealMetrics::neu().map_err(|e| TransformError::WorkerStart(e.to_string()))?;
        Self::spawn_with_metrics(config, keys, metrics)
    }

    /// Wie [`spawn`](E2eeWorker::spawn), zaehlt in eine bestehende Registry
    pub fn spawn_with_metrics(
        config: WorkerConfig,
        keys: Arc<KeyStore>,
        metrics: MediasealMetrics,
    ) -> TransformResult<WorkerHandle> {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransformError::WorkerStart(e.to_string()))?;

        let weak = commands.downgrade();
        let thread_events = events.clone();
        let registry = PipelineRegistry::new(metrics.clone());
        let thread = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                runtime.block_on(worker_loop(rx, weak, keys, thread_events, registry));
            })
            .map_err(|e| TransformError::WorkerStart(e.to_string()))?;

        tracing::info!(thread = %config.thread_name, "E2EE-Worker gestartet");

        Ok(WorkerHandle {
            commands,
            events,
            ack_timeout: config.ack_timeout,
            metrics,
            thread: Arc::new(Mutex::new(Some(thread))),
        })
    }
}

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<WorkerCommand>,
    commands: mpsc::WeakUnboundedSender<WorkerCommand>,
    keys: Arc<KeyStore>,
    events: broadcast::Sender<WorkerEvent>,
    mut registry: PipelineRegistry,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WorkerCommand::Register { id, ack } => {
                let result = registry.register(&id);
                if result.is_ok() {
                    tracing::debug!(track = %id, "Pipeline registriert");
                    let _ = events.send(WorkerEvent::PipelineRegistered { id });
                }
                let _ = ack.send(result);
            }

            WorkerCommand::Activate {
                id,
                operation,
                kind,
                streams,
                ack,
            } => {
                let result = match registry.activate(&id, operation, kind) {
                    Ok(active) => {
                        let ctx = PipeContext {
                            id: id.clone(),
                            transform: FrameTransform::new(operation, kind, Arc::clone(&keys)),
                            streams,
                            cancel: active.cancel.clone(),
                            counters: active.counters.clone(),
                            events: events.clone(),
                        };
                        let generation = active.generation;
                        let commands = commands.clone();
                        let pipe_id = id.clone();
                        tokio::spawn(async move {
                            let reason = run_pipe(ctx).await;
                            if let Some(tx) = commands.upgrade() {
                                let _ = tx.send(WorkerCommand::PipeFinished {
                                    id: pipe_id,
                                    generation,
                                    reason,
                                });
                            }
                        });

                        tracing::debug!(track = %id, %operation, %kind, "Pipeline aktiv");
                        let _ = events.send(WorkerEvent::PipelineStarted {
                            id,
                            operation,
                            kind,
                        });
                        Ok(())
                    }
                    Err(error) => {
                        tracing::warn!(track = %id, fehler = %error, "Aktivierung fehlgeschlagen");
                        let _ = events.send(WorkerEvent::ActivationFailed {
                            id,
                            error: error.clone(),
                        });
                        Err(error)
                    }
                };
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }

            WorkerCommand::Stop { id, ack } => {
                if registry.stop(&id).is_some() {
                    tracing::debug!(track = %id, "Pipeline gestoppt");
                    let _ = events.send(WorkerEvent::PipelineStopped {
                        id,
                        reason: StopReason::Stopped,
                    });
                }
                let _ = ack.send(());
            }

            WorkerCommand::PipeFinished {
                id,
                generation,
                reason,
            } => {
                if registry.finished(&id, generation) {
                    tracing::debug!(track = %id, ?reason, "Pipe beendet");
                    let _ = events.send(WorkerEvent::PipelineStopped { id, reason });
                }
            }

            WorkerCommand::SetKeys { keys: neu, ack } => {
                let count = neu.len();
                keys.set_keys(neu);
                let _ = events.send(WorkerEvent::KeysUpdated { count });
                let _ = ack.send(());
            }

            WorkerCommand::Stats { id, reply } => {
                let _ = reply.send(registry.stats(&id));
            }

            WorkerCommand::Pipelines { reply } => {
                let _ = reply.send(registry.ids());
            }

            WorkerCommand::Shutdown { ack } => {
                stop_all(&mut registry, &events);
                let _ = ack.send(());
                break;
            }
        }
    }

    if registry.len() > 0 {
        stop_all(&mut registry, &events);
    }
    tracing::info!("E2EE-Worker beendet");
}

fn stop_all(registry: &mut PipelineRegistry, events: &broadcast::Sender<WorkerEvent>) {
    for id in registry.stop_all() {
        let _ = events.send(WorkerEvent::PipelineStopped {
            id,
            reason: StopReason::Shutdown,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
