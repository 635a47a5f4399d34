//! Pipeline-Zustandsmaschine
//!
//! Pro Track-ID: `registered -> active -> (entfernt)`. Die Registry lebt
//! ausschliesslich auf dem Worker-Thread und braucht daher keine Sperren.
//! Frame-Zaehler liegen in den Prometheus-Metriken, gelabelt mit Track-ID
//! und Richtung.

use std::collections::HashMap;

use mediaseal_core::{MediaKind, TrackId};
use mediaseal_observability::{MediasealMetrics, PipelineZaehler};
use tokio_util::sync::CancellationToken;

use crate::error::{TransformError, TransformResult};
use crate::transform::Operation;

/// Warum eine Pipeline beendet wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explizit ueber `stop` beendet
    Stopped,
    /// `readable` wurde geschlossen
    SourceClosed,
    /// `writable` wurde geschlossen
    SinkClosed,
    /// Worker wurde heruntergefahren
    Shutdown,
}

/// Momentaufnahme der Frame-Zaehler einer Pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_in: u64,
    pub frames_out: u64,
    pub dropped: u64,
    pub passed_through: u64,
}

impl From<&PipelineZaehler> for PipelineStats {
    fn from(zaehler: &PipelineZaehler) -> Self {
        Self {
            frames_in: zaehler.frames_in.get(),
            frames_out: zaehler.frames_out.get(),
            dropped: zaehler.dropped.get(),
            passed_through: zaehler.passed_through.get(),
        }
    }
}

// ---------------------------------------------------------------------------
// Zustaende
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct ActivePipeline {
    pub operation: Operation,
    pub kind: MediaKind,
    pub cancel: CancellationToken,
    pub counters: PipelineZaehler,
    /// Unterscheidet Aktivierungen derselben Track-ID
    pub generation: u64,
}

#[derive(Debug)]
pub(crate) enum PipelineState {
    Registered,
    Active(ActivePipeline),
}

#[derive(Debug)]
pub(crate) struct PipelineRegistry {
    pipelines: HashMap<TrackId, PipelineState>,
    next_generation: u64,
    metrics: MediasealMetrics,
}

impl PipelineRegistry {
    pub fn new(metrics: MediasealMetrics) -> Self {
        Self {
            pipelines: HashMap::new(),
            next_generation: 0,
            metrics,
        }
    }

    pub fn register(&mut self, id: &TrackId) -> TransformResult<()> {
        if self.pipelines.contains_key(id) {
            return Err(TransformError::AlreadyRegistered(id.clone()));
        }
        self.pipelines.insert(id.clone(), PipelineState::Registered);
        Ok(())
    }

    /// Uebergang `registered -> active`
    pub fn activate(
        &mut self,
        id: &TrackId,
        operation: Operation,
        kind: MediaKind,
    ) -> TransformResult<&ActivePipeline> {
        let state = self
            .pipelines
            .get_mut(id)
            .ok_or_else(|| TransformError::NotRegistered(id.clone()))?;
        if matches!(state, PipelineState::Active(_)) {
            return Err(TransformError::AlreadyActive(id.clone()));
        }

        self.next_generation += 1;
        *state = PipelineState::Active(ActivePipeline {
            operation,
            kind,
            cancel: CancellationToken::new(),
            counters: self.metrics.pipeline(id.as_str(), operation.as_str()),
            generation: self.next_generation,
        });
        match state {
            PipelineState::Active(active) => Ok(active),
            PipelineState::Registered => Err(TransformError::NotRegistered(id.clone())),
        }
    }

    /// Entfernt die Pipeline und bricht eine laufende Pipe ab
    ///
    /// Gibt `None` zurueck, wenn keine Pipeline existierte.
    pub fn stop(&mut self, id: &TrackId) -> Option<PipelineState> {
        let state = self.pipelines.remove(id)?;
        if let PipelineState::Active(active) = &state {
            active.cancel.cancel();
            self.metrics
                .pipeline_entfernen(id.as_str(), active.operation.as_str());
        }
        Some(state)
    }

    /// Entfernt eine Pipeline, deren Pipe von selbst geendet hat
    ///
    /// Nur wenn die Generation noch passt: eine inzwischen neu registrierte
    /// Pipeline mit derselben ID bleibt unberuehrt.
    pub fn finished(&mut self, id: &TrackId, generation: u64) -> bool {
        let operation = match self.pipelines.get(id) {
            Some(PipelineState::Active(active)) if active.generation == generation => {
                active.operation
            }
            _ => return false,
        };
        self.pipelines.remove(id);
        self.metrics.pipeline_entfernen(id.as_str(), operation.as_str());
        true
    }

    pub fn stats(&self, id: &TrackId) -> Option<PipelineStats> {
        match self.pipelines.get(id)? {
            PipelineState::Registered => Some(PipelineStats::default()),
            PipelineState::Active(active) => Some(PipelineStats::from(&active.counters)),
        }
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.pipelines.keys().cloned().collect()
    }

    /// Bricht alle Pipes ab und leert die Registry
    pub fn stop_all(&mut self) -> Vec<TrackId> {
        let ids = self.ids();
        for id in &ids {
            self.stop(id);
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
