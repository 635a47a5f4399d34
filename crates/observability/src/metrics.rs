//! Prometheus-kompatible Metriken fuer Mediaseal
//!
//! Registrierte Metriken (Labels `track`, `operation`):
//! - `mediaseal_frames_in_total` – Counter: gelesene Frames
//! - `mediaseal_frames_out_total` – Counter: geschriebene Frames
//! - `mediaseal_frames_dropped_total` – Counter: verworfene Frames (Encode)
//! - `mediaseal_frames_passed_through_total` – Counter: unveraendert
//!   durchgereichte Frames (Decode)

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Label-Namen der Pipeline-Zaehler
pub const PIPELINE_LABELS: [&str; 2] = ["track", "operation"];

/// Alle Mediaseal-Prometheus-Metriken
#[derive(Clone)]
pub struct MediasealMetrics {
    pub registry: Arc<Registry>,

    pub frames_in: IntCounterVec,
    pub frames_out: IntCounterVec,
    pub frames_dropped: IntCounterVec,
    pub frames_passed_through: IntCounterVec,
}

/// Zaehler einer einzelnen Pipeline, aufgeloest fuer ein Label-Paar
#[derive(Clone)]
pub struct PipelineZaehler {
    pub frames_in: IntCounter,
    pub frames_out: IntCounter,
    pub dropped: IntCounter,
    pub passed_through: IntCounter,
}

impl MediasealMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let frames_in = pipeline_counter(
            &registry,
            "mediaseal_frames_in_total",
            "Gesamtanzahl gelesener Frames pro Pipeline",
        )?;
        let frames_out = pipeline_counter(
            &registry,
            "mediaseal_frames_out_total",
            "Gesamtanzahl geschriebener Frames pro Pipeline",
        )?;
        let frames_dropped = pipeline_counter(
            &registry,
            "mediaseal_frames_dropped_total",
            "Verworfene Frames (Verschluesselung fehlgeschlagen)",
        )?;
        let frames_passed_through = pipeline_counter(
            &registry,
            "mediaseal_frames_passed_through_total",
            "Unveraendert durchgereichte Frames (Entschluesselung nicht moeglich)",
        )?;

        Ok(Self {
            registry: Arc::new(registry),
            frames_in,
            frames_out,
            frames_dropped,
            frames_passed_through,
        })
    }

    /// Zaehler fuer `(track, operation)`; legt die Label-Werte bei Bedarf an
    pub fn pipeline(&self, track: &str, operation: &str) -> PipelineZaehler {
        let labels = [track, operation];
        PipelineZaehler {
            frames_in: self.frames_in.with_label_values(&labels),
            frames_out: self.frames_out.with_label_values(&labels),
            dropped: self.frames_dropped.with_label_values(&labels),
            passed_through: self.frames_passed_through.with_label_values(&labels),
        }
    }

    /// Entfernt die Label-Werte einer beendeten Pipeline
    pub fn pipeline_entfernen(&self, track: &str, operation: &str) {
        let labels = [track, operation];
        for vec in [
            &self.frames_in,
            &self.frames_out,
            &self.frames_dropped,
            &self.frames_passed_through,
        ] {
            // Nie gezaehlte Label-Werte existieren nicht
            let _ = vec.remove_label_values(&labels);
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for MediasealMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediasealMetrics")
            .field("familien", &self.registry.gather().len())
            .finish()
    }
}

impl std::fmt::Debug for PipelineZaehler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineZaehler")
            .field("frames_in", &self.frames_in.get())
            .field("frames_out", &self.frames_out.get())
            .field("dropped", &self.dropped.get())
            .field("passed_through", &self.passed_through.get())
            .finish()
    }
}

fn pipeline_counter(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, hilfe), &PIPELINE_LABELS)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}
