//! # mediaseal-observability
//!
//! Observability-Crate fuer Mediaseal-Clients:
//! - Structured Logging via tracing-subscriber. Level und Format kommen aus
//!   der Konfiguration und koennen per Umgebungsvariable ueberschrieben werden.
//! - Prometheus-kompatible Frame-Zaehler pro Pipeline

pub mod logging;
pub mod metrics;

pub use logging::{
    log_format_gueltig, log_level_gueltig, logging_initialisieren, LogFormat, LOG_FORMAT_ENV,
    LOG_LEVEL_ENV,
};
pub use metrics::{MediasealMetrics, PipelineZaehler, PIPELINE_LABELS};
