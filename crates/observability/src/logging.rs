//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `MEDIASEAL_LOG_LEVEL`: EnvFilter-Direktive (z.B. `info` oder
//!   `mediaseal_worker=debug`), Standard aus der Konfiguration
//! - `MEDIASEAL_LOG_FORMAT`: Format (text/json), Standard aus der Konfiguration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "MEDIASEAL_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "MEDIASEAL_LOG_FORMAT";

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            anders => anyhow::bail!("Unbekanntes Log-Format: '{anders}'"),
        }
    }
}

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor den uebergebenen Werten. Ein
/// ungueltiges Format aus der Umgebung faellt auf `format` zurueck.
/// Schlaegt fehl, wenn bereits ein globaler Subscriber gesetzt ist.
pub fn logging_initialisieren(level: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = format_waehlen(std::env::var(LOG_FORMAT_ENV).ok().as_deref(), format);

    let result = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Logging konnte nicht initialisiert werden: {e}"))
}

fn format_waehlen(aus_env: Option<&str>, fallback: LogFormat) -> LogFormat {
    aus_env
        .and_then(|wert| wert.parse().ok())
        .unwrap_or(fallback)
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    format.parse::<LogFormat>().is_ok()
}
