use crate::encode::{WireEncoder, DEFAULT_MAX_HEADER_BYTES};
use crate::error::InitError;
use crate::layer::ChromeLoggerLayer;
use crate::record::Severity;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Capture configuration.
///
/// **Fields**
/// - `min_severity`: records less severe than this are not captured.
/// - `max_header_bytes`: cap on the encoded header value; the newest rows
///   are dropped past it. `0` disables the cap.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   installed next to [`ChromeLoggerLayer`] so records also reach the
///   console.
/// - `targets`: target prefixes to capture, e.g. `my_app::billing`.
///   Empty captures every target.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub min_severity: Severity,
    pub max_header_bytes: usize,
    pub enable_stdout: bool,
    pub targets: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Trace,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            enable_stdout: true,
            targets: Vec::new(),
        }
    }
}

impl CaptureConfig {
    pub fn encoder(&self) -> WireEncoder {
        WireEncoder::new(self.max_header_bytes)
    }

    pub fn layer(&self) -> ChromeLoggerLayer {
        ChromeLoggerLayer::new(self.min_severity).with_targets(self.targets.iter().cloned())
    }
}

/// Install the global `tracing` subscriber with a [`ChromeLoggerLayer`]
/// built from `config`.
///
/// **Returns**
/// - the installed layer; its counters are shared with the installed copy.
/// - `Err(InitError::AlreadyInstalled)` if a global subscriber exists.
pub fn init_tracing_with_config(config: &CaptureConfig) -> Result<ChromeLoggerLayer, InitError> {
    let layer = config.layer();

    // Both variants are spelled out since the subscriber types differ.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer.clone()).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer.clone());
        tracing::subscriber::set_global_default(subscriber)?;
    }

    tracing::debug!(
        target: "chromelogger",
        min_severity = ?config.min_severity,
        max_header_bytes = config.max_header_bytes,
        targets = ?config.targets,
        "browser log capture installed"
    );
    Ok(layer)
}

/// Install the global subscriber using [`CaptureConfig::default`].
pub fn init_tracing() -> Result<ChromeLoggerLayer, InitError> {
    init_tracing_with_config(&CaptureConfig::default())
}
