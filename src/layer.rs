use crate::context::{with_current_buffer, BufferBusy};
use crate::record::{mapping_value, LogArgs, LogValue, Severity};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Target used by this crate's own diagnostics. Events with this target
/// are never captured.
pub const SELF_TARGET: &str = "chromelogger";

/// Field-name prefix marking keyword arguments, e.g. `kw.user = "alice"`.
pub const KEYWORD_PREFIX: &str = "kw.";

/// `tracing_subscriber` layer that copies events into the buffer of the
/// request being served on the current task or thread.
///
/// The layer sits next to any other layers of the subscriber and never
/// filters what they see. Events emitted outside a capture scope are
/// ignored. Recording never blocks and never panics into the caller.
#[derive(Clone)]
pub struct ChromeLoggerLayer {
    min_severity: Severity,
    targets: Vec<String>,
    /// Events seen by the layer (before any filtering).
    pub total_events: Arc<AtomicU64>,
    /// Events appended to a request buffer.
    pub captured_events: Arc<AtomicU64>,
    /// Events lost to a failure while recording them.
    pub failed_events: Arc<AtomicU64>,
}

impl Default for ChromeLoggerLayer {
    fn default() -> Self {
        Self::new(Severity::Trace)
    }
}

impl ChromeLoggerLayer {
    /// Create a layer that captures events at `min_severity` or above.
    pub fn new(min_severity: Severity) -> Self {
        Self {
            min_severity,
            targets: Vec::new(),
            total_events: Arc::new(AtomicU64::new(0)),
            captured_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Only capture events whose target lies under one of `prefixes`:
    /// `my_app::auth` covers `my_app::auth` and `my_app::auth::session`
    /// but not `my_app::authz`. An empty list captures every target.
    pub fn with_targets<I, T>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.targets = prefixes
            .into_iter()
            .map(Into::into)
            .map(|prefix: String| prefix.trim().trim_end_matches("::").to_string())
            .filter(|prefix| !prefix.is_empty())
            .collect();
        self
    }

    pub fn min_severity(&self) -> Severity {
        self.min_severity
    }

    /// Whether events with this target are captured.
    pub fn captures_target(&self, target: &str) -> bool {
        target != SELF_TARGET
            && (self.targets.is_empty()
                || self.targets.iter().any(|prefix| within_subtree(target, prefix)))
    }

    /// Append one record to the current request's buffer.
    ///
    /// **Returns** `true` if the record was captured, `false` if no
    /// capture scope is active, the record was below the threshold, or
    /// recording failed. Failures are reported on stderr.
    pub fn record(
        &self,
        severity: Severity,
        template: &str,
        args: LogArgs,
        file: &str,
        line: u32,
    ) -> bool {
        if severity < self.min_severity {
            return false;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            with_current_buffer(|buf| buf.record(severity, template, args, file, line))
        }));
        self.settle(outcome, file, line)
    }

    fn settle(
        &self,
        outcome: std::thread::Result<Result<Option<()>, BufferBusy>>,
        file: &str,
        line: u32,
    ) -> bool {
        match outcome {
            Ok(Ok(Some(()))) => {
                self.captured_events.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(Ok(None)) => false,
            Ok(Err(BufferBusy)) => {
                self.failed_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("chromelogger: request buffer busy, dropping record from {}:{}", file, line);
                false
            }
            Err(_) => {
                self.failed_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("chromelogger: failed to record log from {}:{}", file, line);
                false
            }
        }
    }
}

impl<S> Layer<S> for ChromeLoggerLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        if !self.captures_target(meta.target()) {
            return;
        }
        let severity = Severity::from(meta.level());
        if severity < self.min_severity || !crate::context::is_capturing() {
            return;
        }

        let file = meta.file().unwrap_or("<unknown>");
        let line = meta.line().unwrap_or(0);

        // Visiting runs user `Debug` impls.
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut visitor = ArgsVisitor::default();
            event.record(&mut visitor);
            let (template, args) = visitor.finish();
            with_current_buffer(|buf| buf.record(severity, &template, args, file, line))
        }));
        self.settle(outcome, file, line);
    }
}

fn within_subtree(target: &str, prefix: &str) -> bool {
    match target.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with("::"),
        None => false,
    }
}

/// Collects an event's message and its remaining fields, in declaration
/// order, as formatter arguments.
#[derive(Default)]
pub struct ArgsVisitor {
    message: Option<String>,
    positional: Vec<LogValue>,
    keywords: Vec<(String, LogValue)>,
}

impl ArgsVisitor {
    /// Split into the message template and its arguments.
    ///
    /// Keyword fields alone form a mapping argument; next to positional
    /// fields the mapping becomes one extra trailing positional value.
    pub fn finish(self) -> (String, LogArgs) {
        let template = self.message.unwrap_or_default();
        let args = match (self.positional.is_empty(), self.keywords.is_empty()) {
            (_, true) => LogArgs::Positional(self.positional),
            (true, false) => LogArgs::Mapping(self.keywords),
            (false, false) => {
                let mut positional = self.positional;
                positional.push(mapping_value(self.keywords));
                LogArgs::Positional(positional)
            }
        };
        (template, args)
    }

    fn push(&mut self, field: &Field, value: LogValue) {
        match field.name().strip_prefix(KEYWORD_PREFIX) {
            Some(name) => self.keywords.push((name.to_string(), value)),
            None => self.positional.push(value),
        }
    }
}

impl Visit for ArgsVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.push(field, LogValue::Str(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, LogValue::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, LogValue::U64(value));
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        self.push(field, LogValue::I128(value));
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        self.push(field, LogValue::U128(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, LogValue::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, LogValue::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, LogValue::Debug(format!("{:?}", value)));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            // `fmt::Arguments` debug-formats as the plain message text.
            self.message = Some(format!("{:?}", value));
        } else {
            self.push(field, LogValue::debug(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{capture_sync, ThreadScope};
    use crate::encode::{decode_header, WireEncoder};
    use serde_json::json;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    fn with_layer<R>(layer: ChromeLoggerLayer, f: impl FnOnce() -> R) -> R {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, f)
    }

    fn capture(layer: ChromeLoggerLayer, f: impl FnOnce()) -> crate::encode::DecodedPayload {
        let (_, header) = with_layer(layer, || capture_sync(&WireEncoder::default(), f));
        decode_header(&header).unwrap()
    }

    #[test]
    fn positional_fields_fill_placeholders() {
        let decoded = capture(ChromeLoggerLayer::default(), || {
            let user = "alice";
            tracing::info!(user, "User %s logged in");
        });
        assert_eq!(decoded.rows.len(), 1);
        let (entry, backtrace, label) = &decoded.rows[0];
        assert_eq!(entry, &vec![json!("User "), json!("alice"), json!(" logged in")]);
        assert!(backtrace.as_deref().unwrap().starts_with("src/layer.rs:"));
        assert_eq!(label, "info");
    }

    #[test]
    fn keyword_fields_form_one_mapping() {
        let decoded = capture(ChromeLoggerLayer::default(), || {
            tracing::warn!(kw.user = "bob", kw.attempts = 3u64, "login state %s");
        });
        let (entry, _, label) = &decoded.rows[0];
        assert_eq!(
            entry,
            &vec![
                json!("login state "),
                json!({"user": "bob", "attempts": 3}),
                json!("")
            ]
        );
        assert_eq!(label, "warn");
    }

    #[test]
    fn debug_fields_keep_their_representation() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Session {
            id: u32,
        }
        let session = Session { id: 5 };
        let decoded = capture(ChromeLoggerLayer::default(), || {
            tracing::error!(?session, ratio = 0.5, "closing");
        });
        let (entry, _, label) = &decoded.rows[0];
        assert_eq!(
            entry,
            &vec![json!("closing"), json!("Session { id: 5 }"), json!(0.5)]
        );
        assert_eq!(label, "error");
    }

    #[test]
    fn same_call_site_reports_backtrace_once() {
        let decoded = capture(ChromeLoggerLayer::default(), || {
            for i in 0..3u64 {
                tracing::debug!(i, "tick %s");
            }
        });
        let traces: Vec<_> = decoded.rows.iter().map(|r| r.1.is_some()).collect();
        assert_eq!(traces, vec![true, false, false]);
        assert!(decoded.rows.iter().all(|r| r.2.is_empty()));
    }

    #[test]
    fn events_below_threshold_are_skipped() {
        let layer = ChromeLoggerLayer::new(Severity::Warning);
        let captured = layer.captured_events.clone();
        let decoded = capture(layer, || {
            tracing::info!("quiet");
            tracing::warn!("loud");
        });
        assert_eq!(decoded.rows.len(), 1);
        assert_eq!(captured.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn events_outside_scope_are_ignored() {
        let layer = ChromeLoggerLayer::default();
        let total = layer.total_events.clone();
        let captured = layer.captured_events.clone();
        with_layer(layer, || tracing::info!("no request"));
        assert_eq!(total.load(Ordering::Relaxed), 1);
        assert_eq!(captured.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn own_diagnostics_are_not_captured() {
        let decoded = capture(ChromeLoggerLayer::default(), || {
            tracing::debug!(target: "chromelogger", "internal");
        });
        assert!(decoded.rows.is_empty());
    }

    #[test]
    fn busy_buffer_counts_as_failure() {
        let layer = ChromeLoggerLayer::default();
        let _scope = ThreadScope::enter();
        let captured = crate::context::with_current_buffer(|_| {
            layer.record(Severity::Info, "re-entrant", LogArgs::none(), "a.rs", 1)
        });
        assert_eq!(captured, Ok(Some(false)));
        assert_eq!(layer.failed_events.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn panicking_field_value_is_contained() {
        struct Exploding;
        impl std::fmt::Debug for Exploding {
            fn fmt(&self, _: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                panic!("debug impl blew up")
            }
        }

        let layer = ChromeLoggerLayer::default();
        let failed = layer.failed_events.clone();
        let captured = layer.captured_events.clone();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            capture(layer, || {
                let value = Exploding;
                tracing::info!(?value, "value %s");
                tracing::info!("after");
            })
        }));

        let decoded = outcome.expect("panic escaped the layer");
        assert_eq!(failed.load(Ordering::Relaxed), 1);
        assert_eq!(captured.load(Ordering::Relaxed), 1);
        assert_eq!(decoded.rows.len(), 1);
        assert_eq!(decoded.rows[0].0, vec![json!("after")]);
    }

    #[test]
    fn target_prefixes_limit_capture() {
        let layer = ChromeLoggerLayer::default().with_targets(["app::auth"]);
        let decoded = capture(layer, || {
            tracing::info!(target: "app::auth", "login");
            tracing::info!(target: "app::auth::session", "refresh");
            tracing::info!(target: "app::authz", "sibling");
            tracing::info!(target: "other", "elsewhere");
        });
        let messages: Vec<_> = decoded.rows.iter().map(|row| row.0[0].clone()).collect();
        assert_eq!(messages, vec![json!("login"), json!("refresh")]);
    }

    #[test]
    fn empty_target_list_captures_everything() {
        let layer = ChromeLoggerLayer::default().with_targets(Vec::<String>::new());
        assert!(layer.captures_target("anything"));
        assert!(!layer.captures_target(SELF_TARGET));
    }

    #[test]
    fn error_fields_use_their_debug_form() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Refused {
            port: u16,
        }
        impl std::fmt::Display for Refused {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "connection refused")
            }
        }
        impl std::error::Error for Refused {}

        let err = Refused { port: 5432 };
        let decoded = capture(ChromeLoggerLayer::default(), || {
            let err: &(dyn std::error::Error + 'static) = &err;
            tracing::error!(err, "db %s");
        });
        assert_eq!(
            decoded.rows[0].0,
            vec![json!("db "), json!("Refused { port: 5432 }"), json!("")]
        );
    }
}
