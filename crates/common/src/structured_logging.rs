use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};
use uuid::Uuid;

/// One log line in JSON form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredLogEntry {
    /// RFC 3339 timestamp
    pub timestamp: String,
    pub level: String,
    /// Module that emitted the event
    pub target: String,
    pub message: String,
    /// Remaining event fields
    #[serde(flatten)]
    pub fields: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ExecutionContext>,
    /// Migration metrics picked out of the event fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MigrationMetrics>,
}

/// Process-level context attached to every entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Migration run the event belongs to, when known
    pub run_id: Option<String>,
    pub app_version: String,
    pub hostname: String,
    pub pid: u32,
    pub thread_id: String,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            run_id: None,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            thread_id: format!("{:?}", std::thread::current().id()),
        }
    }
}

/// Migration metrics
///
/// Picked up from well-known event fields: `duration_ms`, `records`,
/// `failed`, `throughput`, `credits`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationMetrics {
    pub duration_ms: Option<u64>,
    pub records_processed: Option<u64>,
    pub records_failed: Option<u64>,
    /// Records per second
    pub throughput: Option<f32>,
    /// Rate-limit credits left when the event was emitted
    pub credits_available: Option<f32>,
}

impl MigrationMetrics {
    fn is_empty(&self) -> bool {
        self.duration_ms.is_none()
            && self.records_processed.is_none()
            && self.records_failed.is_none()
            && self.throughput.is_none()
            && self.credits_available.is_none()
    }
}

/// Fields recorded on a span, kept in its extensions
struct SpanFields(HashMap<String, Value>);

/// JSON lines layer
///
/// Writes to stderr so reports printed on stdout stay parseable. The
/// `run_id` of the nearest enclosing span (see [`RunContext::span`]) is
/// copied into the entry context.
pub struct JsonFormatter<W = fn() -> io::Stderr> {
    make_writer: W,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self {
            make_writer: io::stderr,
        }
    }

    pub fn with_writer<W>(self, make_writer: W) -> JsonFormatter<W>
    where
        W: for<'w> MakeWriter<'w> + 'static,
    {
        JsonFormatter { make_writer }
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, W> Layer<S> for JsonFormatter<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = JsonVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = JsonVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            fields.0.extend(visitor.fields);
            return;
        }
        extensions.insert(SpanFields(visitor.fields));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        // innermost span first
        let span_run_id = ctx.event_scope(event).and_then(|mut scope| {
            scope.find_map(|span| {
                let extensions = span.extensions();
                let run_id = extensions
                    .get::<SpanFields>()
                    .and_then(|fields| text_value(fields.0.get("run_id")));
                run_id
            })
        });

        let entry = build_entry(event, span_run_id);
        if let Ok(json) = serde_json::to_string(&entry) {
            let mut writer = self.make_writer.make_writer();
            let _ = writeln!(writer, "{json}");
        }
    }
}

fn build_entry(event: &Event<'_>, span_run_id: Option<String>) -> StructuredLogEntry {
    let mut visitor = JsonVisitor::default();
    event.record(&mut visitor);

    let level = match *event.metadata().level() {
        Level::ERROR => "ERROR",
        Level::WARN => "WARN",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    };

    let metrics = visitor.extract_metrics();
    let context = ExecutionContext {
        run_id: text_value(visitor.fields.get("run_id")).or(span_run_id),
        ..ExecutionContext::default()
    };

    StructuredLogEntry {
        timestamp: Utc::now().to_rfc3339(),
        level: level.to_string(),
        target: event.metadata().target().to_string(),
        message: visitor.message.unwrap_or_default(),
        fields: visitor.fields,
        context: Some(context),
        metrics,
    }
}

fn text_value(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(|s| s.trim_matches('"').to_string())
}

/// Collects event or span fields as JSON values
#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: HashMap<String, Value>,
}

impl Visit for JsonVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(format!("{:?}", value)));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.fields.insert(field.name().to_string(), Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), Value::Bool(value));
    }
}

impl JsonVisitor {
    fn extract_metrics(&self) -> Option<MigrationMetrics> {
        let metrics = MigrationMetrics {
            duration_ms: self.u64_field("duration_ms"),
            records_processed: self.u64_field("records"),
            records_failed: self.u64_field("failed"),
            throughput: self.f64_field("throughput").map(|v| v as f32),
            credits_available: self.f64_field("credits").map(|v| v as f32),
        };
        (!metrics.is_empty()).then_some(metrics)
    }

    fn u64_field(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(|v| v.as_u64())
    }

    fn f64_field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(|v| v.as_f64())
    }
}

/// Logging setup
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level when RUST_LOG is not set
    pub level: Level,
    /// JSON lines instead of human-readable output
    pub json_output: bool,
    /// ANSI colours, human-readable output only
    pub color_output: bool,
    pub include_line_numbers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_output: false,
            color_output: true,
            include_line_numbers: cfg!(debug_assertions),
        }
    }
}

impl LoggingConfig {
    /// Quiet preset for interactive CLI runs with a progress bar
    pub fn cli(verbose: bool, json_output: bool) -> Self {
        Self {
            level: if verbose { Level::DEBUG } else { Level::WARN },
            json_output,
            ..Self::default()
        }
    }
}

/// Install the global subscriber; both formats write to stderr
pub fn init_structured_logging(config: LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    if config.json_output {
        let subscriber = Registry::default().with(env_filter).with(JsonFormatter::new());
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_line_number(config.include_line_numbers)
            .with_ansi(config.color_output)
            .with_span_events(FmtSpan::CLOSE);

        let subscriber = Registry::default().with(env_filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Times an operation and logs the outcome
pub struct OperationTimer {
    start: Instant,
    operation_name: String,
    fields: HashMap<String, Value>,
}

impl OperationTimer {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation_name: operation_name.into(),
            fields: HashMap::new(),
        }
    }

    pub fn add_field(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        tracing::info!(
            operation = %self.operation_name,
            duration_ms = elapsed.as_millis() as u64,
            success = true,
            fields = ?self.fields,
            "Operation completed"
        );
        elapsed
    }

    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: &Result<T, E>) -> Duration {
        let elapsed = self.start.elapsed();
        let duration_ms = elapsed.as_millis() as u64;
        match result {
            Ok(_) => tracing::info!(
                operation = %self.operation_name,
                duration_ms,
                success = true,
                fields = ?self.fields,
                "Operation completed"
            ),
            Err(e) => tracing::error!(
                operation = %self.operation_name,
                duration_ms,
                success = false,
                error = %e,
                fields = ?self.fields,
                "Operation failed"
            ),
        }
        elapsed
    }
}

/// Identity of one migration run, carried on its tracing span
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: Instant,
}

impl RunContext {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Instant::now(),
        }
    }

    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("migration_run", run_id = %self.run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedLines(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLines {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("capture lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLines {
        fn entries(&self) -> Vec<Value> {
            let bytes = self.0.lock().expect("capture lock").clone();
            String::from_utf8(bytes)
                .expect("utf8")
                .lines()
                .map(|line| serde_json::from_str(line).expect("json line"))
                .collect()
        }
    }

    fn capture(emit: impl FnOnce()) -> Vec<Value> {
        let captured = CapturedLines::default();
        let writer = captured.clone();
        let subscriber =
            Registry::default().with(JsonFormatter::new().with_writer(move || writer.clone()));
        tracing::subscriber::with_default(subscriber, emit);
        captured.entries()
    }

    #[test]
    fn test_run_id_comes_from_enclosing_span() {
        let run_id = Uuid::nil();
        let entries = capture(|| {
            let _guard = RunContext::new(run_id).span().entered();
            tracing::info!(records = 3, "stage finished");
        });

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["message"], "stage finished");
        assert_eq!(entries[0]["context"]["run_id"], run_id.to_string());
        assert_eq!(entries[0]["metrics"]["records_processed"], 3);
    }

    #[test]
    fn test_nested_spans_keep_the_run_id() {
        let run_id = Uuid::new_v4();
        let entries = capture(|| {
            let _run = RunContext::new(run_id).span().entered();
            let _stage = tracing::info_span!("stage", resource = "product").entered();
            tracing::warn!("batch retried");
        });

        assert_eq!(entries[0]["context"]["run_id"], run_id.to_string());
    }

    #[test]
    fn test_event_outside_a_run_has_no_run_id() {
        let entries = capture(|| tracing::info!("config loaded"));
        assert_eq!(entries[0]["context"]["run_id"], Value::Null);
    }

    #[test]
    fn test_structured_log_entry_serialization() {
        let entry = StructuredLogEntry {
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            level: "INFO".to_string(),
            target: "orchestrator::executor".to_string(),
            message: "Batch finished".to_string(),
            fields: HashMap::new(),
            context: Some(ExecutionContext::default()),
            metrics: Some(MigrationMetrics {
                duration_ms: Some(100),
                records_processed: Some(10),
                records_failed: Some(3),
                throughput: Some(100.0),
                credits_available: Some(29.0),
            }),
        };

        let json = serde_json::to_string_pretty(&entry).unwrap();
        assert!(json.contains("timestamp"));
        assert!(json.contains("Batch finished"));
        assert!(json.contains("records_failed"));
    }

    #[test]
    fn test_metrics_extracted_from_known_fields() {
        let mut visitor = JsonVisitor::default();
        visitor.fields.insert("records".into(), Value::from(10u64));
        visitor.fields.insert("credits".into(), Value::from(12.5));
        visitor.fields.insert("resource".into(), Value::from("product"));

        let metrics = visitor.extract_metrics().expect("metrics present");
        assert_eq!(metrics.records_processed, Some(10));
        assert_eq!(metrics.credits_available, Some(12.5));
        assert_eq!(metrics.duration_ms, None);
    }

    #[test]
    fn test_no_metrics_without_known_fields() {
        let mut visitor = JsonVisitor::default();
        visitor.fields.insert("resource".into(), Value::from("product"));
        assert!(visitor.extract_metrics().is_none());
    }

    #[test]
    fn test_operation_timer() {
        let mut timer = OperationTimer::new("verify");
        timer.add_field("records", 100);
        std::thread::sleep(Duration::from_millis(5));
        assert!(timer.finish() >= Duration::from_millis(5));
    }
}
