//! Logging and trace export for the `braid` binary.
//!
//! Events go to stderr, filtered by `BRAID_LOG` (an `EnvFilter` directive,
//! default `warn` for text and `info` for JSON). `--log-format json` writes
//! one JSON object per event and closed span, for runs that are recorded.
//!
//! With the `otel` feature and `OTEL_EXPORTER_OTLP_ENDPOINT` set, spans are
//! also exported over OTLP HTTP. Every command runs inside a root `braid`
//! span; if `TRACEPARENT` is set that span continues the caller's trace,
//! and [`current_traceparent`] hands the replay's trace on to the fix shell.

use clap::ValueEnum;
use tracing::Span;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const FILTER_ENV: &str = "BRAID_LOG";

/// How events are written to stderr.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    const fn default_directive(self) -> &'static str {
        match self {
            Self::Text => "warn",
            Self::Json => "info",
        }
    }
}

/// Keeps the trace pipeline alive; dropping it flushes pending spans.
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        {
            if let Some(provider) = self.provider.take()
                && let Err(e) = provider.shutdown()
            {
                eprintln!("braid: trace export shutdown failed: {e}");
            }
        }
    }
}

/// Install the global subscriber. Call once, before any command runs.
#[must_use]
pub fn init(format: LogFormat) -> TelemetryGuard {
    let filter = EnvFilter::try_from_env(FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format.default_directive()));

    let text = matches!(format, LogFormat::Text).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
    });
    let json = matches!(format, LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
    });

    #[cfg(feature = "otel")]
    let provider = otlp_provider();
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json);

    #[cfg(feature = "otel")]
    {
        use opentelemetry::trace::TracerProvider as _;
        let export = provider
            .as_ref()
            .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("braid")));
        registry.with(export).init();
    }
    #[cfg(not(feature = "otel"))]
    {
        if std::env::var_os("OTEL_EXPORTER_OTLP_ENDPOINT").is_some() {
            eprintln!("braid: OTEL_EXPORTER_OTLP_ENDPOINT ignored; built without the 'otel' feature");
        }
        registry.init();
    }

    TelemetryGuard {
        #[cfg(feature = "otel")]
        provider,
    }
}

/// The root span of one command, continuing `TRACEPARENT` if given.
pub fn command_span(command: &'static str) -> Span {
    let span = tracing::info_span!("braid", command);
    #[cfg(feature = "otel")]
    {
        use tracing_opentelemetry::OpenTelemetrySpanExt as _;
        if let Some(parent) = remote_parent() {
            let _ = span.set_parent(parent);
        }
    }
    span
}

/// W3C `traceparent` of the current span, for processes braid starts.
#[cfg(feature = "otel")]
pub fn current_traceparent() -> Option<String> {
    use opentelemetry::propagation::TextMapPropagator as _;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use std::collections::HashMap;
    use tracing_opentelemetry::OpenTelemetrySpanExt as _;

    let cx = Span::current().context();
    let mut carrier: HashMap<String, String> = HashMap::new();
    TraceContextPropagator::new().inject_context(&cx, &mut carrier);
    carrier.remove("traceparent")
}

#[cfg(not(feature = "otel"))]
pub fn current_traceparent() -> Option<String> {
    None
}

/// OTLP HTTP span export, if an endpoint is configured. The SDK reads
/// `OTEL_EXPORTER_OTLP_ENDPOINT` itself and appends `/v1/traces`.
#[cfg(feature = "otel")]
fn otlp_provider() -> Option<opentelemetry_sdk::trace::SdkTracerProvider> {
    use opentelemetry::KeyValue;

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;
    if endpoint.is_empty() {
        return None;
    }
    let exporter = match opentelemetry_otlp::SpanExporter::builder().with_http().build() {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("braid: trace export to {endpoint} disabled: {e}");
            return None;
        }
    };
    let resource = opentelemetry_sdk::Resource::builder()
        .with_attribute(KeyValue::new("service.name", "braid"))
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();
    Some(
        opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_simple_exporter(exporter)
            .with_resource(resource)
            .build(),
    )
}

#[cfg(feature = "otel")]
fn remote_parent() -> Option<opentelemetry::Context> {
    use opentelemetry::propagation::TextMapPropagator as _;
    use opentelemetry::trace::TraceContextExt as _;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use std::collections::HashMap;

    let traceparent = std::env::var("TRACEPARENT").ok()?;
    let carrier = HashMap::from([("traceparent".to_owned(), traceparent)]);
    let cx = TraceContextPropagator::new().extract(&carrier);
    let valid = cx.span().span_context().is_valid();
    valid.then_some(cx)
}
