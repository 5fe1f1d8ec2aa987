//! # Telemetry
//!
//! Console logging is always on: every `tracing` event is rendered by
//! `tracing_subscriber::fmt`, filtered through `RUST_LOG` (default `info`).
//! OpenTelemetry export is opt-in through cargo features.
//!
//! ## Feature matrix
//!
//! - `traces`: Exports spans through an OpenTelemetry tracer provider.
//! - `metrics`: Exports session and chat metrics (counters, histograms).
//! - `otlp`: Enables the OTLP/gRPC exporter.
//! - `stdout`: Enables the stdout exporter.
//!
//! ## Feature constraints
//!
//! - Exporters require at least one of `traces` or `metrics`.
//! - `otlp` and `stdout` may be enabled together.
//!
//! ## OTLP environment
//!
//! - `OTLP_ENDPOINT` (required), e.g. `http://localhost:4317`
//! - `OTLP_COMPRESSION` (optional, `gzip` or `zstd`, default `gzip`)
//! - `OTLP_HEADERS` (optional, `key=value` pairs separated by `,`)
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --features traces,metrics,stdout
//! ```

// Disallow using `otlp` without `traces` or `metrics`
#[cfg(all(feature = "otlp", not(any(feature = "traces", feature = "metrics"))))]
compile_error!("The 'otlp' feature requires at least one of 'traces' or 'metrics' to be enabled.");

// Disallow using `stdout` without `traces` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "traces", feature = "metrics"))))]
compile_error!("The 'stdout' feature requires at least one of 'traces' or 'metrics' to be enabled.");

use crate::server::session::SessionKind;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "traces")))]
use opentelemetry_otlp::{Compression, Protocol, WithExportConfig, WithTonicConfig};
#[cfg(all(feature = "otlp", feature = "metrics"))]
use opentelemetry_sdk::metrics::Temporality;
#[cfg(feature = "otlp")]
use tonic::metadata::{Ascii, MetadataKey, MetadataMap};
#[cfg(all(feature = "otlp", any(feature = "metrics", feature = "traces")))]
use tonic::transport::ClientTlsConfig;

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "traces")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "traces")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "traces")]
use opentelemetry_sdk::trace as sdktrace;

const SERVICE_NAME: &str = "envsense";

pub struct TelemetryProviders {
    #[cfg(feature = "traces")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending spans and metrics and shuts the providers down.
    ///
    /// Errors are printed to stderr since the subscriber may already be gone.
    pub fn shutdown(&self) {
        #[cfg(feature = "traces")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "traces")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "traces")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "metrics", feature = "traces"))]
    let scope = InstrumentationScope::builder(SERVICE_NAME)
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Console output is independent of the `stdout` exporter, which prints
    // OpenTelemetry records rather than log lines.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true),
        );

    #[cfg(feature = "traces")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "traces")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

#[cfg(feature = "otlp")]
struct OtlpSettings {
    endpoint: String,
    compression: Compression,
    metadata: MetadataMap,
}

#[cfg(feature = "otlp")]
fn otlp_settings() -> anyhow::Result<OtlpSettings> {
    use anyhow::Context;
    use std::str::FromStr;

    let endpoint = std::env::var("OTLP_ENDPOINT").context("missing `OTLP_ENDPOINT`")?;
    let compression = std::env::var("OTLP_COMPRESSION")
        .unwrap_or_else(|_| "gzip".to_string())
        .to_ascii_lowercase();
    let compression = Compression::from_str(&compression)?;

    let mut metadata = MetadataMap::new();
    if let Ok(headers) = std::env::var("OTLP_HEADERS") {
        for pair in headers.split(',').filter(|pair| !pair.trim().is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("invalid OTLP header `{pair}`"))?;
            let key = MetadataKey::<Ascii>::from_bytes(key.trim().as_bytes())
                .with_context(|| format!("invalid OTLP header name `{key}`"))?;
            metadata.insert(key, value.trim().parse().context("invalid OTLP header value")?);
        }
    }

    Ok(OtlpSettings {
        endpoint,
        compression,
        metadata,
    })
}

#[cfg(any(feature = "metrics", feature = "traces"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name(SERVICE_NAME)
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        let reader =
            sdkmetrics::PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                .with_interval(std::time::Duration::from_secs(5))
                .build();
        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let settings = otlp_settings()?;
        let exporter = opentelemetry_otlp::MetricExporter::builder().with_tonic();
        let exporter = if settings.endpoint.starts_with("https://") {
            exporter.with_tls_config(ClientTlsConfig::new().with_native_roots())
        } else {
            exporter
        };
        let exporter = exporter
            .with_metadata(settings.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(settings.compression)
            .with_endpoint(settings.endpoint)
            .with_protocol(Protocol::Grpc)
            .with_temporality(Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;

        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "traces")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = builder.with_span_processor(batch_processor(
        opentelemetry_stdout::SpanExporter::default(),
    ));

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let settings = otlp_settings()?;
        let exporter = opentelemetry_otlp::SpanExporter::builder().with_tonic();
        let exporter = if settings.endpoint.starts_with("https://") {
            exporter.with_tls_config(ClientTlsConfig::new().with_native_roots())
        } else {
            exporter
        };
        let exporter = exporter
            .with_metadata(settings.metadata)
            .with_timeout(std::time::Duration::from_secs(10))
            .with_compression(settings.compression)
            .with_endpoint(settings.endpoint)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build span exporter")?;

        builder.with_span_processor(batch_processor(exporter))
    };

    Ok(builder.build())
}

#[cfg(feature = "traces")]
fn batch_processor<E>(exporter: E) -> sdktrace::BatchSpanProcessor
where
    E: opentelemetry_sdk::trace::SpanExporter + 'static,
{
    sdktrace::BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            sdktrace::BatchConfigBuilder::default()
                .with_scheduled_delay(std::time::Duration::from_secs(5))
                .with_max_queue_size(2048)
                .build(),
        )
        .build()
}

#[cfg(feature = "metrics")]
static SESSIONS_OPENED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static SESSIONS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static STREAM_ERRORS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static SESSION_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static READINGS_EMITTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static SAMPLES_RECEIVED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CHAT_DELIVERIES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static CHAT_DELIVERY_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = SESSIONS_OPENED.set(
        meter
            .u64_counter("sessions_opened")
            .with_description("Streaming sessions opened, by kind")
            .build(),
    );
    let _ = SESSIONS_INFLIGHT.set(
        meter
            .i64_up_down_counter("sessions_inflight")
            .with_description("Concurrent streaming sessions, by kind")
            .build(),
    );
    let _ = STREAM_ERRORS.set(
        meter
            .u64_counter("stream_errors")
            .with_description("Sessions terminated by an error")
            .build(),
    );
    let _ = SESSION_DURATION_MS.set(
        meter
            .f64_histogram("session_duration")
            .with_unit("ms")
            .with_description("End-to-end session duration, by kind")
            .build(),
    );
    let _ = READINGS_EMITTED.set(
        meter
            .u64_counter("forecast_readings_emitted")
            .with_description("Forecast readings written to clients")
            .build(),
    );
    let _ = SAMPLES_RECEIVED.set(
        meter
            .u64_counter("samples_received")
            .with_description("Water quality samples accepted from uploads")
            .build(),
    );
    let _ = CHAT_DELIVERIES.set(
        meter
            .u64_counter("chat_deliveries")
            .with_description("Chat messages queued to participants")
            .build(),
    );
    let _ = CHAT_DELIVERY_FAILURES.set(
        meter
            .u64_counter("chat_delivery_failures")
            .with_description("Chat messages that could not be queued to a participant")
            .build(),
    );
}

#[cfg(feature = "metrics")]
fn kind_attr(kind: SessionKind) -> [KeyValue; 1] {
    [KeyValue::new("session.kind", kind.as_str())]
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_sessions_opened(kind: SessionKind) {
    if let Some(counter) = SESSIONS_OPENED.get() {
        counter.add(1, &kind_attr(kind));
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_sessions_opened(_kind: SessionKind) {}

#[cfg(feature = "metrics")]
pub fn increment_sessions_inflight(kind: SessionKind) {
    if let Some(counter) = SESSIONS_INFLIGHT.get() {
        counter.add(1, &kind_attr(kind));
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_sessions_inflight(_kind: SessionKind) {}

#[cfg(feature = "metrics")]
pub fn decrement_sessions_inflight(kind: SessionKind) {
    if let Some(counter) = SESSIONS_INFLIGHT.get() {
        counter.add(-1, &kind_attr(kind));
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_sessions_inflight(_kind: SessionKind) {}

#[cfg(feature = "metrics")]
pub fn increment_stream_errors(kind: SessionKind) {
    if let Some(counter) = STREAM_ERRORS.get() {
        counter.add(1, &kind_attr(kind));
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_stream_errors(_kind: SessionKind) {}

#[cfg(feature = "metrics")]
pub fn record_session_duration(kind: SessionKind, duration_ms: f64) {
    if let Some(histogram) = SESSION_DURATION_MS.get() {
        histogram.record(duration_ms, &kind_attr(kind));
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_session_duration(_kind: SessionKind, _duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn increment_readings_emitted() {
    if let Some(counter) = READINGS_EMITTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_readings_emitted() {}

#[cfg(feature = "metrics")]
pub fn increment_samples_received() {
    if let Some(counter) = SAMPLES_RECEIVED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_samples_received() {}

#[cfg(feature = "metrics")]
pub fn record_chat_delivery(delivered: u64, failed: u64) {
    if let Some(counter) = CHAT_DELIVERIES.get() {
        counter.add(delivered, &[]);
    }
    if let Some(counter) = CHAT_DELIVERY_FAILURES.get() {
        counter.add(failed, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_chat_delivery(_delivered: u64, _failed: u64) {}
