//! Prometheus exposition format support.
//!
//! Serves the shared [`MetricsState`] in the Prometheus text-based
//! exposition format. Each scrape renders whatever the collector last wrote;
//! the exporter never triggers a collection itself.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tigowatch_exporter::prometheus::{PrometheusConfig, PrometheusExporter};
//! use tigowatch_exporter::MetricsState;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PrometheusConfig::builder()
//!         .listen_addr("0.0.0.0:9980")
//!         .metrics_path("/metrics")
//!         .build();
//!
//!     let state = Arc::new(MetricsState::new());
//!     let server = PrometheusExporter::new(config, state).bind().await?;
//!
//!     // Metrics available at http://localhost:9980/metrics
//!     server.run().await;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tigowatch_types::{device_label, FieldKind, MetricsSnapshot};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::error::ExporterError;
use crate::state::MetricsState;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9980";
const DEFAULT_METRICS_PATH: &str = "/metrics";
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Families in exposition order (sorted by metric name).
const DEVICE_FAMILIES: [FieldKind; 4] = [
    FieldKind::Power,
    FieldKind::Rssi,
    FieldKind::Temperature,
    FieldKind::Voltage,
];

const TIMESTAMP_METRIC: &str = "tigo_timestamp";
const TIMESTAMP_HELP: &str = "Timestamp of the dataset";

/// Where and how the exposition endpoint is served.
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// `ip:port` to bind.
    pub listen_addr: String,
    pub metrics_path: String,
    /// Prefixed to every family name as `<ns>_`.
    pub namespace: Option<String>,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
            namespace: None,
        }
    }
}

impl PrometheusConfig {
    pub fn builder() -> PrometheusConfigBuilder {
        PrometheusConfigBuilder::default()
    }
}

/// Builder for [`PrometheusConfig`]; unset fields keep the defaults.
#[derive(Debug, Default)]
pub struct PrometheusConfigBuilder {
    listen_addr: Option<String>,
    metrics_path: Option<String>,
    namespace: Option<String>,
}

impl PrometheusConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn metrics_path(mut self, path: impl Into<String>) -> Self {
        self.metrics_path = Some(path.into());
        self
    }

    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    pub fn build(self) -> PrometheusConfig {
        PrometheusConfig {
            listen_addr: self
                .listen_addr
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            metrics_path: self
                .metrics_path
                .unwrap_or_else(|| DEFAULT_METRICS_PATH.to_string()),
            namespace: self.namespace,
        }
    }
}

/// Prometheus exporter that serves the shared metrics state over HTTP.
#[derive(Debug)]
pub struct PrometheusExporter {
    config: PrometheusConfig,
    state: Arc<MetricsState>,
}

impl PrometheusExporter {
    pub fn new(config: PrometheusConfig, state: Arc<MetricsState>) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &PrometheusConfig {
        &self.config
    }

    /// Render the current state without going through HTTP.
    pub fn render(&self) -> String {
        self.state
            .read(|snapshot| format_prometheus(snapshot, self.config.namespace.as_deref()))
    }

    /// Bind the listener.
    ///
    /// Failing to bind is the one exporter error the process cannot recover from.
    pub async fn bind(self) -> Result<MetricsServer, ExporterError> {
        let addr: SocketAddr =
            self.config
                .listen_addr
                .parse()
                .map_err(|source| ExporterError::InvalidAddress {
                    addr: self.config.listen_addr.clone(),
                    source,
                })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ExporterError::Bind {
                addr: self.config.listen_addr.clone(),
                source,
            })?;

        Ok(MetricsServer {
            listener,
            routes: Arc::new(Routes {
                metrics_path: self.config.metrics_path,
                namespace: self.config.namespace,
                state: self.state,
            }),
        })
    }
}

/// A bound metrics endpoint, ready to serve.
#[derive(Debug)]
pub struct MetricsServer {
    listener: TcpListener,
    routes: Arc<Routes>,
}

#[derive(Debug)]
struct Routes {
    metrics_path: String,
    namespace: Option<String>,
    state: Arc<MetricsState>,
}

impl MetricsServer {
    /// The address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections forever.
    ///
    /// Each connection is served on its own task. Accept errors (such as
    /// running out of file descriptors) are logged and retried after
    /// a short pause.
    pub async fn run(self) {
        loop {
            let (stream, peer) = accept_with_retry(|| self.listener.accept()).await;
            debug!(%peer, "Accepted scrape connection");
            let io = TokioIo::new(stream);
            let routes = self.routes.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let routes = routes.clone();
                    async move { Ok::<_, Infallible>(routes.handle(&req)) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(%peer, "Prometheus connection error: {}", e);
                }
            });
        }
    }
}

/// Await `accept` until it succeeds, pausing after each failure.
async fn accept_with_retry<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!("Failed to accept connection, retrying: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

impl Routes {
    fn handle<B>(&self, req: &Request<B>) -> Response<Full<Bytes>> {
        let path = req.uri().path();

        if path == self.metrics_path {
            let body = self
                .state
                .read(|snapshot| format_prometheus(snapshot, self.namespace.as_deref()));
            respond(
                StatusCode::OK,
                "text/plain; version=0.0.4; charset=utf-8",
                body,
            )
        } else if path == "/health" || path == "/healthz" {
            respond(StatusCode::OK, "text/plain", "OK")
        } else {
            respond(StatusCode::NOT_FOUND, "text/plain", "Not Found")
        }
    }
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Format a snapshot as Prometheus exposition format.
///
/// Families without any series are left out entirely.
pub fn format_prometheus(snapshot: &MetricsSnapshot, namespace: Option<&str>) -> String {
    let mut output = String::new();
    let prefix = namespace.map(|n| format!("{}_", n)).unwrap_or_default();

    for kind in DEVICE_FAMILIES {
        let mut series = snapshot.series(kind).peekable();
        if series.peek().is_none() {
            continue;
        }

        let name = format!("{}{}", prefix, kind.metric_name());
        output.push_str(&format!("# HELP {} {}\n", name, kind.help()));
        output.push_str(&format!("# TYPE {} gauge\n", name));
        for (device, value) in series {
            output.push_str(&format!(
                "{}{{name=\"{}\"}} {}\n",
                name,
                escape_label_value(&device_label(device)),
                format_value(value)
            ));
        }
    }

    if !snapshot.timestamps.is_empty() {
        let name = format!("{}{}", prefix, TIMESTAMP_METRIC);
        output.push_str(&format!("# HELP {} {}\n", name, TIMESTAMP_HELP));
        output.push_str(&format!("# TYPE {} gauge\n", name));
        for ts in &snapshot.timestamps {
            output.push_str(&format!(
                "{}{{location=\"{}\",source=\"{}\"}} {}\n",
                name,
                escape_label_value(&ts.location),
                escape_label_value(&ts.source),
                format_value(ts.value)
            ));
        }
    }

    output
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

/// Escape a label value for Prometheus format.
/// Backslash, double-quote, and newline must be escaped.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
