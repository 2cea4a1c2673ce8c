// SensorBridge Daemon - Gateway service with HTTP status and metrics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # SensorBridge Daemon
//!
//! Runs the ingestion gateway and exposes its state over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Simulated sensor network, industrial thresholds
//! sensorbridge-daemon --simulate --preset industrial
//!
//! # Real UART device, JSON configuration
//! sensorbridge-daemon --config gateway.json --uart-device /dev/ttyUSB0 --port 9090
//! ```

mod error;
mod metrics;
mod readers;

#[cfg(feature = "simulation")]
mod simulation;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use error::Result;
use serde::{Deserialize, Serialize};
use sensorbridge_gateway::{Gateway, GatewayConfig, GatewayHandle, Preset, DEFAULT_RECENT_RESULTS};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// SensorBridge gateway daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deployment preset (home, industrial, agricultural, edge_ai); ignored with --config
    #[arg(long)]
    preset: Option<Preset>,

    /// Override the gateway identifier
    #[arg(short, long)]
    gateway_id: Option<String>,

    /// HTTP port to listen on
    #[arg(short, long, default_value = "9100")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Feed the gateway from simulated UART, SPI and I2C devices
    #[arg(long)]
    simulate: bool,

    /// Seed for the simulated devices
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Serial device for the UART reader (overrides the configuration)
    #[arg(long)]
    uart_device: Option<String>,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolve the gateway configuration from the command line.
fn load_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = match (&args.config, args.preset) {
        (Some(path), _) => GatewayConfig::from_file(path)?,
        (None, Some(preset)) => GatewayConfig::preset(preset, GatewayConfig::default().gateway_id),
        (None, None) => GatewayConfig::default(),
    };
    if let Some(gateway_id) = &args.gateway_id {
        config.gateway_id = gateway_id.clone();
    }
    if let Some(device) = &args.uart_device {
        config.uart_device = device.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Log-only forwarding sinks.
fn wire_sinks(gateway: &Gateway) {
    gateway.on_mqtt(|topic, payload| {
        debug!(target: "sensorbridge::mqtt", "{} {}", topic, payload);
        Ok(())
    });
    gateway.on_websocket(|payload| {
        debug!(target: "sensorbridge::websocket", "{}", payload);
        Ok(())
    });
    gateway.on_alert(|category, text, _alert| {
        warn!(target: "sensorbridge::alerts", "[{}] {}", category, text);
    });
}

fn build_gateway(args: &Args, config: GatewayConfig) -> Result<Gateway> {
    let mut gateway = Gateway::new(config)?;

    if args.simulate {
        attach_simulation(&mut gateway, args.seed)?;
    } else {
        readers::attach_serial(&mut gateway)?;
        readers::attach_buses(&mut gateway)?;
    }

    wire_sinks(&gateway);
    Ok(gateway)
}

#[cfg(feature = "simulation")]
fn attach_simulation(gateway: &mut Gateway, seed: u64) -> Result<()> {
    let sim = simulation::SimulationConfig {
        seed,
        ..Default::default()
    };
    simulation::attach_simulated(gateway, &sim)
}

#[cfg(not(feature = "simulation"))]
fn attach_simulation(_gateway: &mut Gateway, _seed: u64) -> Result<()> {
    Err(error::DaemonError::SimulationUnavailable)
}

fn router(handle: GatewayHandle) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/sensors", get(sensors_handler))
        .route("/sensors/:id", get(sensor_handler))
        .route("/analytics", get(analytics_handler))
        .route("/aggregate", post(aggregate_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(handle)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutdown requested");
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    info!(
        "Gateway {} at {} ({} workers, queue {})",
        config.gateway_id, config.location, config.worker_thread_count, config.max_queue_size
    );

    let mut gateway = build_gateway(&args, config)?;
    gateway.initialize()?;
    gateway.start()?;

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!("Starting server on http://{}", addr);
    info!("Metrics endpoint: http://{}/metrics", addr);

    let served = async {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router(gateway.handle()))
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
    .await;

    gateway.stop();
    info!("Final status: {}", gateway.status().summary());
    served?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!("SensorBridge Daemon v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Root handler - shows a simple HTML page.
async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>SensorBridge Daemon</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
        h1 { color: #2c3e50; }
        a { color: #3498db; text-decoration: none; }
        .endpoints { background: #f8f9fa; padding: 20px; border-radius: 8px; margin: 20px 0; }
        .endpoint { margin: 10px 0; }
        code { background: #e9ecef; padding: 2px 6px; border-radius: 4px; }
    </style>
</head>
<body>
    <h1>SensorBridge Daemon</h1>
    <p>Gateway sensor ingestion for UART, SPI and I2C links.</p>

    <div class="endpoints">
        <h2>Endpoints</h2>
        <div class="endpoint"><a href="/health">/health</a> - Health check</div>
        <div class="endpoint"><a href="/status">/status</a> - Gateway status (JSON)</div>
        <div class="endpoint"><a href="/sensors">/sensors</a> - Per-sensor statistics (JSON)</div>
        <div class="endpoint"><code>/sensors/&lt;id&gt;</code> - One sensor's statistics</div>
        <div class="endpoint"><a href="/analytics">/analytics</a> - Recent edge analysis results</div>
        <div class="endpoint"><code>POST /aggregate</code> - Force an aggregation sweep</div>
        <div class="endpoint"><a href="/metrics">/metrics</a> - Prometheus metrics</div>
    </div>
</body>
</html>"#,
    )
}

/// 200 while the gateway is running, 503 otherwise.
async fn health_handler(State(handle): State<GatewayHandle>) -> impl IntoResponse {
    if handle.is_running() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, handle.state().as_str())
    }
}

async fn status_handler(State(handle): State<GatewayHandle>) -> impl IntoResponse {
    Json(handle.status())
}

async fn sensors_handler(State(handle): State<GatewayHandle>) -> impl IntoResponse {
    Json(handle.all_statistics())
}

async fn sensor_handler(
    State(handle): State<GatewayHandle>,
    Path(sensor_id): Path<String>,
) -> Response {
    match handle.sensor_statistics(&sensor_id) {
        Some(stats) => Json(stats).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            format!("unknown sensor '{}'", sensor_id),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct AnalyticsQuery {
    count: Option<usize>,
}

async fn analytics_handler(
    State(handle): State<GatewayHandle>,
    Query(query): Query<AnalyticsQuery>,
) -> impl IntoResponse {
    let count = query.count.unwrap_or(DEFAULT_RECENT_RESULTS);
    Json(handle.recent_edge_results(count))
}

#[derive(Debug, Serialize)]
struct AggregateResponse {
    aggregates: usize,
}

async fn aggregate_handler(State(handle): State<GatewayHandle>) -> impl IntoResponse {
    let aggregates = handle.trigger_aggregation();
    info!("Manual aggregation forwarded {} aggregates", aggregates);
    Json(AggregateResponse { aggregates })
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(handle): State<GatewayHandle>) -> Response {
    metrics::update_gateway_metrics(&handle.status());
    metrics::update_sensor_metrics(&handle.all_statistics());
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("{}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaemonError;
    use std::io::Write;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["sensorbridge-daemon"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_args() {
        let args = args(&[]);
        assert_eq!(args.port, 9100);
        assert_eq!(args.seed, 42);
        assert!(!args.simulate);
        assert!(args.preset.is_none());
    }

    #[test]
    fn test_preset_and_overrides() {
        let args = args(&[
            "--preset",
            "industrial",
            "--gateway-id",
            "gw-plant",
            "--uart-device",
            "/dev/ttyUSB0",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.gateway_id, "gw-plant");
        assert_eq!(config.location, "Industrial");
        assert_eq!(config.worker_thread_count, 8);
        assert_eq!(config.uart_device, "/dev/ttyUSB0");
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let argv = ["sensorbridge-daemon", "--preset", "lunar"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut config = GatewayConfig::with_gateway_id("gw-file");
        config.temp_alert_high = 31.5;
        file.write_all(config.to_json().unwrap().as_bytes()).unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let loaded = load_config(&args(&["--config", &path, "--preset", "home"])).unwrap();
        assert_eq!(loaded.gateway_id, "gw-file");
        assert_eq!(loaded.temp_alert_high, 31.5);
    }

    #[test]
    fn test_invalid_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert!(matches!(
            load_config(&args(&["--config", &path])),
            Err(DaemonError::Gateway(_))
        ));
    }
}
