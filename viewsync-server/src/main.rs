//! # viewsync
//!
//! View synchronization server between an external lineage-tracking tool and
//! a 3D viewer. Binds to localhost by default.

use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use viewsync_core::{DispatchQueue, HeadlessHost, SceneHost, SyncState};
use viewsync_server::config::CliArgs;
use viewsync_server::{metrics, routes, AppState, HostRuntime, Shutdown, ViewService};

/// Build a CORS layer that only allows localhost origins.
fn build_cors_layer(port: u16) -> CorsLayer {
    let localhost_origins = [
        format!("http://localhost:{port}"),
        format!("http://127.0.0.1:{port}"),
    ];

    let origins: Vec<HeaderValue> = localhost_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels.
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,viewsync_server=debug,viewsync_core=debug,tower_http=debug")
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_tracing();

    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to initialize Prometheus metrics: {}", e))?;
    tracing::info!("Prometheus metrics initialized");

    let sync = SyncState::new();
    let queue = DispatchQueue::new();
    let shutdown = Shutdown::new();

    // No viewer process is embedded; the headless scene stands in for it.
    let runtime = HostRuntime::spawn(
        || Box::new(HeadlessHost::new()) as Box<dyn SceneHost>,
        queue.clone(),
        sync.clone(),
        args.tick_interval(),
    )
    .context("failed to start host thread")?;

    let service = ViewService::new(queue, sync.clone(), shutdown.clone());
    let event_counter = metrics::spawn_event_counter(sync.bus());
    let state = AppState::new(service.clone(), runtime.status());

    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let app = routes::api_router(state)
        .merge(metrics_router)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(build_cors_layer(args.port))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let addr = args.socket_addr();
    if !addr.ip().is_loopback() {
        tracing::warn!(%addr, "Binding to a non-loopback address");
    }
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("viewsync {} listening on http://{}", viewsync_core::VERSION, addr);

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        ctrl_c.trigger();
    });

    let graceful = {
        let service = service.clone();
        async move {
            service.shutdown().wait().await;
            service.begin_shutdown();
        }
    };
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(graceful)
            .await
    });

    tokio::select! {
        result = &mut server => {
            result.context("server task failed")??;
        }
        () = shutdown.wait() => {
            wait_for_server(server, args.shutdown_grace()).await?;
        }
    }

    sync.bus().close();
    let _ = event_counter.await;
    tokio::task::spawn_blocking(move || runtime.shutdown())
        .await
        .context("host thread shutdown failed")?;

    tracing::info!("viewsync stopped");
    Ok(())
}

/// Give in-flight calls `grace` to finish, then stop the server.
async fn wait_for_server(
    mut server: tokio::task::JoinHandle<std::io::Result<()>>,
    grace: Duration,
) -> anyhow::Result<()> {
    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => {
            result.context("server task failed")??;
        }
        Err(_) => {
            tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, forcing stop");
            server.abort();
        }
    }
    Ok(())
}

/// Prometheus metrics endpoint.
#[tracing::instrument(name = "metrics", skip(handle))]
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
