//! Test server harness for integration tests.
//!
//! Spins up the real router, a host thread driving a headless scene, and the
//! same graceful shutdown path the binary uses, on a random port.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use viewsync_core::{DispatchQueue, HeadlessHandle, HeadlessHost, SyncState};
use viewsync_server::{routes, AppState, HostRuntime, Shutdown, ViewService};

/// Host tick used by tests.
const TICK: Duration = Duration::from_millis(5);

/// A test server instance with control handles.
pub struct TestServer {
    addr: SocketAddr,
    scene: HeadlessHandle,
    service: ViewService,
    client: reqwest::Client,
    runtime: Option<HostRuntime>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a new test server on a random available port.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or server fails to bind.
    pub async fn start() -> Self {
        let port = portpicker::pick_unused_port().expect("no available port");
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let host = HeadlessHost::new();
        let scene = host.handle();
        let sync = SyncState::new();
        let queue = DispatchQueue::new();
        let runtime = HostRuntime::spawn(move || Box::new(host), queue.clone(), sync.clone(), TICK)
            .expect("failed to start host thread");

        let service = ViewService::new(queue, sync, Shutdown::new());
        let app = routes::api_router(AppState::new(service.clone(), runtime.status()));

        let listener = TcpListener::bind(addr).await.expect("failed to bind");
        let actual_addr = listener.local_addr().expect("failed to get local addr");

        let graceful = {
            let service = service.clone();
            async move {
                service.shutdown().wait().await;
                service.begin_shutdown();
            }
        };
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
                .expect("server error");
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr: actual_addr,
            scene,
            service,
            client: reqwest::Client::new(),
            runtime: Some(runtime),
            handle,
        }
    }

    /// Get the server's socket address.
    #[allow(dead_code)]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:1234`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// The headless scene behind the host thread.
    pub fn scene(&self) -> &HeadlessHandle {
        &self.scene
    }

    /// The service (for shutdown checks).
    #[allow(dead_code)]
    pub fn service(&self) -> &ViewService {
        &self.service
    }

    /// HTTP client shared by helpers.
    #[allow(dead_code)]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Make one JSON-RPC call and return the whole response object.
    pub async fn call(&self, method: &str, params: Value) -> Value {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        self.client
            .post(self.url("/rpc"))
            .json(&body)
            .send()
            .await
            .expect("rpc request failed")
            .json()
            .await
            .expect("rpc response is not JSON")
    }

    /// Make one JSON-RPC call and return its `result`, panicking on an error.
    pub async fn call_ok(&self, method: &str, params: Value) -> Value {
        let response = self.call(method, params).await;
        assert!(
            response.get("error").is_none(),
            "{method} failed: {response}"
        );
        response["result"].clone()
    }

    /// Poll `check` until it holds or a second passes.
    pub async fn eventually(&self, mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// Gracefully shut down the server and the host thread.
    pub async fn shutdown(mut self) {
        self.service.shutdown().trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), &mut self.handle).await;
        self.service.sync().bus().close();
        if let Some(runtime) = self.runtime.take() {
            let _ = tokio::task::spawn_blocking(move || runtime.shutdown()).await;
        }
    }
}
