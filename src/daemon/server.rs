use super::managed::ManagedDaemon;
use super::methods::MethodTable;
use super::protocol::{Fault, RpcRequest, RpcResponse};
use super::registry;
use super::shutdown::{ShutdownCoordinator, ShutdownHandle, ShutdownReason};
use super::supervisor::Supervisor;
use crate::config::{DaemonRole, SupervisorConfig};
use crate::logging;
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// JSON-RPC endpoint of the master daemon.
pub struct ControlServer {
    table: Arc<MethodTable>,
}

impl ControlServer {
    pub fn new(table: MethodTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(rpc_handler))
            .route("/{*path}", post(rpc_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.table))
    }

    /// Serve until `shutdown` fires, letting in-flight calls finish.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownCoordinator,
    ) -> std::io::Result<ShutdownReason> {
        let (reason_tx, reason_rx) = oneshot::channel();
        let graceful = async move {
            let _ = reason_tx.send(shutdown.wait().await);
        };
        axum::serve(listener, self.router())
            .with_graceful_shutdown(graceful)
            .await?;
        Ok(reason_rx.await.unwrap_or(ShutdownReason::Requested))
    }
}

async fn rpc_handler(State(table): State<Arc<MethodTable>>, body: Bytes) -> Json<RpcResponse> {
    Json(dispatch(&table, &body).await)
}

/// Decode one request body and run the named method.
pub async fn dispatch(table: &MethodTable, body: &[u8]) -> RpcResponse {
    let value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => return RpcResponse::failure(Value::Null, Fault::parse_error(e)),
    };
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => return RpcResponse::failure(id, Fault::invalid_request(e)),
    };
    if request.jsonrpc.as_deref().is_some_and(|v| v != "2.0") {
        return RpcResponse::failure(id, Fault::invalid_request("jsonrpc must be \"2.0\""));
    }

    debug!("RPC call {} (id {})", request.method, id);
    match table.call(&request.method, request.params).await {
        Ok(result) => RpcResponse::success(id, result),
        Err(fault) => {
            debug!("RPC call {} failed: {}", request.method, fault.message);
            RpcResponse::failure(id, fault)
        }
    }
}

/// Forward SIGTERM, SIGTSTP and SIGINT to `handle`.
pub fn install_signal_handlers(handle: ShutdownHandle) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigtstp = signal(SignalKind::from_raw(libc::SIGTSTP))?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigtstp.recv() => "SIGTSTP",
            _ = sigint.recv() => "SIGINT",
        };
        handle.shutdown(ShutdownReason::Signal(name));
    });
    Ok(())
}

/// Body of the `serve` mode: own the master daemon reservation and answer
/// RPC calls until a termination signal arrives. Sets up daemon logging once
/// the reservation is held.
pub async fn run_master_daemon(config: Arc<SupervisorConfig>) -> Result<()> {
    // Handlers go in first: once the tag is held, `stop` may signal us.
    let shutdown = ShutdownCoordinator::new();
    install_signal_handlers(shutdown.handle())?;

    let identity = ManagedDaemon::from_config(&config, DaemonRole::Supervisor);
    let _reservation = registry::reserve(&identity.tag)?;
    // Only the holder may rotate the shared log file.
    logging::init_daemon_logging(&config)?;

    let addr = format!("0.0.0.0:{}", config.master_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Started master daemon (port {})", config.master_port);

    let table = MethodTable::for_supervisor(Arc::new(Supervisor::new(Arc::clone(&config))))?;
    match ControlServer::new(table).serve(listener, shutdown).await? {
        ShutdownReason::Signal(name) => info!("Got signal {}, exiting.", name),
        ShutdownReason::Requested => info!("Shutdown requested, exiting."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::methods::{handler, MethodTableBuilder, RpcResult};
    use crate::daemon::protocol::{INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};
    use serde_json::json;

    fn echo_table() -> MethodTable {
        MethodTableBuilder::new()
            .register(
                "echo",
                handler(|params| async move {
                    RpcResult::Ok(serde_json::to_value(params).unwrap())
                }),
            )
            .unwrap()
            .finish()
            .unwrap()
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let response = dispatch(&echo_table(), b"{not json").await;
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
        assert_eq!(response.id, Value::Null);
    }

    #[tokio::test]
    async fn request_without_method_is_invalid() {
        let response = dispatch(&echo_table(), br#"{"jsonrpc":"2.0","id":4}"#).await;
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
        assert_eq!(response.id, json!(4));
    }

    #[tokio::test]
    async fn unknown_method_keeps_request_id() {
        let response = dispatch(
            &echo_table(),
            br#"{"jsonrpc":"2.0","id":"a","method":"nope"}"#,
        )
        .await;
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
        assert_eq!(response.id, json!("a"));
    }

    #[tokio::test]
    async fn serves_over_http_until_requested_to_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = ShutdownCoordinator::new();
        let handle = shutdown.handle();
        let server = tokio::spawn(ControlServer::new(echo_table()).serve(listener, shutdown));

        let response: RpcResponse = reqwest::Client::new()
            .post(format!("http://{}/", addr))
            .json(&json!({"jsonrpc": "2.0", "id": 1, "method": "echo", "params": [1, "two"]}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!([1, "two"])));

        let methods: RpcResponse = reqwest::Client::new()
            .post(format!("http://{}/RPC2", addr))
            .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "get_methods"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(methods.result, Some(json!(["echo", "get_methods"])));

        handle.shutdown(ShutdownReason::Requested);
        let reason = server.await.unwrap().unwrap();
        assert_eq!(reason, ShutdownReason::Requested);
    }
}
