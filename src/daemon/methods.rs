//! Remotely callable operations of the master daemon.
//!
//! Each operation is registered once, under a unique name, wrapped in the
//! invocation-logging middleware. `get_methods` is always registered last so
//! its listing covers the whole table, itself included.

use super::protocol::{Fault, Params};
use super::supervisor::Supervisor;
use crate::config::DaemonRole;
use crate::error::{Result, SupervisorError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

pub type RpcResult = std::result::Result<Value, Fault>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = RpcResult> + Send>>;
pub type Handler = Arc<dyn Fn(Params) -> HandlerFuture + Send + Sync>;

/// Every operation the control plane exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    CheckConnectivity,
    Add,
    GetTrexPath,
    UpdateTrex,
    IsRunning(DaemonRole),
    Start(DaemonRole),
    Stop(DaemonRole),
    Restart(DaemonRole),
    GetMethods,
}

const REMOTE_ROLES: [DaemonRole; 2] = [DaemonRole::Worker, DaemonRole::Proxy];

impl Method {
    /// Operations backed by the supervisor, in registration order.
    pub fn operations() -> Vec<Method> {
        let mut methods = vec![
            Self::CheckConnectivity,
            Self::Add,
            Self::GetTrexPath,
            Self::UpdateTrex,
        ];
        for role in REMOTE_ROLES {
            methods.extend([
                Self::IsRunning(role),
                Self::Start(role),
                Self::Stop(role),
                Self::Restart(role),
            ]);
        }
        methods
    }

    pub fn name(&self) -> String {
        match self {
            Self::CheckConnectivity => "check_connectivity".to_string(),
            Self::Add => "add".to_string(),
            Self::GetTrexPath => "get_trex_path".to_string(),
            Self::UpdateTrex => "update_trex".to_string(),
            Self::IsRunning(role) => format!("is_{}_running", rpc_stem(*role)),
            Self::Start(role) => format!("start_{}", rpc_stem(*role)),
            Self::Stop(role) => format!("stop_{}", rpc_stem(*role)),
            Self::Restart(role) => format!("restart_{}", rpc_stem(*role)),
            Self::GetMethods => "get_methods".to_string(),
        }
    }
}

fn rpc_stem(role: DaemonRole) -> &'static str {
    match role {
        DaemonRole::Supervisor => "master_daemon",
        DaemonRole::Worker => "trex_daemon",
        DaemonRole::Proxy => "stl_rpc_proxy",
    }
}

/// Name to handler mapping, fixed once the server starts.
pub struct MethodTable {
    handlers: HashMap<String, Handler>,
    names: Vec<String>,
}

#[derive(Default)]
pub struct MethodTableBuilder {
    handlers: HashMap<String, Handler>,
    names: Vec<String>,
}

impl MethodTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, handler: Handler) -> Result<Self> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(SupervisorError::Configuration(format!(
                "method '{}' registered twice",
                name
            )));
        }
        self.handlers
            .insert(name.clone(), with_invocation_log(name.clone(), handler));
        self.names.push(name);
        Ok(self)
    }

    /// Register `get_methods` and freeze the table.
    pub fn finish(self) -> Result<MethodTable> {
        let mut names = self.names.clone();
        names.push(Method::GetMethods.name());
        let listing = json!(names);
        let builder = self.register(
            Method::GetMethods.name(),
            handler(move |_| {
                let listing = listing.clone();
                async move { RpcResult::Ok(listing) }
            }),
        )?;
        Ok(MethodTable {
            handlers: builder.handlers,
            names: builder.names,
        })
    }
}

impl MethodTable {
    /// Table of every supervisor operation plus `get_methods`.
    pub fn for_supervisor(supervisor: Arc<Supervisor>) -> Result<Self> {
        let mut builder = MethodTableBuilder::new();
        for method in Method::operations() {
            if let Some(h) = handler_for(&supervisor, method) {
                builder = builder.register(method.name(), h)?;
            }
        }
        builder.finish()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub async fn call(&self, method: &str, params: Params) -> RpcResult {
        match self.handlers.get(method) {
            Some(handler) => handler(params).await,
            None => Err(Fault::method_not_found(method)),
        }
    }
}

/// Log "<name>, <args>" at INFO before the handler runs.
fn with_invocation_log(name: String, inner: Handler) -> Handler {
    Arc::new(move |params: Params| {
        if params.is_empty() {
            info!("{}", name);
        } else {
            info!("{}, {}", name, params);
        }
        inner(params)
    })
}

pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult> + Send + 'static,
{
    Arc::new(move |params| Box::pin(f(params)))
}

/// `None` for `get_methods`, which the table serves itself.
fn handler_for(supervisor: &Arc<Supervisor>, method: Method) -> Option<Handler> {
    let sup = Arc::clone(supervisor);
    let h = match method {
        Method::CheckConnectivity => handler(|_| check_connectivity()),
        Method::Add => handler(|params| async move { add(&params) }),
        Method::GetTrexPath => handler(move |_| get_trex_path(Arc::clone(&sup))),
        Method::UpdateTrex => handler(move |params| update_trex(Arc::clone(&sup), params)),
        Method::IsRunning(role) => handler(move |_| is_running(Arc::clone(&sup), role)),
        Method::Start(role) => handler(move |_| start(Arc::clone(&sup), role)),
        Method::Stop(role) => handler(move |_| stop(Arc::clone(&sup), role)),
        Method::Restart(role) => handler(move |_| restart(Arc::clone(&sup), role)),
        Method::GetMethods => return None,
    };
    Some(h)
}

async fn check_connectivity() -> RpcResult {
    Ok(json!(true))
}

async fn get_trex_path(sup: Arc<Supervisor>) -> RpcResult {
    Ok(json!(sup.trex_path().display().to_string()))
}

async fn update_trex(sup: Arc<Supervisor>, params: Params) -> RpcResult {
    let package = params.optional_str(0, "package_path")?;
    sup.update_trex(package.as_deref()).await?;
    Ok(json!(true))
}

async fn is_running(sup: Arc<Supervisor>, role: DaemonRole) -> RpcResult {
    let running = sup.controller(role)?.is_running();
    Ok(json!(running))
}

async fn start(sup: Arc<Supervisor>, role: DaemonRole) -> RpcResult {
    sup.controller(role)?.start().await?;
    Ok(json!(true))
}

async fn stop(sup: Arc<Supervisor>, role: DaemonRole) -> RpcResult {
    sup.controller(role)?.stop().await?;
    Ok(json!(true))
}

async fn restart(sup: Arc<Supervisor>, role: DaemonRole) -> RpcResult {
    sup.controller(role)?.restart().await?;
    Ok(json!(true))
}

fn add(params: &Params) -> RpcResult {
    let a = params.required(0, "a")?;
    let b = params.required(1, "b")?;
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x
            .checked_add(y)
            .map(|sum| json!(sum))
            .ok_or_else(|| Fault::invalid_params("integer overflow"));
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => Ok(json!(x + y)),
        _ => Err(Fault::invalid_params(format!(
            "'add' expects two numbers, got {} and {}",
            a, b
        ))),
    }
}
