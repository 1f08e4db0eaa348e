//! Daemon supervision and the master daemon's control plane.
//!
//! Whether a daemon runs is decided by a single source of truth: the
//! exclusivity registry. Every daemon reserves a well-known tag for its
//! whole lifetime, so "running" means "the tag is held".
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │          master daemon (serve mode)           │
//! ├──────────────────────────────────────────────┤
//! │  ControlServer  │  MethodTable  │  Updater    │
//! │  (JSON-RPC)     │  (logged)     │ (tx + undo) │
//! ├──────────────────────────────────────────────┤
//! │  LifecycleController × 2 → hold → worker/proxy│
//! └──────────────────────────────────────────────┘
//! ```

pub mod launcher;
pub mod lifecycle;
pub mod managed;
pub mod methods;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod supervisor;

pub use lifecycle::{with_retry, DaemonAction, LifecycleController, RETRY_DELAY};
pub use managed::{ManagedDaemon, StartCommand};
pub use methods::{Method, MethodTable};
pub use protocol::{Fault, Params, RpcRequest, RpcResponse};
pub use server::{run_master_daemon, ControlServer};
pub use shutdown::{ShutdownCoordinator, ShutdownHandle, ShutdownReason};
pub use supervisor::Supervisor;
