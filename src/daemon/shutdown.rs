use tokio::sync::watch;

/// Why the serve loop is asked to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(&'static str),
    Requested,
}

/// Owned by the serve loop; hands out cheap handles that only notify.
pub struct ShutdownCoordinator {
    tx: watch::Sender<Option<ShutdownReason>>,
    rx: watch::Receiver<Option<ShutdownReason>>,
}

#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<Option<ShutdownReason>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self { tx, rx }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.tx.clone(),
        }
    }

    /// Resolves with the first reason any handle reported.
    pub async fn wait(&mut self) -> ShutdownReason {
        loop {
            if let Some(reason) = *self.rx.borrow_and_update() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                return ShutdownReason::Requested;
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    /// First caller wins; later reasons are ignored.
    pub fn shutdown(&self, reason: ShutdownReason) {
        self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
    }
}
