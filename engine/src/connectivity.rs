//! Network reachability signal.
//!
//! The reconciler samples [`ConnectivityProvider::is_online`] once at the
//! start of a pass and never again during it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Answers "can we reach the server right now?".
pub trait ConnectivityProvider: Send + Sync {
    fn is_online(&self) -> bool;
}

/// A fixed answer, for tests and one-shot tools that check once up front.
#[derive(Debug, Clone, Copy)]
pub struct StaticConnectivity(pub bool);

impl ConnectivityProvider for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.0
    }
}

/// Shared flag flipped by whatever watches the network.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityFlag {
    online: Arc<AtomicBool>,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl ConnectivityProvider for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

impl ConnectivityProvider for watch::Receiver<bool> {
    fn is_online(&self) -> bool {
        *self.borrow()
    }
}
