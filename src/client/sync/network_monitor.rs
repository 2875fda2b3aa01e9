//! # Network Monitor
//!
//! Boolean connectivity signal with change notifications. The platform layer
//! calls [`NetworkMonitor::set_online`]; the service layer reads it to decide
//! whether a failure is expected, and the background sync task subscribes to
//! it to flush queued writes on reconnect.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(self) -> bool {
        self == NetworkStatus::Online
    }
}

/// Shared connectivity handle; clones observe the same signal
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    status: Arc<watch::Sender<NetworkStatus>>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let initial = if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };
        let (status, _) = watch::channel(initial);
        Self {
            status: Arc::new(status),
        }
    }

    pub fn get_status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.get_status().is_online()
    }

    /// Record a connectivity change. Returns true if the status changed.
    pub fn set_online(&self, online: bool) -> bool {
        let next = if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };
        let changed = self.status.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::info!("Network is now {:?}", next);
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
