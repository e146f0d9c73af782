//! Connectivity signal consulted before a cycle touches the network.

use tokio::sync::watch;

/// Whether the device currently believes it can reach the server.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity that never reports offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Connectivity flag fed by the platform's network callbacks.
///
/// Observers can watch transitions, for example to trigger a sync as soon as
/// the device comes back online.
#[derive(Debug)]
pub struct NetworkStatus {
    tx: watch::Sender<bool>,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx }
    }

    /// Record a connectivity change. Returns the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.tx.send_replace(online);
        if previous != online {
            tracing::info!(online, "Connectivity changed");
        }
        previous
    }

    /// Watch connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for NetworkStatus {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}
