use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Source of the online/offline signal the engine consults before each send.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Connectivity flag flipped by whatever watches the network.
/// Clones share the same flag.
#[derive(Clone, Debug)]
pub struct ConnectivityFlag(Arc<AtomicBool>);

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        ConnectivityFlag(Arc::new(AtomicBool::new(online)))
    }

    pub fn set_online(&self, online: bool) {
        let was = self.0.swap(online, Ordering::SeqCst);
        if was != online {
            tracing::info!(online = online, "Connectivity changed");
        }
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
