use crate::directory::DeviceDirectory;
use crate::relay::RelayFacade;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay entry point
    pub relay: RelayFacade,

    /// Device listing source
    pub directory: Arc<dyn DeviceDirectory>,
}

impl AppState {
    pub fn new(relay: RelayFacade, directory: Arc<dyn DeviceDirectory>) -> Self {
        Self { relay, directory }
    }
}
