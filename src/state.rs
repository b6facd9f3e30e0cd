use std::sync::Arc;

use crate::config::Config;
use crate::coordinator::RoomCoordinator;
use crate::relay::RelayNotifier;
use crate::store::RoomStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RoomStore>,
    pub coordinator: Arc<RoomCoordinator>,
    pub relay: Arc<RelayNotifier>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RoomStore>, relay: RelayNotifier) -> Self {
        let coordinator = RoomCoordinator::new(store.clone(), &config);
        Self {
            config: Arc::new(config),
            store,
            coordinator: Arc::new(coordinator),
            relay: Arc::new(relay),
        }
    }
}
