use std::sync::Arc;

use sqlx::{Pool, Postgres};

use crate::config::Config;
use crate::services::NotificationService;
use crate::websocket::{ConnectionRegistry, PushDelivery};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub registry: ConnectionRegistry,
    pub notifications: Arc<NotificationService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Pool<Postgres>, config: Config) -> Self {
        let registry = ConnectionRegistry::new();
        // The notification side sees the registry only as a push capability.
        let push: Arc<dyn PushDelivery> = Arc::new(registry.clone());
        let notifications = Arc::new(NotificationService::new(db.clone(), push));

        Self {
            db,
            registry,
            notifications,
            config: Arc::new(config),
        }
    }
}
