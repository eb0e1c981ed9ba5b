pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod routes;
pub mod store;

use std::sync::Arc;

use auth::tokens::TokenVerifier;
use config::Config;
use gateway::handler::ChatGateway;
use notify::NotificationDispatcher;
use store::Stores;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<TokenVerifier>,
    pub stores: Stores,
    pub gateway: Arc<ChatGateway>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        let tokens = Arc::new(TokenVerifier::new(config.jwt_secret.as_deref()));
        let gateway = Arc::new(ChatGateway::new(stores.clone(), notifier, &config));
        Self {
            config: Arc::new(config),
            tokens,
            stores,
            gateway,
        }
    }
}
