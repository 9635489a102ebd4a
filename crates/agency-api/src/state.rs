//! # Application State
//!
//! Shared state passed to every handler via the `State` extractor. Holds
//! the storage engine and the settlement services built on it. The gateway
//! services are optional: without gateway configuration the token and
//! callback endpoints answer 503.

use std::sync::Arc;

use agency_gateway::GatewayClient;
use agency_settlement::{
    CallbackReconciler, PaymentTokenIssuer, RefundService, SaleCoordinator, SaleNotifier,
    TenancyService, TracingNotifier,
};
use agency_store::{MemoryStore, StoreHandle};

use crate::auth::SecretToken;

const DEFAULT_PORT: u16 = 8080;

/// Process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Static bearer secret. `None` disables authentication.
    pub auth_token: Option<SecretToken>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            auth_token: None,
        }
    }
}

impl AppConfig {
    /// Read `PORT` and `AUTH_TOKEN`.
    pub fn from_env() -> Self {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "PORT is not a valid port, using {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            Err(_) => DEFAULT_PORT,
        };
        let auth_token = std::env::var("AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretToken::new);
        if auth_token.is_none() {
            tracing::warn!("AUTH_TOKEN not set, every caller is treated as admin");
        }
        Self { port, auth_token }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: StoreHandle,
    pub tenancy: TenancyService,
    pub sales: SaleCoordinator,
    pub refunds: RefundService,
    pub tokens: Option<PaymentTokenIssuer>,
    pub callbacks: Option<CallbackReconciler>,
}

impl AppState {
    /// In-memory engine, default config, no gateway.
    pub fn new() -> Self {
        Self::with_store(AppConfig::default(), Arc::new(MemoryStore::new()), None)
    }

    pub fn with_store(config: AppConfig, store: StoreHandle, gateway: Option<GatewayClient>) -> Self {
        Self::with_notifier(config, store, gateway, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(
        config: AppConfig,
        store: StoreHandle,
        gateway: Option<GatewayClient>,
        notifier: Arc<dyn SaleNotifier>,
    ) -> Self {
        let callbacks = gateway
            .as_ref()
            .map(|g| CallbackReconciler::new(store.clone(), g.signer().clone()));
        let tokens = gateway.map(|g| PaymentTokenIssuer::new(store.clone(), g));
        Self {
            config,
            tenancy: TenancyService::new(store.clone()),
            sales: SaleCoordinator::new(store.clone(), notifier),
            refunds: RefundService::new(store.clone()),
            tokens,
            callbacks,
            store,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_has_no_gateway() {
        let state = AppState::new();
        assert!(state.tokens.is_none());
        assert!(state.callbacks.is_none());
        assert_eq!(state.store.engine(), "memory");
        assert_eq!(state.config.port, 8080);
    }

    #[test]
    fn config_debug_redacts_token() {
        let config = AppConfig {
            port: 9000,
            auth_token: Some(SecretToken::new("hunter2")),
        };
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
