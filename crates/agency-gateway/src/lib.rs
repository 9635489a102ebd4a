//! # agency-gateway -- Payment Gateway Client
//!
//! Everything that crosses the boundary to the external card gateway:
//!
//! - **Token request** ([`GatewayClient::request_token`]): a signed form
//!   POST that returns a one-time payment token. Pure outbound call; no
//!   local state changes, safe to retry.
//! - **Order ids** ([`order_id`]): the gateway accepts only alphanumerics,
//!   so sale UUIDs travel without hyphens and are restored on the way back.
//! - **Callbacks** ([`CallbackPayload`]): the inbound webhook body and its
//!   hash verification.
//!
//! The signed string layouts are fixed by the gateway and are documented in
//! [`signature`].

pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod order_id;
pub mod request;
pub(crate) mod retry;
pub mod signature;

pub use callback::{CallbackPayload, CALLBACK_ACK};
pub use client::{GatewayClient, PaymentToken};
pub use config::{ConfigError, GatewayConfig};
pub use error::GatewayError;
pub use request::{BasketItem, TokenRequest};
pub use signature::Signer;
