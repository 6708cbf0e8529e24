//! Realm registrar library crate.
//!
//! Manages OAuth clients in an identity provider through Dynamic Client
//! Registration (RFC 7591/7592), renewing registration access tokens through the
//! provider's administrative API, and guards realm creation with a Kubernetes
//! validating admission webhook.

pub mod admin;
pub mod admission;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod http;
pub mod registration;
pub mod transport;
