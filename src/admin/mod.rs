//! Administrative API access.

pub mod client;
pub mod types;

pub use client::{AdminClient, AdminCredentials};
pub use types::ClientRepresentation;
