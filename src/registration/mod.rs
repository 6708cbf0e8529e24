//! Dynamic client registration against the identity provider.

pub mod client;
pub mod types;

pub use client::RegistrationClient;
pub use types::{
    ClientAuthMethod, ClientInformation, ClientMetadata, GrantType, Operation, ResponseType,
};
