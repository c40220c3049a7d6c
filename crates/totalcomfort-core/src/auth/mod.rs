//! Authentication types: caller-owned credentials, the keychain-backed
//! credential store, and the portal session.
//!
//! The session itself is an explicit value returned by
//! [`PortalClient::login`](crate::api::PortalClient::login) and passed to
//! every operation - there is no ambient logged-in state.

pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, Credentials};
pub use session::Session;
