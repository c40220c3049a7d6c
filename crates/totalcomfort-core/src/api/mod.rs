//! Client module for the Total Connect Comfort portal.
//!
//! This module provides the `PortalClient` for authenticating against the
//! portal and reading/writing thermostat state.
//!
//! The portal uses a cookie-scoped web session obtained through its login
//! form; data endpoints speak JSON.

pub mod client;
pub mod error;

pub use client::{PortalClient, PORTAL_DOMAIN};
pub use error::PortalError;
