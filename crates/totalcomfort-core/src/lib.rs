//! Client library for the Total Connect Comfort thermostat portal.
//!
//! The portal is a cookie-authenticated web application; this crate wraps
//! its login form and JSON endpoints behind a typed API:
//!
//! ```no_run
//! use totalcomfort_core::{Attribute, Credentials, PortalClient};
//!
//! # async fn demo() -> Result<(), totalcomfort_core::PortalError> {
//! let mut client = PortalClient::new(Credentials::new("user@example.com", "secret"))?;
//! let mut session = client.login().await?;
//! client.list_devices(&mut session).await?;
//!
//! let mut device = session
//!     .default_device()
//!     .cloned()
//!     .expect("account has no devices");
//! let temp = client
//!     .get_attribute(&mut session, &mut device, Attribute::CurrentTemperature)
//!     .await?;
//! println!("{temp}");
//! # Ok(())
//! # }
//! ```
//!
//! Session expiry is handled inside the client: when the portal bounces a
//! request back to its login page (or answers 401/403), the client
//! re-authenticates once and replays the request, surfacing
//! [`PortalError::SessionExpired`] only when that single retry fails.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{PortalClient, PortalError, PORTAL_DOMAIN};
pub use auth::{CredentialStore, Credentials, Session};
pub use config::Config;
pub use models::{
    Attribute, AttributeValue, AttributeWrite, Device, EquipmentStatus, FanMode, Hold, Location,
    SystemMode,
};
