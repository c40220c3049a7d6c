//! Data models for portal entities.
//!
//! - `Location`, `Device`: the account's thermostat inventory
//! - `DeviceState` (`UiData`/`FanData`): a device's remote state payload
//! - `attribute`: the fixed attribute set and its value domains

pub mod attribute;
pub mod device;
pub mod location;

pub use attribute::{
    format_number, Attribute, AttributeValue, AttributeWrite, EquipmentStatus, FanMode, Hold,
    HoldStatus, SystemMode,
};
pub use device::{Device, DeviceState, FanData, UiData};
pub use location::Location;
