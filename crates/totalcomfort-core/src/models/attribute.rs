//! Attribute names and value domains for thermostat state.
//!
//! The portal encodes modes as positional indexes and hold deadlines as
//! quarter-hours since midnight. The tables here are the vendor's wire
//! contract; the enums are the typed surface the rest of the crate uses.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};

use crate::api::PortalError;

/// Fan operating mode, wire-encoded as its index position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    Auto,
    On,
    Circulate,
    FollowSchedule,
}

impl FanMode {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(FanMode::Auto),
            1 => Some(FanMode::On),
            2 => Some(FanMode::Circulate),
            3 => Some(FanMode::FollowSchedule),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            FanMode::Auto => 0,
            FanMode::On => 1,
            FanMode::Circulate => 2,
            FanMode::FollowSchedule => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FanMode::Auto => "auto",
            FanMode::On => "on",
            FanMode::Circulate => "circulate",
            FanMode::FollowSchedule => "follow schedule",
        }
    }
}

impl fmt::Display for FanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanMode {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(FanMode::Auto),
            "on" => Ok(FanMode::On),
            "circulate" => Ok(FanMode::Circulate),
            "follow schedule" | "followschedule" => Ok(FanMode::FollowSchedule),
            other => Err(PortalError::InvalidValue(format!(
                "unknown fan mode '{other}' (expected auto, on, circulate, or follow schedule)"
            ))),
        }
    }
}

/// System switch position, wire-encoded as its index position.
///
/// The portal also reports index 5 for some auto-capable models; it is an
/// alias for auto and accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMode {
    EmHeat,
    Heat,
    Off,
    Cool,
    Auto,
}

impl SystemMode {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(SystemMode::EmHeat),
            1 => Some(SystemMode::Heat),
            2 => Some(SystemMode::Off),
            3 => Some(SystemMode::Cool),
            4 | 5 => Some(SystemMode::Auto),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            SystemMode::EmHeat => 0,
            SystemMode::Heat => 1,
            SystemMode::Off => 2,
            SystemMode::Cool => 3,
            SystemMode::Auto => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SystemMode::EmHeat => "emheat",
            SystemMode::Heat => "heat",
            SystemMode::Off => "off",
            SystemMode::Cool => "cool",
            SystemMode::Auto => "auto",
        }
    }
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemMode {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "emheat" => Ok(SystemMode::EmHeat),
            "heat" => Ok(SystemMode::Heat),
            "off" => Ok(SystemMode::Off),
            "cool" => Ok(SystemMode::Cool),
            "auto" => Ok(SystemMode::Auto),
            other => Err(PortalError::InvalidValue(format!(
                "unknown system mode '{other}' (expected emheat, heat, off, cool, or auto)"
            ))),
        }
    }
}

/// Hold status as stored in `StatusHeat`/`StatusCool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldStatus {
    Schedule,
    Temporary,
    Permanent,
}

impl HoldStatus {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(HoldStatus::Schedule),
            1 => Some(HoldStatus::Temporary),
            2 => Some(HoldStatus::Permanent),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        match self {
            HoldStatus::Schedule => 0,
            HoldStatus::Temporary => 1,
            HoldStatus::Permanent => 2,
        }
    }
}

/// A requested schedule override.
///
/// `Schedule` cancels any hold and resumes the programmed schedule.
/// `Until` pins the setpoints until the given time of day, which must fall
/// on a 15-minute boundary (the portal stores it as quarter-hours).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    Schedule,
    Permanent,
    Until(NaiveTime),
}

impl Hold {
    pub fn status(self) -> HoldStatus {
        match self {
            Hold::Schedule => HoldStatus::Schedule,
            Hold::Permanent => HoldStatus::Permanent,
            Hold::Until(_) => HoldStatus::Temporary,
        }
    }

    /// Wire value for `HeatNextPeriod`/`CoolNextPeriod`, if the hold has a
    /// deadline.
    pub fn next_period(self) -> Result<Option<u16>, PortalError> {
        match self {
            Hold::Until(deadline) => Ok(Some(quarter_hours(deadline)?)),
            _ => Ok(None),
        }
    }
}

impl fmt::Display for Hold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hold::Schedule => f.write_str("schedule"),
            Hold::Permanent => f.write_str("permanent"),
            Hold::Until(deadline) => write!(f, "{}", deadline.format("%H:%M")),
        }
    }
}

/// Convert a time of day to the portal's quarter-hours-since-midnight value.
pub fn quarter_hours(deadline: NaiveTime) -> Result<u16, PortalError> {
    if deadline.minute() % 15 != 0 {
        return Err(PortalError::InvalidValue(
            "hold time must be on a 15-minute boundary".to_string(),
        ));
    }
    Ok(((deadline.hour() * 60 + deadline.minute()) / 15) as u16)
}

/// Inverse of [`quarter_hours`]. `None` for out-of-range wire values.
pub fn hold_deadline(quarter_hours: u16) -> Option<NaiveTime> {
    let minutes = u32::from(quarter_hours) * 15;
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// What the equipment is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipmentStatus {
    Off,
    Fan,
    Heat,
    Cool,
}

impl EquipmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EquipmentStatus::Off => "off",
            EquipmentStatus::Fan => "fan",
            EquipmentStatus::Heat => "heat",
            EquipmentStatus::Cool => "cool",
        }
    }
}

impl fmt::Display for EquipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of readable attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    FanMode,
    SystemMode,
    SetpointCool,
    SetpointHeat,
    CurrentTemperature,
    CurrentHumidity,
    OutdoorTemperature,
    OutdoorHumidity,
    EquipmentOutputStatus,
    Hold,
}

impl Attribute {
    pub fn name(self) -> &'static str {
        match self {
            Attribute::FanMode => "fan_mode",
            Attribute::SystemMode => "system_mode",
            Attribute::SetpointCool => "setpoint_cool",
            Attribute::SetpointHeat => "setpoint_heat",
            Attribute::CurrentTemperature => "current_temperature",
            Attribute::CurrentHumidity => "current_humidity",
            Attribute::OutdoorTemperature => "outdoor_temperature",
            Attribute::OutdoorHumidity => "outdoor_humidity",
            Attribute::EquipmentOutputStatus => "equipment_output_status",
            Attribute::Hold => "hold",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = PortalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fan_mode" => Ok(Attribute::FanMode),
            "system_mode" => Ok(Attribute::SystemMode),
            "setpoint_cool" => Ok(Attribute::SetpointCool),
            "setpoint_heat" => Ok(Attribute::SetpointHeat),
            "current_temperature" => Ok(Attribute::CurrentTemperature),
            "current_humidity" => Ok(Attribute::CurrentHumidity),
            "outdoor_temperature" => Ok(Attribute::OutdoorTemperature),
            "outdoor_humidity" => Ok(Attribute::OutdoorHumidity),
            "equipment_output_status" => Ok(Attribute::EquipmentOutputStatus),
            "hold" => Ok(Attribute::Hold),
            other => Err(PortalError::InvalidValue(format!(
                "unknown attribute '{other}'"
            ))),
        }
    }
}

/// A typed attribute reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue {
    Temperature(f64),
    Humidity(f64),
    Fan(FanMode),
    System(SystemMode),
    Equipment(EquipmentStatus),
    Hold { heat: Hold, cool: Hold },
    /// The device does not expose this sensor (no outdoor sensor, faulted
    /// humidity sensor).
    Unavailable,
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Temperature(v) | AttributeValue::Humidity(v) => {
                f.write_str(&format_number(*v))
            }
            AttributeValue::Fan(mode) => write!(f, "{mode}"),
            AttributeValue::System(mode) => write!(f, "{mode}"),
            AttributeValue::Equipment(status) => write!(f, "{status}"),
            AttributeValue::Hold { heat, cool } => write!(f, "heat:{heat} cool:{cool}"),
            AttributeValue::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// A typed attribute write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeWrite {
    Fan(FanMode),
    System(SystemMode),
    SetpointHeat(f64),
    SetpointCool(f64),
    Hold(Hold),
}

impl AttributeWrite {
    pub fn attribute(&self) -> Attribute {
        match self {
            AttributeWrite::Fan(_) => Attribute::FanMode,
            AttributeWrite::System(_) => Attribute::SystemMode,
            AttributeWrite::SetpointHeat(_) => Attribute::SetpointHeat,
            AttributeWrite::SetpointCool(_) => Attribute::SetpointCool,
            AttributeWrite::Hold(_) => Attribute::Hold,
        }
    }
}

/// Format a reading with at least one decimal place ("58.0", "56.5"),
/// matching what the portal's own UI displays.
pub fn format_number(value: f64) -> String {
    if value == value.trunc() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}
