//! Thermostat device model and its remote state.
//!
//! `DeviceState` mirrors the portal's `latestData` payload (the `uiData` and
//! `fanData` blocks). It is refreshed per call, never cached durably; the
//! copy held here only serves domain validation before a write and local
//! bookkeeping after one.

use serde::{Deserialize, Serialize};

use crate::api::PortalError;
use crate::models::attribute::{
    hold_deadline, Attribute, AttributeValue, EquipmentStatus, FanMode, Hold, HoldStatus,
    SystemMode,
};

/// The `uiData` block of a device's state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UiData {
    #[serde(rename = "DispTemperature")]
    pub disp_temperature: Option<f64>,
    #[serde(rename = "DisplayUnits")]
    pub display_units: Option<String>,

    #[serde(rename = "HeatSetpoint")]
    pub heat_setpoint: Option<f64>,
    #[serde(rename = "CoolSetpoint")]
    pub cool_setpoint: Option<f64>,
    #[serde(rename = "HeatLowerSetptLimit")]
    pub heat_lower_setpt_limit: Option<f64>,
    #[serde(rename = "HeatUpperSetptLimit")]
    pub heat_upper_setpt_limit: Option<f64>,
    #[serde(rename = "CoolLowerSetptLimit")]
    pub cool_lower_setpt_limit: Option<f64>,
    #[serde(rename = "CoolUpperSetptLimit")]
    pub cool_upper_setpt_limit: Option<f64>,
    #[serde(rename = "Deadband")]
    pub deadband: Option<f64>,
    #[serde(rename = "ScheduleHeatSp")]
    pub schedule_heat_sp: Option<f64>,
    #[serde(rename = "ScheduleCoolSp")]
    pub schedule_cool_sp: Option<f64>,

    #[serde(rename = "SystemSwitchPosition")]
    pub system_switch_position: Option<u8>,
    #[serde(rename = "SwitchEmergencyHeatAllowed")]
    pub switch_emergency_heat_allowed: bool,
    #[serde(rename = "SwitchHeatAllowed")]
    pub switch_heat_allowed: bool,
    #[serde(rename = "SwitchOffAllowed")]
    pub switch_off_allowed: bool,
    #[serde(rename = "SwitchCoolAllowed")]
    pub switch_cool_allowed: bool,
    #[serde(rename = "SwitchAutoAllowed")]
    pub switch_auto_allowed: bool,

    #[serde(rename = "StatusHeat")]
    pub status_heat: Option<u8>,
    #[serde(rename = "StatusCool")]
    pub status_cool: Option<u8>,
    #[serde(rename = "HeatNextPeriod")]
    pub heat_next_period: Option<u16>,
    #[serde(rename = "CoolNextPeriod")]
    pub cool_next_period: Option<u16>,

    #[serde(rename = "IndoorHumidity")]
    pub indoor_humidity: Option<f64>,
    #[serde(rename = "IndoorHumiditySensorAvailable")]
    pub indoor_humidity_sensor_available: bool,
    #[serde(rename = "IndoorHumiditySensorNotFault")]
    pub indoor_humidity_sensor_not_fault: bool,

    #[serde(rename = "OutdoorTemperature")]
    pub outdoor_temperature: Option<f64>,
    #[serde(rename = "OutdoorTemperatureAvailable")]
    pub outdoor_temperature_available: bool,
    #[serde(rename = "OutdoorHumidity")]
    pub outdoor_humidity: Option<f64>,
    #[serde(rename = "OutdoorHumidityAvailable")]
    pub outdoor_humidity_available: bool,

    #[serde(rename = "EquipmentOutputStatus")]
    pub equipment_output_status: Option<u8>,
}

/// The `fanData` block of a device's state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FanData {
    #[serde(rename = "fanMode")]
    pub fan_mode: Option<u8>,
    #[serde(rename = "fanModeAutoAllowed")]
    pub fan_mode_auto_allowed: bool,
    #[serde(rename = "fanModeOnAllowed")]
    pub fan_mode_on_allowed: bool,
    #[serde(rename = "fanModeCirculateAllowed")]
    pub fan_mode_circulate_allowed: bool,
    #[serde(rename = "fanModeFollowScheduleAllowed")]
    pub fan_mode_follow_schedule_allowed: bool,
    #[serde(rename = "fanIsRunning")]
    pub fan_is_running: bool,
}

/// A device's `latestData` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceState {
    #[serde(rename = "uiData")]
    pub ui: UiData,
    #[serde(rename = "fanData")]
    pub fan: FanData,
    #[serde(rename = "hasFan")]
    pub has_fan: bool,
}

/// One physical thermostat, as discovered from the portal.
#[derive(Debug, Clone, Default)]
pub struct Device {
    pub id: i64,
    pub mac_id: Option<String>,
    pub name: Option<String>,
    pub location_id: i64,
    pub device_live: bool,
    pub communication_lost: bool,
    pub state: DeviceState,
}

impl Device {
    /// Whether the portal can currently reach the device.
    pub fn is_alive(&self) -> bool {
        self.device_live && !self.communication_lost
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Temperature unit in use, "F" or "C".
    pub fn temperature_unit(&self) -> Option<&str> {
        self.state.ui.display_units.as_deref()
    }

    pub fn fan_running(&self) -> bool {
        self.state.has_fan && self.state.fan.fan_is_running
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        self.state.fan.fan_mode.and_then(FanMode::from_index)
    }

    pub fn system_mode(&self) -> Option<SystemMode> {
        self.state
            .ui
            .system_switch_position
            .and_then(SystemMode::from_index)
    }

    pub fn setpoint_heat(&self) -> Option<f64> {
        self.state.ui.heat_setpoint
    }

    pub fn setpoint_cool(&self) -> Option<f64> {
        self.state.ui.cool_setpoint
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.state.ui.disp_temperature
    }

    /// Indoor humidity, only when the sensor is present and not faulted.
    pub fn current_humidity(&self) -> Option<f64> {
        if self.state.ui.indoor_humidity_sensor_available
            && self.state.ui.indoor_humidity_sensor_not_fault
        {
            self.state.ui.indoor_humidity
        } else {
            None
        }
    }

    pub fn outdoor_temperature(&self) -> Option<f64> {
        if self.state.ui.outdoor_temperature_available {
            self.state.ui.outdoor_temperature
        } else {
            None
        }
    }

    pub fn outdoor_humidity(&self) -> Option<f64> {
        if self.state.ui.outdoor_humidity_available {
            self.state.ui.outdoor_humidity
        } else {
            None
        }
    }

    /// Current equipment activity. A zero/absent wire value means the heat
    /// and cool stages are idle, which still leaves the fan to report.
    pub fn equipment_output_status(&self) -> Result<EquipmentStatus, PortalError> {
        match self.state.ui.equipment_output_status {
            None | Some(0) => {
                if self.fan_running() {
                    Ok(EquipmentStatus::Fan)
                } else {
                    Ok(EquipmentStatus::Off)
                }
            }
            Some(1) => Ok(EquipmentStatus::Heat),
            Some(2) => Ok(EquipmentStatus::Cool),
            Some(other) => Err(PortalError::UnexpectedResponse(format!(
                "unknown equipment output status {other}"
            ))),
        }
    }

    pub fn hold_heat(&self) -> Result<Hold, PortalError> {
        self.hold(self.state.ui.status_heat, self.state.ui.heat_next_period)
    }

    pub fn hold_cool(&self) -> Result<Hold, PortalError> {
        self.hold(self.state.ui.status_cool, self.state.ui.cool_next_period)
    }

    fn hold(&self, status: Option<u8>, next_period: Option<u16>) -> Result<Hold, PortalError> {
        let raw = status.ok_or_else(|| {
            PortalError::UnexpectedResponse("hold status not reported".to_string())
        })?;
        let status = HoldStatus::from_index(raw).ok_or_else(|| {
            PortalError::UnexpectedResponse(format!("unknown hold status {raw}"))
        })?;
        match status {
            HoldStatus::Schedule => Ok(Hold::Schedule),
            HoldStatus::Permanent => Ok(Hold::Permanent),
            HoldStatus::Temporary => {
                let period = next_period.ok_or_else(|| {
                    PortalError::UnexpectedResponse("hold period not reported".to_string())
                })?;
                let deadline = hold_deadline(period).ok_or_else(|| {
                    PortalError::UnexpectedResponse(format!("hold period {period} out of range"))
                })?;
                Ok(Hold::Until(deadline))
            }
        }
    }

    /// Read one attribute from the current state.
    pub fn attribute(&self, attribute: Attribute) -> Result<AttributeValue, PortalError> {
        let missing =
            |what: &str| PortalError::UnexpectedResponse(format!("{what} not reported"));
        match attribute {
            Attribute::FanMode => self
                .fan_mode()
                .map(AttributeValue::Fan)
                .ok_or_else(|| missing("fan mode")),
            Attribute::SystemMode => self
                .system_mode()
                .map(AttributeValue::System)
                .ok_or_else(|| missing("system mode")),
            Attribute::SetpointCool => self
                .setpoint_cool()
                .map(AttributeValue::Temperature)
                .ok_or_else(|| missing("cool setpoint")),
            Attribute::SetpointHeat => self
                .setpoint_heat()
                .map(AttributeValue::Temperature)
                .ok_or_else(|| missing("heat setpoint")),
            Attribute::CurrentTemperature => self
                .current_temperature()
                .map(AttributeValue::Temperature)
                .ok_or_else(|| missing("temperature")),
            Attribute::CurrentHumidity => Ok(self
                .current_humidity()
                .map(AttributeValue::Humidity)
                .unwrap_or(AttributeValue::Unavailable)),
            Attribute::OutdoorTemperature => Ok(self
                .outdoor_temperature()
                .map(AttributeValue::Temperature)
                .unwrap_or(AttributeValue::Unavailable)),
            Attribute::OutdoorHumidity => Ok(self
                .outdoor_humidity()
                .map(AttributeValue::Humidity)
                .unwrap_or(AttributeValue::Unavailable)),
            Attribute::EquipmentOutputStatus => {
                self.equipment_output_status().map(AttributeValue::Equipment)
            }
            Attribute::Hold => Ok(AttributeValue::Hold {
                heat: self.hold_heat()?,
                cool: self.hold_cool()?,
            }),
        }
    }

    /// Reject a fan mode the device does not advertise.
    pub fn ensure_fan_mode_allowed(&self, mode: FanMode) -> Result<(), PortalError> {
        let allowed = match mode {
            FanMode::Auto => self.state.fan.fan_mode_auto_allowed,
            FanMode::On => self.state.fan.fan_mode_on_allowed,
            FanMode::Circulate => self.state.fan.fan_mode_circulate_allowed,
            FanMode::FollowSchedule => self.state.fan.fan_mode_follow_schedule_allowed,
        };
        if allowed {
            Ok(())
        } else {
            Err(PortalError::InvalidValue(format!(
                "device does not support fan mode '{mode}'"
            )))
        }
    }

    /// Reject a system mode the device does not advertise.
    pub fn ensure_system_mode_allowed(&self, mode: SystemMode) -> Result<(), PortalError> {
        let allowed = match mode {
            SystemMode::EmHeat => self.state.ui.switch_emergency_heat_allowed,
            SystemMode::Heat => self.state.ui.switch_heat_allowed,
            SystemMode::Off => self.state.ui.switch_off_allowed,
            SystemMode::Cool => self.state.ui.switch_cool_allowed,
            SystemMode::Auto => self.state.ui.switch_auto_allowed,
        };
        if allowed {
            Ok(())
        } else {
            Err(PortalError::InvalidValue(format!(
                "device does not support system mode '{mode}'"
            )))
        }
    }

    /// Validate a heat setpoint and compute the coupled cool setpoint the
    /// portal requires when the deadband would be violated.
    ///
    /// Returns `(heat_setpoint, Option<cool_setpoint>)`.
    pub fn plan_setpoint_heat(&self, temp: f64) -> Result<(f64, Option<f64>), PortalError> {
        let (lower, upper) = self.setpoint_limits(
            self.state.ui.heat_lower_setpt_limit,
            self.state.ui.heat_upper_setpt_limit,
        )?;
        if temp < lower || temp > upper {
            return Err(PortalError::InvalidValue(format!(
                "setpoint {temp} outside allowed range {lower}-{upper}"
            )));
        }
        let deadband = self.state.ui.deadband.unwrap_or(0.0);
        let coupled = match self.state.ui.schedule_cool_sp {
            Some(cool_sp) if deadband > 0.0 && cool_sp - deadband <= temp => {
                Some(temp + deadband)
            }
            _ => None,
        };
        Ok((temp, coupled))
    }

    /// Validate a cool setpoint and compute the coupled heat setpoint.
    ///
    /// Returns `(cool_setpoint, Option<heat_setpoint>)`.
    pub fn plan_setpoint_cool(&self, temp: f64) -> Result<(f64, Option<f64>), PortalError> {
        let (lower, upper) = self.setpoint_limits(
            self.state.ui.cool_lower_setpt_limit,
            self.state.ui.cool_upper_setpt_limit,
        )?;
        if temp < lower || temp > upper {
            return Err(PortalError::InvalidValue(format!(
                "setpoint {temp} outside allowed range {lower}-{upper}"
            )));
        }
        let deadband = self.state.ui.deadband.unwrap_or(0.0);
        let coupled = match self.state.ui.schedule_heat_sp {
            Some(heat_sp) if deadband > 0.0 && heat_sp + deadband >= temp => {
                Some(temp - deadband)
            }
            _ => None,
        };
        Ok((temp, coupled))
    }

    fn setpoint_limits(
        &self,
        lower: Option<f64>,
        upper: Option<f64>,
    ) -> Result<(f64, f64), PortalError> {
        match (lower, upper) {
            (Some(lower), Some(upper)) => Ok((lower, upper)),
            _ => Err(PortalError::UnexpectedResponse(
                "setpoint limits not reported".to_string(),
            )),
        }
    }
}
