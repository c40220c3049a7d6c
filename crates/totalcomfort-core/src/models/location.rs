//! Locations group the devices registered to a portal account.

use std::collections::BTreeMap;

use crate::models::Device;

/// One location (a house, typically), as reported by the portal's
/// location list. Read-only; re-fetched each session.
#[derive(Debug, Clone, Default)]
pub struct Location {
    pub id: i64,
    pub name: Option<String>,
    pub devices: BTreeMap<i64, Device>,
}

impl Location {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Look a device up by its user-set name. If several devices share a
    /// name, the one with the lowest id wins.
    pub fn device_by_name(&self, name: &str) -> Option<&Device> {
        self.devices
            .values()
            .find(|d| d.name.as_deref() == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_by_name() {
        let mut location = Location {
            id: 1,
            name: Some("Home".to_string()),
            devices: BTreeMap::new(),
        };
        location.devices.insert(
            7,
            Device {
                id: 7,
                name: Some("Upstairs".to_string()),
                ..Device::default()
            },
        );
        assert_eq!(location.device_by_name("Upstairs").map(|d| d.id), Some(7));
        assert!(location.device_by_name("Attic").is_none());
        assert_eq!(location.device_count(), 1);
    }
}
