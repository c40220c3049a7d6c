use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{Device, Location};

/// One authenticated epoch against the portal.
///
/// The transport state (the auth cookie) lives in the client's cookie
/// store; the session records when that cookie was granted and carries the
/// location/device mapping discovered under it. Expiry is not predicted
/// client-side - the portal signals it per request, and the client renews
/// the session transparently, once, before giving up.
#[derive(Debug, Clone)]
pub struct Session {
    created_at: DateTime<Utc>,
    locations: BTreeMap<i64, Location>,
}

impl Session {
    pub(crate) fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            locations: BTreeMap::new(),
        }
    }

    /// When this session was last (re-)authenticated.
    pub fn established_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    /// Mark the session as re-authenticated, keeping the discovered
    /// inventory (locations are re-fetched per session by `list_devices`,
    /// not per login).
    pub(crate) fn renew(&mut self, at: DateTime<Utc>) {
        self.created_at = at;
    }

    pub fn locations(&self) -> &BTreeMap<i64, Location> {
        &self.locations
    }

    pub(crate) fn set_locations(&mut self, locations: BTreeMap<i64, Location>) {
        self.locations = locations;
    }

    pub fn device_count(&self) -> usize {
        self.locations.values().map(Location::device_count).sum()
    }

    pub fn find_device(&self, device_id: i64) -> Option<&Device> {
        self.locations
            .values()
            .find_map(|location| location.devices.get(&device_id))
    }

    /// The first device of the first location. Only meaningful for the
    /// common single-thermostat account; `None` when no devices were
    /// discovered.
    pub fn default_device(&self) -> Option<&Device> {
        self.locations
            .values()
            .flat_map(|location| location.devices.values())
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_devices(ids: &[(i64, i64)]) -> Session {
        let mut session = Session::new(Utc::now());
        let mut locations = BTreeMap::new();
        for &(location_id, device_id) in ids {
            let location: &mut Location =
                locations.entry(location_id).or_insert_with(|| Location {
                    id: location_id,
                    ..Location::default()
                });
            location.devices.insert(
                device_id,
                Device {
                    id: device_id,
                    location_id,
                    ..Device::default()
                },
            );
        }
        session.set_locations(locations);
        session
    }

    #[test]
    fn test_default_device_is_first_by_location_then_id() {
        let session = session_with_devices(&[(2, 30), (1, 20), (1, 10)]);
        assert_eq!(session.default_device().map(|d| d.id), Some(10));
        assert_eq!(session.device_count(), 3);
    }

    #[test]
    fn test_find_device_searches_all_locations() {
        let session = session_with_devices(&[(1, 10), (2, 30)]);
        assert_eq!(session.find_device(30).map(|d| d.location_id), Some(2));
        assert!(session.find_device(99).is_none());
    }

    #[test]
    fn test_renew_keeps_inventory() {
        let mut session = session_with_devices(&[(1, 10)]);
        let later = Utc::now() + Duration::minutes(5);
        session.renew(later);
        assert_eq!(session.established_at(), later);
        assert_eq!(session.device_count(), 1);
    }
}
