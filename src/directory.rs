//! Read-only listing of intercom-capable devices

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A device that can host an intercom session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,

    /// Display name
    pub name: String,

    /// Switch entity that toggles the device's intercom
    pub entity_id: String,
}

/// Source of the device list
pub trait DeviceDirectory: Send + Sync {
    fn list_devices(&self) -> Vec<DeviceInfo>;
}

/// Directory backed by configured entries
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    devices: Vec<DeviceInfo>,
}

impl StaticDirectory {
    /// Keeps only intercom switch entities, in the given order
    pub fn new(entries: Vec<DeviceInfo>) -> Self {
        let devices: Vec<DeviceInfo> = entries
            .into_iter()
            .filter(|entry| {
                let keep = is_intercom_entity(&entry.entity_id);
                if !keep {
                    debug!(entity_id = %entry.entity_id, "skipping non-intercom entity");
                }
                keep
            })
            .collect();

        Self { devices }
    }
}

impl DeviceDirectory for StaticDirectory {
    fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices.clone()
    }
}

/// `switch.<name>_intercom`
pub fn is_intercom_entity(entity_id: &str) -> bool {
    entity_id
        .strip_prefix("switch.")
        .is_some_and(|name| name.ends_with("_intercom"))
}
