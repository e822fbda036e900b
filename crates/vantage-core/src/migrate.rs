// ── Entry migration ──
//
// Version 1 entries registered BackBox objects as devices. BackBoxes are
// wall boxes with nothing controllable in them, so they are dropped.

use tracing::info;

use crate::entry::ConfigEntry;

pub const CURRENT_VERSION: u32 = 2;

const BACK_BOX_MODEL: &str = "BackBox";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub removed_devices: usize,
}

/// Bring `entry` up to [`CURRENT_VERSION`]. Safe to run on every setup.
pub fn migrate_entry(entry: &mut ConfigEntry) -> MigrationReport {
    let from_version = entry.version;
    let before = entry.devices.len();
    entry.devices.retain(|device| device.model != BACK_BOX_MODEL);
    let removed_devices = before - entry.devices.len();

    if removed_devices > 0 {
        info!(entry_id = %entry.entry_id, removed_devices, "removed BackBox devices");
    }
    entry.version = entry.version.max(CURRENT_VERSION);

    MigrationReport {
        from_version,
        removed_devices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryData;
    use crate::model::DeviceInfo;

    fn device(id: &str, model: &str) -> DeviceInfo {
        DeviceInfo {
            id: id.into(),
            name: id.into(),
            manufacturer: "Vantage".into(),
            model: model.into(),
            suggested_area: None,
            serial_number: None,
            via_device: None,
            sw_version: None,
            service: false,
        }
    }

    #[test]
    fn back_boxes_are_removed() {
        let mut entry = ConfigEntry::new("4242", EntryData::new("h"));
        entry.version = 1;
        entry.devices = vec![
            device("1", "Master"),
            device("20", "BackBox"),
            device("21", "Keypad"),
            device("22", "BackBox"),
        ];

        let report = migrate_entry(&mut entry);
        assert_eq!(report.from_version, 1);
        assert_eq!(report.removed_devices, 2);
        assert_eq!(entry.version, CURRENT_VERSION);
        let ids: Vec<&str> = entry.devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["1", "21"]);

        assert_eq!(migrate_entry(&mut entry).removed_devices, 0);
    }
}
