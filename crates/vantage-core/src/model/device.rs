// ── Device info ──
//
// Devices group entities the way the physical installation does:
// controllers, modules, stations, and the objects entities come from.
// BackBox objects are never devices.

use serde::{Deserialize, Serialize};
use vantage_link::{ObjectType, SystemObject, Vid};

use super::Directory;

pub const DEFAULT_MANUFACTURER: &str = "Vantage";

/// Registry-facing description of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// `"{vid}"` for objects, `"{master}:variables"` for the variables device.
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    /// Virtual device with no hardware behind it.
    #[serde(default)]
    pub service: bool,
}

/// Whether `object` should appear as a device in its own right, even
/// without entities of its own.
pub fn is_parent_device(object: &SystemObject) -> bool {
    matches!(
        object.object_type,
        ObjectType::Master | ObjectType::Module | ObjectType::ModuleGen2
    ) || object.object_type.is_station()
}

/// Build the device info for `object`. `None` for BackBoxes.
pub fn device_info(object: &SystemObject, directory: &dyn Directory) -> Option<DeviceInfo> {
    if object.object_type == ObjectType::BackBox {
        return None;
    }

    // Custom devices report "manufacturer.model"; built-ins only a type tag.
    let source = object
        .model
        .as_deref()
        .unwrap_or_else(|| object.object_type.as_str());
    let (manufacturer, model) = match source.split_once('.') {
        Some((manufacturer, model)) => (manufacturer.to_owned(), model.to_owned()),
        None => (DEFAULT_MANUFACTURER.to_owned(), source.to_owned()),
    };

    let is_master = object.object_type == ObjectType::Master;
    let via_device = if is_master {
        None
    } else {
        match object.parent.and_then(|p| directory.lookup(p.vid)) {
            Some(parent) if parent.object_type != ObjectType::BackBox => Some(parent.vid),
            _ => directory.master(),
        }
        .filter(|vid| *vid != object.vid)
        .map(|vid| vid.to_string())
    };

    Some(DeviceInfo {
        id: object.vid.to_string(),
        name: object.name.clone(),
        manufacturer,
        model,
        suggested_area: object
            .area
            .and_then(|area| directory.lookup(area))
            .map(|area| area.name),
        serial_number: if is_master || object.object_type.is_station() {
            object.serial_number.clone()
        } else {
            None
        },
        via_device,
        sw_version: if is_master {
            object.firmware_version.clone()
        } else {
            None
        },
        service: false,
    })
}

/// The virtual device every variable entity attaches to.
pub fn variables_device(master: Vid) -> DeviceInfo {
    DeviceInfo {
        id: variables_device_id(master),
        name: "Variables".into(),
        manufacturer: DEFAULT_MANUFACTURER.into(),
        model: "Variables".into(),
        suggested_area: None,
        serial_number: None,
        via_device: Some(master.to_string()),
        sw_version: None,
        service: true,
    }
}

pub fn variables_device_id(master: Vid) -> String {
    format!("{master}:variables")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn directory() -> Vec<SystemObject> {
        let mut master = SystemObject::new(1, "Main Controller", ObjectType::Master);
        master.serial_number = Some("12345678".into());
        master.firmware_version = Some("4.1.5".into());
        let mut station = SystemObject::new(30, "Kitchen Keypad", ObjectType::Keypad).with_parent(1, 2);
        station.serial_number = Some("K-99".into());
        vec![
            master,
            SystemObject::new(2, "Kitchen", ObjectType::Area),
            SystemObject::new(3, "BB", ObjectType::BackBox),
            station,
            SystemObject::new(40, "Pendants", ObjectType::Load)
                .with_parent(3, 1)
                .with_area(2),
        ]
    }

    #[test]
    fn master_carries_firmware_and_serial() {
        let dir = directory();
        let info = device_info(&dir[0], &dir).unwrap();
        assert_eq!(info.manufacturer, "Vantage");
        assert_eq!(info.model, "Master");
        assert_eq!(info.sw_version.as_deref(), Some("4.1.5"));
        assert_eq!(info.serial_number.as_deref(), Some("12345678"));
        assert_eq!(info.via_device, None);
    }

    #[test]
    fn back_box_parents_are_skipped_for_the_master() {
        let dir = directory();
        let info = device_info(&dir[4], &dir).unwrap();
        assert_eq!(info.via_device.as_deref(), Some("1"));
        assert_eq!(info.suggested_area.as_deref(), Some("Kitchen"));
        assert_eq!(info.serial_number, None);
    }

    #[test]
    fn station_links_to_parent_and_keeps_serial() {
        let dir = directory();
        let info = device_info(&dir[3], &dir).unwrap();
        assert_eq!(info.via_device.as_deref(), Some("1"));
        assert_eq!(info.serial_number.as_deref(), Some("K-99"));
        assert!(is_parent_device(&dir[3]));
    }

    #[test]
    fn custom_device_model_is_split() {
        let mut shade = SystemObject::new(50, "Shade", ObjectType::SomfyRs485Shade);
        shade.model = Some("Somfy.RS-485 Shade".into());
        let info = device_info(&shade, &directory()).unwrap();
        assert_eq!(info.manufacturer, "Somfy");
        assert_eq!(info.model, "RS-485 Shade");

        let tagged = SystemObject::new(51, "Shade", ObjectType::SomfyUrtsi2Shade);
        let info = device_info(&tagged, &directory()).unwrap();
        assert_eq!(info.manufacturer, "Somfy");
        assert_eq!(info.model, "URTSI_2_Shade_CHILD");
    }

    #[test]
    fn back_boxes_are_never_devices() {
        let dir = directory();
        assert!(device_info(&dir[2], &dir).is_none());
    }

    #[test]
    fn variables_device_hangs_off_the_master() {
        let info = variables_device(Vid(1));
        assert_eq!(info.id, "1:variables");
        assert_eq!(info.via_device.as_deref(), Some("1"));
        assert!(info.service);
    }
}
