//! `vantage inspect`: load a fixture's object directory into an entity
//! store and show what the bridge would expose, without connecting.

use tabled::Tabled;

use vantage_core::EntityStore;
use vantage_link::{ControllerFixture, SystemObject};

use crate::cli::{InspectArgs, InspectView};
use crate::context::Context;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "VID")]
    vid: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Device")]
    device: String,
}

#[derive(Tabled)]
struct ObjectRow {
    #[tabled(rename = "VID")]
    vid: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Parent")]
    parent: String,
    #[tabled(rename = "Model")]
    model: String,
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Device")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Manufacturer")]
    manufacturer: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Via")]
    via: String,
}

fn object_row(object: &SystemObject) -> ObjectRow {
    ObjectRow {
        vid: object.vid.0,
        name: object.name.clone(),
        object_type: object.object_type.as_str().to_owned(),
        parent: object
            .parent
            .as_ref()
            .map(|p| format!("{}:{}", p.vid, p.position))
            .unwrap_or_default(),
        model: object.model.clone().unwrap_or_default(),
    }
}

pub fn handle(args: &InspectArgs, ctx: &Context) -> Result<(), CliError> {
    let fixture = ControllerFixture::load(&args.fixture)?;
    let objects = fixture.objects;

    let out = match args.show {
        InspectView::Objects => output::render_list(ctx.output, &objects, object_row, |o| {
            o.vid.to_string()
        }),
        InspectView::Entities => {
            let store = EntityStore::new();
            store.load(objects);
            let entities = store.entities_snapshot();
            output::render_list(
                ctx.output,
                entities.as_slice(),
                |e| EntityRow {
                    entity_id: e.entity_id(),
                    vid: e.vid.0,
                    name: e.name.clone(),
                    state: e.state.summary(),
                    enabled: output::yes_no(e.enabled_by_default, ctx.color),
                    device: e.device_id.clone(),
                },
                |e| e.entity_id(),
            )
        }
        InspectView::Devices => {
            let store = EntityStore::new();
            store.load(objects);
            let devices = store.devices_snapshot();
            output::render_list(
                ctx.output,
                devices.as_slice(),
                |d| DeviceRow {
                    id: d.id.clone(),
                    name: d.name.clone(),
                    manufacturer: d.manufacturer.clone(),
                    model: d.model.clone(),
                    via: d.via_device.clone().unwrap_or_default(),
                },
                |d| d.id.clone(),
            )
        }
    };
    output::print_output(&out, ctx.quiet);
    Ok(())
}
