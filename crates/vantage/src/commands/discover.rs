//! `vantage discover`: browse mDNS for controllers.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tabled::Tabled;

use vantage_core::{DiscoveredController, discovery};

use crate::cli::DiscoverArgs;
use crate::context::Context;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct Found {
    #[serde(flatten)]
    controller: DiscoveredController,
    /// Entry id when the controller is already configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_id: Option<String>,
}

#[derive(Tabled)]
struct FoundRow {
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Hostname")]
    hostname: String,
    #[tabled(rename = "Port")]
    port: u16,
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Configured")]
    configured: String,
}

pub async fn handle(args: &DiscoverArgs, ctx: &Context) -> Result<(), CliError> {
    let spinner = (!ctx.quiet && std::io::stderr().is_terminal()).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!(
            "Listening for controllers ({})",
            humantime::format_duration(args.timeout)
        ));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = discovery::discover(args.timeout).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let controllers = result?;

    let found: Vec<Found> = controllers
        .into_iter()
        .map(|controller| {
            let entry_id = controller
                .serial_number
                .as_deref()
                .and_then(|serial| ctx.config.find_entry(serial).ok())
                .map(|entry| entry.entry_id.clone());
            Found {
                controller,
                entry_id,
            }
        })
        .collect();

    let out = output::render_list(
        ctx.output,
        &found,
        |f| FoundRow {
            host: f.controller.host.clone(),
            hostname: f.controller.hostname.clone(),
            port: f.controller.port,
            serial: f.controller.serial_number.clone().unwrap_or_default(),
            configured: output::yes_no(f.entry_id.is_some(), ctx.color),
        },
        |f| f.controller.host.clone(),
    );
    output::print_output(&out, ctx.quiet);
    Ok(())
}
