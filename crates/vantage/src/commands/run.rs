//! `vantage run`: bridge the configured controllers and stream bus events
//! until Ctrl-C or `--duration` elapses.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vantage_core::{BusEvent, BusEventData, EntryState};

use crate::cli::{OutputFormat, RunArgs};
use crate::commands::util;
use crate::context::Context;
use crate::error::CliError;
use crate::output;

pub async fn handle(args: &RunArgs, ctx: &Context) -> Result<(), CliError> {
    let hub = ctx.hub(ctx.entries());
    // Subscribe first so events fired during setup are not missed.
    let mut events = hub.subscribe_events();
    let states = util::setup_hub(ctx, &hub, args.entry.as_deref()).await?;

    for (entry_id, state) in &states {
        let entities = match hub.runtime(entry_id).await {
            Some(runtime) => runtime.store().entity_count(),
            None => 0,
        };
        let line = match state {
            EntryState::Loaded => format!("● {entry_id}: loaded, {entities} entities"),
            other => format!("○ {entry_id}: {other}"),
        };
        util::status(ctx, &line);
    }

    let scripts = CancellationToken::new();
    let replays: Vec<_> = ctx
        .network
        .controllers()
        .map(|controller| controller.spawn_script(scripts.child_token()))
        .collect();

    let deadline = async {
        match args.duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            () = &mut deadline => break,
            event = events.recv() => match event {
                Ok(event) => print_event(ctx, &event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    scripts.cancel();
    for replay in replays {
        let _ = replay.await;
    }
    hub.shutdown().await;
    Ok(())
}

fn print_event(ctx: &Context, event: &Arc<BusEvent>) {
    let line = match ctx.output {
        OutputFormat::Table | OutputFormat::Plain => {
            let subject = match &event.data {
                BusEventData::Button(b) => format!("{} ({})", b.button_name, b.button_id),
                BusEventData::Task(t) => match t.task_state {
                    Some(state) => format!("{} ({}) state={state}", t.task_name, t.task_id),
                    None => format!("{} ({})", t.task_name, t.task_id),
                },
            };
            format!(
                "{} {:<28} {} {subject}",
                output::dim(&event.time_fired.format("%H:%M:%S%.3f").to_string(), ctx.color),
                event.event_type.as_ref(),
                output::dim(&event.entry_id, ctx.color),
            )
        }
        // One document per event so the stream stays parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(event.as_ref(), true),
        OutputFormat::Yaml => {
            let body = serde_yaml::to_string(event.as_ref()).unwrap_or_default();
            format!("---\n{}", body.trim_end())
        }
    };
    output::print_output(&line, ctx.quiet);
}
