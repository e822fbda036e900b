//! `vantage task start|stop`: run a task service against the configured
//! controllers.

use tabled::Tabled;

use vantage_core::{TaskCall, TaskService, TaskTarget};

use crate::cli::{TaskArgs, TaskCommand, TaskSelectArgs};
use crate::commands::util;
use crate::context::Context;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "Entry")]
    entry_id: String,
    #[tabled(rename = "Task")]
    task_id: u32,
    #[tabled(rename = "Name")]
    task_name: String,
}

pub async fn handle(args: TaskArgs, ctx: &Context) -> Result<(), CliError> {
    let (service, select) = match args.command {
        TaskCommand::Start(select) => (TaskService::StartTask, select),
        TaskCommand::Stop(select) => (TaskService::StopTask, select),
    };

    let mut call = TaskCall {
        id: select.id,
        name: select.name.clone(),
        entry_id: None,
    };
    // Reject a bad selector before touching any controller.
    call.selector()?;

    let hub = ctx.hub(ctx.entries());
    util::setup_hub(ctx, &hub, select.entry.as_deref()).await?;
    if let Some(selector) = &select.entry {
        call.entry_id = Some(ctx.entry_id(selector)?);
    }

    let result = hub.call_task(service, &call).await;
    hub.shutdown().await;
    let target = result?;

    print_target(ctx, service, &select, &target);
    Ok(())
}

fn print_target(ctx: &Context, service: TaskService, select: &TaskSelectArgs, target: &TaskTarget) {
    let verb = match service {
        TaskService::StartTask => "Started",
        TaskService::StopTask => "Stopped",
    };
    tracing::debug!(?select, entry_id = %target.entry_id, "task service done");
    let out = output::render_list(
        ctx.output,
        std::slice::from_ref(target),
        |t| TargetRow {
            entry_id: t.entry_id.clone(),
            task_id: t.task_id.0,
            task_name: t.task_name.clone(),
        },
        |t| t.task_id.to_string(),
    );
    util::status(ctx, &format!("✓ {verb} task {} ({})", target.task_name, target.task_id));
    output::print_output(&out, ctx.quiet);
}
