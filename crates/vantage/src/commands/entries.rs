//! `vantage entries`: list, add, remove, reconfigure and reauth config
//! entries. Adding and changing entries runs the same flows a hub UI would.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;
use tracing::warn;

use vantage_config::EntryConfig;
use vantage_core::{
    AbortReason, ConfigFlow, FlowResult, FlowStep, FormError, ReauthFlow, ReconfigureFlow,
    ReconfigureInput,
};

use crate::cli::{AddArgs, EntriesArgs, EntriesCommand, ReauthArgs, ReconfigureArgs};
use crate::commands::util;
use crate::context::Context;
use crate::error::CliError;
use crate::output;

// ── Views ───────────────────────────────────────────────────────────

/// Serializable entry view without the password itself.
#[derive(Serialize)]
struct EntryView {
    entry_id: String,
    title: String,
    unique_id: Option<String>,
    host: String,
    ssl: bool,
    username: Option<String>,
    password_source: &'static str,
    devices: usize,
}

impl From<&EntryConfig> for EntryView {
    fn from(entry: &EntryConfig) -> Self {
        let password_source = if entry.password_env.is_some() {
            "env"
        } else if entry.password.is_some() {
            "plaintext"
        } else if entry.username.is_some() {
            "keyring"
        } else {
            "none"
        };
        Self {
            entry_id: entry.entry_id.clone(),
            title: entry.title.clone(),
            unique_id: entry.unique_id.clone(),
            host: entry.host.clone(),
            ssl: entry.ssl,
            username: entry.username.clone(),
            password_source,
            devices: entry.devices.len(),
        }
    }
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Entry")]
    entry_id: String,
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "SSL")]
    ssl: String,
    #[tabled(rename = "User")]
    username: String,
    #[tabled(rename = "Password")]
    password: String,
    #[tabled(rename = "Devices")]
    devices: usize,
}

fn entry_row(view: &EntryView, color: bool) -> EntryRow {
    EntryRow {
        entry_id: view.entry_id.clone(),
        serial: view.unique_id.clone().unwrap_or_default(),
        host: view.host.clone(),
        ssl: output::yes_no(view.ssl, color),
        username: view.username.clone().unwrap_or_default(),
        password: output::dim(view.password_source, color),
        devices: view.devices,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: EntriesArgs, ctx: &mut Context) -> Result<(), CliError> {
    match args.command {
        EntriesCommand::List => {
            list(ctx);
            Ok(())
        }
        EntriesCommand::Add(args) => add(&args, ctx).await,
        EntriesCommand::Remove { entry } => remove(&entry, ctx),
        EntriesCommand::Reconfigure(args) => reconfigure(&args, ctx).await,
        EntriesCommand::Reauth(args) => reauth(&args, ctx).await,
    }
}

fn list(ctx: &Context) {
    let views: Vec<EntryView> = ctx.config.entries.iter().map(EntryView::from).collect();
    if views.is_empty() && ctx.output == crate::cli::OutputFormat::Table {
        util::status(ctx, "No config entries. Add one with: vantage entries add --host <HOST>");
        return;
    }
    let out = output::render_list(
        ctx.output,
        &views,
        |v| entry_row(v, ctx.color),
        |v| v.entry_id.clone(),
    );
    output::print_output(&out, ctx.quiet);
}

// ── Add ─────────────────────────────────────────────────────────────

async fn add(args: &AddArgs, ctx: &mut Context) -> Result<(), CliError> {
    let host = util::value_or_prompt(ctx, args.host.as_deref(), "host", "Controller host")?;
    let entries = ctx.entries();
    let mut flow = ConfigFlow::new(Arc::new(ctx.network.clone()), Arc::clone(&entries));

    let mut result = flow.step_user(Some(&host)).await;
    let mut password = None;
    loop {
        result = match result {
            FlowResult::Form {
                step: FlowStep::Auth,
                error,
                suggested_username,
                ..
            } => {
                if password.is_some() {
                    return Err(form_error(error, &host));
                }
                let input = util::login_input(ctx, &args.login, suggested_username.as_deref())?;
                password = Some(input.password.clone());
                flow.step_auth(Some(input)).await
            }
            FlowResult::Form {
                step: FlowStep::ZeroconfConfirm,
                ..
            } => flow.step_zeroconf_confirm(true).await,
            FlowResult::Form { error, .. } => return Err(form_error(error, &host)),
            FlowResult::Abort(reason) => return Err(CliError::from_abort(reason, &host)),
            FlowResult::CreateEntry(entry) => {
                util::persist_entries(
                    ctx,
                    &entries,
                    &entry.entry_id,
                    password.as_ref(),
                    args.login.store,
                )?;
                util::status(
                    ctx,
                    &format!("✓ Added {} ({}) as entry {}", entry.title, host, entry.entry_id),
                );
                if let Ok(saved) = ctx.config.find_entry(&entry.entry_id) {
                    let view = EntryView::from(saved);
                    let out = output::render_single(
                        ctx.output,
                        &view,
                        |v| v.entry_id.clone(),
                        |v| v.entry_id.clone(),
                    );
                    output::print_output(&out, ctx.quiet);
                }
                return Ok(());
            }
        };
    }
}

fn form_error(error: Option<FormError>, host: &str) -> CliError {
    match error {
        Some(FormError::InvalidAuth) => CliError::AuthFailed {
            message: format!("{host} rejected the username or password"),
        },
        Some(FormError::CannotConnect) | None => CliError::ConnectionFailed {
            host: host.to_owned(),
            reason: "the controller did not answer".into(),
        },
    }
}

// ── Remove ──────────────────────────────────────────────────────────

fn remove(selector: &str, ctx: &mut Context) -> Result<(), CliError> {
    let entry_id = ctx.entry_id(selector)?;
    if !util::confirm(ctx, &format!("Remove entry {entry_id}?"), "entries remove")? {
        return Ok(());
    }

    ctx.config.entries.retain(|e| e.entry_id != entry_id);
    if let Err(err) = vantage_config::forget_password(&entry_id) {
        warn!(entry_id, error = %err, "could not clear the keyring password");
    }
    ctx.save()?;
    util::status(ctx, &format!("✓ Removed entry {entry_id}"));
    Ok(())
}

// ── Reconfigure ─────────────────────────────────────────────────────

async fn reconfigure(args: &ReconfigureArgs, ctx: &mut Context) -> Result<(), CliError> {
    let entry_id = ctx.entry_id(&args.entry)?;
    let current_host = ctx.config.find_entry(&entry_id)?.host.clone();
    let host = args.host.clone().unwrap_or(current_host);

    let auth = if args.login.username.is_some() || args.login.password.is_some() {
        Some(util::login_input(ctx, &args.login, None)?)
    } else {
        None
    };
    let password = auth.as_ref().map(|a| a.password.clone());

    let entries = ctx.entries();
    let hub = ctx.hub(Arc::clone(&entries));
    let mut flow = ReconfigureFlow::new(Arc::new(ctx.network.clone()), hub, &entry_id)
        .ok_or_else(|| CliError::NotFound {
            resource_type: "config entry".into(),
            identifier: entry_id.clone(),
            list_command: "entries list".into(),
        })?;

    match flow
        .step_reconfigure(Some(ReconfigureInput {
            host: host.clone(),
            auth,
        }))
        .await
    {
        FlowResult::Abort(AbortReason::ReconfigureSuccessful) => {
            util::persist_entries(ctx, &entries, &entry_id, password.as_ref(), args.login.store)?;
            util::status(ctx, &format!("✓ Entry {entry_id} now points at {host}"));
            Ok(())
        }
        FlowResult::Abort(reason) => Err(CliError::from_abort(reason, &host)),
        FlowResult::Form { error, .. } => Err(form_error(error, &host)),
        FlowResult::CreateEntry(_) => Err(CliError::CommandFailed {
            message: "reconfiguration created a new entry".into(),
        }),
    }
}

// ── Reauth ──────────────────────────────────────────────────────────

async fn reauth(args: &ReauthArgs, ctx: &mut Context) -> Result<(), CliError> {
    let entry_id = ctx.entry_id(&args.entry)?;
    let host = ctx.config.find_entry(&entry_id)?.host.clone();

    let entries = ctx.entries();
    let hub = ctx.hub(Arc::clone(&entries));
    let mut flow = ReauthFlow::new(Arc::new(ctx.network.clone()), hub, &entry_id).ok_or_else(
        || CliError::NotFound {
            resource_type: "config entry".into(),
            identifier: entry_id.clone(),
            list_command: "entries list".into(),
        },
    )?;

    let suggested = match flow.step_reauth().await {
        FlowResult::Form {
            suggested_username, ..
        } => suggested_username,
        _ => None,
    };
    let input = util::login_input(ctx, &args.login, suggested.as_deref())?;
    let password = input.password.clone();

    match flow.step_reauth_confirm(Some(input)).await {
        FlowResult::Abort(AbortReason::ReauthSuccessful) => {
            util::persist_entries(ctx, &entries, &entry_id, Some(&password), args.login.store)?;
            util::status(ctx, &format!("✓ Updated the login for entry {entry_id}"));
            Ok(())
        }
        FlowResult::Abort(reason) => Err(CliError::from_abort(reason, &host)),
        FlowResult::Form { error, .. } => Err(form_error(error, &host)),
        FlowResult::CreateEntry(_) => Err(CliError::CommandFailed {
            message: "re-authentication created a new entry".into(),
        }),
    }
}
