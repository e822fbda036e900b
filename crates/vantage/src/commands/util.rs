//! Shared helpers for command handlers.

use std::io::IsTerminal;

use dialoguer::Input;
use secrecy::SecretString;
use tracing::warn;

use vantage_config::PasswordStorage;
use vantage_core::{AuthInput, ConfigEntries, EntryState, Hub};
use vantage_link::DEFAULT_USERNAME;

use crate::cli::{LoginArgs, PasswordStore};
use crate::context::Context;
use crate::error::CliError;

fn interactive(ctx: &Context) -> bool {
    !ctx.yes && std::io::stdin().is_terminal()
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(ctx: &Context, message: &str, action: &str) -> Result<bool, CliError> {
    if ctx.yes {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)
}

/// A required value: the flag if given, else a prompt.
pub fn value_or_prompt(
    ctx: &Context,
    value: Option<&str>,
    field: &str,
    prompt: &str,
) -> Result<String, CliError> {
    if let Some(value) = value {
        return Ok(value.to_owned());
    }
    if !interactive(ctx) {
        return Err(CliError::Validation {
            field: field.into(),
            reason: format!("--{field} is required when not running interactively"),
        });
    }
    Input::new()
        .with_prompt(prompt)
        .interact_text()
        .map_err(prompt_err)
}

/// Username and password from flags, falling back to prompts.
pub fn login_input(
    ctx: &Context,
    login: &LoginArgs,
    suggested_username: Option<&str>,
) -> Result<AuthInput, CliError> {
    let suggested = suggested_username.unwrap_or(DEFAULT_USERNAME);
    let username = match &login.username {
        Some(username) => username.clone(),
        None if interactive(ctx) => Input::new()
            .with_prompt("Username")
            .default(suggested.to_owned())
            .interact_text()
            .map_err(prompt_err)?,
        None => suggested.to_owned(),
    };

    let password = match &login.password {
        Some(password) => password.clone(),
        None if interactive(ctx) => rpassword::prompt_password("Password: ").map_err(prompt_err)?,
        None => {
            return Err(CliError::Validation {
                field: "password".into(),
                reason: "the controller requires a login; pass --password or set VANTAGE_PASSWORD"
                    .into(),
            });
        }
    };
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    Ok(AuthInput::new(username, password))
}

/// Write the runtime registry back to the config file. When `password` is
/// given it is stored for `entry_id` as the user chose.
pub fn persist_entries(
    ctx: &mut Context,
    entries: &ConfigEntries,
    entry_id: &str,
    password: Option<&SecretString>,
    store: PasswordStore,
) -> Result<(), CliError> {
    ctx.config.sync_entries(entries);
    if let Some(password) = password {
        let storage = match store {
            PasswordStore::Keyring => PasswordStorage::Keyring,
            PasswordStore::Plaintext => PasswordStorage::Plaintext,
        };
        if let Some(entry) = ctx.config.find_entry_mut(entry_id) {
            vantage_config::store_password(entry, password, storage)?;
        }
    }
    ctx.save()
}

/// Status line on stderr, silenced by `--quiet`.
pub fn status(ctx: &Context, message: &str) {
    if !ctx.quiet {
        eprintln!("{message}");
    }
}

/// Set up one entry, or every entry, and report entries that did not load.
/// Fails only when nothing loaded at all.
pub async fn setup_hub(
    ctx: &Context,
    hub: &Hub,
    only: Option<&str>,
) -> Result<Vec<(String, EntryState)>, CliError> {
    ctx.require_entries()?;
    let states = match only {
        Some(selector) => {
            let entry_id = ctx.entry_id(selector)?;
            let state = hub.setup(&entry_id).await?;
            vec![(entry_id, state)]
        }
        None => hub.setup_all().await,
    };

    for (entry_id, state) in &states {
        if *state != EntryState::Loaded {
            warn!(entry_id, %state, "entry did not load");
        }
    }
    let nothing_loaded = !states.iter().any(|(_, s)| *s == EntryState::Loaded);
    if let Some((entry_id, state)) = states.first().filter(|_| nothing_loaded) {
        let state = match state {
            EntryState::SetupError { reason } => reason.clone(),
            other => other.to_string(),
        };
        let err = if hub.needs_reauth(entry_id).await {
            CliError::AuthFailed { message: state }
        } else {
            CliError::SetupFailed {
                entry_id: entry_id.clone(),
                state,
            }
        };
        hub.shutdown().await;
        return Err(err);
    }
    Ok(states)
}
