//! CLI error types with miette diagnostics.
//!
//! Maps core, link and config errors into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use vantage_config::ConfigError;
use vantage_core::{AbortReason, CoreError, ErrorKind};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to controller at {host}")]
    #[diagnostic(
        code(vantage::connection_failed),
        help(
            "Check that the controller is reachable: {reason}\n\
             Fixture-backed controllers must be listed with --fixture or in `fixtures`."
        )
    )]
    ConnectionFailed { host: String, reason: String },

    #[error("Controller did not answer within {seconds}s")]
    #[diagnostic(code(vantage::timeout))]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(vantage::auth_failed),
        help("Update the stored login with: vantage entries reauth <ENTRY>")
    )]
    AuthFailed { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(vantage::not_found),
        help("Run: vantage {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{message}")]
    #[diagnostic(code(vantage::ambiguous), help("Select by id, or narrow with --entry."))]
    Ambiguous { message: String },

    #[error("{message}")]
    #[diagnostic(code(vantage::conflict))]
    Conflict { message: String },

    #[error("No config entries configured")]
    #[diagnostic(
        code(vantage::no_entries),
        help(
            "Add one with: vantage entries add --host <HOST> --fixture <PATH>\n\
             Expected config at: {path}"
        )
    )]
    NoEntries { path: String },

    #[error("Entry {entry_id} did not load: {state}")]
    #[diagnostic(code(vantage::setup_failed))]
    SetupFailed { entry_id: String, state: String },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(vantage::command_failed))]
    CommandFailed { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vantage::validation))]
    Validation { field: String, reason: String },

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(vantage::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(vantage::config))]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(vantage::fixture), help("Check the fixture file contents."))]
    Link(#[from] vantage_link::Error),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Ambiguous { .. } | Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Config(ConfigError::UnknownEntry { .. }) => exit_code::NOT_FOUND,
            _ => exit_code::GENERAL,
        }
    }

    /// Error for a flow that stopped without the outcome the command wanted.
    pub fn from_abort(reason: AbortReason, host: &str) -> Self {
        match reason {
            AbortReason::AlreadyConfigured => Self::Conflict {
                message: format!("controller at {host} is already configured"),
            },
            AbortReason::CannotConnect => Self::ConnectionFailed {
                host: host.to_owned(),
                reason: "no answer to the identity request".into(),
            },
            AbortReason::WrongController => Self::Validation {
                field: "host".into(),
                reason: format!("{host} is a different controller"),
            },
            AbortReason::Unknown
            | AbortReason::ReauthSuccessful
            | AbortReason::ReconfigureSuccessful => Self::CommandFailed {
                message: format!("setup of {host} stopped: {reason}"),
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { host, reason } => Self::ConnectionFailed { host, reason },
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::EntityNotFound { identifier } => Self::NotFound {
                resource_type: "entity".into(),
                identifier,
                list_command: "inspect <FIXTURE>".into(),
            },
            CoreError::TaskNotFound { selector } => Self::NotFound {
                resource_type: "task".into(),
                identifier: selector,
                list_command: "inspect <FIXTURE> --show objects".into(),
            },
            CoreError::EntryNotFound { entry_id } => Self::NotFound {
                resource_type: "config entry".into(),
                identifier: entry_id,
                list_command: "entries list".into(),
            },
            CoreError::EntryNotLoaded { entry_id, state } => Self::SetupFailed { entry_id, state },
            err @ (CoreError::AmbiguousTaskName { .. } | CoreError::AmbiguousTaskId { .. }) => {
                Self::Ambiguous {
                    message: err.to_string(),
                }
            }
            CoreError::InvalidSelector { message } => Self::Validation {
                field: "task selector".into(),
                reason: message,
            },
            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            err if err.is_auth_failure() => Self::AuthFailed {
                message: err.to_string(),
            },
            err if err.kind() == ErrorKind::TransportLoss => Self::ConnectionFailed {
                host: "(disconnected)".into(),
                reason: err.to_string(),
            },
            err => Self::CommandFailed {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use vantage_link::Vid;

    #[test]
    fn resolution_errors_have_distinct_exit_codes() {
        let missing: CliError = CoreError::TaskNotFound {
            selector: "name 'Nap'".into(),
        }
        .into();
        assert_eq!(missing.exit_code(), exit_code::NOT_FOUND);

        let ambiguous: CliError = CoreError::AmbiguousTaskName {
            name: "All Off".into(),
            candidates: vec![Vid(700), Vid(701)],
        }
        .into();
        assert_eq!(ambiguous.exit_code(), exit_code::CONFLICT);
        assert!(ambiguous.to_string().contains("All Off"));

        let invalid: CliError = CoreError::InvalidSelector {
            message: "exactly one of id or name".into(),
        }
        .into();
        assert_eq!(invalid.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn aborted_flows_map_to_conflict_or_connection() {
        assert_eq!(
            CliError::from_abort(AbortReason::AlreadyConfigured, "10.0.0.5").exit_code(),
            exit_code::CONFLICT
        );
        assert_eq!(
            CliError::from_abort(AbortReason::CannotConnect, "10.0.0.5").exit_code(),
            exit_code::CONNECTION
        );
    }
}
