// ── Core error types ──
//
// User-facing errors from vantage-core. Consumers never see raw link
// errors for setup failures; the `From<vantage_link::Error>` impl maps
// them into domain variants. Command failures keep the link error as
// their source so callers can still ask whether new credentials help.

use thiserror::Error;
use vantage_link::Vid;

/// Coarse classification every [`CoreError`] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Unreachable controller or rejected login at setup. Setup is retried.
    ConnectionFailure,
    /// Mid-session disconnect. Entities go unavailable; the link reconnects.
    TransportLoss,
    /// An action could not be delivered or was refused.
    CommandFailure,
    /// A selector matched nothing, or more than one thing.
    Resolution,
    /// Caller supplied arguments that make no sense for the target.
    Validation,
    /// Configuration entries, discovery, or anything else internal.
    Internal,
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to controller at {host}: {reason}")]
    ConnectionFailed { host: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Controller connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Controller disconnected")]
    ControllerDisconnected,

    // ── Resolution errors ────────────────────────────────────────────
    #[error("Entity not found: {identifier}")]
    EntityNotFound { identifier: String },

    #[error("Task not found: {selector}")]
    TaskNotFound { selector: String },

    #[error("Task name '{name}' is ambiguous: matches tasks {}", join_vids(.candidates))]
    AmbiguousTaskName { name: String, candidates: Vec<Vid> },

    #[error("Task {vid} exists on several controllers: {}", .entries.join(", "))]
    AmbiguousTaskId { vid: Vid, entries: Vec<String> },

    #[error("Invalid task selector: {message}")]
    InvalidSelector { message: String },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Request for {target} failed: {source}")]
    Command {
        target: String,
        #[source]
        source: vantage_link::Error,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Entry errors ─────────────────────────────────────────────────
    #[error("Config entry not found: {entry_id}")]
    EntryNotFound { entry_id: String },

    #[error("Config entry {entry_id} is not loaded ({state})")]
    EntryNotLoaded { entry_id: String, state: String },

    #[error("Discovery failed: {message}")]
    Discovery { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_vids(vids: &[Vid]) -> String {
    vids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CoreError {
    /// Wrap a link error raised while acting on `target`.
    pub fn command(target: impl Into<String>, source: vantage_link::Error) -> Self {
        Self::Command {
            target: target.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed { .. } | Self::AuthenticationFailed { .. } | Self::Timeout { .. } => {
                ErrorKind::ConnectionFailure
            }
            Self::ControllerDisconnected => ErrorKind::TransportLoss,
            Self::EntityNotFound { .. }
            | Self::TaskNotFound { .. }
            | Self::AmbiguousTaskName { .. }
            | Self::AmbiguousTaskId { .. }
            | Self::InvalidSelector { .. } => ErrorKind::Resolution,
            Self::Command { .. } => ErrorKind::CommandFailure,
            Self::ValidationFailed { .. } => ErrorKind::Validation,
            Self::EntryNotFound { .. }
            | Self::EntryNotLoaded { .. }
            | Self::Discovery { .. }
            | Self::Config { .. }
            | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if new credentials might resolve this error.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::AuthenticationFailed { .. } => true,
            Self::Command { source, .. } => source.is_auth_failure(),
            _ => false,
        }
    }
}

// ── Conversion from link-layer errors ────────────────────────────────

impl From<vantage_link::Error> for CoreError {
    fn from(err: vantage_link::Error) -> Self {
        use vantage_link::Error as L;
        match err {
            L::Authentication { message } => CoreError::AuthenticationFailed { message },
            L::LoginRequired => CoreError::AuthenticationFailed {
                message: "controller requires a login but no credentials are configured".into(),
            },
            L::Connect { host, reason } => CoreError::ConnectionFailed { host, reason },
            L::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            L::ConnectionClosed { .. } | L::NotConnected => CoreError::ControllerDisconnected,
            err @ (L::InvalidObject { .. } | L::Rejected { .. }) => CoreError::Command {
                target: "controller".into(),
                source: err,
            },
            L::Fixture { message } => CoreError::Config { message },
            L::Io(e) => CoreError::Internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_failures_are_connection_failures() {
        let err = CoreError::from(vantage_link::Error::LoginRequired);
        assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
        assert!(err.is_auth_failure());

        let err = CoreError::from(vantage_link::Error::Connect {
            host: "10.0.0.1".into(),
            reason: "refused".into(),
        });
        assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn lost_session_is_transport_loss() {
        let err = CoreError::from(vantage_link::Error::NotConnected);
        assert_eq!(err.kind(), ErrorKind::TransportLoss);
    }

    #[test]
    fn command_failure_keeps_link_source() {
        let err = CoreError::command(
            "light.kitchen (214)",
            vantage_link::Error::Authentication {
                message: "password changed".into(),
            },
        );
        assert_eq!(err.kind(), ErrorKind::CommandFailure);
        assert!(err.is_auth_failure());
        assert_eq!(
            err.to_string(),
            "Request for light.kitchen (214) failed: Authentication failed: password changed"
        );
    }

    #[test]
    fn ambiguous_name_lists_candidates() {
        let err = CoreError::AmbiguousTaskName {
            name: "All Off".into(),
            candidates: vec![Vid(12), Vid(40)],
        };
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert_eq!(err.to_string(), "Task name 'All Off' is ambiguous: matches tasks 12, 40");
    }
}
