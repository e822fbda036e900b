use thiserror::Error;

use crate::object::Vid;

/// Top-level error type for the `vantage-link` crate.
///
/// Covers every failure mode of a controller session: authentication,
/// transport, per-object rejections, and fixture loading for simulated
/// controllers. `vantage-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong username or password).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The controller has authentication enabled but no credentials were given.
    #[error("Controller requires a login but no credentials were provided")]
    LoginRequired,

    // ── Transport ───────────────────────────────────────────────────
    /// Could not reach the controller (refused, unroutable, DNS failure).
    #[error("Cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    /// Connect or command did not complete in time.
    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// An established session dropped.
    #[error("Connection closed: {reason}")]
    ConnectionClosed { reason: String },

    /// The link is between sessions; nothing was sent.
    #[error("Not connected to controller")]
    NotConnected,

    // ── Objects ─────────────────────────────────────────────────────
    /// The controller no longer knows this object (deleted or reprogrammed).
    #[error("Invalid object {vid}")]
    InvalidObject { vid: Vid },

    /// The controller refused the command.
    #[error("Command rejected by controller: {message}")]
    Rejected { message: String },

    // ── Fixtures ────────────────────────────────────────────────────
    /// A simulated-controller fixture could not be parsed.
    #[error("Invalid fixture: {message}")]
    Fixture { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` if new credentials might resolve this error.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::LoginRequired)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Timeout { .. }
                | Self::ConnectionClosed { .. }
                | Self::NotConnected
        )
    }

    /// Returns `true` if the session that produced this error is gone.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::ConnectionClosed { .. } | Self::Connect { .. })
    }
}
