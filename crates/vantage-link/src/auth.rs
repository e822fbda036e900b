use secrecy::SecretString;

/// Default login name on a factory-configured controller.
pub const DEFAULT_USERNAME: &str = "administrator";

/// Login credentials for a controller with authentication enabled.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Everything needed to open a session against one controller.
///
/// Carries secret material, so it never implements `Serialize`.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    /// Hostname or IP address.
    pub host: String,
    /// Use the TLS port.
    pub ssl: bool,
    /// `None` when the controller has authentication disabled.
    pub credentials: Option<Credentials>,
}

impl ConnectParams {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ssl: true,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}
