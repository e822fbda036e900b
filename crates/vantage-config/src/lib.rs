//! Configuration for the Vantage bridge.
//!
//! TOML config file, persisted config entries, credential resolution
//! (env + keyring + plaintext), and translation to
//! `vantage_core::BridgeConfig`. The CLI layers its flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vantage_core::{
    BridgeConfig, ConfigEntries, ConfigEntry, DeviceInfo, ENTRY_TITLE, EntryData, TaskNamePolicy,
};
use vantage_link::ReconnectConfig;

const KEYRING_SERVICE: &str = "vantage";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no config entry matches '{selector}'")]
    UnknownEntry { selector: String },

    #[error("keyring unavailable: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Bridge tuning shared by every entry.
    #[serde(default)]
    pub bridge: BridgeSettings,

    /// Simulated controller fixtures the bridge can reach.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixtures: Vec<PathBuf>,

    /// One entry per configured controller.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<EntryConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// `[bridge]`: durations use humantime syntax ("10s", "24h").
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeSettings {
    #[serde(with = "humantime_serde_str")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde_str")]
    pub command_timeout: Duration,
    #[serde(with = "humantime_serde_str")]
    pub stale_grace: Duration,
    #[serde(with = "humantime_serde_str")]
    pub sweep_interval: Duration,
    pub task_name_policy: TaskNamePolicy,
    pub reconnect: Backoff,
    pub setup_retry: Backoff,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        let core = BridgeConfig::default();
        Self {
            connect_timeout: core.connect_timeout,
            command_timeout: core.command_timeout,
            stale_grace: core.stale_grace,
            sweep_interval: core.sweep_interval,
            task_name_policy: core.task_name_policy,
            reconnect: Backoff::from(&core.reconnect),
            setup_retry: Backoff::from(&core.setup_retry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Backoff {
    #[serde(with = "humantime_serde_str")]
    pub initial_delay: Duration,
    #[serde(with = "humantime_serde_str")]
    pub max_delay: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for Backoff {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            max_retries: config.max_retries,
        }
    }
}

impl From<&Backoff> for ReconnectConfig {
    fn from(backoff: &Backoff) -> Self {
        Self {
            initial_delay: backoff.initial_delay,
            max_delay: backoff.max_delay,
            max_retries: backoff.max_retries,
        }
    }
}

impl BridgeSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("bridge.connect_timeout", self.connect_timeout),
            ("bridge.command_timeout", self.command_timeout),
            ("bridge.sweep_interval", self.sweep_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "must be greater than zero".into(),
                });
            }
        }
        for (field, backoff) in [
            ("bridge.reconnect", &self.reconnect),
            ("bridge.setup_retry", &self.setup_retry),
        ] {
            if backoff.initial_delay > backoff.max_delay {
                return Err(ConfigError::Validation {
                    field: field.into(),
                    reason: "initial_delay exceeds max_delay".into(),
                });
            }
        }
        Ok(())
    }

    pub fn to_bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            reconnect: ReconnectConfig::from(&self.reconnect),
            setup_retry: ReconnectConfig::from(&self.setup_retry),
            stale_grace: self.stale_grace,
            sweep_interval: self.sweep_interval,
            task_name_policy: self.task_name_policy,
        }
    }
}

/// One persisted config entry, `[[entries]]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EntryConfig {
    pub entry_id: String,

    /// Controller serial number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,

    #[serde(default = "default_title")]
    pub title: String,

    pub host: String,

    #[serde(default = "default_ssl")]
    pub ssl: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Plaintext password. Prefer the keyring or `password_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceInfo>,
}

fn default_title() -> String {
    ENTRY_TITLE.into()
}
fn default_ssl() -> bool {
    true
}
fn default_version() -> u32 {
    1
}

impl EntryConfig {
    /// A persisted form of `entry`. The password is never copied; store it
    /// with [`store_password`].
    pub fn from_entry(entry: &ConfigEntry) -> Self {
        let mut config = Self {
            entry_id: entry.entry_id.clone(),
            unique_id: None,
            title: String::new(),
            host: String::new(),
            ssl: true,
            username: None,
            password: None,
            password_env: None,
            version: 1,
            devices: Vec::new(),
        };
        config.update_from(entry);
        config
    }

    /// Copy everything but the password from `entry`.
    pub fn update_from(&mut self, entry: &ConfigEntry) {
        self.unique_id.clone_from(&entry.unique_id);
        self.title.clone_from(&entry.title);
        self.host.clone_from(&entry.data.host);
        self.ssl = entry.data.ssl;
        self.username.clone_from(&entry.data.username);
        self.version = entry.version;
        self.devices.clone_from(&entry.devices);
    }

    /// Build the runtime entry, resolving the password.
    pub fn to_entry(&self) -> ConfigEntry {
        self.to_entry_with(&|name| std::env::var(name).ok(), &keyring_password)
    }

    fn to_entry_with(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
        keyring: &dyn Fn(&str) -> Option<String>,
    ) -> ConfigEntry {
        ConfigEntry {
            entry_id: self.entry_id.clone(),
            unique_id: self.unique_id.clone(),
            title: self.title.clone(),
            data: EntryData {
                host: self.host.clone(),
                ssl: self.ssl,
                username: self.username.clone(),
                password: resolve_password_with(self, env, keyring),
            },
            version: self.version,
            devices: self.devices.clone(),
        }
    }
}

mod humantime_serde_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

// ── Entry registry ──────────────────────────────────────────────────

impl Config {
    /// Runtime registry of every persisted entry.
    pub fn config_entries(&self) -> ConfigEntries {
        ConfigEntries::from_entries(self.entries.iter().map(EntryConfig::to_entry))
    }

    /// Mirror `entries` into the persisted list, keeping password sources
    /// of entries that already existed. Entries no longer present are
    /// dropped.
    pub fn sync_entries(&mut self, entries: &ConfigEntries) {
        let mut synced = Vec::with_capacity(entries.len());
        for entry in entries.all() {
            match self.entries.iter().position(|e| e.entry_id == entry.entry_id) {
                Some(index) => {
                    let mut existing = self.entries.swap_remove(index);
                    existing.update_from(&entry);
                    synced.push(existing);
                }
                None => synced.push(EntryConfig::from_entry(&entry)),
            }
        }
        self.entries = synced;
    }

    /// Find an entry by id, id prefix, serial number, or host.
    pub fn find_entry(&self, selector: &str) -> Result<&EntryConfig, ConfigError> {
        let exact = self.entries.iter().find(|e| {
            e.entry_id == selector || e.unique_id.as_deref() == Some(selector) || e.host == selector
        });
        if let Some(entry) = exact {
            return Ok(entry);
        }
        let mut prefixed = self.entries.iter().filter(|e| e.entry_id.starts_with(selector));
        match (prefixed.next(), prefixed.next()) {
            (Some(entry), None) if !selector.is_empty() => Ok(entry),
            _ => Err(ConfigError::UnknownEntry {
                selector: selector.into(),
            }),
        }
    }

    pub fn find_entry_mut(&mut self, entry_id: &str) -> Option<&mut EntryConfig> {
        self.entries.iter_mut().find(|e| e.entry_id == entry_id)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `VANTAGE_CONFIG`, else the platform
/// config directory.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("VANTAGE_CONFIG") {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "vantage", "vantage").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("vantage");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full config from the default path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, then `VANTAGE_`-prefixed environment variables.
/// Nested keys use a double underscore: `VANTAGE_BRIDGE__STALE_GRACE=1h`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("VANTAGE_").split("__").ignore(&["config", "password"]));

    let config: Config = figment.extract()?;
    config.bridge.validate()?;
    debug!(path = %path.display(), entries = config.entries.len(), "config loaded");
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_account(entry_id: &str) -> String {
    format!("{entry_id}/password")
}

fn keyring_password(entry_id: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_account(entry_id))
        .ok()?
        .get_password()
        .ok()
}

/// Resolve an entry's password: its `password_env` variable, then the
/// system keyring, then plaintext in the config.
pub fn resolve_password(entry: &EntryConfig) -> Option<SecretString> {
    resolve_password_with(entry, &|name| std::env::var(name).ok(), &keyring_password)
}

fn resolve_password_with(
    entry: &EntryConfig,
    env: &dyn Fn(&str) -> Option<String>,
    keyring: &dyn Fn(&str) -> Option<String>,
) -> Option<SecretString> {
    // 1. Named env var
    if let Some(value) = entry.password_env.as_deref().and_then(env) {
        return Some(SecretString::from(value));
    }

    // 2. Keyring
    if let Some(value) = keyring(&entry.entry_id) {
        return Some(SecretString::from(value));
    }

    // 3. Plaintext in config
    entry.password.clone().map(SecretString::from)
}

/// Where a newly entered password is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordStorage {
    Keyring,
    Plaintext,
}

/// Persist `password` for `entry`.
pub fn store_password(
    entry: &mut EntryConfig,
    password: &SecretString,
    storage: PasswordStorage,
) -> Result<(), ConfigError> {
    match storage {
        PasswordStorage::Keyring => {
            keyring::Entry::new(KEYRING_SERVICE, &keyring_account(&entry.entry_id))?
                .set_password(password.expose_secret())?;
            entry.password = None;
        }
        PasswordStorage::Plaintext => {
            entry.password = Some(password.expose_secret().to_owned());
        }
    }
    Ok(())
}

/// Remove a stored keyring password. Missing entries are fine.
pub fn forget_password(entry_id: &str) -> Result<(), ConfigError> {
    match keyring::Entry::new(KEYRING_SERVICE, &keyring_account(entry_id))?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry_config() -> EntryConfig {
        EntryConfig {
            entry_id: "0f4c2a".into(),
            unique_id: Some("2024166".into()),
            title: ENTRY_TITLE.into(),
            host: "192.168.1.40".into(),
            ssl: true,
            username: Some("administrator".into()),
            password: Some("plain".into()),
            password_env: Some("POOL_PW".into()),
            version: 2,
            devices: Vec::new(),
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.defaults.output, "table");
        assert_eq!(config.bridge, BridgeSettings::default());
        assert!(config.entries.is_empty());
    }

    #[test]
    fn durations_use_humantime_syntax() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[bridge]
command_timeout = "5s"
stale_grace = "0s"
task_name_policy = "first"

[bridge.setup_retry]
initial_delay = "2s"
max_delay = "1m"
max_retries = 10
"#,
        )
        .unwrap();

        let bridge = load_config_from(&path).unwrap().bridge.to_bridge_config();
        assert_eq!(bridge.command_timeout, Duration::from_secs(5));
        assert_eq!(bridge.stale_grace, Duration::ZERO);
        assert_eq!(bridge.task_name_policy, TaskNamePolicy::First);
        assert_eq!(bridge.setup_retry.max_delay, Duration::from_secs(60));
        assert_eq!(bridge.setup_retry.max_retries, Some(10));
        assert_eq!(bridge.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[bridge]\nsweep_interval = \"0s\"\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid bridge.sweep_interval: must be greater than zero"
        );
    }

    #[test]
    fn entries_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            entries: vec![entry_config()],
            ..Config::default()
        };
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.entries, config.entries);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[[entries]]"));
        assert!(text.contains("command_timeout = \"10s\""));
    }

    #[test]
    fn password_resolution_order() {
        let entry = entry_config();
        let env = |name: &str| (name == "POOL_PW").then(|| "from-env".to_owned());
        let keyring = |_: &str| Some("from-keyring".to_owned());
        let none = |_: &str| None;

        let pw = resolve_password_with(&entry, &env, &keyring).unwrap();
        assert_eq!(pw.expose_secret(), "from-env");
        let pw = resolve_password_with(&entry, &none, &keyring).unwrap();
        assert_eq!(pw.expose_secret(), "from-keyring");
        let pw = resolve_password_with(&entry, &none, &none).unwrap();
        assert_eq!(pw.expose_secret(), "plain");

        let bare = EntryConfig {
            password: None,
            ..entry
        };
        assert!(resolve_password_with(&bare, &none, &none).is_none());
    }

    #[test]
    fn sync_keeps_password_sources() {
        let mut config = Config {
            entries: vec![entry_config()],
            ..Config::default()
        };
        let mut runtime = entry_config().to_entry_with(&|_| None, &|_| None);
        runtime.data.host = "192.168.1.41".into();
        let added = ConfigEntry::new("5151", EntryData::new("192.168.1.42"));
        let registry = ConfigEntries::from_entries([runtime, added.clone()]);

        config.sync_entries(&registry);
        assert_eq!(config.entries.len(), 2);
        assert_eq!(config.entries[0].host, "192.168.1.41");
        assert_eq!(config.entries[0].password_env.as_deref(), Some("POOL_PW"));
        assert_eq!(config.entries[0].password.as_deref(), Some("plain"));
        assert_eq!(config.entries[1].entry_id, added.entry_id);
        assert!(config.entries[1].password.is_none());
    }

    #[test]
    fn entries_are_found_by_id_prefix_serial_or_host() {
        let config = Config {
            entries: vec![entry_config()],
            ..Config::default()
        };
        assert_eq!(config.find_entry("0f4").unwrap().entry_id, "0f4c2a");
        assert_eq!(config.find_entry("2024166").unwrap().entry_id, "0f4c2a");
        assert_eq!(config.find_entry("192.168.1.40").unwrap().entry_id, "0f4c2a");
        assert!(config.find_entry("ffff").is_err());
        assert!(config.find_entry("").is_err());
    }
}
