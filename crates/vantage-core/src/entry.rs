// ── Config entries ──
//
// One entry per physical controller. The entry carries the connection
// parameters and the devices registered for it; the controller's serial
// number is the entry's unique id and prevents adding a controller twice.
// Persistence belongs to the caller; this is the in-memory registry.

use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;
use secrecy::SecretString;
use vantage_link::{ConnectParams, Credentials, DEFAULT_USERNAME};

use crate::error::CoreError;
use crate::model::DeviceInfo;

/// Title every entry is created with.
pub const ENTRY_TITLE: &str = "Vantage InFusion";

/// Connection parameters stored in an entry.
#[derive(Debug, Clone)]
pub struct EntryData {
    pub host: String,
    pub ssl: bool,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

impl EntryData {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ssl: true,
            username: None,
            password: None,
        }
    }

    #[must_use]
    pub fn with_login(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.username = Some(username.into());
        self.password = Some(password);
        self
    }

    /// Credentials to log in with. A password without a username logs in
    /// as the factory default user.
    pub fn credentials(&self) -> Option<Credentials> {
        let password = self.password.clone()?;
        Some(Credentials {
            username: self
                .username
                .clone()
                .unwrap_or_else(|| DEFAULT_USERNAME.to_owned()),
            password,
        })
    }

    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            host: self.host.clone(),
            ssl: self.ssl,
            credentials: self.credentials(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigEntry {
    /// Random, stable across reconfiguration.
    pub entry_id: String,
    /// Controller serial number.
    pub unique_id: Option<String>,
    pub title: String,
    pub data: EntryData,
    pub version: u32,
    /// Devices registered for this entry.
    pub devices: Vec<DeviceInfo>,
}

impl ConfigEntry {
    pub fn new(unique_id: impl Into<String>, data: EntryData) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().simple().to_string(),
            unique_id: Some(unique_id.into()),
            title: ENTRY_TITLE.to_owned(),
            data,
            version: crate::migrate::CURRENT_VERSION,
            devices: Vec::new(),
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────

/// Every config entry known to this process, in creation order.
#[derive(Debug, Default)]
pub struct ConfigEntries {
    entries: RwLock<IndexMap<String, ConfigEntry>>,
}

impl ConfigEntries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ConfigEntry>) -> Self {
        let map = entries
            .into_iter()
            .map(|entry| (entry.entry_id.clone(), entry))
            .collect();
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Add `entry`. One entry per controller: a second entry with the same
    /// unique id is refused.
    pub fn add(&self, entry: ConfigEntry) -> Result<(), CoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(uid) = entry.unique_id.as_deref() {
            if entries
                .values()
                .any(|e| e.unique_id.as_deref() == Some(uid))
            {
                return Err(CoreError::Config {
                    message: format!("controller {uid} is already configured"),
                });
            }
        }
        entries.insert(entry.entry_id.clone(), entry);
        Ok(())
    }

    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entry_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<ConfigEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn remove(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(entry_id)
    }

    /// Mutate one entry in place and return the updated copy.
    pub fn update<F>(&self, entry_id: &str, f: F) -> Result<ConfigEntry, CoreError>
    where
        F: FnOnce(&mut ConfigEntry),
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(entry_id)
            .ok_or_else(|| CoreError::EntryNotFound {
                entry_id: entry_id.to_owned(),
            })?;
        f(entry);
        Ok(entry.clone())
    }

    pub fn find_by_unique_id(&self, unique_id: &str) -> Option<ConfigEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|e| e.unique_id.as_deref() == Some(unique_id))
            .cloned()
    }

    pub fn find_by_host(&self, host: &str) -> Option<ConfigEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|e| e.data.host == host)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn same_controller_cannot_be_added_twice() {
        let entries = ConfigEntries::new();
        entries
            .add(ConfigEntry::new("4242", EntryData::new("10.0.0.5")))
            .unwrap();
        let err = entries
            .add(ConfigEntry::new("4242", EntryData::new("10.0.0.6")))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: controller 4242 is already configured"
        );
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn update_keeps_entry_id() {
        let entries = ConfigEntries::new();
        let entry = ConfigEntry::new("4242", EntryData::new("10.0.0.5"));
        let id = entry.entry_id.clone();
        entries.add(entry).unwrap();

        let updated = entries
            .update(&id, |e| e.data.host = "10.0.0.9".into())
            .unwrap();
        assert_eq!(updated.entry_id, id);
        assert_eq!(entries.find_by_host("10.0.0.9").unwrap().entry_id, id);
        assert!(entries.find_by_host("10.0.0.5").is_none());
        assert!(entries.update("nope", |_| {}).is_err());
    }

    #[test]
    fn password_without_username_uses_default_login() {
        let data = EntryData {
            password: Some(SecretString::from("secret")),
            ..EntryData::new("10.0.0.5")
        };
        let params = data.connect_params();
        let credentials = params.credentials.unwrap();
        assert_eq!(credentials.username, "administrator");
        assert_eq!(credentials.password.expose_secret(), "secret");
        assert!(EntryData::new("10.0.0.5").connect_params().credentials.is_none());
    }

    #[test]
    fn new_entries_use_the_fixed_title() {
        let entry = ConfigEntry::new("4242", EntryData::new("h"));
        assert_eq!(entry.title, "Vantage InFusion");
        assert_eq!(entry.entry_id.len(), 32);
        assert_eq!(entry.unique_id.as_deref(), Some("4242"));
    }
}
