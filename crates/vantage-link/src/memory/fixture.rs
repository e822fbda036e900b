// ── Controller fixtures ──
//
// A YAML or JSON description of one simulated controller: identity,
// login policy, object directory, and an optional timed script of
// notifications to replay once a session is live.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::auth::DEFAULT_USERNAME;
use crate::error::Error;
use crate::object::{SystemObject, Vid};
use crate::state::ObjectState;

fn default_true() -> bool {
    true
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_owned()
}

/// A simulated controller as read from disk.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerFixture {
    pub host: String,
    pub serial_number: String,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default = "default_true")]
    pub supports_ssl: bool,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub objects: Vec<SystemObject>,
    #[serde(default)]
    pub script: Vec<ScriptStep>,
}

/// One scripted notification, fired `after` the previous step.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    #[serde(default, deserialize_with = "deserialize_delay")]
    pub after: Duration,
    #[serde(flatten)]
    pub action: ScriptAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    Update { vid: Vid, changes: ObjectState },
    Add { object: SystemObject },
    Delete { vid: Vid },
    Unreachable { vid: Vid },
    Drop { reason: String },
}

/// Accepts `humantime` strings (`"250ms"`, `"2s"`) or bare milliseconds.
fn deserialize_delay<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
        Raw::Text(s) => humantime::parse_duration(&s).map_err(serde::de::Error::custom),
    }
}

impl ControllerFixture {
    /// Load a fixture, picking the format from the file extension
    /// (`.json` is JSON, anything else YAML).
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let fixture = if is_json {
            Self::from_json(&raw)
        } else {
            Self::from_yaml(&raw)
        }
        .map_err(|e| Error::Fixture {
            message: format!("{}: {e}", path.display()),
        })?;

        tracing::debug!(
            path = %path.display(),
            objects = fixture.objects.len(),
            script_steps = fixture.script.len(),
            "Loaded controller fixture"
        );
        Ok(fixture)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, Error> {
        let fixture: Self = serde_yaml::from_str(raw).map_err(|e| Error::Fixture {
            message: e.to_string(),
        })?;
        fixture.validate()
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        let fixture: Self = serde_json::from_str(raw).map_err(|e| Error::Fixture {
            message: e.to_string(),
        })?;
        fixture.validate()
    }

    fn validate(self) -> Result<Self, Error> {
        let mut seen = std::collections::HashSet::new();
        for object in &self.objects {
            if !seen.insert(object.vid) {
                return Err(Error::Fixture {
                    message: format!("duplicate vid {}", object.vid),
                });
            }
        }
        if self.requires_auth && self.password.is_none() {
            return Err(Error::Fixture {
                message: "requires_auth is set but no password is given".into(),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::object::ObjectType;

    const FIXTURE: &str = r"
host: 192.168.1.50
serial_number: '12345678'
requires_auth: true
password: hunter2
objects:
  - { vid: 1, name: Master, type: Master, firmware_version: '4.1.5' }
  - { vid: 683, name: Toggle Office Lights, type: Task }
script:
  - { after: 250ms, action: update, vid: 683, changes: { running: true } }
  - { after: 1500, action: drop, reason: cable pulled }
";

    #[test]
    fn parses_yaml_fixture_with_script() {
        let fixture = ControllerFixture::from_yaml(FIXTURE).unwrap();
        assert_eq!(fixture.serial_number, "12345678");
        assert_eq!(fixture.username, "administrator");
        assert!(fixture.supports_ssl);
        assert_eq!(fixture.objects[1].object_type, ObjectType::Task);

        assert_eq!(fixture.script[0].after, Duration::from_millis(250));
        assert!(matches!(
            fixture.script[0].action,
            ScriptAction::Update { vid: Vid(683), .. }
        ));
        assert_eq!(fixture.script[1].after, Duration::from_millis(1500));
        assert!(matches!(fixture.script[1].action, ScriptAction::Drop { .. }));
    }

    #[test]
    fn duplicate_vids_are_rejected() {
        let raw = r"
host: h
serial_number: '1'
objects:
  - { vid: 5, name: A, type: Load }
  - { vid: 5, name: B, type: Load }
";
        let err = ControllerFixture::from_yaml(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate vid 5"));
    }

    #[test]
    fn auth_without_password_is_rejected() {
        let raw = "host: h\nserial_number: '1'\nrequires_auth: true\n";
        assert!(matches!(
            ControllerFixture::from_yaml(raw),
            Err(Error::Fixture { .. })
        ));
    }

    #[test]
    fn load_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctrl.json");
        std::fs::write(
            &path,
            r#"{"host":"10.0.0.2","serial_number":"99","objects":[]}"#,
        )
        .unwrap();
        let fixture = ControllerFixture::load(&path).unwrap();
        assert_eq!(fixture.host, "10.0.0.2");
    }
}
