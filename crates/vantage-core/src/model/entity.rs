// ── Bridge entities ──

use chrono::{DateTime, Utc};
use serde::Serialize;
use vantage_link::{SystemObject, Vid};

use super::classify::{EntityKind, Platform};
use super::project::{EntityState, project};

/// One platform entity, owned by exactly one controller object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    /// Decimal vid. Never reused: a recreated object gets a new vid.
    pub unique_id: String,
    pub vid: Vid,
    pub name: String,
    pub kind: EntityKind,
    pub state: EntityState,
    pub available: bool,
    /// Set when the controller stops reporting the object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_since: Option<DateTime<Utc>>,
    pub enabled_by_default: bool,
    pub hidden: bool,
    pub device_id: String,
}

impl Entity {
    /// Build the entity for `object`, rendering its current state.
    pub fn new(
        object: &SystemObject,
        kind: EntityKind,
        children: &[SystemObject],
        device_id: String,
    ) -> Self {
        Self {
            unique_id: unique_id(object.vid),
            vid: object.vid,
            name: object.name.clone(),
            kind,
            state: project(&kind, object, children),
            available: true,
            stale_since: None,
            enabled_by_default: kind.enabled_by_default(),
            hidden: kind.hidden_by_default(),
            device_id,
        }
    }

    pub fn platform(&self) -> Platform {
        self.kind.platform()
    }

    /// `"light.kitchen_pendants"`-style id for logs and tables.
    pub fn entity_id(&self) -> String {
        format!("{}.{}", self.platform(), slug(&self.name))
    }

    pub fn is_stale(&self) -> bool {
        self.stale_since.is_some()
    }
}

pub fn unique_id(vid: Vid) -> String {
    vid.to_string()
}

fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() { "unnamed".into() } else { out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::classify::classify;
    use vantage_link::ObjectType;

    #[test]
    fn entity_id_is_slugged_by_platform() {
        let obj = SystemObject::new(214, "Kitchen  Pendants (East)", ObjectType::Load);
        let Some(kind) = classify(&obj) else {
            panic!("load should classify");
        };
        let entity = Entity::new(&obj, kind, &[], "214".into());
        assert_eq!(entity.unique_id, "214");
        assert_eq!(entity.entity_id(), "light.kitchen_pendants_east");
        assert!(entity.available);
        assert!(!entity.is_stale());
    }

    #[test]
    fn slug_of_symbols_only_name() {
        assert_eq!(slug("***"), "unnamed");
    }
}
