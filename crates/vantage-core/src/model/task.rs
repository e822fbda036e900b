// ── Task selection ──

use std::fmt;

use vantage_link::{SystemObject, Vid};

use crate::config::TaskNamePolicy;
use crate::error::CoreError;

/// How a service call names its task: by id or by exact name, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSelector {
    Id(Vid),
    Name(String),
}

impl TaskSelector {
    /// Build a selector from the two optional service fields.
    pub fn from_call(id: Option<u32>, name: Option<&str>) -> Result<Self, CoreError> {
        match (id, name) {
            (Some(id), None) => Ok(Self::Id(Vid(id))),
            (None, Some(name)) if !name.is_empty() => Ok(Self::Name(name.to_owned())),
            (None, Some(_)) => Err(CoreError::InvalidSelector {
                message: "task name must not be empty".into(),
            }),
            (Some(_), Some(_)) => Err(CoreError::InvalidSelector {
                message: "give either a task id or a task name, not both".into(),
            }),
            (None, None) => Err(CoreError::InvalidSelector {
                message: "a task id or a task name is required".into(),
            }),
        }
    }

    /// Every task in `tasks` this selector matches, ordered by vid.
    ///
    /// Name matching is exact and case-sensitive.
    pub fn matches<'a>(&self, tasks: &'a [SystemObject]) -> Vec<&'a SystemObject> {
        let mut found: Vec<&SystemObject> = tasks
            .iter()
            .filter(|t| match self {
                Self::Id(vid) => t.vid == *vid,
                Self::Name(name) => t.name == *name,
            })
            .collect();
        found.sort_by_key(|t| t.vid);
        found
    }
}

impl fmt::Display for TaskSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(vid) => write!(f, "id {vid}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

/// Resolve `selector` against one controller's tasks.
pub fn resolve_task<'a>(
    tasks: &'a [SystemObject],
    selector: &TaskSelector,
    policy: TaskNamePolicy,
) -> Result<&'a SystemObject, CoreError> {
    let found = selector.matches(tasks);
    match (found.as_slice(), selector) {
        ([], _) => Err(CoreError::TaskNotFound {
            selector: selector.to_string(),
        }),
        ([only], _) => Ok(only),
        ([first, ..], TaskSelector::Name(_)) if policy == TaskNamePolicy::First => Ok(first),
        (many, TaskSelector::Name(name)) => Err(CoreError::AmbiguousTaskName {
            name: name.clone(),
            candidates: many.iter().map(|t| t.vid).collect(),
        }),
        // Vids are unique within one directory.
        ([first, ..], TaskSelector::Id(_)) => Ok(first),
    }
}
