// ── Task services ──
//
// `start_task` / `stop_task`: resolve a task by id or exact name, then
// send one command. A failed command is reported once and never retried,
// so a physical action is never repeated behind the caller's back.

use serde::{Deserialize, Serialize};
use vantage_link::{ObjectCommand, SystemObject, Vid};

use crate::config::TaskNamePolicy;
use crate::error::CoreError;
use crate::model::TaskSelector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskService {
    StartTask,
    StopTask,
}

impl TaskService {
    pub fn command(self, vid: Vid) -> ObjectCommand {
        match self {
            Self::StartTask => ObjectCommand::StartTask { vid },
            Self::StopTask => ObjectCommand::StopTask { vid },
        }
    }
}

/// Fields of a task service call. Exactly one of `id` / `name` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskCall {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    /// Restrict resolution to one config entry.
    #[serde(default)]
    pub entry_id: Option<String>,
}

impl TaskCall {
    pub fn by_id(id: u32) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn on_entry(mut self, entry_id: impl Into<String>) -> Self {
        self.entry_id = Some(entry_id.into());
        self
    }

    pub fn selector(&self) -> Result<TaskSelector, CoreError> {
        TaskSelector::from_call(self.id, self.name.as_deref())
    }
}

/// The task a call acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTarget {
    pub entry_id: String,
    pub task_id: Vid,
    pub task_name: String,
}

/// Resolve `selector` across several entries' task lists.
///
/// A selector matching tasks on more than one controller is ambiguous
/// unless the policy picks the first: lowest vid, then lowest entry id.
pub(crate) fn resolve_across(
    entries: &[(String, Vec<SystemObject>)],
    selector: &TaskSelector,
    policy: TaskNamePolicy,
) -> Result<TaskTarget, CoreError> {
    let mut found: Vec<(&str, &SystemObject)> = entries
        .iter()
        .flat_map(|(entry_id, tasks)| {
            selector
                .matches(tasks)
                .into_iter()
                .map(move |task| (entry_id.as_str(), task))
        })
        .collect();
    found.sort_by(|a, b| a.1.vid.cmp(&b.1.vid).then_with(|| a.0.cmp(b.0)));

    let (entry_id, task) = match found.as_slice() {
        [] => {
            return Err(CoreError::TaskNotFound {
                selector: selector.to_string(),
            });
        }
        [only] => *only,
        [first, ..] if policy == TaskNamePolicy::First => *first,
        many => {
            return Err(match selector {
                TaskSelector::Name(name) => CoreError::AmbiguousTaskName {
                    name: name.clone(),
                    candidates: many.iter().map(|(_, t)| t.vid).collect(),
                },
                TaskSelector::Id(vid) => CoreError::AmbiguousTaskId {
                    vid: *vid,
                    entries: many.iter().map(|(e, _)| (*e).to_owned()).collect(),
                },
            });
        }
    };

    Ok(TaskTarget {
        entry_id: entry_id.to_owned(),
        task_id: task.vid,
        task_name: task.name.clone(),
    })
}
