use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::{
    notifications::{NotificationRequest, NotificationSink},
    store::{LocalStore, MemoryStore, TASKS_KEY, TASK_COUNTER_KEY},
    task::{display_order, Task, TaskId, TaskStats},
    toast::Toast,
};

pub const TASK_CREATED_TITLE: &str = "Task added";

const SAMPLE_TASKS: [&str; 5] = [
    "Do the grocery shopping",
    "Call the doctor for an appointment",
    "Finish the work project",
    "Exercise for 30 minutes",
    "Read 20 pages of the book",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("task text must not be empty")]
    EmptyText,
    #[error("task {0} not found")]
    NotFound(TaskId),
    #[error("no task ids left")]
    IdsExhausted,
}

/// Result of reading the store at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing stored yet.
    Empty,
    Restored { tasks: usize },
    /// Stored data was unreadable and has been replaced by an empty list.
    Recovered { reason: String },
}

impl LoadOutcome {
    pub fn toast(&self) -> Option<Toast> {
        match self {
            LoadOutcome::Recovered { .. } => Some(Toast::warning(
                "Could not load saved tasks, starting with an empty list",
            )),
            LoadOutcome::Empty | LoadOutcome::Restored { .. } => None,
        }
    }
}

/// A mutated task together with the toasts the UI should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskChange {
    pub task: Task,
    pub toasts: Vec<Toast>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub tasks: Vec<Task>,
    pub task_id_counter: TaskId,
    pub export_date: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TaskList {
    tasks: Vec<Task>,
    counter: TaskId,
}

impl TaskList {
    /// Advances the counter. `None` once every id has been handed out.
    fn next_id(&mut self) -> Option<TaskId> {
        self.counter = self.counter.checked_add(1)?;
        Some(self.counter)
    }
}

pub struct TaskService {
    store: Arc<dyn LocalStore>,
    list: RwLock<TaskList>,
    notification_sink: Option<Box<dyn NotificationSink>>,
    last_load: LoadOutcome,
}

pub struct TaskServiceBuilder {
    store: Option<Arc<dyn LocalStore>>,
    notification_sink: Option<Box<dyn NotificationSink>>,
}

impl TaskServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            notification_sink: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notification_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    /// Builds the service and loads whatever the store holds. Load failures
    /// are recovered, never returned: inspect [`TaskService::last_load`].
    pub fn build(self) -> TaskService {
        let mut service = TaskService {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            list: RwLock::new(TaskList::default()),
            notification_sink: self.notification_sink,
            last_load: LoadOutcome::Empty,
        };
        service.reload();
        service
    }
}

impl Default for TaskServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskService {
    pub fn builder() -> TaskServiceBuilder {
        TaskServiceBuilder::new()
    }

    pub fn last_load(&self) -> &LoadOutcome {
        &self.last_load
    }

    #[instrument(skip(self))]
    pub fn reload(&mut self) -> LoadOutcome {
        let outcome = match self.read_store() {
            Ok(None) => {
                *self.list.write() = TaskList::default();
                LoadOutcome::Empty
            }
            Ok(Some(list)) => {
                let count = list.tasks.len();
                info!(tasks = count, counter = list.counter, "tasks restored");
                *self.list.write() = list;
                LoadOutcome::Restored { tasks: count }
            }
            Err(err) => {
                let reason = format!("{err:#}");
                error!(%reason, "stored tasks unreadable, resetting to an empty list");
                *self.list.write() = TaskList::default();
                LoadOutcome::Recovered { reason }
            }
        };
        self.last_load = outcome.clone();
        outcome
    }

    /// Tasks in display order.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks = self.list.read().tasks.clone();
        tasks.sort_by(display_order);
        tasks
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.list.read().tasks.iter().find(|task| task.id == id).cloned()
    }

    pub fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.list.read().tasks)
    }

    pub fn counter(&self) -> TaskId {
        self.list.read().counter
    }

    #[instrument(skip(self))]
    pub fn create_task(&self, text: &str) -> Result<TaskChange, TaskError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TaskError::EmptyText);
        }

        let mut toasts = Vec::new();
        let task = {
            let mut list = self.list.write();
            let id = list.next_id().ok_or(TaskError::IdsExhausted)?;
            let task = Task::new(id, text, Utc::now());
            list.tasks.push(task.clone());
            toasts.extend(self.persist(&list));
            task
        };
        info!(id = task.id, "task created");

        // Persistence has completed; delivery is handed off and never awaited.
        if let Some(sink) = &self.notification_sink {
            if let Ok(request) = NotificationRequest::new(TASK_CREATED_TITLE, task.text.clone()) {
                sink.notify(request);
            }
        }

        toasts.push(Toast::success("Task added"));
        Ok(TaskChange { task, toasts })
    }

    #[instrument(skip(self))]
    pub fn toggle_task(&self, id: TaskId) -> Result<TaskChange, TaskError> {
        let mut list = self.list.write();
        let task = list
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or(TaskError::NotFound(id))?;
        task.toggle();
        let task = task.clone();

        let mut toasts: Vec<Toast> = self.persist(&list).into_iter().collect();
        if task.completed {
            toasts.push(Toast::success("Task completed!"));
        }
        info!(id, completed = task.completed, "task toggled");
        Ok(TaskChange { task, toasts })
    }

    #[instrument(skip(self))]
    pub fn delete_task(&self, id: TaskId) -> Result<TaskChange, TaskError> {
        let mut list = self.list.write();
        let index = list
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or(TaskError::NotFound(id))?;
        let task = list.tasks.remove(index);

        let mut toasts: Vec<Toast> = self.persist(&list).into_iter().collect();
        toasts.push(Toast::info("Task deleted"));
        info!(id, "task deleted");
        Ok(TaskChange { task, toasts })
    }

    /// Drops every task. The id counter is kept so ids stay unique for the
    /// rest of the session.
    pub fn clear_all(&self) -> Vec<Toast> {
        let mut list = self.list.write();
        list.tasks.clear();
        let mut toasts: Vec<Toast> = self.persist(&list).into_iter().collect();
        toasts.push(Toast::info("All tasks deleted"));
        toasts
    }

    pub fn add_sample_tasks(&self) -> Vec<Toast> {
        let mut list = self.list.write();
        let now = Utc::now();
        let mut exhausted = false;
        for text in SAMPLE_TASKS {
            let Some(id) = list.next_id() else {
                exhausted = true;
                break;
            };
            list.tasks.push(Task::new(id, text, now));
        }
        let mut toasts: Vec<Toast> = self.persist(&list).into_iter().collect();
        if exhausted {
            warn!(counter = list.counter, "task ids exhausted");
            toasts.push(Toast::warning(TaskError::IdsExhausted.to_string()));
        } else {
            toasts.push(Toast::info("Sample tasks added"));
        }
        toasts
    }

    pub fn export_snapshot(&self) -> ExportSnapshot {
        let list = self.list.read();
        ExportSnapshot {
            tasks: list.tasks.clone(),
            task_id_counter: list.counter,
            export_date: Utc::now(),
        }
    }

    fn read_store(&self) -> Result<Option<TaskList>> {
        let tasks_raw = self.store.get(TASKS_KEY).context("reading stored tasks")?;
        let counter_raw = self
            .store
            .get(TASK_COUNTER_KEY)
            .context("reading stored task counter")?;
        if tasks_raw.is_none() && counter_raw.is_none() {
            return Ok(None);
        }

        let tasks: Vec<Task> = match tasks_raw {
            Some(raw) => serde_json::from_str(&raw).context("stored tasks are malformed")?,
            None => Vec::new(),
        };
        let stored_counter: TaskId = match counter_raw {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("stored task counter `{raw}` is not an integer"))?,
            None => 0,
        };
        let highest_id = tasks.iter().map(|task| task.id).max().unwrap_or(0);
        if highest_id > stored_counter {
            warn!(
                stored_counter,
                highest_id, "task counter lags behind stored ids, advancing"
            );
        }

        Ok(Some(TaskList {
            counter: stored_counter.max(highest_id),
            tasks,
        }))
    }

    fn persist(&self, list: &TaskList) -> Option<Toast> {
        match self.write_store(list) {
            Ok(()) => None,
            Err(err) => {
                let reason = format!("{err:#}");
                error!(%reason, "unable to persist tasks");
                Some(Toast::error("Could not save tasks"))
            }
        }
    }

    fn write_store(&self, list: &TaskList) -> Result<()> {
        let raw = serde_json::to_string(&list.tasks).context("encoding tasks")?;
        self.store.set(TASKS_KEY, &raw).context("writing tasks")?;
        self.store
            .set(TASK_COUNTER_KEY, &list.counter.to_string())
            .context("writing task counter")?;
        Ok(())
    }
}
