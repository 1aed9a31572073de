use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub type TaskId = u64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, text: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            text: text.into(),
            completed: false,
            created_at,
        }
    }

    pub fn toggle(&mut self) {
        self.completed = !self.completed;
    }
}

/// Display order: open tasks before completed ones, newest first inside each group.
pub fn display_order(a: &Task, b: &Task) -> Ordering {
    a.completed
        .cmp(&b.completed)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        Self {
            total: tasks.len(),
            completed: tasks.iter().filter(|task| task.completed).count(),
        }
    }

    pub fn pending(&self) -> usize {
        self.total - self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn open_tasks_sort_before_completed_newest_first() {
        let mut done = Task::new(1, "old done", at(1));
        done.toggle();
        let older = Task::new(2, "older", at(2));
        let newer = Task::new(3, "newer", at(3));

        let mut tasks = vec![done, older, newer];
        tasks.sort_by(display_order);

        let ids: Vec<TaskId> = tasks.iter().map(|task| task.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn equal_timestamps_fall_back_to_id() {
        let first = Task::new(4, "a", at(5));
        let second = Task::new(5, "b", at(5));
        let mut tasks = vec![first, second];
        tasks.sort_by(display_order);
        assert_eq!(tasks[0].id, 5);
    }

    #[test]
    fn deserializes_camel_case_and_backfills_created_at() {
        let task: Task =
            serde_json::from_str(r#"{"id":7,"text":"Legacy","completed":true}"#).unwrap();
        assert_eq!(task.id, 7);
        assert!(task.completed);

        let with_stamp: Task = serde_json::from_str(
            r#"{"id":1,"text":"Buy milk","completed":false,"createdAt":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(with_stamp.created_at, at(0));
    }

    #[test]
    fn stats_count_completed() {
        let mut done = Task::new(1, "a", at(1));
        done.toggle();
        let stats = TaskStats::from_tasks(&[done, Task::new(2, "b", at(2))]);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending(), 1);
    }
}
