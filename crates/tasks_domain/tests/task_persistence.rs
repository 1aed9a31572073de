use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use tasks_domain::service::LoadOutcome;
use tasks_domain::store::{FileStore, LocalStore, MemoryStore, TASKS_KEY, TASK_COUNTER_KEY};
use tasks_domain::{TaskId, TaskService, ToastLevel};
use tempfile::tempdir;

fn tuples(service: &TaskService) -> BTreeSet<(TaskId, String, bool)> {
    service
        .tasks()
        .into_iter()
        .map(|task| (task.id, task.text, task.completed))
        .collect()
}

#[test]
fn mixed_operations_round_trip_through_the_file_store() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("tasks.json");

    let before = {
        let store = Arc::new(FileStore::open(&path).expect("open store"));
        let service = TaskService::builder().with_store(store).build();
        let mut ids = Vec::new();
        for text in ["Buy milk", "Call dentist", "Water plants", "Pay rent", "Walk dog"] {
            ids.push(service.create_task(text).expect("create").task.id);
        }
        service.toggle_task(ids[1]).expect("toggle");
        service.delete_task(ids[2]).expect("delete");
        service.toggle_task(ids[4]).expect("toggle");
        service.toggle_task(ids[4]).expect("toggle back");
        service.delete_task(ids[0]).expect("delete");
        service.toggle_task(ids[3]).expect("toggle");
        tuples(&service)
    };

    let store = Arc::new(FileStore::open(&path).expect("reopen store"));
    let reloaded = TaskService::builder().with_store(store).build();
    assert_eq!(reloaded.last_load(), &LoadOutcome::Restored { tasks: 3 });
    assert_eq!(tuples(&reloaded), before);
    assert_eq!(reloaded.counter(), 5);
}

#[test]
fn stored_list_reloads_and_new_tasks_sort_first() {
    let store = Arc::new(MemoryStore::seeded([
        (
            TASKS_KEY,
            r#"[{"id":1,"text":"Buy milk","completed":false,"createdAt":"2024-01-01T00:00:00Z"}]"#,
        ),
        (TASK_COUNTER_KEY, "1"),
    ]));
    let service = TaskService::builder().with_store(store).build();

    let tasks = service.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].text, "Buy milk");
    assert!(!tasks[0].completed);

    let created = service.create_task("Call dentist").expect("create");
    assert_eq!(created.task.id, 2);

    let texts: Vec<String> = service.tasks().into_iter().map(|task| task.text).collect();
    assert_eq!(texts, vec!["Call dentist", "Buy milk"]);

    service.toggle_task(2).expect("toggle");
    let order: Vec<TaskId> = service.tasks().into_iter().map(|task| task.id).collect();
    assert_eq!(order, vec![1, 2]);
}

#[test]
fn malformed_json_resets_to_an_empty_interactive_list() {
    let store = Arc::new(MemoryStore::seeded([
        (TASKS_KEY, "[{\"id\":1,\"text\":"),
        (TASK_COUNTER_KEY, "7"),
    ]));
    let service = TaskService::builder().with_store(store.clone()).build();

    assert!(matches!(service.last_load(), LoadOutcome::Recovered { .. }));
    let toast = service.last_load().toast().expect("warning toast");
    assert_eq!(toast.level, ToastLevel::Warning);
    assert!(service.tasks().is_empty());
    assert_eq!(service.counter(), 0);

    let change = service.create_task("Still works").expect("create");
    assert_eq!(change.task.id, 1);
    assert_eq!(
        store.get(TASK_COUNTER_KEY).unwrap().as_deref(),
        Some("1")
    );
}

#[test]
fn unreadable_store_file_can_be_replaced() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("tasks.json");
    fs::write(&path, "garbage").expect("write fixture");

    assert!(FileStore::open(&path).is_err());
    fs::remove_file(&path).expect("remove corrupt file");

    let store = Arc::new(FileStore::open(&path).expect("fresh store"));
    let service = TaskService::builder().with_store(store).build();
    assert_eq!(service.last_load(), &LoadOutcome::Empty);
}
