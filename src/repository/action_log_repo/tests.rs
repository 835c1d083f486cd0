use super::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::init_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

fn make_test_log(entity_id: &str, actor: &str) -> ActionLog {
    ActionLog::new("work_order", entity_id, ActionType::Update, actor)
        .with_tenant(Some("T1".to_string()))
        .with_before(serde_json::json!({"status": "DRAFT"}))
        .with_after(serde_json::json!({"status": "ASSIGNED"}))
}

#[test]
fn test_insert_and_find_by_id() {
    let repo = ActionLogRepository::new(setup_test_db());

    let log = make_test_log("WO1", "user1");
    let action_id = repo.insert(&log).unwrap();
    assert_eq!(action_id, log.action_id);

    let found = repo.find_by_id(&action_id).unwrap().unwrap();
    assert_eq!(found.entity_id, "WO1");
    assert_eq!(found.actor, "user1");
    assert_eq!(found.tenant_id.as_deref(), Some("T1"));
    assert_eq!(found.after_json.unwrap()["status"], "ASSIGNED");
}

#[test]
fn test_find_by_entity() {
    let repo = ActionLogRepository::new(setup_test_db());

    repo.insert(&make_test_log("WO1", "user1")).unwrap();
    repo.insert(&make_test_log("WO1", "user2")).unwrap();
    repo.insert(&make_test_log("WO2", "user1")).unwrap();

    let logs = repo.find_by_entity("work_order", "WO1").unwrap();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.entity_id == "WO1"));
}

#[test]
fn test_find_by_actor_with_limit() {
    let repo = ActionLogRepository::new(setup_test_db());

    for i in 0..3 {
        repo.insert(&make_test_log(&format!("WO{}", i), "user1")).unwrap();
    }
    repo.insert(&make_test_log("WO9", "user2")).unwrap();

    assert_eq!(repo.find_by_actor("user1", 10).unwrap().len(), 3);
    assert_eq!(repo.find_by_actor("user1", 2).unwrap().len(), 2);
}

#[test]
fn test_find_missing_returns_none() {
    let repo = ActionLogRepository::new(setup_test_db());
    assert!(repo.find_by_id("nope").unwrap().is_none());
}
