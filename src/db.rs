// ==========================================
// 学校设备维修工单 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键、busy_timeout）
// - 统一建表入口，所有表均为 CREATE TABLE IF NOT EXISTS（幂等）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化全部表结构（幂等）
///
/// 工单永不物理删除（审计要求），因此工单相关外键不使用 ON DELETE CASCADE。
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS project_phase (
    phase_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'OPEN' CHECK(status IN ('OPEN', 'DONE')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_by TEXT
);

CREATE TABLE IF NOT EXISTS work_order (
    work_order_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    school_id TEXT NOT NULL,
    incident_id TEXT,
    device_id TEXT,
    project_id TEXT,
    phase_id TEXT REFERENCES project_phase(phase_id),
    service_location_id TEXT,
    device_model TEXT,
    status TEXT NOT NULL CHECK(status IN (
        'DRAFT', 'ASSIGNED', 'IN_REPAIR', 'QA', 'COMPLETED', 'APPROVED'
    )),
    approval_status TEXT NOT NULL CHECK(approval_status IN (
        'PENDING', 'APPROVED', 'REJECTED', 'NOT_REQUIRED'
    )),
    rework_count INTEGER NOT NULL DEFAULT 0 CHECK(rework_count >= 0),
    assigned_to TEXT,
    device_serial TEXT,
    school_name TEXT,
    contact_name TEXT,
    contact_email TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_work_order_tenant_status
    ON work_order(tenant_id, status);
CREATE INDEX IF NOT EXISTS idx_work_order_phase
    ON work_order(tenant_id, phase_id);

CREATE TABLE IF NOT EXISTS inventory (
    tenant_id TEXT NOT NULL,
    service_location_id TEXT NOT NULL,
    part_id TEXT NOT NULL,
    qty_available INTEGER NOT NULL DEFAULT 0 CHECK(qty_available >= 0),
    qty_reserved INTEGER NOT NULL DEFAULT 0 CHECK(qty_reserved >= 0),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (tenant_id, service_location_id, part_id)
);

CREATE TABLE IF NOT EXISTS work_order_part (
    line_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    service_location_id TEXT NOT NULL,
    work_order_id TEXT NOT NULL REFERENCES work_order(work_order_id),
    part_id TEXT NOT NULL,
    qty_planned INTEGER NOT NULL CHECK(qty_planned >= 0),
    qty_used INTEGER NOT NULL DEFAULT 0 CHECK(qty_used >= 0 AND qty_used <= qty_planned),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    updated_by TEXT
);

CREATE INDEX IF NOT EXISTS idx_work_order_part_wo
    ON work_order_part(tenant_id, work_order_id);

CREATE TABLE IF NOT EXISTS work_order_rework_history (
    history_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    work_order_id TEXT NOT NULL REFERENCES work_order(work_order_id),
    from_status TEXT NOT NULL,
    to_status TEXT NOT NULL,
    reason TEXT,
    category TEXT NOT NULL CHECK(category IN ('DEFECT', 'INCOMPLETE', 'INCORRECT_PART', 'OTHER')),
    actor TEXT NOT NULL,
    rework_sequence INTEGER NOT NULL CHECK(rework_sequence >= 1),
    created_at TEXT NOT NULL,
    UNIQUE (work_order_id, rework_sequence)
);

CREATE TABLE IF NOT EXISTS work_order_deliverable (
    deliverable_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    work_order_id TEXT NOT NULL REFERENCES work_order(work_order_id),
    name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING' CHECK(status IN ('PENDING', 'APPROVED', 'REJECTED'))
);

CREATE INDEX IF NOT EXISTS idx_work_order_deliverable_wo
    ON work_order_deliverable(tenant_id, work_order_id);

CREATE TABLE IF NOT EXISTS part_compatibility (
    part_id TEXT NOT NULL,
    device_model TEXT NOT NULL,
    PRIMARY KEY (part_id, device_model)
);

CREATE TABLE IF NOT EXISTS bulk_operation_log (
    operation_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    operation_type TEXT NOT NULL CHECK(operation_type IN ('STATUS_UPDATE', 'ASSIGNMENT', 'APPROVAL')),
    actor TEXT NOT NULL,
    payload_json TEXT,
    requested_ids_json TEXT NOT NULL,
    succeeded_ids_json TEXT,
    failed_items_json TEXT,
    total_count INTEGER NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 0,
    failure_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL CHECK(status IN ('RUNNING', 'COMPLETED', 'FAILED')),
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS action_log (
    action_id TEXT PRIMARY KEY,
    tenant_id TEXT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    action_type TEXT NOT NULL,
    action_ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    before_json TEXT,
    after_json TEXT,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_action_log_entity
    ON action_log(entity_type, entity_id, action_ts);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), None);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }
}
