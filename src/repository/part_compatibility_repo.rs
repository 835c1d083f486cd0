// ==========================================
// 学校设备维修工单 - 备件兼容性仓储
// ==========================================
// 职责: 管理 part_compatibility 表 (part_id, device_model)
// ==========================================

use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct PartCompatibilityRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PartCompatibilityRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn add(&self, part_id: &str, device_model: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO part_compatibility (part_id, device_model) VALUES (?1, ?2)",
            params![part_id, device_model],
        )?;
        Ok(())
    }

    pub fn exists_tx(conn: &Connection, part_id: &str, device_model: &str) -> RepositoryResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM part_compatibility WHERE part_id = ?1 AND device_model = ?2",
            params![part_id, device_model],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn exists(&self, part_id: &str, device_model: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        Self::exists_tx(&conn, part_id, device_model)
    }
}
