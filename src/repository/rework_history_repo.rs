// ==========================================
// 学校设备维修工单 - 返工历史仓储
// ==========================================
// 职责: 管理 work_order_rework_history 表（只追加）
// 说明: 序号在同一事务内以 MAX+1 分配，UNIQUE(work_order_id, rework_sequence) 兜底
// ==========================================

use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

use crate::domain::rework::ReworkHistoryEntry;
use crate::repository::error::{parse_enum_column, RepositoryError, RepositoryResult};

pub struct ReworkHistoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReworkHistoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 该工单下一条返工记录的序号（从1开始）
    pub fn next_sequence_tx(conn: &Connection, work_order_id: &str) -> RepositoryResult<i64> {
        let max_seq: Option<i64> = conn.query_row(
            "SELECT MAX(rework_sequence) FROM work_order_rework_history WHERE work_order_id = ?1",
            params![work_order_id],
            |row| row.get(0),
        )?;
        Ok(max_seq.unwrap_or(0) + 1)
    }

    pub fn insert_tx(conn: &Connection, entry: &ReworkHistoryEntry) -> RepositoryResult<String> {
        conn.execute(
            r#"
            INSERT INTO work_order_rework_history (
                history_id, tenant_id, work_order_id, from_status, to_status,
                reason, category, actor, rework_sequence, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                entry.history_id,
                entry.tenant_id,
                entry.work_order_id,
                entry.from_status.as_str(),
                entry.to_status.as_str(),
                entry.reason,
                entry.category.as_str(),
                entry.actor,
                entry.rework_sequence,
                entry.created_at,
            ],
        )?;
        Ok(entry.history_id.clone())
    }

    /// 按序号升序列出工单的返工历史
    pub fn list_by_work_order(
        &self,
        tenant_id: &str,
        work_order_id: &str,
    ) -> RepositoryResult<Vec<ReworkHistoryEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT history_id, tenant_id, work_order_id, from_status, to_status,
                   reason, category, actor, rework_sequence, created_at
            FROM work_order_rework_history
            WHERE tenant_id = ?1 AND work_order_id = ?2
            ORDER BY rework_sequence ASC
            "#,
        )?;

        let rows = stmt
            .query_map(params![tenant_id, work_order_id], |row| {
                Ok(ReworkHistoryEntry {
                    history_id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    work_order_id: row.get(2)?,
                    from_status: parse_enum_column(3, row.get(3)?)?,
                    to_status: parse_enum_column(4, row.get(4)?)?,
                    reason: row.get(5)?,
                    category: parse_enum_column(6, row.get(6)?)?,
                    actor: row.get(7)?,
                    rework_sequence: row.get(8)?,
                    created_at: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }
}
