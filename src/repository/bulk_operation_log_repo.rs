// ==========================================
// 学校设备维修工单 - 批量操作日志仓储
// ==========================================
// 职责: 管理 bulk_operation_log 表
// 生命周期: 批次开始时插入(RUNNING) → 结束时更新一次(COMPLETED/FAILED) → 此后只读
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::domain::bulk::{BulkItemFailure, BulkOperationLog};
use crate::domain::types::BulkOperationStatus;
use crate::repository::error::{
    parse_enum_column, parse_json_column, RepositoryError, RepositoryResult,
};

pub struct BulkOperationLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BulkOperationLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 记录批次请求（RUNNING）
    pub fn insert_started(&self, log: &BulkOperationLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO bulk_operation_log (
                operation_id, tenant_id, operation_type, actor, payload_json,
                requested_ids_json, succeeded_ids_json, failed_items_json,
                total_count, success_count, failure_count, status, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, 0, 0, ?8, ?9, NULL)
            "#,
            params![
                log.operation_id,
                log.tenant_id,
                log.operation_type.as_str(),
                log.actor,
                log.payload_json.as_ref().map(|v| v.to_string()),
                serde_json::to_string(&log.requested_ids)?,
                log.total_count,
                BulkOperationStatus::Running.as_str(),
                log.started_at,
            ],
        )?;
        Ok(log.operation_id.clone())
    }

    /// 写入最终结果（仅允许从 RUNNING 更新一次）
    pub fn finish(
        &self,
        operation_id: &str,
        succeeded_ids: &[String],
        failed_items: &[BulkItemFailure],
        status: BulkOperationStatus,
        finished_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE bulk_operation_log
            SET succeeded_ids_json = ?1,
                failed_items_json = ?2,
                success_count = ?3,
                failure_count = ?4,
                status = ?5,
                finished_at = ?6
            WHERE operation_id = ?7 AND status = 'RUNNING'
            "#,
            params![
                serde_json::to_string(succeeded_ids)?,
                serde_json::to_string(failed_items)?,
                succeeded_ids.len() as i64,
                failed_items.len() as i64,
                status.as_str(),
                finished_at,
                operation_id,
            ],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "BulkOperationLog(RUNNING)".to_string(),
                id: operation_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn find_by_id(&self, operation_id: &str) -> RepositoryResult<Option<BulkOperationLog>> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                r#"
                SELECT operation_id, tenant_id, operation_type, actor, payload_json,
                       requested_ids_json, succeeded_ids_json, failed_items_json,
                       total_count, success_count, failure_count, status, started_at, finished_at
                FROM bulk_operation_log
                WHERE operation_id = ?1
                "#,
                params![operation_id],
                |row| {
                    Ok(BulkOperationLog {
                        operation_id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        operation_type: parse_enum_column(2, row.get(2)?)?,
                        actor: row.get(3)?,
                        payload_json: parse_json_column(4, row.get(4)?)?,
                        requested_ids: parse_json_column(5, row.get(5)?)?.unwrap_or_default(),
                        succeeded_ids: parse_json_column(6, row.get(6)?)?.unwrap_or_default(),
                        failed_items: parse_json_column(7, row.get(7)?)?.unwrap_or_default(),
                        total_count: row.get(8)?,
                        success_count: row.get(9)?,
                        failure_count: row.get(10)?,
                        status: parse_enum_column(11, row.get(11)?)?,
                        started_at: row.get(12)?,
                        finished_at: row.get(13)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bulk::BulkFailureCode;
    use crate::domain::types::BulkOperationType;

    fn setup() -> BulkOperationLogRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        BulkOperationLogRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn make_log(id: &str) -> BulkOperationLog {
        BulkOperationLog {
            operation_id: id.to_string(),
            tenant_id: "T1".to_string(),
            operation_type: BulkOperationType::StatusUpdate,
            actor: "admin".to_string(),
            payload_json: Some(serde_json::json!({"target_status": "ASSIGNED"})),
            requested_ids: vec!["WO1".to_string(), "WO2".to_string()],
            succeeded_ids: Vec::new(),
            failed_items: Vec::new(),
            total_count: 2,
            success_count: 0,
            failure_count: 0,
            status: BulkOperationStatus::Running,
            started_at: chrono::Local::now().naive_local(),
            finished_at: None,
        }
    }

    #[test]
    fn test_insert_then_finish_once() {
        let repo = setup();
        repo.insert_started(&make_log("OP1")).unwrap();

        let failed = vec![BulkItemFailure {
            work_order_id: "WO2".to_string(),
            code: BulkFailureCode::NotFound,
            message: "missing".to_string(),
        }];
        repo.finish(
            "OP1",
            &["WO1".to_string()],
            &failed,
            BulkOperationStatus::Completed,
            chrono::Local::now().naive_local(),
        )
        .unwrap();

        let log = repo.find_by_id("OP1").unwrap().unwrap();
        assert_eq!(log.status, BulkOperationStatus::Completed);
        assert_eq!(log.requested_ids.len(), 2);
        assert_eq!(log.success_count + log.failure_count, log.total_count);
        assert_eq!(log.failed_items[0].code, BulkFailureCode::NotFound);
        assert!(log.finished_at.is_some());

        // 已结束的批次不可再次更新
        let again = repo.finish(
            "OP1",
            &[],
            &[],
            BulkOperationStatus::Failed,
            chrono::Local::now().naive_local(),
        );
        assert!(matches!(again, Err(RepositoryError::NotFound { .. })));
    }
}
