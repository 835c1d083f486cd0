// ==========================================
// 学校设备维修工单 - 工单仓储
// ==========================================
// 职责: 管理 work_order 表
// 红线: Repository 不含业务逻辑；状态迁移合法性由引擎层判定
// 说明: *_tx 关联函数接收事务连接，供引擎在同一事务内组合调用
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

use crate::domain::types::{ApprovalStatus, WorkOrderStatus};
use crate::domain::work_order::{TenantScope, WorkOrder};
use crate::repository::error::{parse_enum_column, RepositoryError, RepositoryResult};

const SELECT_COLUMNS: &str = r#"
    work_order_id, tenant_id, school_id, incident_id, device_id, project_id, phase_id,
    service_location_id, device_model, status, approval_status, rework_count, assigned_to,
    device_serial, school_name, contact_name, contact_email, created_at, updated_at, updated_by
"#;

/// 批量更新时 approval_status 的写法：NOT_REQUIRED 的工单保持不变
const APPROVAL_UNLESS_NOT_REQUIRED: &str =
    "CASE WHEN approval_status = 'NOT_REQUIRED' THEN 'NOT_REQUIRED' ELSE ? END";

// ==========================================
// WorkOrderRepository - 工单仓储
// ==========================================
pub struct WorkOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WorkOrderRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> rusqlite::Result<WorkOrder> {
        Ok(WorkOrder {
            work_order_id: row.get(0)?,
            tenant_id: row.get(1)?,
            school_id: row.get(2)?,
            incident_id: row.get(3)?,
            device_id: row.get(4)?,
            project_id: row.get(5)?,
            phase_id: row.get(6)?,
            service_location_id: row.get(7)?,
            device_model: row.get(8)?,
            status: parse_enum_column(9, row.get(9)?)?,
            approval_status: parse_enum_column(10, row.get(10)?)?,
            rework_count: row.get(11)?,
            assigned_to: row.get(12)?,
            device_serial: row.get(13)?,
            school_name: row.get(14)?,
            contact_name: row.get(15)?,
            contact_email: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
            updated_by: row.get(19)?,
        })
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入工单
    pub fn insert(&self, work_order: &WorkOrder) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, work_order)
    }

    pub fn insert_tx(conn: &Connection, wo: &WorkOrder) -> RepositoryResult<String> {
        conn.execute(
            r#"
            INSERT INTO work_order (
                work_order_id, tenant_id, school_id, incident_id, device_id, project_id, phase_id,
                service_location_id, device_model, status, approval_status, rework_count, assigned_to,
                device_serial, school_name, contact_name, contact_email, created_at, updated_at, updated_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
            params![
                wo.work_order_id,
                wo.tenant_id,
                wo.school_id,
                wo.incident_id,
                wo.device_id,
                wo.project_id,
                wo.phase_id,
                wo.service_location_id,
                wo.device_model,
                wo.status.as_str(),
                wo.approval_status.as_str(),
                wo.rework_count,
                wo.assigned_to,
                wo.device_serial,
                wo.school_name,
                wo.contact_name,
                wo.contact_email,
                wo.created_at,
                wo.updated_at,
                wo.updated_by,
            ],
        )?;
        Ok(wo.work_order_id.clone())
    }

    /// 条件更新状态（CAS）：仅当当前状态仍为 `from` 时生效
    ///
    /// # 返回
    /// - 受影响行数（0 表示状态已被并发修改或工单不在作用域内）
    pub fn compare_and_set_status_tx(
        conn: &Connection,
        scope: &TenantScope,
        work_order_id: &str,
        from: WorkOrderStatus,
        to: WorkOrderStatus,
        approval: Option<ApprovalStatus>,
        actor: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE work_order
            SET status = ?1,
                approval_status = CASE
                    WHEN ?2 IS NULL OR approval_status = 'NOT_REQUIRED' THEN approval_status
                    ELSE ?2
                END,
                updated_at = ?3,
                updated_by = ?4
            WHERE tenant_id = ?5
              AND (?6 IS NULL OR school_id = ?6)
              AND work_order_id = ?7
              AND status = ?8
            "#,
            params![
                to.as_str(),
                approval.map(|a| a.as_str()),
                now,
                actor,
                scope.tenant_id,
                scope.school_id,
                work_order_id,
                from.as_str(),
            ],
        )?;
        Ok(rows)
    }

    /// 返工写入：状态回退 + rework_count 自增，谓词内含返工上限
    ///
    /// # 返回
    /// - 受影响行数（0 表示状态已变化或已达返工上限）
    pub fn apply_rework_tx(
        conn: &Connection,
        scope: &TenantScope,
        work_order_id: &str,
        from: WorkOrderStatus,
        to: WorkOrderStatus,
        max_rework_count: i64,
        approval: Option<ApprovalStatus>,
        actor: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE work_order
            SET status = ?1,
                rework_count = rework_count + 1,
                approval_status = CASE
                    WHEN ?2 IS NULL OR approval_status = 'NOT_REQUIRED' THEN approval_status
                    ELSE ?2
                END,
                updated_at = ?3,
                updated_by = ?4
            WHERE tenant_id = ?5
              AND (?6 IS NULL OR school_id = ?6)
              AND work_order_id = ?7
              AND status = ?8
              AND rework_count < ?9
            "#,
            params![
                to.as_str(),
                approval.map(|a| a.as_str()),
                now,
                actor,
                scope.tenant_id,
                scope.school_id,
                work_order_id,
                from.as_str(),
                max_rework_count,
            ],
        )?;
        Ok(rows)
    }

    /// 批量更新状态：一条语句覆盖全部 ID
    pub fn bulk_update_status_tx(
        conn: &Connection,
        scope: &TenantScope,
        work_order_ids: &[String],
        to: WorkOrderStatus,
        approval: Option<ApprovalStatus>,
        actor: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        if work_order_ids.is_empty() {
            return Ok(0);
        }

        let mut values: Vec<Value> = vec![Value::from(to.as_str().to_string())];
        let mut sql = String::from("UPDATE work_order SET status = ?");
        if let Some(approval) = approval {
            sql.push_str(", approval_status = ");
            sql.push_str(APPROVAL_UNLESS_NOT_REQUIRED);
            values.push(Value::from(approval.as_str().to_string()));
        }
        sql.push_str(", updated_at = ?, updated_by = ?");
        values.push(Value::from(now.format("%Y-%m-%d %H:%M:%S%.f").to_string()));
        values.push(Value::from(actor.to_string()));

        Self::push_scope_and_ids(&mut sql, &mut values, scope, work_order_ids);

        let rows = conn.execute(&sql, params_from_iter(values))?;
        Ok(rows)
    }

    /// 批量派工：一条语句覆盖全部 ID；Draft 工单同时推进到 Assigned
    pub fn bulk_update_assignment_tx(
        conn: &Connection,
        scope: &TenantScope,
        work_order_ids: &[String],
        assignee_id: &str,
        actor: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        if work_order_ids.is_empty() {
            return Ok(0);
        }

        let mut sql = String::from(
            "UPDATE work_order SET assigned_to = ?, \
             status = CASE WHEN status = 'DRAFT' THEN 'ASSIGNED' ELSE status END, \
             updated_at = ?, updated_by = ?",
        );
        let mut values: Vec<Value> = vec![
            Value::from(assignee_id.to_string()),
            Value::from(now.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::from(actor.to_string()),
        ];

        Self::push_scope_and_ids(&mut sql, &mut values, scope, work_order_ids);

        let rows = conn.execute(&sql, params_from_iter(values))?;
        Ok(rows)
    }

    fn push_scope_and_ids(
        sql: &mut String,
        values: &mut Vec<Value>,
        scope: &TenantScope,
        work_order_ids: &[String],
    ) {
        sql.push_str(" WHERE tenant_id = ?");
        values.push(Value::from(scope.tenant_id.clone()));
        if let Some(school_id) = &scope.school_id {
            sql.push_str(" AND school_id = ?");
            values.push(Value::from(school_id.clone()));
        }
        let placeholders = vec!["?"; work_order_ids.len()].join(", ");
        sql.push_str(&format!(" AND work_order_id IN ({})", placeholders));
        values.extend(work_order_ids.iter().map(|id| Value::from(id.clone())));
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(
        &self,
        scope: &TenantScope,
        work_order_id: &str,
    ) -> RepositoryResult<Option<WorkOrder>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, scope, work_order_id)
    }

    pub fn find_by_id_tx(
        conn: &Connection,
        scope: &TenantScope,
        work_order_id: &str,
    ) -> RepositoryResult<Option<WorkOrder>> {
        let sql = format!(
            "SELECT {} FROM work_order \
             WHERE tenant_id = ?1 AND (?2 IS NULL OR school_id = ?2) AND work_order_id = ?3",
            SELECT_COLUMNS
        );
        let found = conn
            .query_row(
                &sql,
                params![scope.tenant_id, scope.school_id, work_order_id],
                Self::map_row,
            )
            .optional()?;
        Ok(found)
    }

    /// 按 ID 列表一次性查询（作用域外/不存在的 ID 不出现在结果中）
    pub fn find_by_ids(
        &self,
        scope: &TenantScope,
        work_order_ids: &[String],
    ) -> RepositoryResult<Vec<WorkOrder>> {
        let conn = self.get_conn()?;
        Self::find_by_ids_tx(&conn, scope, work_order_ids)
    }

    pub fn find_by_ids_tx(
        conn: &Connection,
        scope: &TenantScope,
        work_order_ids: &[String],
    ) -> RepositoryResult<Vec<WorkOrder>> {
        if work_order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!("SELECT {} FROM work_order", SELECT_COLUMNS);
        let mut values: Vec<Value> = Vec::new();
        Self::push_scope_and_ids(&mut sql, &mut values, scope, work_order_ids);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_by_status(
        &self,
        scope: &TenantScope,
        status: WorkOrderStatus,
    ) -> RepositoryResult<Vec<WorkOrder>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM work_order \
             WHERE tenant_id = ?1 AND (?2 IS NULL OR school_id = ?2) AND status = ?3 \
             ORDER BY created_at ASC, work_order_id ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![scope.tenant_id, scope.school_id, status.as_str()],
                Self::map_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_by_phase_tx(
        conn: &Connection,
        tenant_id: &str,
        phase_id: &str,
    ) -> RepositoryResult<Vec<WorkOrder>> {
        let sql = format!(
            "SELECT {} FROM work_order WHERE tenant_id = ?1 AND phase_id = ?2 \
             ORDER BY work_order_id ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![tenant_id, phase_id], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
