// ==========================================
// 学校设备维修工单 - 工单备件行(BOM行)仓储
// ==========================================
// 职责: 管理 work_order_part 表
// 红线: 数量边界以条件更新表达，保证 0 ≤ qty_used ≤ qty_planned
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

use crate::domain::inventory::BomLine;
use crate::repository::error::{RepositoryError, RepositoryResult};

const SELECT_COLUMNS: &str = r#"
    line_id, tenant_id, service_location_id, work_order_id, part_id,
    qty_planned, qty_used, created_at, updated_at, updated_by
"#;

pub struct BomLineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BomLineRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> rusqlite::Result<BomLine> {
        Ok(BomLine {
            line_id: row.get(0)?,
            tenant_id: row.get(1)?,
            service_location_id: row.get(2)?,
            work_order_id: row.get(3)?,
            part_id: row.get(4)?,
            qty_planned: row.get(5)?,
            qty_used: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            updated_by: row.get(9)?,
        })
    }

    pub fn insert_tx(conn: &Connection, line: &BomLine) -> RepositoryResult<String> {
        conn.execute(
            r#"
            INSERT INTO work_order_part (
                line_id, tenant_id, service_location_id, work_order_id, part_id,
                qty_planned, qty_used, created_at, updated_at, updated_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                line.line_id,
                line.tenant_id,
                line.service_location_id,
                line.work_order_id,
                line.part_id,
                line.qty_planned,
                line.qty_used,
                line.created_at,
                line.updated_at,
                line.updated_by,
            ],
        )?;
        Ok(line.line_id.clone())
    }

    /// 条件累加消耗量：仅当 qty_used + qty <= qty_planned
    pub fn add_used_tx(
        conn: &Connection,
        tenant_id: &str,
        line_id: &str,
        qty: i64,
        actor: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE work_order_part
            SET qty_used = qty_used + ?1, updated_at = ?2, updated_by = ?3
            WHERE tenant_id = ?4 AND line_id = ?5 AND qty_used + ?1 <= qty_planned
            "#,
            params![qty, now, actor, tenant_id, line_id],
        )?;
        Ok(rows)
    }

    /// 条件下调计划量：仅当 qty_planned - qty >= qty_used
    pub fn lower_planned_tx(
        conn: &Connection,
        tenant_id: &str,
        line_id: &str,
        qty: i64,
        actor: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE work_order_part
            SET qty_planned = qty_planned - ?1, updated_at = ?2, updated_by = ?3
            WHERE tenant_id = ?4 AND line_id = ?5 AND qty_planned - ?1 >= qty_used
            "#,
            params![qty, now, actor, tenant_id, line_id],
        )?;
        Ok(rows)
    }

    pub fn find_by_id(&self, tenant_id: &str, line_id: &str) -> RepositoryResult<Option<BomLine>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, tenant_id, line_id)
    }

    pub fn find_by_id_tx(
        conn: &Connection,
        tenant_id: &str,
        line_id: &str,
    ) -> RepositoryResult<Option<BomLine>> {
        let sql = format!(
            "SELECT {} FROM work_order_part WHERE tenant_id = ?1 AND line_id = ?2",
            SELECT_COLUMNS
        );
        let found = conn
            .query_row(&sql, params![tenant_id, line_id], Self::map_row)
            .optional()?;
        Ok(found)
    }

    pub fn list_by_work_order(
        &self,
        tenant_id: &str,
        work_order_id: &str,
    ) -> RepositoryResult<Vec<BomLine>> {
        let conn = self.get_conn()?;
        Self::list_by_work_orders_tx(&conn, tenant_id, &[work_order_id.to_string()])
    }

    /// 一次查询多个工单的全部BOM行
    pub fn list_by_work_orders_tx(
        conn: &Connection,
        tenant_id: &str,
        work_order_ids: &[String],
    ) -> RepositoryResult<Vec<BomLine>> {
        if work_order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; work_order_ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM work_order_part WHERE tenant_id = ? AND work_order_id IN ({}) \
             ORDER BY work_order_id ASC, created_at ASC, line_id ASC",
            SELECT_COLUMNS, placeholders
        );
        let mut values: Vec<Value> = vec![Value::from(tenant_id.to_string())];
        values.extend(work_order_ids.iter().map(|id| Value::from(id.clone())));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
