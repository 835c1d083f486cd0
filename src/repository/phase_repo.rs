// ==========================================
// 学校设备维修工单 - 项目阶段/交付物仓储
// ==========================================
// 职责: 管理 project_phase 与 work_order_deliverable 表
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::domain::phase::{Deliverable, ProjectPhase};
use crate::domain::types::{DeliverableStatus, PhaseStatus};
use crate::repository::error::{parse_enum_column, RepositoryError, RepositoryResult};

pub struct PhaseRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PhaseRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 阶段
    // ==========================================

    pub fn insert_phase(&self, phase: &ProjectPhase) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO project_phase (phase_id, tenant_id, project_id, name, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                phase.phase_id,
                phase.tenant_id,
                phase.project_id,
                phase.name,
                phase.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn find_phase(&self, tenant_id: &str, phase_id: &str) -> RepositoryResult<Option<ProjectPhase>> {
        let conn = self.get_conn()?;
        Self::find_phase_tx(&conn, tenant_id, phase_id)
    }

    pub fn find_phase_tx(
        conn: &Connection,
        tenant_id: &str,
        phase_id: &str,
    ) -> RepositoryResult<Option<ProjectPhase>> {
        let found = conn
            .query_row(
                r#"
                SELECT phase_id, tenant_id, project_id, name, status
                FROM project_phase
                WHERE tenant_id = ?1 AND phase_id = ?2
                "#,
                params![tenant_id, phase_id],
                |row| {
                    Ok(ProjectPhase {
                        phase_id: row.get(0)?,
                        tenant_id: row.get(1)?,
                        project_id: row.get(2)?,
                        name: row.get(3)?,
                        status: parse_enum_column(4, row.get(4)?)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    pub fn mark_phase_done_tx(
        conn: &Connection,
        tenant_id: &str,
        phase_id: &str,
        actor: &str,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE project_phase
            SET status = ?1, updated_at = ?2, updated_by = ?3
            WHERE tenant_id = ?4 AND phase_id = ?5
            "#,
            params![PhaseStatus::Done.as_str(), now, actor, tenant_id, phase_id],
        )?;
        Ok(rows)
    }

    // ==========================================
    // 交付物
    // ==========================================

    pub fn insert_deliverable(&self, deliverable: &Deliverable) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO work_order_deliverable (deliverable_id, tenant_id, work_order_id, name, status)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                deliverable.deliverable_id,
                deliverable.tenant_id,
                deliverable.work_order_id,
                deliverable.name,
                deliverable.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn set_deliverable_status(
        &self,
        tenant_id: &str,
        deliverable_id: &str,
        status: DeliverableStatus,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE work_order_deliverable SET status = ?1 WHERE tenant_id = ?2 AND deliverable_id = ?3",
            params![status.as_str(), tenant_id, deliverable_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Deliverable".to_string(),
                id: deliverable_id.to_string(),
            });
        }
        Ok(())
    }

    /// 一次查询多个工单的交付物
    pub fn list_deliverables_tx(
        conn: &Connection,
        tenant_id: &str,
        work_order_ids: &[String],
    ) -> RepositoryResult<Vec<Deliverable>> {
        if work_order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; work_order_ids.len()].join(", ");
        let sql = format!(
            "SELECT deliverable_id, tenant_id, work_order_id, name, status \
             FROM work_order_deliverable \
             WHERE tenant_id = ? AND work_order_id IN ({}) \
             ORDER BY work_order_id ASC, deliverable_id ASC",
            placeholders
        );
        let mut values: Vec<Value> = vec![Value::from(tenant_id.to_string())];
        values.extend(work_order_ids.iter().map(|id| Value::from(id.clone())));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(Deliverable {
                    deliverable_id: row.get(0)?,
                    tenant_id: row.get(1)?,
                    work_order_id: row.get(2)?,
                    name: row.get(3)?,
                    status: parse_enum_column(4, row.get(4)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
