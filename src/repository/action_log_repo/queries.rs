use super::core::ActionLogRepository;
use crate::domain::action_log::ActionLog;
use crate::repository::error::{parse_json_column, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Result as SqliteResult, Row};

impl ActionLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 action_id 查询单个日志
    pub fn find_by_id(&self, action_id: &str) -> RepositoryResult<Option<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, tenant_id, entity_type, entity_id, action_type,
                   action_ts, actor, before_json, after_json, detail
            FROM action_log
            WHERE action_id = ?
            "#,
        )?;

        match stmt.query_row(params![action_id], |row| self.map_row(row)) {
            Ok(log) => Ok(Some(log)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询某实体的全部审计日志（按时间升序）
    pub fn find_by_entity(&self, entity_type: &str, entity_id: &str) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, tenant_id, entity_type, entity_id, action_type,
                   action_ts, actor, before_json, after_json, detail
            FROM action_log
            WHERE entity_type = ? AND entity_id = ?
            ORDER BY action_ts ASC, rowid ASC
            "#,
        )?;

        let logs = stmt
            .query_map(params![entity_type, entity_id], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }

    /// 查询某操作人的最近日志
    pub fn find_by_actor(&self, actor: &str, limit: i32) -> RepositoryResult<Vec<ActionLog>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, tenant_id, entity_type, entity_id, action_type,
                   action_ts, actor, before_json, after_json, detail
            FROM action_log
            WHERE actor = ?
            ORDER BY action_ts DESC, rowid DESC
            LIMIT ?
            "#,
        )?;

        let logs = stmt
            .query_map(params![actor, limit], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(logs)
    }

    // ==========================================
    // 辅助方法
    // ==========================================

    /// 映射数据库行到 ActionLog
    fn map_row(&self, row: &Row) -> SqliteResult<ActionLog> {
        let action_ts_str: String = row.get(5)?;
        let action_ts = NaiveDateTime::parse_from_str(&action_ts_str, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?;

        Ok(ActionLog {
            action_id: row.get(0)?,
            tenant_id: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            action_type: row.get(4)?,
            action_ts,
            actor: row.get(6)?,
            before_json: parse_json_column(7, row.get(7)?)?,
            after_json: parse_json_column(8, row.get(8)?)?,
            detail: row.get(9)?,
        })
    }
}
