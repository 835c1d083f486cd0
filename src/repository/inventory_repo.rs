// ==========================================
// 学校设备维修工单 - 库存仓储
// ==========================================
// 职责: 管理 inventory 表 (tenant, service_location, part)
// 红线: 预留必须是单条条件更新（谓词与变更同一语句），禁止先读后写
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::domain::inventory::{InventoryRecord, StockKey};
use crate::repository::error::{RepositoryError, RepositoryResult};

pub struct InventoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 入库同步（外部收货流程/测试数据准备使用）
    ///
    /// 说明：qty_available 不会被写到低于当前 qty_reserved
    pub fn upsert_stock(&self, key: StockKey<'_>, qty_available: i64) -> RepositoryResult<()> {
        if qty_available < 0 {
            return Err(RepositoryError::FieldValueError {
                field: "qty_available".to_string(),
                message: format!("库存数量不能为负: {}", qty_available),
            });
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO inventory (tenant_id, service_location_id, part_id, qty_available, qty_reserved, updated_at)
            VALUES (?1, ?2, ?3, ?4, 0, ?5)
            ON CONFLICT(tenant_id, service_location_id, part_id) DO UPDATE SET
                qty_available = MAX(excluded.qty_available, inventory.qty_reserved),
                updated_at = excluded.updated_at
            "#,
            params![
                key.tenant_id,
                key.service_location_id,
                key.part_id,
                qty_available,
                chrono::Local::now().naive_local(),
            ],
        )?;
        Ok(())
    }

    pub fn find(&self, key: StockKey<'_>) -> RepositoryResult<Option<InventoryRecord>> {
        let conn = self.get_conn()?;
        Self::find_tx(&conn, key)
    }

    pub fn find_tx(conn: &Connection, key: StockKey<'_>) -> RepositoryResult<Option<InventoryRecord>> {
        let found = conn
            .query_row(
                r#"
                SELECT tenant_id, service_location_id, part_id, qty_available, qty_reserved, updated_at
                FROM inventory
                WHERE tenant_id = ?1 AND service_location_id = ?2 AND part_id = ?3
                "#,
                params![key.tenant_id, key.service_location_id, key.part_id],
                |row| {
                    Ok(InventoryRecord {
                        tenant_id: row.get(0)?,
                        service_location_id: row.get(1)?,
                        part_id: row.get(2)?,
                        qty_available: row.get(3)?,
                        qty_reserved: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }

    /// 条件预留：仅当 qty_available - qty_reserved >= qty 时 qty_reserved += qty
    ///
    /// # 返回
    /// - 受影响行数（0 表示库存不足或记录不存在）
    pub fn try_reserve_tx(
        conn: &Connection,
        key: StockKey<'_>,
        qty: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE inventory
            SET qty_reserved = qty_reserved + ?1,
                updated_at = ?2
            WHERE tenant_id = ?3 AND service_location_id = ?4 AND part_id = ?5
              AND qty_available - qty_reserved >= ?1
            "#,
            params![qty, now, key.tenant_id, key.service_location_id, key.part_id],
        )?;
        Ok(rows)
    }

    /// 消耗：qty_reserved 与 qty_available 同时扣减，下限为0
    pub fn consume_tx(
        conn: &Connection,
        key: StockKey<'_>,
        qty: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE inventory
            SET qty_reserved = MAX(qty_reserved - ?1, 0),
                qty_available = MAX(qty_available - ?1, 0),
                updated_at = ?2
            WHERE tenant_id = ?3 AND service_location_id = ?4 AND part_id = ?5
            "#,
            params![qty, now, key.tenant_id, key.service_location_id, key.part_id],
        )?;
        Ok(rows)
    }

    /// 释放：仅扣减 qty_reserved，下限为0
    pub fn release_tx(
        conn: &Connection,
        key: StockKey<'_>,
        qty: i64,
        now: NaiveDateTime,
    ) -> RepositoryResult<usize> {
        let rows = conn.execute(
            r#"
            UPDATE inventory
            SET qty_reserved = MAX(qty_reserved - ?1, 0),
                updated_at = ?2
            WHERE tenant_id = ?3 AND service_location_id = ?4 AND part_id = ?5
            "#,
            params![qty, now, key.tenant_id, key.service_location_id, key.part_id],
        )?;
        Ok(rows)
    }
}
