// ==========================================
// 学校设备维修工单 - 库存台账引擎
// ==========================================
// 红线: 0 <= qty_reserved <= qty_available
// 约束: 预留可用量判断必须下推到同一条条件 UPDATE，禁止先读后写
// ==========================================
// 职责: 按 (维修点, 备件) 维护可用量/预留量
// 说明: *_tx 供 BOM 行管理在自身事务内组合调用
// ==========================================

use chrono::NaiveDateTime;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

use crate::domain::inventory::{InventoryRecord, StockKey};
use crate::engine::context::OperationContext;
use crate::engine::error::{WorkOrderError, WorkOrderResult};
use crate::repository::{InventoryRepository, RepositoryError};

pub struct InventoryLedger {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryLedger {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn require_positive(qty: i64) -> WorkOrderResult<()> {
        if qty <= 0 {
            return Err(WorkOrderError::ValidationError(format!(
                "数量必须大于0: {}",
                qty
            )));
        }
        Ok(())
    }

    fn missing(key: StockKey<'_>) -> WorkOrderError {
        WorkOrderError::not_found(
            "Inventory",
            &format!("{}/{}", key.service_location_id, key.part_id),
        )
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 预留：仅当 qty_available - qty_reserved >= qty 时生效
    pub fn reserve_tx(
        conn: &Connection,
        key: StockKey<'_>,
        qty: i64,
        now: NaiveDateTime,
    ) -> WorkOrderResult<()> {
        Self::require_positive(qty)?;

        if InventoryRepository::try_reserve_tx(conn, key, qty, now)? == 1 {
            return Ok(());
        }

        // 条件未命中：区分"无库存行"与"可用量不足"，仅用于报错
        match InventoryRepository::find_tx(conn, key)? {
            None => Err(Self::missing(key)),
            Some(record) => {
                debug!(
                    part_id = key.part_id,
                    requested = qty,
                    free = record.qty_free(),
                    "预留被拒绝: 可用量不足"
                );
                Err(WorkOrderError::InsufficientStock {
                    service_location_id: key.service_location_id.to_string(),
                    part_id: key.part_id.to_string(),
                    requested: qty,
                    free: record.qty_free(),
                })
            }
        }
    }

    /// 消耗：预留量与可用量同时扣减（下限0）
    pub fn consume_tx(
        conn: &Connection,
        key: StockKey<'_>,
        qty: i64,
        now: NaiveDateTime,
    ) -> WorkOrderResult<()> {
        Self::require_positive(qty)?;
        if InventoryRepository::consume_tx(conn, key, qty, now)? == 0 {
            return Err(Self::missing(key));
        }
        Ok(())
    }

    /// 释放：仅扣减预留量（下限0）
    pub fn release_tx(
        conn: &Connection,
        key: StockKey<'_>,
        qty: i64,
        now: NaiveDateTime,
    ) -> WorkOrderResult<()> {
        Self::require_positive(qty)?;
        if InventoryRepository::release_tx(conn, key, qty, now)? == 0 {
            return Err(Self::missing(key));
        }
        Ok(())
    }

    // ==========================================
    // 独立操作（各自一个事务）
    // ==========================================

    #[instrument(skip(self, ctx), fields(part_id = key.part_id, location = key.service_location_id))]
    pub fn reserve(
        &self,
        ctx: &OperationContext,
        key: StockKey<'_>,
        qty: i64,
    ) -> WorkOrderResult<InventoryRecord> {
        self.run(ctx, key, |conn, now| Self::reserve_tx(conn, key, qty, now))
    }

    #[instrument(skip(self, ctx), fields(part_id = key.part_id, location = key.service_location_id))]
    pub fn consume(
        &self,
        ctx: &OperationContext,
        key: StockKey<'_>,
        qty: i64,
    ) -> WorkOrderResult<InventoryRecord> {
        self.run(ctx, key, |conn, now| Self::consume_tx(conn, key, qty, now))
    }

    #[instrument(skip(self, ctx), fields(part_id = key.part_id, location = key.service_location_id))]
    pub fn release(
        &self,
        ctx: &OperationContext,
        key: StockKey<'_>,
        qty: i64,
    ) -> WorkOrderResult<InventoryRecord> {
        self.run(ctx, key, |conn, now| Self::release_tx(conn, key, qty, now))
    }

    pub fn get(&self, key: StockKey<'_>) -> WorkOrderResult<Option<InventoryRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        Ok(InventoryRepository::find_tx(&conn, key)?)
    }

    fn run<F>(&self, ctx: &OperationContext, key: StockKey<'_>, op: F) -> WorkOrderResult<InventoryRecord>
    where
        F: FnOnce(&Connection, NaiveDateTime) -> WorkOrderResult<()>,
    {
        ctx.check("开始")?;
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.unchecked_transaction()?;

        op(&*tx, chrono::Local::now().naive_local())?;
        let record = InventoryRepository::find_tx(&tx, key)?.ok_or_else(|| Self::missing(key))?;

        ctx.check("提交前")?;
        tx.commit()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(qty_available: i64) -> InventoryLedger {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        InventoryRepository::new(conn.clone())
            .upsert_stock(key(), qty_available)
            .unwrap();
        InventoryLedger::new(conn)
    }

    fn key() -> StockKey<'static> {
        StockKey {
            tenant_id: "T1",
            service_location_id: "LOC1",
            part_id: "BATTERY-45W",
        }
    }

    fn assert_invariant(record: &InventoryRecord) {
        assert!(record.qty_reserved >= 0);
        assert!(record.qty_reserved <= record.qty_available);
    }

    #[test]
    fn test_reserve_consume_release_keeps_invariant() {
        let ledger = setup(8);
        let ctx = OperationContext::new("tech");

        let steps: Vec<(&str, i64)> = vec![
            ("reserve", 5),
            ("consume", 2),
            ("reserve", 3),
            ("release", 3),
            ("consume", 3),
            ("release", 10),
        ];
        for (op, qty) in steps {
            let result = match op {
                "reserve" => ledger.reserve(&ctx, key(), qty),
                "consume" => ledger.consume(&ctx, key(), qty),
                _ => ledger.release(&ctx, key(), qty),
            };
            let record = result.unwrap();
            assert_invariant(&record);
        }

        let record = ledger.get(key()).unwrap().unwrap();
        assert_eq!(record.qty_available, 3);
        assert_eq!(record.qty_reserved, 0);
    }

    #[test]
    fn test_reserve_beyond_free_stock_is_rejected_without_mutation() {
        let ledger = setup(3);
        let ctx = OperationContext::new("tech");
        ledger.reserve(&ctx, key(), 2).unwrap();

        let err = ledger.reserve(&ctx, key(), 2).unwrap_err();
        match err {
            WorkOrderError::InsufficientStock { requested, free, .. } => {
                assert_eq!(requested, 2);
                assert_eq!(free, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ledger.get(key()).unwrap().unwrap().qty_reserved, 2);
    }

    #[test]
    fn test_missing_row_and_bad_quantity() {
        let ledger = setup(3);
        let ctx = OperationContext::new("tech");
        let other = StockKey {
            part_id: "UNKNOWN",
            ..key()
        };

        assert!(matches!(
            ledger.release(&ctx, other, 1),
            Err(WorkOrderError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.reserve(&ctx, other, 1),
            Err(WorkOrderError::NotFound { .. })
        ));
        assert!(matches!(
            ledger.consume(&ctx, key(), 0),
            Err(WorkOrderError::ValidationError(_))
        ));
    }
}
