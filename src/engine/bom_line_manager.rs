// ==========================================
// 学校设备维修工单 - BOM行管理引擎
// ==========================================
// 红线: 0 <= qty_used <= qty_planned
// 红线: 库存预留/消耗/释放与BOM行变更在同一事务内，要么全部生效要么全部回滚
// ==========================================
// 职责: 添加备件行(预留) / 消耗 / 释放
// 依赖: InventoryLedger (事务内组合), PartCompatibility (策略开关)
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

use crate::config::WorkOrderPolicy;
use crate::domain::inventory::{AddBomLineRequest, BomLine, StockKey};
use crate::domain::work_order::TenantScope;
use crate::engine::audit::{AuditMeta, AuditSink};
use crate::engine::compatibility::PartCompatibility;
use crate::engine::context::OperationContext;
use crate::engine::error::{WorkOrderError, WorkOrderResult};
use crate::engine::inventory_ledger::InventoryLedger;
use crate::repository::{BomLineRepository, RepositoryError, WorkOrderRepository};

const ENTITY_TYPE: &str = "work_order_part";

pub struct BomLineManager {
    conn: Arc<Mutex<Connection>>,
    policy: Arc<WorkOrderPolicy>,
    compatibility: Arc<dyn PartCompatibility>,
    audit: AuditSink,
}

impl BomLineManager {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        policy: Arc<WorkOrderPolicy>,
        compatibility: Arc<dyn PartCompatibility>,
        audit: AuditSink,
    ) -> Self {
        Self {
            conn,
            policy,
            compatibility,
            audit,
        }
    }

    fn get_conn(&self) -> WorkOrderResult<std::sync::MutexGuard<'_, Connection>> {
        Ok(self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?)
    }

    /// 添加BOM行：预留库存 + 插入行，同一事务
    #[instrument(skip(self, ctx, req), fields(work_order_id = %req.work_order_id, part_id = %req.part_id))]
    pub fn add_line(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        req: &AddBomLineRequest,
    ) -> WorkOrderResult<BomLine> {
        ctx.check("开始")?;
        if req.qty_planned <= 0 {
            return Err(WorkOrderError::ValidationError(format!(
                "计划数量必须大于0: {}",
                req.qty_planned
            )));
        }
        if req.part_id.trim().is_empty() {
            return Err(WorkOrderError::ValidationError("备件ID不能为空".to_string()));
        }

        let work_order = {
            let conn = self.get_conn()?;
            WorkOrderRepository::find_by_id_tx(&conn, scope, &req.work_order_id)?
        }
        .ok_or_else(|| WorkOrderError::not_found("WorkOrder", &req.work_order_id))?;

        let location = work_order
            .service_location_id
            .clone()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                WorkOrderError::ValidationError(format!(
                    "工单 {} 未指定维修点，无法预留库存",
                    work_order.work_order_id
                ))
            })?;

        // 兼容性查询在事务外完成；未登记设备型号时跳过
        if self.policy.enforce_part_compatibility && !req.override_compatibility {
            if let Some(model) = work_order.device_model.as_deref() {
                if !self.compatibility.is_compatible(&req.part_id, model)? {
                    debug!(part_id = %req.part_id, device_model = model, "备件不兼容，拒绝添加");
                    return Err(WorkOrderError::IncompatiblePart {
                        part_id: req.part_id.clone(),
                        device_model: model.to_string(),
                    });
                }
            }
        }

        let now = chrono::Local::now().naive_local();
        let line = BomLine {
            line_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: work_order.tenant_id.clone(),
            service_location_id: location,
            work_order_id: work_order.work_order_id.clone(),
            part_id: req.part_id.clone(),
            qty_planned: req.qty_planned,
            qty_used: 0,
            created_at: now,
            updated_at: now,
            updated_by: Some(ctx.actor().to_string()),
        };

        {
            let conn = self.get_conn()?;
            let tx = conn.unchecked_transaction()?;

            // 库存行缺失按预留失败上报
            InventoryLedger::reserve_tx(&tx, line.stock_key(), line.qty_planned, now).map_err(
                |e| match e {
                    WorkOrderError::NotFound { entity, id } => WorkOrderError::ReservationConflict(
                        format!("库存记录不存在: {} {}", entity, id),
                    ),
                    other => other,
                },
            )?;
            BomLineRepository::insert_tx(&tx, &line)
                .map_err(|e| WorkOrderError::ReservationConflict(e.to_string()))?;

            ctx.check("提交前")?;
            tx.commit()?;
        }

        info!(
            line_id = %line.line_id,
            qty_planned = line.qty_planned,
            "BOM行已添加并完成预留"
        );
        self.audit.record_create(
            &AuditMeta::new(&line.tenant_id, ctx.actor()),
            ENTITY_TYPE,
            &line.line_id,
            &line.snapshot(),
        );
        Ok(line)
    }

    /// 消耗：qty_used += qty，并扣减库存
    #[instrument(skip(self, ctx, scope))]
    pub fn consume(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        line_id: &str,
        qty: i64,
    ) -> WorkOrderResult<BomLine> {
        self.mutate_line(ctx, scope, line_id, qty, LineMutation::Consume)
    }

    /// 释放：qty_planned -= qty，并归还预留
    #[instrument(skip(self, ctx, scope))]
    pub fn release(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        line_id: &str,
        qty: i64,
    ) -> WorkOrderResult<BomLine> {
        self.mutate_line(ctx, scope, line_id, qty, LineMutation::Release)
    }

    pub fn list_lines(&self, scope: &TenantScope, work_order_id: &str) -> WorkOrderResult<Vec<BomLine>> {
        let conn = self.get_conn()?;
        Ok(BomLineRepository::list_by_work_orders_tx(
            &conn,
            &scope.tenant_id,
            &[work_order_id.to_string()],
        )?)
    }

    fn mutate_line(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        line_id: &str,
        qty: i64,
        mutation: LineMutation,
    ) -> WorkOrderResult<BomLine> {
        ctx.check("开始")?;
        if qty <= 0 {
            return Err(WorkOrderError::ValidationError(format!("数量必须大于0: {}", qty)));
        }

        let now = chrono::Local::now().naive_local();
        let (before, after) = {
            let conn = self.get_conn()?;
            let tx = conn.unchecked_transaction()?;

            let before = BomLineRepository::find_by_id_tx(&tx, &scope.tenant_id, line_id)?
                .ok_or_else(|| WorkOrderError::not_found("BomLine", line_id))?;
            let key = StockKey {
                tenant_id: &before.tenant_id,
                service_location_id: &before.service_location_id,
                part_id: &before.part_id,
            };

            match mutation {
                LineMutation::Consume => {
                    let rows = BomLineRepository::add_used_tx(
                        &tx,
                        &scope.tenant_id,
                        line_id,
                        qty,
                        ctx.actor(),
                        now,
                    )?;
                    if rows == 0 {
                        return Err(WorkOrderError::OverConsumption {
                            line_id: line_id.to_string(),
                            requested: qty,
                            remaining: before.qty_open(),
                        });
                    }
                    InventoryLedger::consume_tx(&tx, key, qty, now)?;
                }
                LineMutation::Release => {
                    let rows = BomLineRepository::lower_planned_tx(
                        &tx,
                        &scope.tenant_id,
                        line_id,
                        qty,
                        ctx.actor(),
                        now,
                    )?;
                    if rows == 0 {
                        return Err(WorkOrderError::ReleaseExceedsAvailable {
                            line_id: line_id.to_string(),
                            requested: qty,
                            releasable: before.qty_open(),
                        });
                    }
                    InventoryLedger::release_tx(&tx, key, qty, now)?;
                }
            }

            let after = BomLineRepository::find_by_id_tx(&tx, &scope.tenant_id, line_id)?
                .ok_or_else(|| WorkOrderError::not_found("BomLine", line_id))?;

            ctx.check("提交前")?;
            tx.commit()?;
            (before, after)
        };

        info!(
            line_id,
            op = mutation.as_str(),
            qty,
            qty_used = after.qty_used,
            qty_planned = after.qty_planned,
            "BOM行已更新"
        );
        self.audit.record_update(
            &AuditMeta::new(&after.tenant_id, ctx.actor()).with_detail(mutation.as_str()),
            ENTITY_TYPE,
            line_id,
            &before.snapshot(),
            &after.snapshot(),
        );
        Ok(after)
    }
}

#[derive(Debug, Clone, Copy)]
enum LineMutation {
    Consume,
    Release,
}

impl LineMutation {
    fn as_str(&self) -> &'static str {
        match self {
            LineMutation::Consume => "CONSUME",
            LineMutation::Release => "RELEASE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::work_order::{NewWorkOrder, WorkOrder};
    use crate::engine::compatibility::SqlitePartCompatibility;
    use crate::repository::{InventoryRepository, PartCompatibilityRepository};

    struct Fixture {
        conn: Arc<Mutex<Connection>>,
        manager: BomLineManager,
        scope: TenantScope,
    }

    fn setup(policy: WorkOrderPolicy) -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        let wo = WorkOrder::draft(
            "WO1".to_string(),
            "T1".to_string(),
            NewWorkOrder {
                school_id: "S1".to_string(),
                service_location_id: Some("LOC1".to_string()),
                device_model: Some("Chromebook C340".to_string()),
                ..Default::default()
            },
            "admin",
        );
        WorkOrderRepository::new(conn.clone()).insert(&wo).unwrap();

        let stock = StockKey {
            tenant_id: "T1",
            service_location_id: "LOC1",
            part_id: "SCREEN-14",
        };
        InventoryRepository::new(conn.clone()).upsert_stock(stock, 5).unwrap();

        let compat_repo = Arc::new(PartCompatibilityRepository::new(conn.clone()));
        compat_repo.add("SCREEN-14", "Chromebook C340").unwrap();

        let manager = BomLineManager::new(
            conn.clone(),
            Arc::new(policy),
            Arc::new(SqlitePartCompatibility::new(compat_repo)),
            AuditSink::none(),
        );
        Fixture {
            conn,
            manager,
            scope: TenantScope::tenant("T1"),
        }
    }

    fn request(part_id: &str, qty: i64) -> AddBomLineRequest {
        AddBomLineRequest {
            work_order_id: "WO1".to_string(),
            part_id: part_id.to_string(),
            qty_planned: qty,
            override_compatibility: false,
        }
    }

    fn reserved(fx: &Fixture, part_id: &str) -> Option<i64> {
        InventoryRepository::new(fx.conn.clone())
            .find(StockKey {
                tenant_id: "T1",
                service_location_id: "LOC1",
                part_id,
            })
            .unwrap()
            .map(|r| r.qty_reserved)
    }

    #[test]
    fn test_over_consumption_and_over_release_are_rejected() {
        let fx = setup(WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech");
        let line = fx.manager.add_line(&ctx, &fx.scope, &request("SCREEN-14", 3)).unwrap();

        fx.manager.consume(&ctx, &fx.scope, &line.line_id, 2).unwrap();
        let err = fx.manager.consume(&ctx, &fx.scope, &line.line_id, 2).unwrap_err();
        assert!(matches!(err, WorkOrderError::OverConsumption { remaining: 1, .. }));

        let err = fx.manager.release(&ctx, &fx.scope, &line.line_id, 2).unwrap_err();
        assert!(matches!(err, WorkOrderError::ReleaseExceedsAvailable { releasable: 1, .. }));

        let line = fx.manager.release(&ctx, &fx.scope, &line.line_id, 1).unwrap();
        assert_eq!(line.qty_planned, 2);
        assert_eq!(line.qty_used, 2);
        assert!(line.is_resolved());
        assert_eq!(reserved(&fx, "SCREEN-14"), Some(0));
    }

    #[test]
    fn test_incompatible_part_is_rejected_unless_overridden() {
        let fx = setup(WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech");
        InventoryRepository::new(fx.conn.clone())
            .upsert_stock(
                StockKey {
                    tenant_id: "T1",
                    service_location_id: "LOC1",
                    part_id: "IPAD-DIGITIZER",
                },
                2,
            )
            .unwrap();

        let err = fx
            .manager
            .add_line(&ctx, &fx.scope, &request("IPAD-DIGITIZER", 1))
            .unwrap_err();
        assert!(matches!(err, WorkOrderError::IncompatiblePart { .. }));
        assert_eq!(reserved(&fx, "IPAD-DIGITIZER"), Some(0));

        let mut overridden = request("IPAD-DIGITIZER", 1);
        overridden.override_compatibility = true;
        fx.manager.add_line(&ctx, &fx.scope, &overridden).unwrap();
        assert_eq!(reserved(&fx, "IPAD-DIGITIZER"), Some(1));
    }

    #[test]
    fn test_compatibility_check_disabled_by_policy() {
        let fx = setup(WorkOrderPolicy {
            enforce_part_compatibility: false,
            ..Default::default()
        });
        let ctx = OperationContext::new("tech");
        InventoryRepository::new(fx.conn.clone())
            .upsert_stock(
                StockKey {
                    tenant_id: "T1",
                    service_location_id: "LOC1",
                    part_id: "GENERIC-CABLE",
                },
                1,
            )
            .unwrap();
        assert!(fx.manager.add_line(&ctx, &fx.scope, &request("GENERIC-CABLE", 1)).is_ok());
    }

    #[test]
    fn test_add_line_validation() {
        let fx = setup(WorkOrderPolicy::default());
        let ctx = OperationContext::new("tech");

        assert!(matches!(
            fx.manager.add_line(&ctx, &fx.scope, &request("SCREEN-14", 0)),
            Err(WorkOrderError::ValidationError(_))
        ));

        let mut missing = request("SCREEN-14", 1);
        missing.work_order_id = "NOPE".to_string();
        assert!(matches!(
            fx.manager.add_line(&ctx, &fx.scope, &missing),
            Err(WorkOrderError::NotFound { .. })
        ));

        // 其他租户不可见
        assert!(matches!(
            fx.manager.add_line(&ctx, &TenantScope::tenant("T2"), &request("SCREEN-14", 1)),
            Err(WorkOrderError::NotFound { .. })
        ));
    }
}
