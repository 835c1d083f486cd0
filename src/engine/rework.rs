// ==========================================
// 学校设备维修工单 - 返工引擎
// ==========================================
// 红线: 返工历史与状态回退/计数自增同一事务提交，不得出现半写
// 红线: rework_count 等于成功返工次数，且不超过 max_rework_count
// ==========================================
// 职责: 逆向迁移校验 (正向表的逆表或策略覆盖) + 原因/类别/上限守卫
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

use crate::config::WorkOrderPolicy;
use crate::domain::rework::{ReworkHistoryEntry, ReworkRequest};
use crate::domain::types::{ApprovalStatus, WorkOrderStatus};
use crate::domain::work_order::{TenantScope, WorkOrder};
use crate::engine::audit::{AuditMeta, AuditSink};
use crate::engine::context::OperationContext;
use crate::engine::error::{WorkOrderError, WorkOrderResult};
use crate::engine::lifecycle::TransitionTable;
use crate::repository::{RepositoryError, ReworkHistoryRepository, WorkOrderRepository};

pub struct ReworkEngine {
    conn: Arc<Mutex<Connection>>,
    policy: Arc<WorkOrderPolicy>,
    table: TransitionTable,
    history_repo: ReworkHistoryRepository,
    audit: AuditSink,
}

impl ReworkEngine {
    pub fn new(conn: Arc<Mutex<Connection>>, policy: Arc<WorkOrderPolicy>, audit: AuditSink) -> Self {
        let table = match &policy.rework_edges {
            Some(edges) => TransitionTable::from_edges(edges.clone()),
            None => TransitionTable::forward().inverted(),
        };
        Self {
            history_repo: ReworkHistoryRepository::new(conn.clone()),
            conn,
            policy,
            table,
            audit,
        }
    }

    /// 当前生效的逆向迁移表
    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    fn get_conn(&self) -> WorkOrderResult<std::sync::MutexGuard<'_, Connection>> {
        Ok(self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?)
    }

    /// 驳回返工
    #[instrument(skip(self, ctx, scope, req), fields(actor = ctx.actor(), to = %req.to_status, category = %req.category))]
    pub fn reject_for_rework(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_id: &str,
        req: &ReworkRequest,
    ) -> WorkOrderResult<(WorkOrder, ReworkHistoryEntry)> {
        ctx.check("开始")?;

        let reason = req.normalized_reason();
        if self.policy.require_rework_reason && reason.is_none() {
            return Err(WorkOrderError::ValidationError("返工原因不能为空".to_string()));
        }

        let now = chrono::Local::now().naive_local();
        let max = self.policy.max_rework_count;

        let (before, after, entry) = {
            let conn = self.get_conn()?;
            let tx = conn.unchecked_transaction()?;

            let before = WorkOrderRepository::find_by_id_tx(&tx, scope, work_order_id)?
                .ok_or_else(|| WorkOrderError::not_found("WorkOrder", work_order_id))?;

            if !self.table.allows(before.status, req.to_status) {
                debug!(from = %before.status, "返工迁移不在逆向表内");
                return Err(WorkOrderError::InvalidTransition {
                    from: before.status,
                    to: req.to_status,
                });
            }
            if before.rework_count >= max {
                return Err(WorkOrderError::ReworkLimitExceeded {
                    work_order_id: work_order_id.to_string(),
                    max_rework_count: max,
                });
            }

            let approval = (before.status == WorkOrderStatus::Completed)
                .then_some(ApprovalStatus::Rejected);
            let rows = WorkOrderRepository::apply_rework_tx(
                &tx,
                scope,
                work_order_id,
                before.status,
                req.to_status,
                max,
                approval,
                ctx.actor(),
                now,
            )?;
            if rows == 0 {
                return Err(WorkOrderError::ConcurrentModification {
                    work_order_id: work_order_id.to_string(),
                    expected: before.status,
                });
            }

            let entry = ReworkHistoryEntry {
                history_id: uuid::Uuid::new_v4().to_string(),
                tenant_id: before.tenant_id.clone(),
                work_order_id: work_order_id.to_string(),
                from_status: before.status,
                to_status: req.to_status,
                reason,
                category: req.category,
                actor: ctx.actor().to_string(),
                rework_sequence: ReworkHistoryRepository::next_sequence_tx(&tx, work_order_id)?,
                created_at: now,
            };
            ReworkHistoryRepository::insert_tx(&tx, &entry)?;

            let after = WorkOrderRepository::find_by_id_tx(&tx, scope, work_order_id)?
                .ok_or_else(|| WorkOrderError::not_found("WorkOrder", work_order_id))?;

            ctx.check("提交前")?;
            tx.commit()?;
            (before, after, entry)
        };

        info!(
            work_order_id,
            from = %before.status,
            rework_sequence = entry.rework_sequence,
            rework_count = after.rework_count,
            "工单已驳回返工"
        );
        let meta = AuditMeta::new(&after.tenant_id, ctx.actor());
        let detail = format!("REWORK {} -> {} ({})", before.status, after.status, entry.category);
        self.audit.record_update(
            &meta.with_detail(&detail),
            "work_order",
            work_order_id,
            &before.snapshot(),
            &after.snapshot(),
        );
        self.audit.record_create(
            &meta,
            "work_order_rework_history",
            &entry.history_id,
            &serde_json::to_value(&entry).unwrap_or_default(),
        );
        Ok((after, entry))
    }

    pub fn list_history(
        &self,
        scope: &TenantScope,
        work_order_id: &str,
    ) -> WorkOrderResult<Vec<ReworkHistoryEntry>> {
        Ok(self
            .history_repo
            .list_by_work_order(&scope.tenant_id, work_order_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReworkEdges;
    use crate::domain::types::ReworkCategory;
    use crate::domain::work_order::NewWorkOrder;

    fn setup(policy: WorkOrderPolicy, status: WorkOrderStatus) -> (Arc<Mutex<Connection>>, ReworkEngine) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));

        let mut wo = WorkOrder::draft(
            "WO1".to_string(),
            "T1".to_string(),
            NewWorkOrder {
                school_id: "S1".to_string(),
                approval_required: true,
                ..Default::default()
            },
            "admin",
        );
        wo.status = status;
        WorkOrderRepository::new(conn.clone()).insert(&wo).unwrap();

        let engine = ReworkEngine::new(conn.clone(), Arc::new(policy), AuditSink::none());
        (conn, engine)
    }

    fn request(to: WorkOrderStatus, reason: Option<&str>) -> ReworkRequest {
        ReworkRequest {
            to_status: to,
            reason: reason.map(str::to_string),
            category: ReworkCategory::Defect,
        }
    }

    #[test]
    fn test_reason_required_by_policy() {
        let (_conn, engine) = setup(WorkOrderPolicy::default(), WorkOrderStatus::Qa);
        let ctx = OperationContext::new("qa-lead");
        let scope = TenantScope::tenant("T1");

        let err = engine
            .reject_for_rework(&ctx, &scope, "WO1", &request(WorkOrderStatus::InRepair, Some("  ")))
            .unwrap_err();
        assert!(matches!(err, WorkOrderError::ValidationError(_)));

        let relaxed = WorkOrderPolicy {
            require_rework_reason: false,
            ..Default::default()
        };
        let (_conn, engine) = setup(relaxed, WorkOrderStatus::Qa);
        let (wo, entry) = engine
            .reject_for_rework(&ctx, &scope, "WO1", &request(WorkOrderStatus::InRepair, None))
            .unwrap();
        assert_eq!(wo.status, WorkOrderStatus::InRepair);
        assert!(entry.reason.is_none());
    }

    #[test]
    fn test_rework_from_completed_marks_approval_rejected() {
        let (_conn, engine) = setup(WorkOrderPolicy::default(), WorkOrderStatus::Completed);
        let ctx = OperationContext::new("qa-lead");
        let scope = TenantScope::tenant("T1");

        let (wo, entry) = engine
            .reject_for_rework(&ctx, &scope, "WO1", &request(WorkOrderStatus::Qa, Some("屏幕漏光")))
            .unwrap();
        assert_eq!(wo.status, WorkOrderStatus::Qa);
        assert_eq!(wo.approval_status, ApprovalStatus::Rejected);
        assert_eq!(wo.rework_count, 1);
        assert_eq!(entry.rework_sequence, 1);
        assert_eq!(entry.from_status, WorkOrderStatus::Completed);
    }

    #[test]
    fn test_forward_or_terminal_edges_are_invalid() {
        let (_conn, engine) = setup(WorkOrderPolicy::default(), WorkOrderStatus::Approved);
        let ctx = OperationContext::new("qa-lead");
        let scope = TenantScope::tenant("T1");

        let err = engine
            .reject_for_rework(&ctx, &scope, "WO1", &request(WorkOrderStatus::Completed, Some("x")))
            .unwrap_err();
        assert!(matches!(err, WorkOrderError::InvalidTransition { .. }));
        assert!(engine.list_history(&scope, "WO1").unwrap().is_empty());
    }

    #[test]
    fn test_policy_edges_override_default_table() {
        let mut edges = ReworkEdges::new();
        edges.insert(WorkOrderStatus::Qa, vec![WorkOrderStatus::Assigned]);
        let policy = WorkOrderPolicy {
            rework_edges: Some(edges),
            ..Default::default()
        };
        let (_conn, engine) = setup(policy, WorkOrderStatus::Qa);
        let ctx = OperationContext::new("qa-lead");
        let scope = TenantScope::tenant("T1");

        assert!(engine
            .reject_for_rework(&ctx, &scope, "WO1", &request(WorkOrderStatus::InRepair, Some("x")))
            .is_err());
        let (wo, _) = engine
            .reject_for_rework(&ctx, &scope, "WO1", &request(WorkOrderStatus::Assigned, Some("x")))
            .unwrap();
        assert_eq!(wo.status, WorkOrderStatus::Assigned);
    }
}
