// ==========================================
// 学校设备维修工单 - 批量操作协调器
// ==========================================
// 流程: 记录请求 → 一次查询全部工单 → 逐个独立校验
//       → 通过校验的子集用一条语句写入 → 回写批量日志 → 逐个审计
// 红线: 单个 ID 失败不影响其他 ID；仅当批量写入语句本身失败时，全部有效 ID 一并失败
// 红线: 批量状态更新只允许正向迁移（返工不走批量通道）
// ==========================================

use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::config::WorkOrderPolicy;
use crate::domain::bulk::{
    BulkFailureCode, BulkItemFailure, BulkOperationLog, BulkOperationResult, BulkPayload,
};
use crate::domain::types::{ApprovalDecision, ApprovalStatus, BulkOperationStatus, WorkOrderStatus};
use crate::domain::work_order::{TenantScope, WorkOrder};
use crate::engine::audit::{AuditMeta, AuditSink};
use crate::engine::context::OperationContext;
use crate::engine::error::{WorkOrderError, WorkOrderResult};
use crate::engine::lifecycle::{approval_blockers_tx, approval_effect, can_transition};
use crate::repository::{BulkOperationLogRepository, RepositoryError, WorkOrderRepository};

pub struct BulkOperationCoordinator {
    conn: Arc<Mutex<Connection>>,
    policy: Arc<WorkOrderPolicy>,
    log_repo: BulkOperationLogRepository,
    audit: AuditSink,
}

#[derive(Default)]
struct BatchOutcome {
    succeeded: Vec<String>,
    failed: Vec<BulkItemFailure>,
    snapshots: Vec<(WorkOrder, WorkOrder)>,
    cancelled: Option<WorkOrderError>,
}

/// 单条写入语句的目标
enum BulkWrite<'a> {
    Status {
        to: WorkOrderStatus,
        approval: Option<ApprovalStatus>,
    },
    Assignment {
        assignee_id: &'a str,
    },
}

impl BulkOperationCoordinator {
    pub fn new(conn: Arc<Mutex<Connection>>, policy: Arc<WorkOrderPolicy>, audit: AuditSink) -> Self {
        Self {
            log_repo: BulkOperationLogRepository::new(conn.clone()),
            conn,
            policy,
            audit,
        }
    }

    fn get_conn(&self) -> WorkOrderResult<std::sync::MutexGuard<'_, Connection>> {
        Ok(self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?)
    }

    /// 去重（保留首次出现顺序），空列表/超限直接拒绝整个请求
    fn normalize_ids(&self, work_order_ids: &[String]) -> WorkOrderResult<Vec<String>> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = work_order_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        if ids.is_empty() {
            return Err(WorkOrderError::ValidationError("工单ID列表不能为空".to_string()));
        }
        if ids.len() > self.policy.max_bulk_batch_size {
            return Err(WorkOrderError::BatchTooLarge {
                size: ids.len(),
                max: self.policy.max_bulk_batch_size,
            });
        }
        Ok(ids)
    }

    fn validate_payload(payload: &BulkPayload) -> WorkOrderResult<()> {
        if let BulkPayload::Assignment { assignee_id } = payload {
            if assignee_id.trim().is_empty() {
                return Err(WorkOrderError::ValidationError("派工对象不能为空".to_string()));
            }
        }
        Ok(())
    }

    /// 单个工单的校验；返回 Err 即该 ID 的失败项
    fn validate_item(
        payload: &BulkPayload,
        wo: &WorkOrder,
        blockers: &HashMap<String, Vec<String>>,
    ) -> Result<(), (BulkFailureCode, String)> {
        let invalid = |to: WorkOrderStatus| {
            (
                BulkFailureCode::InvalidTransition,
                WorkOrderError::InvalidTransition { from: wo.status, to }.to_string(),
            )
        };
        let blocked = || {
            blockers.get(&wo.work_order_id).map(|reasons| {
                (
                    BulkFailureCode::ApprovalBlocked,
                    WorkOrderError::ApprovalBlocked {
                        work_order_id: wo.work_order_id.clone(),
                        reasons: reasons.clone(),
                    }
                    .to_string(),
                )
            })
        };

        match payload {
            BulkPayload::StatusUpdate { target_status } => {
                if !can_transition(wo.status, *target_status) {
                    return Err(invalid(*target_status));
                }
                if *target_status == WorkOrderStatus::Approved {
                    if let Some(failure) = blocked() {
                        return Err(failure);
                    }
                }
            }
            BulkPayload::Assignment { .. } => {
                if wo.status.is_terminal() {
                    return Err((
                        BulkFailureCode::InvalidTransition,
                        format!("工单 {} 已验收，不可派工", wo.work_order_id),
                    ));
                }
            }
            BulkPayload::Approval { decision, .. } => {
                let to = match decision {
                    ApprovalDecision::Approve => WorkOrderStatus::Approved,
                    ApprovalDecision::Reject => WorkOrderStatus::Qa,
                };
                if wo.status != WorkOrderStatus::Completed {
                    return Err(invalid(to));
                }
                if *decision == ApprovalDecision::Approve {
                    if let Some(failure) = blocked() {
                        return Err(failure);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_target(payload: &BulkPayload) -> BulkWrite<'_> {
        match payload {
            BulkPayload::StatusUpdate { target_status } => BulkWrite::Status {
                to: *target_status,
                approval: approval_effect(*target_status),
            },
            BulkPayload::Assignment { assignee_id } => BulkWrite::Assignment {
                assignee_id: assignee_id.as_str(),
            },
            BulkPayload::Approval { decision, .. } => match decision {
                ApprovalDecision::Approve => BulkWrite::Status {
                    to: WorkOrderStatus::Approved,
                    approval: Some(ApprovalStatus::Approved),
                },
                // 轻量回退：不写返工历史，不计返工次数
                ApprovalDecision::Reject => BulkWrite::Status {
                    to: WorkOrderStatus::Qa,
                    approval: Some(ApprovalStatus::Rejected),
                },
            },
        }
    }

    /// 执行批量操作
    #[instrument(skip(self, ctx, scope, work_order_ids), fields(
        actor = ctx.actor(),
        op = %payload.operation_type(),
        requested = work_order_ids.len()
    ))]
    pub fn execute(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_ids: &[String],
        payload: &BulkPayload,
    ) -> WorkOrderResult<BulkOperationResult> {
        ctx.check("开始")?;
        let ids = self.normalize_ids(work_order_ids)?;
        Self::validate_payload(payload)?;

        // 1. 记录请求
        let started_at = chrono::Local::now().naive_local();
        let operation_id = uuid::Uuid::new_v4().to_string();
        self.log_repo.insert_started(&BulkOperationLog {
            operation_id: operation_id.clone(),
            tenant_id: scope.tenant_id.clone(),
            operation_type: payload.operation_type(),
            actor: ctx.actor().to_string(),
            payload_json: serde_json::to_value(payload).ok(),
            requested_ids: ids.clone(),
            succeeded_ids: Vec::new(),
            failed_items: Vec::new(),
            total_count: ids.len() as i64,
            success_count: 0,
            failure_count: 0,
            status: BulkOperationStatus::Running,
            started_at,
            finished_at: None,
        })?;

        // 2~4. 查询/校验/写入；查询阶段的存储错误同样要回写日志
        let (succeeded, mut failed, snapshots, abort) =
            match self.run_batch(ctx, scope, &ids, payload, &operation_id) {
                Ok(outcome) => (
                    outcome.succeeded,
                    outcome.failed,
                    outcome.snapshots,
                    outcome.cancelled,
                ),
                Err(e) => {
                    warn!(operation_id = %operation_id, error = %e, "批量操作中止");
                    let failed: Vec<BulkItemFailure> = ids
                        .iter()
                        .map(|id| BulkItemFailure {
                            work_order_id: id.clone(),
                            code: BulkFailureCode::StorageFailure,
                            message: e.to_string(),
                        })
                        .collect();
                    (Vec::new(), failed, Vec::new(), Some(e))
                }
            };

        // 失败项按请求顺序排列
        let position: HashMap<&str, usize> =
            ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        failed.sort_by_key(|f| position.get(f.work_order_id.as_str()).copied().unwrap_or(usize::MAX));

        // 5. 回写批量日志
        let storage_failed = failed
            .iter()
            .any(|f| f.code == BulkFailureCode::StorageFailure);
        let status = if storage_failed {
            BulkOperationStatus::Failed
        } else {
            BulkOperationStatus::Completed
        };
        if let Err(e) = self.log_repo.finish(
            &operation_id,
            &succeeded,
            &failed,
            status,
            chrono::Local::now().naive_local(),
        ) {
            warn!(operation_id = %operation_id, error = %e, "回写批量操作日志失败");
        }

        if let Some(err) = abort {
            return Err(err);
        }

        // 6. 逐个审计
        let detail = match payload {
            BulkPayload::Approval {
                comment: Some(comment),
                decision,
            } => format!("BULK {} {}: {}", payload.operation_type(), decision.as_str(), comment),
            _ => format!("BULK {} op={}", payload.operation_type(), operation_id),
        };
        for (before, after) in &snapshots {
            self.audit.record_update(
                &AuditMeta::new(&scope.tenant_id, ctx.actor()).with_detail(&detail),
                "work_order",
                &after.work_order_id,
                &before.snapshot(),
                &after.snapshot(),
            );
        }

        info!(
            operation_id = %operation_id,
            total = ids.len(),
            succeeded = succeeded.len(),
            failed = failed.len(),
            status = status.as_str(),
            "批量操作完成"
        );

        Ok(BulkOperationResult {
            operation_id,
            operation_type: payload.operation_type(),
            total_count: ids.len(),
            success_count: succeeded.len(),
            failure_count: failed.len(),
            succeeded,
            failed,
        })
    }

    fn run_batch(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        ids: &[String],
        payload: &BulkPayload,
        operation_id: &str,
    ) -> WorkOrderResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        // 2. 一次查询全部工单
        let found: HashMap<String, WorkOrder> = WorkOrderRepository::find_by_ids_tx(&tx, scope, ids)?
            .into_iter()
            .map(|wo| (wo.work_order_id.clone(), wo))
            .collect();

        let needs_guard = matches!(
            payload,
            BulkPayload::StatusUpdate {
                target_status: WorkOrderStatus::Approved
            } | BulkPayload::Approval {
                decision: ApprovalDecision::Approve,
                ..
            }
        );
        let blockers = if needs_guard {
            let found_ids: Vec<String> = found.keys().cloned().collect();
            approval_blockers_tx(&tx, &scope.tenant_id, &found_ids)?
        } else {
            HashMap::new()
        };

        // 3. 逐个独立校验
        let mut valid: Vec<String> = Vec::new();
        for id in ids {
            let Some(wo) = found.get(id) else {
                outcome.failed.push(BulkItemFailure {
                    work_order_id: id.clone(),
                    code: BulkFailureCode::NotFound,
                    message: format!("工单不存在: {}", id),
                });
                continue;
            };
            match Self::validate_item(payload, wo, &blockers) {
                Ok(()) => valid.push(id.clone()),
                Err((code, message)) => {
                    debug!(work_order_id = %id, ?code, %message, "批量校验未通过");
                    outcome.failed.push(BulkItemFailure {
                        work_order_id: id.clone(),
                        code,
                        message,
                    });
                }
            }
        }

        if valid.is_empty() {
            return Ok(outcome);
        }

        // 4. 有效子集一条语句写入
        let now = chrono::Local::now().naive_local();
        let written = match Self::write_target(payload) {
            BulkWrite::Status { to, approval } => WorkOrderRepository::bulk_update_status_tx(
                &tx,
                scope,
                &valid,
                to,
                approval,
                ctx.actor(),
                now,
            ),
            BulkWrite::Assignment { assignee_id } => WorkOrderRepository::bulk_update_assignment_tx(
                &tx,
                scope,
                &valid,
                assignee_id,
                ctx.actor(),
                now,
            ),
        }
        .and_then(|_| WorkOrderRepository::find_by_ids_tx(&tx, scope, &valid));

        let committed = match written {
            Ok(after) => match ctx.check("提交前") {
                Err(e) => {
                    outcome.cancelled = Some(e);
                    Err("操作已取消，未提交".to_string())
                }
                Ok(()) => tx.commit().map(|_| after).map_err(|e| e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        match committed {
            Ok(after) => {
                let mut after_by_id: HashMap<String, WorkOrder> = after
                    .into_iter()
                    .map(|wo| (wo.work_order_id.clone(), wo))
                    .collect();
                for id in valid {
                    if let (Some(before), Some(after)) = (found.get(&id), after_by_id.remove(&id)) {
                        outcome.snapshots.push((before.clone(), after));
                    }
                    outcome.succeeded.push(id);
                }
            }
            Err(message) => {
                warn!(operation_id, error = %message, "批量写入失败，全部有效ID判定失败");
                for id in valid {
                    outcome.failed.push(BulkItemFailure {
                        work_order_id: id,
                        code: BulkFailureCode::StorageFailure,
                        message: message.clone(),
                    });
                }
            }
        }
        Ok(outcome)
    }

    pub fn bulk_update_status(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_ids: &[String],
        target_status: WorkOrderStatus,
    ) -> WorkOrderResult<BulkOperationResult> {
        self.execute(ctx, scope, work_order_ids, &BulkPayload::StatusUpdate { target_status })
    }

    pub fn bulk_update_assignment(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_ids: &[String],
        assignee_id: &str,
    ) -> WorkOrderResult<BulkOperationResult> {
        self.execute(
            ctx,
            scope,
            work_order_ids,
            &BulkPayload::Assignment {
                assignee_id: assignee_id.to_string(),
            },
        )
    }

    pub fn bulk_update_approval(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_ids: &[String],
        decision: ApprovalDecision,
        comment: Option<String>,
    ) -> WorkOrderResult<BulkOperationResult> {
        self.execute(
            ctx,
            scope,
            work_order_ids,
            &BulkPayload::Approval { decision, comment },
        )
    }

    pub fn get_log(&self, operation_id: &str) -> WorkOrderResult<BulkOperationLog> {
        self.log_repo
            .find_by_id(operation_id)?
            .ok_or_else(|| WorkOrderError::not_found("BulkOperationLog", operation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::work_order::NewWorkOrder;

    fn setup(max_batch: usize) -> (Arc<Mutex<Connection>>, BulkOperationCoordinator) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let policy = WorkOrderPolicy {
            max_bulk_batch_size: max_batch,
            ..Default::default()
        };
        let coordinator =
            BulkOperationCoordinator::new(conn.clone(), Arc::new(policy), AuditSink::none());
        (conn, coordinator)
    }

    fn seed(conn: &Arc<Mutex<Connection>>, id: &str, status: WorkOrderStatus) {
        let mut wo = WorkOrder::draft(
            id.to_string(),
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
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_and_oversized_batches_are_rejected() {
        let (_conn, coordinator) = setup(2);
        let ctx = OperationContext::new("admin");
        let scope = TenantScope::tenant("T1");

        assert!(matches!(
            coordinator.bulk_update_status(&ctx, &scope, &[], WorkOrderStatus::Assigned),
            Err(WorkOrderError::ValidationError(_))
        ));
        assert!(matches!(
            coordinator.bulk_update_status(&ctx, &scope, &ids(&["A", "B", "C"]), WorkOrderStatus::Assigned),
            Err(WorkOrderError::BatchTooLarge { size: 3, max: 2 })
        ));
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let (conn, coordinator) = setup(2);
        seed(&conn, "WO1", WorkOrderStatus::Draft);
        let ctx = OperationContext::new("admin");
        let scope = TenantScope::tenant("T1");

        let result = coordinator
            .bulk_update_status(&ctx, &scope, &ids(&["WO1", "WO1", "WO1"]), WorkOrderStatus::Assigned)
            .unwrap();
        assert_eq!(result.total_count, 1);
        assert_eq!(result.succeeded, ids(&["WO1"]));
    }

    #[test]
    fn test_assignment_moves_draft_and_skips_approved() {
        let (conn, coordinator) = setup(10);
        seed(&conn, "WO1", WorkOrderStatus::Draft);
        seed(&conn, "WO2", WorkOrderStatus::InRepair);
        seed(&conn, "WO3", WorkOrderStatus::Approved);
        let ctx = OperationContext::new("admin");
        let scope = TenantScope::tenant("T1");

        let result = coordinator
            .bulk_update_assignment(&ctx, &scope, &ids(&["WO1", "WO2", "WO3", "WO9"]), "tech-42")
            .unwrap();
        assert_eq!(result.succeeded, ids(&["WO1", "WO2"]));
        assert_eq!(result.failure_for("WO3").unwrap().code, BulkFailureCode::InvalidTransition);
        assert_eq!(result.failure_for("WO9").unwrap().code, BulkFailureCode::NotFound);

        let repo = WorkOrderRepository::new(conn.clone());
        let wo1 = repo.find_by_id(&scope, "WO1").unwrap().unwrap();
        assert_eq!(wo1.status, WorkOrderStatus::Assigned);
        assert_eq!(wo1.assigned_to.as_deref(), Some("tech-42"));
        let wo2 = repo.find_by_id(&scope, "WO2").unwrap().unwrap();
        assert_eq!(wo2.status, WorkOrderStatus::InRepair);

        assert!(matches!(
            coordinator.bulk_update_assignment(&ctx, &scope, &ids(&["WO1"]), "  "),
            Err(WorkOrderError::ValidationError(_))
        ));
    }

    #[test]
    fn test_bulk_reject_reverts_to_qa_without_rework_count() {
        let (conn, coordinator) = setup(10);
        seed(&conn, "WO1", WorkOrderStatus::Completed);
        seed(&conn, "WO2", WorkOrderStatus::Qa);
        let ctx = OperationContext::new("principal");
        let scope = TenantScope::tenant("T1");

        let result = coordinator
            .bulk_update_approval(
                &ctx,
                &scope,
                &ids(&["WO1", "WO2"]),
                ApprovalDecision::Reject,
                Some("照片不清晰".to_string()),
            )
            .unwrap();
        assert_eq!(result.succeeded, ids(&["WO1"]));
        assert_eq!(result.failure_for("WO2").unwrap().code, BulkFailureCode::InvalidTransition);

        let wo1 = WorkOrderRepository::new(conn.clone())
            .find_by_id(&scope, "WO1")
            .unwrap()
            .unwrap();
        assert_eq!(wo1.status, WorkOrderStatus::Qa);
        assert_eq!(wo1.approval_status, ApprovalStatus::Rejected);
        assert_eq!(wo1.rework_count, 0);

        let log = coordinator.get_log(&result.operation_id).unwrap();
        assert_eq!(log.status, BulkOperationStatus::Completed);
        assert_eq!(log.success_count + log.failure_count, log.total_count);
    }
}
