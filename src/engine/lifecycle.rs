// ==========================================
// 学校设备维修工单 - 工单生命周期引擎
// ==========================================
// 状态: DRAFT → ASSIGNED → IN_REPAIR → (QA) → COMPLETED → APPROVED
// 红线: 迁移表是数据而非分支；未列出的边一律 InvalidTransition
// 红线: 终态验收前，BOM行全部结清且交付物全部验收
// ==========================================
// 职责: 单工单状态迁移 / 验收门禁 / 阶段关闭门禁
// ==========================================

use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

use crate::config::ReworkEdges;
use crate::domain::phase::{GateViolation, ProjectPhase};
use crate::domain::types::{ApprovalStatus, DeliverableStatus, PhaseStatus, WorkOrderStatus};
use crate::domain::work_order::{TenantScope, WorkOrder};
use crate::engine::audit::{AuditMeta, AuditSink};
use crate::engine::context::OperationContext;
use crate::engine::error::{WorkOrderError, WorkOrderResult};
use crate::repository::{BomLineRepository, PhaseRepository, RepositoryError, WorkOrderRepository};

// ==========================================
// 迁移表
// ==========================================

/// 正向迁移边（QA 可跳过）
const FORWARD_EDGES: &[(WorkOrderStatus, &[WorkOrderStatus])] = &[
    (WorkOrderStatus::Draft, &[WorkOrderStatus::Assigned]),
    (WorkOrderStatus::Assigned, &[WorkOrderStatus::InRepair]),
    (
        WorkOrderStatus::InRepair,
        &[WorkOrderStatus::Qa, WorkOrderStatus::Completed],
    ),
    (WorkOrderStatus::Qa, &[WorkOrderStatus::Completed]),
    (WorkOrderStatus::Completed, &[WorkOrderStatus::Approved]),
];

/// 状态迁移表: from → 允许的 to 集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    edges: BTreeMap<WorkOrderStatus, Vec<WorkOrderStatus>>,
}

impl TransitionTable {
    pub fn forward() -> Self {
        let edges = FORWARD_EDGES
            .iter()
            .map(|(from, tos)| (*from, tos.to_vec()))
            .collect();
        Self { edges }
    }

    pub fn from_edges(edges: ReworkEdges) -> Self {
        Self { edges }
    }

    /// 反转方向；终态出发的边（即反转后起点为终态）不保留
    pub fn inverted(&self) -> Self {
        let mut edges: BTreeMap<WorkOrderStatus, Vec<WorkOrderStatus>> = BTreeMap::new();
        for (from, tos) in &self.edges {
            for to in tos {
                if to.is_terminal() {
                    continue;
                }
                edges.entry(*to).or_default().push(*from);
            }
        }
        for targets in edges.values_mut() {
            targets.sort();
            targets.dedup();
        }
        Self { edges }
    }

    pub fn allows(&self, from: WorkOrderStatus, to: WorkOrderStatus) -> bool {
        self.edges
            .get(&from)
            .map_or(false, |targets| targets.contains(&to))
    }

    pub fn targets(&self, from: WorkOrderStatus) -> &[WorkOrderStatus] {
        self.edges.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edges(&self) -> &BTreeMap<WorkOrderStatus, Vec<WorkOrderStatus>> {
        &self.edges
    }
}

/// 正向迁移判定（纯查表）
pub fn can_transition(from: WorkOrderStatus, to: WorkOrderStatus) -> bool {
    FORWARD_EDGES
        .iter()
        .any(|(f, tos)| *f == from && tos.contains(&to))
}

/// 迁移附带的验收状态变更：进入 COMPLETED 置 PENDING，进入 APPROVED 置 APPROVED
/// （NOT_REQUIRED 由仓储层保持不变）
pub(crate) fn approval_effect(to: WorkOrderStatus) -> Option<ApprovalStatus> {
    match to {
        WorkOrderStatus::Completed => Some(ApprovalStatus::Pending),
        WorkOrderStatus::Approved => Some(ApprovalStatus::Approved),
        _ => None,
    }
}

/// 验收门禁：返回每个工单未满足的条件（无阻塞的工单不出现在结果中）
pub(crate) fn approval_blockers_tx(
    conn: &Connection,
    tenant_id: &str,
    work_order_ids: &[String],
) -> WorkOrderResult<HashMap<String, Vec<String>>> {
    let mut blockers: HashMap<String, Vec<String>> = HashMap::new();

    for line in BomLineRepository::list_by_work_orders_tx(conn, tenant_id, work_order_ids)? {
        if !line.is_resolved() {
            blockers.entry(line.work_order_id.clone()).or_default().push(format!(
                "BOM行 {} ({}) 未结清: 已用 {}/计划 {}",
                line.line_id, line.part_id, line.qty_used, line.qty_planned
            ));
        }
    }

    for deliverable in PhaseRepository::list_deliverables_tx(conn, tenant_id, work_order_ids)? {
        if deliverable.status != DeliverableStatus::Approved {
            blockers
                .entry(deliverable.work_order_id.clone())
                .or_default()
                .push(format!("交付物 {} 未验收 ({})", deliverable.name, deliverable.status));
        }
    }

    Ok(blockers)
}

// ==========================================
// WorkOrderLifecycle - 生命周期引擎
// ==========================================
pub struct WorkOrderLifecycle {
    conn: Arc<Mutex<Connection>>,
    audit: AuditSink,
}

impl WorkOrderLifecycle {
    pub fn new(conn: Arc<Mutex<Connection>>, audit: AuditSink) -> Self {
        Self { conn, audit }
    }

    fn get_conn(&self) -> WorkOrderResult<std::sync::MutexGuard<'_, Connection>> {
        Ok(self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?)
    }

    /// 新建工单（DRAFT）
    pub fn create(&self, ctx: &OperationContext, work_order: &WorkOrder) -> WorkOrderResult<()> {
        ctx.check("开始")?;
        if work_order.status != WorkOrderStatus::Draft || work_order.rework_count != 0 {
            return Err(WorkOrderError::ValidationError(
                "新建工单必须为 DRAFT 且返工次数为0".to_string(),
            ));
        }
        {
            let conn = self.get_conn()?;
            WorkOrderRepository::insert_tx(&conn, work_order)?;
        }

        info!(work_order_id = %work_order.work_order_id, "工单已创建");
        self.audit.record_create(
            &AuditMeta::new(&work_order.tenant_id, ctx.actor()),
            "work_order",
            &work_order.work_order_id,
            &work_order.snapshot(),
        );
        Ok(())
    }

    /// 单工单正向迁移（CAS 写入）
    #[instrument(skip(self, ctx, scope), fields(actor = ctx.actor()))]
    pub fn transition_status(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_id: &str,
        to: WorkOrderStatus,
    ) -> WorkOrderResult<WorkOrder> {
        ctx.check("开始")?;
        let now = chrono::Local::now().naive_local();

        let (before, after) = {
            let conn = self.get_conn()?;
            let tx = conn.unchecked_transaction()?;

            let before = WorkOrderRepository::find_by_id_tx(&tx, scope, work_order_id)?
                .ok_or_else(|| WorkOrderError::not_found("WorkOrder", work_order_id))?;

            if !can_transition(before.status, to) {
                debug!(from = %before.status, to = %to, "非法状态迁移");
                return Err(WorkOrderError::InvalidTransition {
                    from: before.status,
                    to,
                });
            }

            if to == WorkOrderStatus::Approved {
                let mut blockers =
                    approval_blockers_tx(&tx, &before.tenant_id, &[before.work_order_id.clone()])?;
                if let Some(reasons) = blockers.remove(&before.work_order_id) {
                    return Err(WorkOrderError::ApprovalBlocked {
                        work_order_id: before.work_order_id.clone(),
                        reasons,
                    });
                }
            }

            let rows = WorkOrderRepository::compare_and_set_status_tx(
                &tx,
                scope,
                work_order_id,
                before.status,
                to,
                approval_effect(to),
                ctx.actor(),
                now,
            )?;
            if rows == 0 {
                return Err(WorkOrderError::ConcurrentModification {
                    work_order_id: work_order_id.to_string(),
                    expected: before.status,
                });
            }

            let after = WorkOrderRepository::find_by_id_tx(&tx, scope, work_order_id)?
                .ok_or_else(|| WorkOrderError::not_found("WorkOrder", work_order_id))?;

            ctx.check("提交前")?;
            tx.commit()?;
            (before, after)
        };

        info!(
            work_order_id,
            from = %before.status,
            to = %after.status,
            approval_status = %after.approval_status,
            "工单状态已迁移"
        );
        let detail = format!("{} -> {}", before.status, after.status);
        self.audit.record_update(
            &AuditMeta::new(&after.tenant_id, ctx.actor()).with_detail(&detail),
            "work_order",
            work_order_id,
            &before.snapshot(),
            &after.snapshot(),
        );
        Ok(after)
    }

    /// 阶段关闭：阶段下全部工单须 COMPLETED/APPROVED、验收已通过或无需验收、交付物全部验收
    #[instrument(skip(self, ctx), fields(actor = ctx.actor()))]
    pub fn promote_phase_to_done(
        &self,
        ctx: &OperationContext,
        tenant_id: &str,
        phase_id: &str,
    ) -> WorkOrderResult<ProjectPhase> {
        ctx.check("开始")?;
        let now = chrono::Local::now().naive_local();

        let (before, after) = {
            let conn = self.get_conn()?;
            let tx = conn.unchecked_transaction()?;

            let before = PhaseRepository::find_phase_tx(&tx, tenant_id, phase_id)?
                .ok_or_else(|| WorkOrderError::not_found("ProjectPhase", phase_id))?;
            if before.status == PhaseStatus::Done {
                return Ok(before);
            }

            let work_orders = WorkOrderRepository::list_by_phase_tx(&tx, tenant_id, phase_id)?;
            let violations = Self::phase_gate_violations(&tx, tenant_id, &work_orders)?;
            if !violations.is_empty() {
                debug!(phase_id, blocked = violations.len(), "阶段关闭被阻塞");
                return Err(WorkOrderError::PhaseBlocked {
                    phase_id: phase_id.to_string(),
                    violations,
                });
            }

            PhaseRepository::mark_phase_done_tx(&tx, tenant_id, phase_id, ctx.actor(), now)?;
            let after = PhaseRepository::find_phase_tx(&tx, tenant_id, phase_id)?
                .ok_or_else(|| WorkOrderError::not_found("ProjectPhase", phase_id))?;

            ctx.check("提交前")?;
            tx.commit()?;
            (before, after)
        };

        info!(phase_id, "项目阶段已关闭");
        self.audit.record_update(
            &AuditMeta::new(tenant_id, ctx.actor()),
            "project_phase",
            phase_id,
            &serde_json::to_value(&before).unwrap_or_default(),
            &serde_json::to_value(&after).unwrap_or_default(),
        );
        Ok(after)
    }

    fn phase_gate_violations(
        conn: &Connection,
        tenant_id: &str,
        work_orders: &[WorkOrder],
    ) -> WorkOrderResult<Vec<GateViolation>> {
        let ids: Vec<String> = work_orders.iter().map(|wo| wo.work_order_id.clone()).collect();
        let deliverables = PhaseRepository::list_deliverables_tx(conn, tenant_id, &ids)?;

        let mut violations = Vec::new();
        for wo in work_orders {
            let mut push = |reason: String| {
                violations.push(GateViolation {
                    work_order_id: wo.work_order_id.clone(),
                    reason,
                })
            };

            if !matches!(wo.status, WorkOrderStatus::Completed | WorkOrderStatus::Approved) {
                push(format!("工单状态为 {}", wo.status));
            }
            if !wo.approval_status.is_resolved() {
                push(format!("验收状态为 {}", wo.approval_status));
            }
            for d in deliverables
                .iter()
                .filter(|d| d.work_order_id == wo.work_order_id)
            {
                if d.status != DeliverableStatus::Approved {
                    push(format!("交付物 {} 未验收 ({})", d.name, d.status));
                }
            }
        }
        Ok(violations)
    }

    pub fn get(&self, scope: &TenantScope, work_order_id: &str) -> WorkOrderResult<WorkOrder> {
        let conn = self.get_conn()?;
        WorkOrderRepository::find_by_id_tx(&conn, scope, work_order_id)?
            .ok_or_else(|| WorkOrderError::not_found("WorkOrder", work_order_id))
    }
}
