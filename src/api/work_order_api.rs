// ==========================================
// 学校设备维修工单 - 工单 API
// ==========================================
// 职责: 对外暴露的工单/BOM/返工/批量操作入口（供 HTTP 处理器调用）
// 红线: API 层只做入参校验与错误转换，业务规则全部在 Engine 层
// ==========================================

use std::sync::Arc;

use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::bulk::{BulkOperationLog, BulkOperationResult};
use crate::domain::inventory::{AddBomLineRequest, BomLine, InventoryRecord, StockKey};
use crate::domain::phase::ProjectPhase;
use crate::domain::rework::{ReworkHistoryEntry, ReworkRequest};
use crate::domain::types::{ApprovalDecision, WorkOrderStatus};
use crate::domain::work_order::{NewWorkOrder, TenantScope, WorkOrder};
use crate::engine::{
    BomLineManager, BulkOperationCoordinator, InventoryLedger, OperationContext, ReworkEngine,
    WorkOrderLifecycle,
};
use crate::repository::WorkOrderRepository;

// ==========================================
// WorkOrderApi - 工单 API
// ==========================================

/// 工单API
///
/// 职责：
/// 1. 工单创建、查询、单工单状态迁移
/// 2. BOM行添加/消耗/释放（库存预留）
/// 3. 驳回返工与返工历史
/// 4. 批量状态/指派/验收
/// 5. 项目阶段关闭
pub struct WorkOrderApi {
    lifecycle: Arc<WorkOrderLifecycle>,
    bom_lines: Arc<BomLineManager>,
    rework: Arc<ReworkEngine>,
    bulk: Arc<BulkOperationCoordinator>,
    ledger: Arc<InventoryLedger>,
    work_order_repo: Arc<WorkOrderRepository>,
}

impl WorkOrderApi {
    pub fn new(
        lifecycle: Arc<WorkOrderLifecycle>,
        bom_lines: Arc<BomLineManager>,
        rework: Arc<ReworkEngine>,
        bulk: Arc<BulkOperationCoordinator>,
        ledger: Arc<InventoryLedger>,
        work_order_repo: Arc<WorkOrderRepository>,
    ) -> Self {
        Self {
            lifecycle,
            bom_lines,
            rework,
            bulk,
            ledger,
            work_order_repo,
        }
    }

    // ==========================================
    // 工单
    // ==========================================

    /// 新建工单（DRAFT）
    ///
    /// # 返回
    /// - Ok(WorkOrder): 新工单（ID 由系统生成）
    /// - Err(ApiError::InvalidInput): 租户或学校为空
    #[instrument(skip(self, ctx, req), fields(actor = ctx.actor()))]
    pub fn create_work_order(
        &self,
        ctx: &OperationContext,
        tenant_id: &str,
        req: NewWorkOrder,
    ) -> ApiResult<WorkOrder> {
        require_non_empty("租户ID", tenant_id)?;
        require_non_empty("学校ID", &req.school_id)?;

        let work_order = WorkOrder::draft(
            uuid::Uuid::new_v4().to_string(),
            tenant_id.to_string(),
            req,
            ctx.actor(),
        );
        self.lifecycle.create(ctx, &work_order)?;
        Ok(work_order)
    }

    pub fn get_work_order(&self, scope: &TenantScope, work_order_id: &str) -> ApiResult<WorkOrder> {
        require_non_empty("工单ID", work_order_id)?;
        Ok(self.lifecycle.get(scope, work_order_id)?)
    }

    pub fn list_work_orders_by_status(
        &self,
        scope: &TenantScope,
        status: WorkOrderStatus,
    ) -> ApiResult<Vec<WorkOrder>> {
        Ok(self.work_order_repo.list_by_status(scope, status)?)
    }

    /// 单工单正向迁移
    ///
    /// # 返回
    /// - Err(ApiError::InvalidStateTransition): 不在正向迁移表内
    /// - Err(ApiError::ApprovalBlocked): COMPLETED → APPROVED 时存在未结BOM行或未验收交付物
    /// - Err(ApiError::ConcurrentModification): 状态已被其他请求修改
    pub fn transition_status(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_id: &str,
        to: WorkOrderStatus,
    ) -> ApiResult<WorkOrder> {
        require_non_empty("工单ID", work_order_id)?;
        Ok(self.lifecycle.transition_status(ctx, scope, work_order_id, to)?)
    }

    // ==========================================
    // BOM 行
    // ==========================================

    /// 添加备件行（同一事务内预留库存）
    pub fn add_bom_line(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        req: &AddBomLineRequest,
    ) -> ApiResult<BomLine> {
        require_non_empty("工单ID", &req.work_order_id)?;
        require_non_empty("备件ID", &req.part_id)?;
        Ok(self.bom_lines.add_line(ctx, scope, req)?)
    }

    pub fn consume_bom_line(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        line_id: &str,
        qty: i64,
    ) -> ApiResult<BomLine> {
        require_non_empty("BOM行ID", line_id)?;
        Ok(self.bom_lines.consume(ctx, scope, line_id, qty)?)
    }

    pub fn release_bom_line(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        line_id: &str,
        qty: i64,
    ) -> ApiResult<BomLine> {
        require_non_empty("BOM行ID", line_id)?;
        Ok(self.bom_lines.release(ctx, scope, line_id, qty)?)
    }

    pub fn list_bom_lines(&self, scope: &TenantScope, work_order_id: &str) -> ApiResult<Vec<BomLine>> {
        require_non_empty("工单ID", work_order_id)?;
        Ok(self.bom_lines.list_lines(scope, work_order_id)?)
    }

    /// 查询库存
    pub fn get_inventory(
        &self,
        tenant_id: &str,
        service_location_id: &str,
        part_id: &str,
    ) -> ApiResult<InventoryRecord> {
        require_non_empty("维修点ID", service_location_id)?;
        require_non_empty("备件ID", part_id)?;

        let key = StockKey {
            tenant_id,
            service_location_id,
            part_id,
        };
        self.ledger.get(key)?.ok_or_else(|| {
            ApiError::NotFound(format!(
                "库存(location={}, part={})不存在",
                service_location_id, part_id
            ))
        })
    }

    // ==========================================
    // 返工
    // ==========================================

    /// 驳回返工
    ///
    /// # 返回
    /// - Ok((WorkOrder, ReworkHistoryEntry)): 回退后的工单与新增历史
    /// - Err(ApiError::ReworkLimitExceeded): 已达返工上限
    pub fn reject_for_rework(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_id: &str,
        req: &ReworkRequest,
    ) -> ApiResult<(WorkOrder, ReworkHistoryEntry)> {
        require_non_empty("工单ID", work_order_id)?;
        Ok(self.rework.reject_for_rework(ctx, scope, work_order_id, req)?)
    }

    /// 返工历史（按序号升序）
    pub fn list_rework_history(
        &self,
        scope: &TenantScope,
        work_order_id: &str,
    ) -> ApiResult<Vec<ReworkHistoryEntry>> {
        require_non_empty("工单ID", work_order_id)?;
        Ok(self.rework.list_history(scope, work_order_id)?)
    }

    // ==========================================
    // 批量操作
    // ==========================================

    pub fn bulk_update_status(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_ids: &[String],
        target_status: WorkOrderStatus,
    ) -> ApiResult<BulkOperationResult> {
        Ok(self
            .bulk
            .bulk_update_status(ctx, scope, work_order_ids, target_status)?)
    }

    pub fn bulk_update_assignment(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_ids: &[String],
        assignee_id: &str,
    ) -> ApiResult<BulkOperationResult> {
        Ok(self
            .bulk
            .bulk_update_assignment(ctx, scope, work_order_ids, assignee_id)?)
    }

    pub fn bulk_update_approval(
        &self,
        ctx: &OperationContext,
        scope: &TenantScope,
        work_order_ids: &[String],
        decision: ApprovalDecision,
        comment: Option<String>,
    ) -> ApiResult<BulkOperationResult> {
        Ok(self
            .bulk
            .bulk_update_approval(ctx, scope, work_order_ids, decision, comment)?)
    }

    pub fn get_bulk_operation_log(&self, operation_id: &str) -> ApiResult<BulkOperationLog> {
        require_non_empty("批量操作ID", operation_id)?;
        Ok(self.bulk.get_log(operation_id)?)
    }

    // ==========================================
    // 项目阶段
    // ==========================================

    /// 关闭项目阶段
    ///
    /// # 返回
    /// - Err(ApiError::PhaseBlocked): 携带每个阻塞工单的原因
    pub fn promote_phase_to_done(
        &self,
        ctx: &OperationContext,
        tenant_id: &str,
        phase_id: &str,
    ) -> ApiResult<ProjectPhase> {
        require_non_empty("租户ID", tenant_id)?;
        require_non_empty("阶段ID", phase_id)?;
        Ok(self.lifecycle.promote_phase_to_done(ctx, tenant_id, phase_id)?)
    }
}

fn require_non_empty(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("{}不能为空", field)));
    }
    Ok(())
}
