// ==========================================
// 学校设备维修工单 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 所有业务拒绝均以类型化错误返回，事务随错误回滚
// ==========================================

use thiserror::Error;

use crate::domain::phase::GateViolation;
use crate::domain::types::WorkOrderStatus;
use crate::repository::error::RepositoryError;

/// 工单引擎错误类型
#[derive(Error, Debug)]
pub enum WorkOrderError {
    // ===== 实体/状态 =====
    #[error("记录不存在: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("非法状态迁移: {from} -> {to}")]
    InvalidTransition {
        from: WorkOrderStatus,
        to: WorkOrderStatus,
    },

    #[error("工单 {work_order_id} 已被并发修改（期望状态 {expected}）")]
    ConcurrentModification {
        work_order_id: String,
        expected: WorkOrderStatus,
    },

    // ===== 库存 / BOM =====
    #[error("库存不足: location={service_location_id}, part={part_id}, 需要={requested}, 可用={free}")]
    InsufficientStock {
        service_location_id: String,
        part_id: String,
        requested: i64,
        free: i64,
    },

    #[error("预留失败: {0}")]
    ReservationConflict(String),

    #[error("超量消耗: line={line_id}, 本次={requested}, 剩余计划量={remaining}")]
    OverConsumption {
        line_id: String,
        requested: i64,
        remaining: i64,
    },

    #[error("释放量超过未消耗量: line={line_id}, 本次={requested}, 可释放={releasable}")]
    ReleaseExceedsAvailable {
        line_id: String,
        requested: i64,
        releasable: i64,
    },

    #[error("备件 {part_id} 与设备型号 {device_model} 不兼容")]
    IncompatiblePart {
        part_id: String,
        device_model: String,
    },

    // ===== 返工 / 门禁 =====
    #[error("工单 {work_order_id} 返工次数已达上限 {max_rework_count}")]
    ReworkLimitExceeded {
        work_order_id: String,
        max_rework_count: i64,
    },

    #[error("阶段 {phase_id} 无法关闭: {}", join_violations(.violations))]
    PhaseBlocked {
        phase_id: String,
        violations: Vec<GateViolation>,
    },

    #[error("工单 {work_order_id} 无法验收: {}", .reasons.join("; "))]
    ApprovalBlocked {
        work_order_id: String,
        reasons: Vec<String>,
    },

    // ===== 批量 / 输入 =====
    #[error("批量请求过大: {size} > {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("参数校验失败: {0}")]
    ValidationError(String),

    #[error("操作已取消: {0}")]
    Cancelled(String),

    // ===== 存储 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn join_violations(violations: &[GateViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<rusqlite::Error> for WorkOrderError {
    fn from(err: rusqlite::Error) -> Self {
        WorkOrderError::Repository(RepositoryError::from(err))
    }
}

impl WorkOrderError {
    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        WorkOrderError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

/// 引擎层 Result 类型别名
pub type WorkOrderResult<T> = Result<T, WorkOrderError>;
