// ==========================================
// 学校设备维修工单 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将引擎/仓储错误转换为用户友好的错误消息
// 约定: 错误信息必须包含显式原因与涉及的ID
// ==========================================

use crate::domain::phase::GateViolation;
use crate::engine::error::WorkOrderError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 库存 / BOM 错误
    // ==========================================
    #[error("库存不足: {0}")]
    InsufficientStock(String),

    #[error("预留冲突: {0}")]
    ReservationConflict(String),

    #[error("超量消耗: {0}")]
    OverConsumption(String),

    #[error("释放超量: {0}")]
    ReleaseExceedsAvailable(String),

    #[error("备件不兼容: {0}")]
    IncompatiblePart(String),

    // ==========================================
    // 返工 / 门禁错误
    // ==========================================
    #[error("返工次数超限: {0}")]
    ReworkLimitExceeded(String),

    #[error("验收被阻塞: {0}")]
    ApprovalBlocked(String),

    /// 阶段关闭被阻塞（带逐个工单原因）
    #[error("阶段关闭被阻塞: {reason}")]
    PhaseBlocked {
        reason: String,
        violations: Vec<GateViolation>,
    },

    #[error("批量请求过大: {size} > {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("并发修改冲突: {0}")]
    ConcurrentModification(String),

    #[error("操作已取消: {0}")]
    Cancelled(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 稳定的错误码（供 HTTP 层映射）
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) | ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidStateTransition { .. } => "INVALID_TRANSITION",
            ApiError::BusinessRuleViolation(_) => "BUSINESS_RULE_VIOLATION",
            ApiError::InsufficientStock(_) => "INSUFFICIENT_STOCK",
            ApiError::ReservationConflict(_) => "RESERVATION_CONFLICT",
            ApiError::OverConsumption(_) => "OVER_CONSUMPTION",
            ApiError::ReleaseExceedsAvailable(_) => "RELEASE_EXCEEDS_AVAILABLE",
            ApiError::IncompatiblePart(_) => "INCOMPATIBLE_PART",
            ApiError::ReworkLimitExceeded(_) => "REWORK_LIMIT_EXCEEDED",
            ApiError::ApprovalBlocked(_) => "APPROVAL_BLOCKED",
            ApiError::PhaseBlocked { .. } => "PHASE_BLOCKED",
            ApiError::BatchTooLarge { .. } => "BATCH_TOO_LARGE",
            ApiError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            ApiError::Cancelled(_) => "CANCELLED",
            ApiError::DatabaseError(_)
            | ApiError::DatabaseConnectionError(_)
            | ApiError::DatabaseTransactionError(_) => "STORAGE_FAILURE",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将Repository层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CheckConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("CHECK约束违反: {}", msg))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::SerializationError(e) => ApiError::InternalError(e.to_string()),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 WorkOrderError 转换
// ==========================================
impl From<WorkOrderError> for ApiError {
    fn from(err: WorkOrderError) -> Self {
        let msg = err.to_string();
        match err {
            WorkOrderError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            WorkOrderError::InvalidTransition { from, to } => ApiError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            WorkOrderError::ConcurrentModification { .. } => ApiError::ConcurrentModification(msg),
            WorkOrderError::InsufficientStock { .. } => ApiError::InsufficientStock(msg),
            WorkOrderError::ReservationConflict(_) => ApiError::ReservationConflict(msg),
            WorkOrderError::OverConsumption { .. } => ApiError::OverConsumption(msg),
            WorkOrderError::ReleaseExceedsAvailable { .. } => {
                ApiError::ReleaseExceedsAvailable(msg)
            }
            WorkOrderError::IncompatiblePart { .. } => ApiError::IncompatiblePart(msg),
            WorkOrderError::ReworkLimitExceeded { .. } => ApiError::ReworkLimitExceeded(msg),
            WorkOrderError::PhaseBlocked { violations, .. } => ApiError::PhaseBlocked {
                reason: msg,
                violations,
            },
            WorkOrderError::ApprovalBlocked { .. } => ApiError::ApprovalBlocked(msg),
            WorkOrderError::BatchTooLarge { size, max } => ApiError::BatchTooLarge { size, max },
            WorkOrderError::ValidationError(m) => ApiError::ValidationError(m),
            WorkOrderError::Cancelled(m) => ApiError::Cancelled(m),
            WorkOrderError::Repository(e) => ApiError::from(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::WorkOrderStatus;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "WorkOrder".to_string(),
            id: "WO001".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("WorkOrder"));
                assert!(msg.contains("WO001"));
            }
            _ => panic!("Expected NotFound"),
        }

        let api_err: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert_eq!(api_err.code(), "STORAGE_FAILURE");
    }

    #[test]
    fn test_work_order_error_conversion() {
        let api_err: ApiError = WorkOrderError::InvalidTransition {
            from: WorkOrderStatus::Draft,
            to: WorkOrderStatus::Completed,
        }
        .into();
        match &api_err {
            ApiError::InvalidStateTransition { from, to } => {
                assert_eq!(from, "DRAFT");
                assert_eq!(to, "COMPLETED");
            }
            _ => panic!("Expected InvalidStateTransition"),
        }
        assert_eq!(api_err.code(), "INVALID_TRANSITION");

        let api_err: ApiError = WorkOrderError::InsufficientStock {
            service_location_id: "LOC1".to_string(),
            part_id: "SCREEN-11".to_string(),
            requested: 2,
            free: 1,
        }
        .into();
        assert!(api_err.to_string().contains("SCREEN-11"));
        assert_eq!(api_err.code(), "INSUFFICIENT_STOCK");
    }

    #[test]
    fn test_phase_blocked_keeps_violations() {
        let api_err: ApiError = WorkOrderError::PhaseBlocked {
            phase_id: "P1".to_string(),
            violations: vec![GateViolation {
                work_order_id: "WO7".to_string(),
                reason: "工单状态为 QA".to_string(),
            }],
        }
        .into();
        match api_err {
            ApiError::PhaseBlocked { reason, violations } => {
                assert!(reason.contains("P1"));
                assert_eq!(violations[0].work_order_id, "WO7");
            }
            _ => panic!("Expected PhaseBlocked"),
        }
    }

    #[test]
    fn test_nested_repository_error_is_unwrapped() {
        let err = WorkOrderError::Repository(RepositoryError::UniqueConstraintViolation(
            "work_order.work_order_id".to_string(),
        ));
        let api_err: ApiError = err.into();
        assert!(matches!(api_err, ApiError::BusinessRuleViolation(_)));
    }
}
