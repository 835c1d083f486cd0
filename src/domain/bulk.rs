// ==========================================
// 学校设备维修工单 - 批量操作领域模型
// ==========================================
// BulkOperationLog 仅用于观测/回放，不参与控制流
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::{
    ApprovalDecision, BulkOperationStatus, BulkOperationType, WorkOrderStatus,
};

// ==========================================
// BulkPayload - 各批量操作的负载
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkPayload {
    StatusUpdate {
        target_status: WorkOrderStatus,
    },
    Assignment {
        assignee_id: String,
    },
    Approval {
        decision: ApprovalDecision,
        comment: Option<String>,
    },
}

impl BulkPayload {
    pub fn operation_type(&self) -> BulkOperationType {
        match self {
            BulkPayload::StatusUpdate { .. } => BulkOperationType::StatusUpdate,
            BulkPayload::Assignment { .. } => BulkOperationType::Assignment,
            BulkPayload::Approval { .. } => BulkOperationType::Approval,
        }
    }
}

// ==========================================
// 单个工单失败原因
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkFailureCode {
    NotFound,
    InvalidTransition,
    ApprovalBlocked,
    StorageFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemFailure {
    pub work_order_id: String,
    pub code: BulkFailureCode,
    pub message: String,
}

// ==========================================
// BulkOperationResult - 返回给调用方的逐ID结果
// ==========================================
/// 调用方不可假设整批全成功/全失败；只有“通过校验的子集”在同一条语句内原子写入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperationResult {
    pub operation_id: String,
    pub operation_type: BulkOperationType,
    pub total_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkItemFailure>,
}

impl BulkOperationResult {
    pub fn failure_for(&self, work_order_id: &str) -> Option<&BulkItemFailure> {
        self.failed.iter().find(|f| f.work_order_id == work_order_id)
    }
}

// ==========================================
// BulkOperationLog - bulk_operation_log 表
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOperationLog {
    pub operation_id: String,
    pub tenant_id: String,
    pub operation_type: BulkOperationType,
    pub actor: String,
    pub payload_json: Option<serde_json::Value>,
    pub requested_ids: Vec<String>,
    pub succeeded_ids: Vec<String>,
    pub failed_items: Vec<BulkItemFailure>,
    pub total_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub status: BulkOperationStatus,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
}
