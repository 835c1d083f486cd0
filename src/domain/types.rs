// ==========================================
// 学校设备维修工单 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 数据库中出现了无法识别的枚举值
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的{kind}取值: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// ==========================================
// 工单状态 (Work Order Status)
// ==========================================
// 全序: Draft < Assigned < InRepair < QA < Completed < Approved
// 终态: Approved
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkOrderStatus {
    Draft,     // 草稿
    Assigned,  // 已派工
    InRepair,  // 维修中
    Qa,        // 质检
    Completed, // 已完工
    Approved,  // 已验收（终态）
}

impl WorkOrderStatus {
    pub const ALL: [WorkOrderStatus; 6] = [
        WorkOrderStatus::Draft,
        WorkOrderStatus::Assigned,
        WorkOrderStatus::InRepair,
        WorkOrderStatus::Qa,
        WorkOrderStatus::Completed,
        WorkOrderStatus::Approved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Draft => "DRAFT",
            WorkOrderStatus::Assigned => "ASSIGNED",
            WorkOrderStatus::InRepair => "IN_REPAIR",
            WorkOrderStatus::Qa => "QA",
            WorkOrderStatus::Completed => "COMPLETED",
            WorkOrderStatus::Approved => "APPROVED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkOrderStatus::Approved)
    }
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkOrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Ok(WorkOrderStatus::Draft),
            "ASSIGNED" => Ok(WorkOrderStatus::Assigned),
            "IN_REPAIR" => Ok(WorkOrderStatus::InRepair),
            "QA" => Ok(WorkOrderStatus::Qa),
            "COMPLETED" => Ok(WorkOrderStatus::Completed),
            "APPROVED" => Ok(WorkOrderStatus::Approved),
            _ => Err(UnknownVariant::new("工单状态", s)),
        }
    }
}

// ==========================================
// 验收状态 (Approval Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    NotRequired,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "PENDING",
            ApprovalStatus::Approved => "APPROVED",
            ApprovalStatus::Rejected => "REJECTED",
            ApprovalStatus::NotRequired => "NOT_REQUIRED",
        }
    }

    /// 阶段关闭门禁接受的验收状态
    pub fn is_resolved(&self) -> bool {
        matches!(self, ApprovalStatus::Approved | ApprovalStatus::NotRequired)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(ApprovalStatus::Pending),
            "APPROVED" => Ok(ApprovalStatus::Approved),
            "REJECTED" => Ok(ApprovalStatus::Rejected),
            "NOT_REQUIRED" => Ok(ApprovalStatus::NotRequired),
            _ => Err(UnknownVariant::new("验收状态", s)),
        }
    }
}

// ==========================================
// 返工类别 (Rework Category)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReworkCategory {
    Defect,        // 维修缺陷
    Incomplete,    // 未完成
    IncorrectPart, // 备件错误
    Other,         // 其他
}

impl ReworkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReworkCategory::Defect => "DEFECT",
            ReworkCategory::Incomplete => "INCOMPLETE",
            ReworkCategory::IncorrectPart => "INCORRECT_PART",
            ReworkCategory::Other => "OTHER",
        }
    }
}

impl fmt::Display for ReworkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReworkCategory {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "DEFECT" => Ok(ReworkCategory::Defect),
            "INCOMPLETE" => Ok(ReworkCategory::Incomplete),
            "INCORRECT_PART" => Ok(ReworkCategory::IncorrectPart),
            "OTHER" => Ok(ReworkCategory::Other),
            _ => Err(UnknownVariant::new("返工类别", s)),
        }
    }
}

// ==========================================
// 批量操作类型 (Bulk Operation Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkOperationType {
    StatusUpdate,
    Assignment,
    Approval,
}

impl BulkOperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperationType::StatusUpdate => "STATUS_UPDATE",
            BulkOperationType::Assignment => "ASSIGNMENT",
            BulkOperationType::Approval => "APPROVAL",
        }
    }
}

impl fmt::Display for BulkOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkOperationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STATUS_UPDATE" => Ok(BulkOperationType::StatusUpdate),
            "ASSIGNMENT" => Ok(BulkOperationType::Assignment),
            "APPROVAL" => Ok(BulkOperationType::Approval),
            _ => Err(UnknownVariant::new("批量操作类型", s)),
        }
    }
}

// ==========================================
// 批量操作日志状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkOperationStatus {
    Running,
    Completed,
    Failed,
}

impl BulkOperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperationStatus::Running => "RUNNING",
            BulkOperationStatus::Completed => "COMPLETED",
            BulkOperationStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for BulkOperationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RUNNING" => Ok(BulkOperationStatus::Running),
            "COMPLETED" => Ok(BulkOperationStatus::Completed),
            "FAILED" => Ok(BulkOperationStatus::Failed),
            _ => Err(UnknownVariant::new("批量操作状态", s)),
        }
    }
}

// ==========================================
// 验收决定 (Approval Decision)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalDecision::Approve => "APPROVE",
            ApprovalDecision::Reject => "REJECT",
        }
    }
}

// ==========================================
// 交付物状态 / 阶段状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliverableStatus {
    Pending,
    Approved,
    Rejected,
}

impl DeliverableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliverableStatus::Pending => "PENDING",
            DeliverableStatus::Approved => "APPROVED",
            DeliverableStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for DeliverableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliverableStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(DeliverableStatus::Pending),
            "APPROVED" => Ok(DeliverableStatus::Approved),
            "REJECTED" => Ok(DeliverableStatus::Rejected),
            _ => Err(UnknownVariant::new("交付物状态", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Open,
    Done,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Open => "OPEN",
            PhaseStatus::Done => "DONE",
        }
    }
}

impl FromStr for PhaseStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Ok(PhaseStatus::Open),
            "DONE" => Ok(PhaseStatus::Done),
            _ => Err(UnknownVariant::new("阶段状态", s)),
        }
    }
}
