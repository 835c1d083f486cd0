// ==========================================
// 学校设备维修工单 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod bulk;
pub mod inventory;
pub mod phase;
pub mod rework;
pub mod types;
pub mod work_order;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use bulk::{
    BulkFailureCode, BulkItemFailure, BulkOperationLog, BulkOperationResult, BulkPayload,
};
pub use inventory::{AddBomLineRequest, BomLine, InventoryRecord, StockKey};
pub use phase::{Deliverable, GateViolation, ProjectPhase};
pub use rework::{ReworkHistoryEntry, ReworkRequest};
pub use types::{
    ApprovalDecision, ApprovalStatus, BulkOperationStatus, BulkOperationType, DeliverableStatus,
    PhaseStatus, ReworkCategory, UnknownVariant, WorkOrderStatus,
};
pub use work_order::{NewWorkOrder, TenantScope, WorkOrder};
