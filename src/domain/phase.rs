// ==========================================
// 学校设备维修工单 - 项目阶段与交付物
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::types::{DeliverableStatus, PhaseStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPhase {
    pub phase_id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub name: String,
    pub status: PhaseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    pub deliverable_id: String,
    pub tenant_id: String,
    pub work_order_id: String,
    pub name: String,
    pub status: DeliverableStatus,
}

/// 门禁违规详情（阶段关闭 / 终态验收）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateViolation {
    pub work_order_id: String,
    pub reason: String,
}

impl std::fmt::Display for GateViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.work_order_id, self.reason)
    }
}
