// ==========================================
// 学校设备维修工单 - 工单领域模型
// ==========================================
// 红线: 工单永不物理删除（审计追踪要求）
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::{ApprovalStatus, WorkOrderStatus};

// ==========================================
// TenantScope - 租户/学校作用域
// ==========================================
/// 所有对外操作都在某个租户内执行；school_id 为 None 时表示租户级操作（不限学校）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantScope {
    pub tenant_id: String,
    pub school_id: Option<String>,
}

impl TenantScope {
    pub fn tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            school_id: None,
        }
    }

    pub fn school(tenant_id: impl Into<String>, school_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            school_id: Some(school_id.into()),
        }
    }

    /// 工单是否落在当前作用域内
    pub fn contains(&self, work_order: &WorkOrder) -> bool {
        work_order.tenant_id == self.tenant_id
            && self
                .school_id
                .as_ref()
                .map_or(true, |school| *school == work_order.school_id)
    }
}

// ==========================================
// WorkOrder - 维修工单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    // ===== 标识 =====
    pub work_order_id: String,
    pub tenant_id: String,
    pub school_id: String,

    // ===== 外键 =====
    pub incident_id: Option<String>,
    pub device_id: Option<String>,
    pub project_id: Option<String>,
    pub phase_id: Option<String>,
    pub service_location_id: Option<String>, // 库存作用域（维修点/仓库）
    pub device_model: Option<String>,        // 备件兼容性校验用

    // ===== 状态 =====
    pub status: WorkOrderStatus,
    pub approval_status: ApprovalStatus,
    pub rework_count: i64,
    pub assigned_to: Option<String>,

    // ===== 冗余展示字段（只读缓存，不承载不变量） =====
    pub device_serial: Option<String>,
    pub school_name: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,

    // ===== 审计字段 =====
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub updated_by: Option<String>,
}

/// 新建工单请求（由报修单或项目流程发起）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWorkOrder {
    pub school_id: String,
    pub incident_id: Option<String>,
    pub device_id: Option<String>,
    pub project_id: Option<String>,
    pub phase_id: Option<String>,
    pub service_location_id: Option<String>,
    pub device_model: Option<String>,
    pub approval_required: bool,
    pub device_serial: Option<String>,
    pub school_name: Option<String>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
}

impl WorkOrder {
    /// 以 Draft 状态构造新工单
    pub fn draft(work_order_id: String, tenant_id: String, req: NewWorkOrder, actor: &str) -> Self {
        let now = chrono::Local::now().naive_local();
        Self {
            work_order_id,
            tenant_id,
            school_id: req.school_id,
            incident_id: req.incident_id,
            device_id: req.device_id,
            project_id: req.project_id,
            phase_id: req.phase_id,
            service_location_id: req.service_location_id,
            device_model: req.device_model,
            status: WorkOrderStatus::Draft,
            approval_status: if req.approval_required {
                ApprovalStatus::Pending
            } else {
                ApprovalStatus::NotRequired
            },
            rework_count: 0,
            assigned_to: None,
            device_serial: req.device_serial,
            school_name: req.school_name,
            contact_name: req.contact_name,
            contact_email: req.contact_email,
            created_at: now,
            updated_at: now,
            updated_by: Some(actor.to_string()),
        }
    }

    /// 审计快照
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
