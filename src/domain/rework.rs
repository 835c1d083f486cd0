// ==========================================
// 学校设备维修工单 - 返工历史领域模型
// ==========================================
// 红线: 只追加，不更新，不删除
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::{ReworkCategory, WorkOrderStatus};

/// 一次返工（逆向状态迁移）的不可变记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReworkHistoryEntry {
    pub history_id: String,
    pub tenant_id: String,
    pub work_order_id: String,
    pub from_status: WorkOrderStatus,
    pub to_status: WorkOrderStatus,
    pub reason: Option<String>,
    pub category: ReworkCategory,
    pub actor: String,
    pub rework_sequence: i64, // 每工单从1开始单调递增
    pub created_at: NaiveDateTime,
}

/// 返工请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReworkRequest {
    pub to_status: WorkOrderStatus,
    pub reason: Option<String>,
    pub category: ReworkCategory,
}

impl ReworkRequest {
    /// 去除首尾空白后的原因；空串视为未填写
    pub fn normalized_reason(&self) -> Option<String> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
    }
}
