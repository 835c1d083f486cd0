// ==========================================
// 学校设备维修工单 - 库存与BOM行领域模型
// ==========================================
// 不变量:
// - 库存: 0 ≤ qty_reserved ≤ qty_available（在预留点强制）
// - BOM行: 0 ≤ qty_used ≤ qty_planned（任何时刻）
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// InventoryRecord - 库存记录 (tenant, location, part)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub tenant_id: String,
    pub service_location_id: String,
    pub part_id: String,
    pub qty_available: i64, // 实物库存
    pub qty_reserved: i64,  // 已为未关闭BOM行预留
    pub updated_at: NaiveDateTime,
}

impl InventoryRecord {
    /// 可用于新预留的数量
    pub fn qty_free(&self) -> i64 {
        self.qty_available - self.qty_reserved
    }
}

/// 库存定位键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockKey<'a> {
    pub tenant_id: &'a str,
    pub service_location_id: &'a str,
    pub part_id: &'a str,
}

// ==========================================
// BomLine - 工单备件行 (work_order_part)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    pub line_id: String,
    pub tenant_id: String,
    pub service_location_id: String,
    pub work_order_id: String,
    pub part_id: String,
    pub qty_planned: i64,
    pub qty_used: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub updated_by: Option<String>,
}

impl BomLine {
    pub fn stock_key(&self) -> StockKey<'_> {
        StockKey {
            tenant_id: &self.tenant_id,
            service_location_id: &self.service_location_id,
            part_id: &self.part_id,
        }
    }

    /// 仍处于预留状态（已计划未消耗）的数量
    pub fn qty_open(&self) -> i64 {
        self.qty_planned - self.qty_used
    }

    /// 计划量已全部消耗或释放
    pub fn is_resolved(&self) -> bool {
        self.qty_open() == 0
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// 添加BOM行请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBomLineRequest {
    pub work_order_id: String,
    pub part_id: String,
    pub qty_planned: i64,
    /// 显式放行不兼容备件（仅在兼容性校验开启时有意义）
    #[serde(default)]
    pub override_compatibility: bool,
}
