// ==========================================
// 学校设备维修工单 - 配置层
// ==========================================
// 职责: 从 config_kv 加载工单策略，构造时注入引擎
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod work_order_policy;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use work_order_policy::{ReworkEdges, WorkOrderPolicy};
