// ==========================================
// 学校设备维修工单 - 核心库
// ==========================================
// 范围: 工单生命周期 + 备件库存预留 + 返工 + 批量操作
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 工单策略
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 对外操作
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ApprovalStatus, ReworkCategory, WorkOrderStatus};

// 领域实体
pub use domain::{
    BomLine, BulkOperationLog, BulkOperationResult, InventoryRecord, ReworkHistoryEntry,
    TenantScope, WorkOrder,
};

// 引擎
pub use engine::{
    BomLineManager, BulkOperationCoordinator, InventoryLedger, OperationContext, ReworkEngine,
    WorkOrderLifecycle,
};

// API
pub use api::{ApiError, ApiResult, WorkOrderApi};

// 配置
pub use config::WorkOrderPolicy;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "学校设备维修工单";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
