// ==========================================
// 学校设备维修工单 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: *_tx 关联函数接收调用方持有的事务连接
// ==========================================

pub mod action_log_repo;
pub mod bom_line_repo;
pub mod bulk_operation_log_repo;
pub mod error;
pub mod inventory_repo;
pub mod part_compatibility_repo;
pub mod phase_repo;
pub mod rework_history_repo;
pub mod work_order_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use bom_line_repo::BomLineRepository;
pub use bulk_operation_log_repo::BulkOperationLogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use inventory_repo::InventoryRepository;
pub use part_compatibility_repo::PartCompatibilityRepository;
pub use phase_repo::PhaseRepository;
pub use rework_history_repo::ReworkHistoryRepository;
pub use work_order_repo::WorkOrderRepository;
