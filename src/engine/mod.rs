// ==========================================
// 学校设备维修工单 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 行级读写全部经由 Repository 的 *_tx 函数
// 红线: 审计仅在事务提交后写入，失败不影响主操作
// ==========================================

pub mod audit;
pub mod bom_line_manager;
pub mod bulk;
pub mod compatibility;
pub mod context;
pub mod error;
pub mod inventory_ledger;
pub mod lifecycle;
pub mod rework;

// 重导出核心引擎
pub use audit::{ActionLogAuditLogger, AuditLogger, AuditMeta, AuditSink, NoOpAuditLogger};
pub use bom_line_manager::BomLineManager;
pub use bulk::BulkOperationCoordinator;
pub use compatibility::{PartCompatibility, SqlitePartCompatibility};
pub use context::OperationContext;
pub use error::{WorkOrderError, WorkOrderResult};
pub use inventory_ledger::InventoryLedger;
pub use lifecycle::{can_transition, TransitionTable, WorkOrderLifecycle};
pub use rework::ReworkEngine;
