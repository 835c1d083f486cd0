// ==========================================
// 学校设备维修工单 - 应用层
// ==========================================
// 职责: 装配 Repository / Engine / API
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
