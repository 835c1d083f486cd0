// ==========================================
// 学校设备维修工单 - API 层
// ==========================================
// 职责: 对外操作入口，入参校验 + 错误转换
// ==========================================

pub mod error;
pub mod work_order_api;

pub use error::{ApiError, ApiResult};
pub use work_order_api::WorkOrderApi;
