// ==========================================
// 学校设备维修工单 - 审计日志数据仓储
// ==========================================
// 对齐: action_log 表
// 红线: 只追加；写入失败不得阻断主业务（由调用方吞掉并告警）
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use self::core::ActionLogRepository;
