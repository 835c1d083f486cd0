// ==========================================
// 学校设备维修工单 - 操作上下文
// ==========================================
// 职责: 携带操作人与可选截止时间
// 约定: 引擎在开始前与提交前各检查一次；过期则返回 Cancelled，未提交事务随 drop 回滚
// ==========================================

use std::time::{Duration, Instant};

use crate::engine::error::{WorkOrderError, WorkOrderResult};

#[derive(Debug, Clone)]
pub struct OperationContext {
    actor: String,
    deadline: Option<Instant>,
}

impl OperationContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// 截止时间已过则返回 Cancelled
    pub fn check(&self, stage: &str) -> WorkOrderResult<()> {
        if self.is_expired() {
            tracing::debug!(actor = %self.actor, stage, "操作截止时间已过，取消");
            return Err(WorkOrderError::Cancelled(format!("截止时间已过 ({})", stage)));
        }
        Ok(())
    }
}
