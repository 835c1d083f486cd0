// ==========================================
// 学校设备维修工单 - 审计日志接口
// ==========================================
// 职责: 定义审计日志 trait，引擎只依赖 trait
// 约定: 审计仅在事务提交后写入；写入失败只记 warn，不影响主操作
// ==========================================

use serde_json::Value as JsonValue;
use std::error::Error;
use std::sync::Arc;

use crate::domain::action_log::{ActionLog, ActionType};
use crate::repository::ActionLogRepository;

/// 审计日志公共字段
#[derive(Debug, Clone, Copy)]
pub struct AuditMeta<'a> {
    pub tenant_id: &'a str,
    pub actor: &'a str,
    pub detail: Option<&'a str>,
}

impl<'a> AuditMeta<'a> {
    pub fn new(tenant_id: &'a str, actor: &'a str) -> Self {
        Self {
            tenant_id,
            actor,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: &'a str) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// 审计日志记录器 Trait
pub trait AuditLogger: Send + Sync {
    fn log_create(
        &self,
        meta: &AuditMeta<'_>,
        entity_type: &str,
        entity_id: &str,
        snapshot: &JsonValue,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    fn log_update(
        &self,
        meta: &AuditMeta<'_>,
        entity_type: &str,
        entity_id: &str,
        before: &JsonValue,
        after: &JsonValue,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

// ==========================================
// ActionLogAuditLogger - 写入 action_log 表
// ==========================================
pub struct ActionLogAuditLogger {
    repo: Arc<ActionLogRepository>,
}

impl ActionLogAuditLogger {
    pub fn new(repo: Arc<ActionLogRepository>) -> Self {
        Self { repo }
    }

    fn build(meta: &AuditMeta<'_>, entity_type: &str, entity_id: &str, action: ActionType) -> ActionLog {
        let log = ActionLog::new(entity_type, entity_id, action, meta.actor)
            .with_tenant(Some(meta.tenant_id.to_string()));
        match meta.detail {
            Some(detail) => log.with_detail(detail),
            None => log,
        }
    }
}

impl AuditLogger for ActionLogAuditLogger {
    fn log_create(
        &self,
        meta: &AuditMeta<'_>,
        entity_type: &str,
        entity_id: &str,
        snapshot: &JsonValue,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let log = Self::build(meta, entity_type, entity_id, ActionType::Create)
            .with_after(snapshot.clone());
        self.repo.insert(&log)?;
        Ok(())
    }

    fn log_update(
        &self,
        meta: &AuditMeta<'_>,
        entity_type: &str,
        entity_id: &str,
        before: &JsonValue,
        after: &JsonValue,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let log = Self::build(meta, entity_type, entity_id, ActionType::Update)
            .with_before(before.clone())
            .with_after(after.clone());
        self.repo.insert(&log)?;
        Ok(())
    }
}

/// 空操作审计记录器（单元测试/不需要审计的场景）
#[derive(Debug, Clone, Default)]
pub struct NoOpAuditLogger;

impl AuditLogger for NoOpAuditLogger {
    fn log_create(
        &self,
        _meta: &AuditMeta<'_>,
        entity_type: &str,
        entity_id: &str,
        _snapshot: &JsonValue,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(entity_type, entity_id, "NoOpAuditLogger: 跳过 CREATE 审计");
        Ok(())
    }

    fn log_update(
        &self,
        _meta: &AuditMeta<'_>,
        entity_type: &str,
        entity_id: &str,
        _before: &JsonValue,
        _after: &JsonValue,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(entity_type, entity_id, "NoOpAuditLogger: 跳过 UPDATE 审计");
        Ok(())
    }
}

// ==========================================
// AuditSink - 引擎侧统一入口（吞掉失败）
// ==========================================
#[derive(Clone)]
pub struct AuditSink {
    inner: Option<Arc<dyn AuditLogger>>,
}

impl AuditSink {
    pub fn with_logger(logger: Arc<dyn AuditLogger>) -> Self {
        Self {
            inner: Some(logger),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }

    pub fn record_create(
        &self,
        meta: &AuditMeta<'_>,
        entity_type: &str,
        entity_id: &str,
        snapshot: &JsonValue,
    ) {
        let Some(logger) = &self.inner else {
            return;
        };
        if let Err(e) = logger.log_create(meta, entity_type, entity_id, snapshot) {
            tracing::warn!(error = %e, entity_type, entity_id, "记录操作日志失败");
        }
    }

    pub fn record_update(
        &self,
        meta: &AuditMeta<'_>,
        entity_type: &str,
        entity_id: &str,
        before: &JsonValue,
        after: &JsonValue,
    ) {
        let Some(logger) = &self.inner else {
            return;
        };
        if let Err(e) = logger.log_update(meta, entity_type, entity_id, before, after) {
            tracing::warn!(error = %e, entity_type, entity_id, "记录操作日志失败");
        }
    }
}

impl Default for AuditSink {
    fn default() -> Self {
        Self::none()
    }
}
