// ==========================================
// 学校设备维修工单 - 审计日志领域模型
// ==========================================
// 用途: 审计追踪（工单/BOM行的创建与变更前后快照）
// 对齐: action_log 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 审计日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub tenant_id: Option<String>,
    pub entity_type: String,          // 实体类型: work_order / work_order_part ...
    pub entity_id: String,            // 实体ID
    pub action_type: String,          // CREATE / UPDATE
    pub action_ts: NaiveDateTime,
    pub actor: String,
    pub before_json: Option<JsonValue>, // 变更前快照
    pub after_json: Option<JsonValue>,  // 变更后快照（CREATE 时为新建快照）
    pub detail: Option<String>,
}

// ==========================================
// ActionType - 审计动作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Create,
    Update,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "CREATE",
            ActionType::Update => "UPDATE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(ActionType::Create),
            "UPDATE" => Some(ActionType::Update),
            _ => None,
        }
    }
}

impl ActionLog {
    /// 创建新的审计日志（action_id 自动生成）
    pub fn new(entity_type: &str, entity_id: &str, action_type: ActionType, actor: &str) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: None,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Local::now().naive_local(),
            actor: actor.to_string(),
            before_json: None,
            after_json: None,
            detail: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_before(mut self, before: JsonValue) -> Self {
        self.before_json = Some(before);
        self
    }

    pub fn with_after(mut self, after: JsonValue) -> Self {
        self.after_json = Some(after);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
