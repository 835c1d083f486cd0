// ==========================================
// 学校设备维修工单 - 工单策略配置
// ==========================================
// 存储: config_kv 表 (scope_id='global', key='work_order.*')
// 说明: 构造引擎时一次性注入，引擎内不再按次读取配置
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::types::WorkOrderStatus;

/// 返工逆向迁移表: from → 允许回退到的状态集合
pub type ReworkEdges = BTreeMap<WorkOrderStatus, Vec<WorkOrderStatus>>;

/// 工单策略
///
/// 默认值：
/// - enforce_part_compatibility = true（添加备件时校验与设备型号兼容）
/// - max_rework_count = 3
/// - require_rework_reason = true
/// - max_bulk_batch_size = 100
/// - rework_edges = None（使用正向迁移表的逆表，终态除外）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrderPolicy {
    #[serde(default = "default_true")]
    pub enforce_part_compatibility: bool,

    #[serde(default = "default_max_rework_count")]
    pub max_rework_count: i64,

    #[serde(default = "default_true")]
    pub require_rework_reason: bool,

    #[serde(default = "default_max_bulk_batch_size")]
    pub max_bulk_batch_size: usize,

    #[serde(default)]
    pub rework_edges: Option<ReworkEdges>,
}

fn default_true() -> bool {
    true
}

fn default_max_rework_count() -> i64 {
    3
}

fn default_max_bulk_batch_size() -> usize {
    100
}

impl Default for WorkOrderPolicy {
    fn default() -> Self {
        Self {
            enforce_part_compatibility: true,
            max_rework_count: default_max_rework_count(),
            require_rework_reason: true,
            max_bulk_batch_size: default_max_bulk_batch_size(),
            rework_edges: None,
        }
    }
}

impl WorkOrderPolicy {
    /// 校验配置取值
    pub fn validate(&self) -> Result<(), String> {
        if self.max_rework_count < 0 {
            return Err(format!("max_rework_count 不能为负: {}", self.max_rework_count));
        }
        if self.max_bulk_batch_size == 0 {
            return Err("max_bulk_batch_size 必须大于0".to_string());
        }
        if let Some(edges) = &self.rework_edges {
            for (from, targets) in edges {
                for to in targets {
                    if to >= from {
                        return Err(format!("返工迁移必须是逆向的: {} -> {}", from, to));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = WorkOrderPolicy::default();
        assert!(policy.validate().is_ok());
        assert!(policy.enforce_part_compatibility);
        assert_eq!(policy.max_rework_count, 3);
    }

    #[test]
    fn test_forward_rework_edge_rejected() {
        let mut edges = ReworkEdges::new();
        edges.insert(WorkOrderStatus::Qa, vec![WorkOrderStatus::Completed]);
        let policy = WorkOrderPolicy {
            rework_edges: Some(edges),
            ..Default::default()
        };
        let err = policy.validate().unwrap_err();
        assert!(err.contains("QA"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let policy: WorkOrderPolicy =
            serde_json::from_str(r#"{"max_rework_count": 5, "rework_edges": {"COMPLETED": ["QA"]}}"#)
                .unwrap();
        assert_eq!(policy.max_rework_count, 5);
        assert_eq!(policy.max_bulk_batch_size, 100);
        assert_eq!(
            policy.rework_edges.unwrap()[&WorkOrderStatus::Completed],
            vec![WorkOrderStatus::Qa]
        );
    }
}
