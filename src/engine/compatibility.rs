// ==========================================
// 学校设备维修工单 - 备件兼容性查询
// ==========================================
// 仅在策略 enforce_part_compatibility 开启时被调用
// ==========================================

use std::sync::Arc;

use crate::repository::{PartCompatibilityRepository, RepositoryResult};

/// 备件/设备型号兼容性查询 Trait
pub trait PartCompatibility: Send + Sync {
    fn is_compatible(&self, part_id: &str, device_model: &str) -> RepositoryResult<bool>;
}

/// 基于 part_compatibility 表的实现（无对应行即视为不兼容）
pub struct SqlitePartCompatibility {
    repo: Arc<PartCompatibilityRepository>,
}

impl SqlitePartCompatibility {
    pub fn new(repo: Arc<PartCompatibilityRepository>) -> Self {
        Self { repo }
    }
}

impl PartCompatibility for SqlitePartCompatibility {
    fn is_compatible(&self, part_id: &str, device_model: &str) -> RepositoryResult<bool> {
        self.repo.exists(part_id, device_model)
    }
}
