// ==========================================
// 学校设备维修工单 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::work_order_policy::{ReworkEdges, WorkOrderPolicy};
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照（key → value）
    pub fn get_config_snapshot(&self) -> Result<BTreeMap<String, String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 读取并解析标量配置；缺省返回 None，格式错误返回 Err
    fn get_parsed<T>(&self, key: &str) -> Result<Option<T>, Box<dyn Error>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_config_value(key)? {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| format!("配置项 {} 格式错误 ({}): {}", key, raw, e).into()),
        }
    }

    // ===== 工单策略 =====

    /// 加载工单策略
    ///
    /// 缺省键回退到默认值；格式错误或取值非法时返回错误（不静默降级）。
    pub fn load_work_order_policy(&self) -> Result<WorkOrderPolicy, Box<dyn Error>> {
        let defaults = WorkOrderPolicy::default();

        let rework_edges = match self.get_config_value(config_keys::REWORK_EDGES)? {
            None => None,
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(serde_json::from_str::<ReworkEdges>(&raw).map_err(|e| {
                format!("配置项 {} 格式错误: {}", config_keys::REWORK_EDGES, e)
            })?),
        };

        let policy = WorkOrderPolicy {
            enforce_part_compatibility: self
                .get_parsed(config_keys::ENFORCE_PART_COMPATIBILITY)?
                .unwrap_or(defaults.enforce_part_compatibility),
            max_rework_count: self
                .get_parsed(config_keys::MAX_REWORK_COUNT)?
                .unwrap_or(defaults.max_rework_count),
            require_rework_reason: self
                .get_parsed(config_keys::REQUIRE_REWORK_REASON)?
                .unwrap_or(defaults.require_rework_reason),
            max_bulk_batch_size: self
                .get_parsed(config_keys::MAX_BULK_BATCH_SIZE)?
                .unwrap_or(defaults.max_bulk_batch_size),
            rework_edges,
        };

        policy.validate()?;

        tracing::debug!(
            enforce_part_compatibility = policy.enforce_part_compatibility,
            max_rework_count = policy.max_rework_count,
            max_bulk_batch_size = policy.max_bulk_batch_size,
            custom_rework_edges = policy.rework_edges.is_some(),
            "工单策略已加载"
        );
        Ok(policy)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const ENFORCE_PART_COMPATIBILITY: &str = "work_order.enforce_part_compatibility";
    pub const MAX_REWORK_COUNT: &str = "work_order.max_rework_count";
    pub const REQUIRE_REWORK_REASON: &str = "work_order.require_rework_reason";
    pub const MAX_BULK_BATCH_SIZE: &str = "work_order.max_bulk_batch_size";
    pub const REWORK_EDGES: &str = "work_order.rework_edges";
}
