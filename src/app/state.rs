// ==========================================
// 学校设备维修工单 - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::api::WorkOrderApi;
use crate::config::{ConfigManager, WorkOrderPolicy};
use crate::engine::{
    ActionLogAuditLogger, AuditSink, BomLineManager, BulkOperationCoordinator, InventoryLedger,
    PartCompatibility, ReworkEngine, SqlitePartCompatibility, WorkOrderLifecycle,
};
use crate::repository::{
    ActionLogRepository, InventoryRepository, PartCompatibilityRepository, PhaseRepository,
    WorkOrderRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源；策略在构造时加载一次
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 生效中的工单策略
    pub policy: Arc<WorkOrderPolicy>,

    /// 工单API
    pub work_order_api: Arc<WorkOrderApi>,

    /// 库存仓储（供收货同步写入）
    pub inventory_repo: Arc<InventoryRepository>,

    /// 备件兼容性仓储
    pub part_compatibility_repo: Arc<PartCompatibilityRepository>,

    /// 项目阶段/交付物仓储
    pub phase_repo: Arc<PhaseRepository>,

    /// 操作日志仓储（用于审计追踪）
    pub action_log_repo: Arc<ActionLogRepository>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并建表（幂等）
    /// 2. 从 config_kv 加载工单策略
    /// 3. 初始化Repository、Engine与API
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = crate::db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        crate::db::init_schema(&conn).map_err(|e| format!("建表失败: {}", e))?;

        let mut state = Self::from_connection(Arc::new(Mutex::new(conn)))?;
        state.db_path = db_path;
        Ok(state)
    }

    /// 基于已有连接装配（连接须已建表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, String> {
        // ==========================================
        // 配置
        // ==========================================
        let config_manager = ConfigManager::from_connection(conn.clone())
            .map_err(|e| format!("无法创建ConfigManager: {}", e))?;
        let policy = Arc::new(
            config_manager
                .load_work_order_policy()
                .map_err(|e| format!("工单策略加载失败: {}", e))?,
        );
        tracing::info!(
            enforce_part_compatibility = policy.enforce_part_compatibility,
            max_rework_count = policy.max_rework_count,
            max_bulk_batch_size = policy.max_bulk_batch_size,
            "工单策略已加载"
        );

        // ==========================================
        // Repository层
        // ==========================================
        let work_order_repo = Arc::new(WorkOrderRepository::new(conn.clone()));
        let inventory_repo = Arc::new(InventoryRepository::new(conn.clone()));
        let part_compatibility_repo = Arc::new(PartCompatibilityRepository::new(conn.clone()));
        let phase_repo = Arc::new(PhaseRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));

        // ==========================================
        // Engine层
        // ==========================================
        let audit = AuditSink::with_logger(Arc::new(ActionLogAuditLogger::new(
            action_log_repo.clone(),
        )));
        let compatibility: Arc<dyn PartCompatibility> = Arc::new(SqlitePartCompatibility::new(
            part_compatibility_repo.clone(),
        ));

        let lifecycle = Arc::new(WorkOrderLifecycle::new(conn.clone(), audit.clone()));
        let ledger = Arc::new(InventoryLedger::new(conn.clone()));
        let bom_lines = Arc::new(BomLineManager::new(
            conn.clone(),
            policy.clone(),
            compatibility,
            audit.clone(),
        ));
        let rework = Arc::new(ReworkEngine::new(conn.clone(), policy.clone(), audit.clone()));
        let bulk = Arc::new(BulkOperationCoordinator::new(conn, policy.clone(), audit));

        // ==========================================
        // API层
        // ==========================================
        let work_order_api = Arc::new(WorkOrderApi::new(
            lifecycle,
            bom_lines,
            rework,
            bulk,
            ledger,
            work_order_repo,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path: String::new(),
            policy,
            work_order_api,
            inventory_repo,
            part_compatibility_repo,
            phase_repo,
            action_log_repo,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 SCHOOL_REPAIR_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("SCHOOL_REPAIR_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./school_repair.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("school-repair");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("school_repair.db");
        }
    }

    path.to_string_lossy().to_string()
}
