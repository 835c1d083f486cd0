// ==========================================
// 学校设备维修工单 - 日志初始化
// ==========================================
// 使用 tracing + tracing-subscriber
// RUST_LOG 控制级别；SCHOOL_REPAIR_LOG_FORMAT=json 输出结构化日志（供日志采集）
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

/// 日志输出格式环境变量
pub const LOG_FORMAT_ENV: &str = "SCHOOL_REPAIR_LOG_FORMAT";

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// 解析格式名；未识别的取值按文本格式处理
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or(LogFormat::Text)
    }
}

/// 初始化日志系统
///
/// # 环境变量
/// - RUST_LOG: 日志级别过滤器（默认: info），例如 RUST_LOG=school_repair=debug
/// - SCHOOL_REPAIR_LOG_FORMAT: text（默认）或 json
///
/// # 示例
/// ```no_run
/// use school_repair::logging;
/// logging::init();
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match LogFormat::from_env() {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_target(true)
            .init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_line_number(true)
            .init(),
    }
}

/// 测试用日志（debug 级别，写入测试输出）；可重复调用
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
