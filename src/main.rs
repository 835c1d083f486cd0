// ==========================================
// 学校设备维修工单 - 管理命令入口
// ==========================================
// 用法:
//   school-repair init [db_path]    建表（幂等）
//   school-repair policy [db_path]  输出生效中的工单策略（JSON）
// ==========================================

use std::process::ExitCode;

use school_repair::app::{get_default_db_path, AppState};
use school_repair::logging;

fn print_usage() {
    eprintln!("用法: school-repair <init|policy> [db_path]");
}

fn run(command: &str, db_path: String) -> Result<(), String> {
    match command {
        "init" => {
            let state = AppState::new(db_path)?;
            tracing::info!(db_path = %state.db_path, "数据库初始化完成");
            println!("数据库已就绪: {}", state.db_path);
            Ok(())
        }
        "policy" => {
            let state = AppState::new(db_path)?;
            let json = serde_json::to_string_pretty(state.policy.as_ref())
                .map_err(|e| format!("策略序列化失败: {}", e))?;
            println!("{}", json);
            Ok(())
        }
        other => Err(format!("未知命令: {}", other)),
    }
}

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        return ExitCode::from(2);
    };
    let db_path = args.get(1).cloned().unwrap_or_else(get_default_db_path);

    tracing::info!("学校设备维修工单 v{}", school_repair::VERSION);

    match run(command, db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("错误: {}", e);
            ExitCode::FAILURE
        }
    }
}
