use clap::Parser;
use profit_switcher::config::{Args, Config};
use profit_switcher::logging::{init_logging, LogConfig};
use profit_switcher::{MiningManager, Watchdog, NAME, VERSION};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // 解析命令行参数
    let args = Args::parse();

    // 加载配置
    let config = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // 初始化日志系统, guard 必须活到进程退出
    let _log_guard = match init_logging(LogConfig::from_settings(&config.settings, &args)) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("🚀 Starting {} v{}", NAME, VERSION);
    info!("📋 Configuration loaded from: {}", args.config);

    let watchdog = Watchdog::new(config.settings.shutdown_grace());
    let manager = match MiningManager::from_config(&config, watchdog.clone()) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            error!("❌ Failed to create mining manager: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.check {
        info!("✅ Configuration is valid, {} workers loaded", manager.workers().len());
        return ExitCode::SUCCESS;
    }

    let shutdown = watchdog.shutdown_token();
    watchdog
        .eat_main_thread(async move {
            manager.startup().await;
            manager.run(shutdown).await;
            manager.shutdown().await;
        })
        .await;

    info!("👋 Exiting");
    ExitCode::SUCCESS
}
