//! Edge Bridge - 本地写入路由与事件归档
//!
//! # 架构概述
//!
//! - **引擎桥接** (`engine`): 熔断器、RPC 客户端、写入路由、草稿清理
//! - **本地存储** (`store`): SQLite 本地存储与失败记录
//! - **事件归档** (`archiving`): 事件日志轮转与 PostgreSQL 归档
//!
//! # 模块结构
//!
//! ```text
//! edge-bridge/src/
//! ├── core/          # 配置、状态、后台任务
//! ├── engine/        # 熔断器、客户端、路由、清理
//! ├── store/         # 本地存储、失败记录
//! ├── archiving/     # 事件日志、归档存储、调度器
//! └── utils/         # 日志
//! ```

pub mod archiving;
pub mod core;
pub mod engine;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod utils;

// Re-export 公共类型
pub use archiving::{ArchiveScheduler, EventLog, FileEventLog};
pub use core::{BackgroundTasks, BridgeState, Config, TaskKind};
pub use engine::{CircuitBreaker, EngineClient, WriteRouter};
pub use shared::error::{AppError, AppResult, ErrorCode};
pub use store::{FailedPostLedger, LocalStore, SqliteLocalStore};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境: 加载 .env 并初始化日志
pub fn setup_environment() -> Config {
    // .env is optional
    let _ = dotenv::dotenv();

    let config = Config::from_env();
    init_logger_with_file(
        Some(&config.log_level),
        Some(config.log_json),
        config.log_dir.as_deref(),
    );
    config
}
