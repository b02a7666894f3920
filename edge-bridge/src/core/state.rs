use std::sync::Arc;

use shared::error::{AppError, AppResult};

use crate::archiving::{ArchiveScheduler, FileEventLog};
use crate::core::Config;
use crate::engine::{ArchivalReconciler, CircuitBreaker, EngineClient, ModuleRegistry, WriteRouter};
use crate::store::{FailedPostLedger, LocalStore, SqliteLocalStore};

/// 桥接服务状态 - 持有所有组件的共享引用
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | store | Arc<SqliteLocalStore> | 本地存储 (草稿、失败记录、通知) |
/// | event_log | Arc<FileEventLog> | 本地事件日志 |
/// | breaker | Arc<CircuitBreaker> | 引擎熔断器 |
/// | router | Arc<WriteRouter> | 写入路由 |
#[derive(Clone)]
pub struct BridgeState {
    pub config: Config,
    pub store: Arc<SqliteLocalStore>,
    pub event_log: Arc<FileEventLog>,
    pub breaker: Arc<CircuitBreaker>,
    pub router: Arc<WriteRouter>,
}

impl BridgeState {
    /// 初始化所有组件
    ///
    /// 1. 创建工作目录和事件日志目录
    /// 2. 打开本地 SQLite 存储
    /// 3. 加载模块路由策略
    /// 4. 组装熔断器、引擎客户端、清理器和写入路由
    pub async fn initialize(config: &Config) -> AppResult<Self> {
        for dir in [&config.work_dir, &config.event_log_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                AppError::config(format!("Failed to create directory {}: {e}", dir.display()))
            })?;
        }

        let db_path = config.local_db_path.to_string_lossy();
        let store = Arc::new(SqliteLocalStore::open(&db_path).await?);
        let local: Arc<dyn LocalStore> = store.clone();

        let modules = Arc::new(ModuleRegistry::load(&config.modules_config)?);
        let event_log = Arc::new(FileEventLog::new(&config.event_log_dir));

        let engine = config.engine();
        let breaker = Arc::new(CircuitBreaker::new(engine.breaker()));
        let client = EngineClient::new(&engine, breaker.clone(), FailedPostLedger::new(local.clone()))?;
        let reconciler = ArchivalReconciler::new(local.clone(), config.notification_table.clone())
            .with_journal(event_log.clone());
        let router = Arc::new(WriteRouter::new(modules, local, client, reconciler));

        tracing::info!(
            engine_enabled = engine.enabled,
            endpoint = %engine.endpoint(),
            "Bridge state initialized"
        );

        Ok(Self {
            config: config.clone(),
            store,
            event_log,
            breaker,
            router,
        })
    }

    /// 事件归档调度器；未配置或被禁用时返回 None
    pub fn archive_scheduler(
        &self,
        shutdown: tokio_util::sync::CancellationToken,
    ) -> AppResult<Option<ArchiveScheduler>> {
        Ok(ArchiveScheduler::from_config(
            &self.config.archive(),
            self.event_log.clone(),
            shutdown,
        )?)
    }
}
