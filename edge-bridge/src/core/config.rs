use crate::archiving::ArchiveConfig;
use crate::engine::EngineConfig;
use std::path::PathBuf;
use std::time::Duration;

/// 桥接服务配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | ENVIRONMENT | development | 运行环境 |
/// | WORK_DIR | /var/lib/edge-bridge | 工作目录 |
/// | LOCAL_DB_PATH | $WORK_DIR/local.db | 本地 SQLite 数据库 |
/// | EVENT_LOG_DIR | $WORK_DIR/events | 事件日志根目录 |
/// | MODULES_CONFIG | $WORK_DIR/modules.json | 模块路由策略 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | - | 日志文件目录 |
/// | LOG_JSON | false | JSON 格式日志 |
/// | ENGINE_ENABLED | false | 是否启用引擎 |
/// | ENGINE_HOST | 127.0.0.1 | 引擎地址 |
/// | ENGINE_PORT | 8080 | 引擎端口 |
/// | ENGINE_TIMEOUT_MS | 5000 | RPC 超时(毫秒) |
/// | INTER_SERVICE_SECRET | - | 服务间共享密钥 |
/// | SERVICE_NAME | edge-bridge | 调用方标识 |
/// | ENGINE_FAILURE_THRESHOLD | 5 | 熔断阈值 |
/// | ENGINE_RECOVERY_TIME_MS | 30000 | 熔断恢复时间(毫秒) |
/// | NOTIFICATION_TABLE | notifications | 通知表 |
/// | EVENT_ARCHIVER_DISABLED | false | 关闭事件归档 |
/// | EVENTS_PG_URL | - | 归档 PostgreSQL 连接串 |
/// | EVENT_ARCHIVE_INTERVAL_MS | 60000 | 归档周期(毫秒) |
///
/// # 示例
///
/// ```ignore
/// ENGINE_ENABLED=true ENGINE_PORT=9090 EVENTS_PG_URL=postgres://... cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 运行环境: development | staging | production
    pub environment: String,
    /// 工作目录
    pub work_dir: PathBuf,
    pub local_db_path: PathBuf,
    pub event_log_dir: PathBuf,
    pub modules_config: PathBuf,

    // === 日志 ===
    pub log_level: String,
    pub log_dir: Option<String>,
    pub log_json: bool,

    // === 引擎 ===
    pub engine_enabled: bool,
    pub engine_host: String,
    pub engine_port: u16,
    pub engine_timeout_ms: u64,
    pub inter_service_secret: String,
    pub service_name: String,
    pub failure_threshold: u32,
    pub recovery_time_ms: u64,
    pub notification_table: String,

    // === 事件归档 ===
    pub archiver_disabled: bool,
    pub events_pg_url: Option<String>,
    pub archive_interval_ms: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let work_dir = PathBuf::from(
            std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/edge-bridge".into()),
        );
        let path_or = |key: &str, file: &str| {
            env_opt(key)
                .map(PathBuf::from)
                .unwrap_or_else(|| work_dir.join(file))
        };

        Self {
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            local_db_path: path_or("LOCAL_DB_PATH", "local.db"),
            event_log_dir: path_or("EVENT_LOG_DIR", "events"),
            modules_config: path_or("MODULES_CONFIG", "modules.json"),
            work_dir: work_dir.clone(),

            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: env_opt("LOG_DIR"),
            log_json: env_or("LOG_JSON", false),

            engine_enabled: env_or("ENGINE_ENABLED", false),
            engine_host: std::env::var("ENGINE_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            engine_port: env_or("ENGINE_PORT", 8080),
            engine_timeout_ms: env_or("ENGINE_TIMEOUT_MS", 5000),
            inter_service_secret: std::env::var("INTER_SERVICE_SECRET").unwrap_or_default(),
            service_name: std::env::var("SERVICE_NAME").unwrap_or_else(|_| "edge-bridge".into()),
            failure_threshold: env_or("ENGINE_FAILURE_THRESHOLD", 5),
            recovery_time_ms: env_or("ENGINE_RECOVERY_TIME_MS", 30000),
            notification_table: std::env::var("NOTIFICATION_TABLE")
                .unwrap_or_else(|_| "notifications".into()),

            archiver_disabled: env_or("EVENT_ARCHIVER_DISABLED", false),
            events_pg_url: env_opt("EVENTS_PG_URL"),
            archive_interval_ms: env_or("EVENT_ARCHIVE_INTERVAL_MS", 60000),
        }
    }

    /// 引擎连接配置
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            enabled: self.engine_enabled,
            host: self.engine_host.clone(),
            port: self.engine_port,
            timeout: Duration::from_millis(self.engine_timeout_ms),
            secret: self.inter_service_secret.clone(),
            service_name: self.service_name.clone(),
            failure_threshold: self.failure_threshold,
            recovery_time: Duration::from_millis(self.recovery_time_ms),
        }
    }

    /// 事件归档配置
    pub fn archive(&self) -> ArchiveConfig {
        ArchiveConfig {
            disabled: self.archiver_disabled,
            pg_url: self.events_pg_url.clone(),
            interval: Duration::from_millis(self.archive_interval_ms.max(1)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_parses_and_falls_back() {
        assert_eq!(env_or("EDGE_BRIDGE_TEST_UNSET_KEY", 42u32), 42);
        assert!(!env_or("EDGE_BRIDGE_TEST_UNSET_KEY", false));
    }

    #[test]
    fn test_derived_views() {
        let mut config = Config::from_env();
        config.engine_enabled = true;
        config.engine_host = "10.0.0.5".into();
        config.engine_port = 9090;
        config.engine_timeout_ms = 1500;
        config.failure_threshold = 3;
        config.recovery_time_ms = 10_000;
        config.archiver_disabled = false;
        config.events_pg_url = Some("postgres://archive".into());
        config.archive_interval_ms = 0;

        let engine = config.engine();
        assert_eq!(engine.endpoint(), "http://10.0.0.5:9090/rpc/execute");
        assert_eq!(engine.timeout, Duration::from_millis(1500));
        let breaker = engine.breaker();
        assert!(breaker.enabled);
        assert_eq!(breaker.failure_threshold, 3);
        assert_eq!(breaker.recovery_time, Duration::from_secs(10));

        let archive = config.archive();
        assert!(archive.is_active());
        // A zero interval would panic in tokio::time::interval
        assert_eq!(archive.interval, Duration::from_millis(1));
    }
}
