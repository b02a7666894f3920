//! 事件归档调度器
//!
//! 启动时立即执行一次归档周期，之后按固定间隔执行，直到收到 shutdown 信号。
//! 单个上下文或单个分段的失败只记录日志，不影响同一周期内的其他上下文。

use super::{ArchiveResult, ArchiveStore, EventLog, PgArchiveStore, UploadOutcome, upload_segment};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Archiver settings
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Kill switch (`EVENT_ARCHIVER_DISABLED`)
    pub disabled: bool,
    /// Archive store connection string (`EVENTS_PG_URL`)
    pub pg_url: Option<String>,
    pub interval: Duration,
}

impl ArchiveConfig {
    /// Whether the archiver should start at all
    pub fn is_active(&self) -> bool {
        !self.disabled && self.pg_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Counters for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub contexts: usize,
    pub rotated: usize,
    pub uploaded_segments: usize,
    pub uploaded_entries: usize,
    pub empty_segments: usize,
    pub failures: usize,
}

/// 事件归档调度器
///
/// 注册为 `TaskKind::Periodic`。
pub struct ArchiveScheduler {
    log: Arc<dyn EventLog>,
    store: Arc<dyn ArchiveStore>,
    interval: Duration,
    shutdown: CancellationToken,
    schema_ready: AtomicBool,
}

impl ArchiveScheduler {
    pub fn new(
        log: Arc<dyn EventLog>,
        store: Arc<dyn ArchiveStore>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            log,
            store,
            interval,
            shutdown,
            schema_ready: AtomicBool::new(false),
        }
    }

    /// Build the scheduler from config; `None` when the archiver is inert
    pub fn from_config(
        config: &ArchiveConfig,
        log: Arc<dyn EventLog>,
        shutdown: CancellationToken,
    ) -> ArchiveResult<Option<Self>> {
        if config.disabled {
            tracing::info!("Event archive service disabled via configuration flag");
            return Ok(None);
        }
        let Some(url) = config.pg_url.as_deref().filter(|u| !u.is_empty()) else {
            tracing::info!("Event archive service disabled: EVENTS_PG_URL missing");
            return Ok(None);
        };

        let store = PgArchiveStore::connect_lazy(url)?;
        Ok(Some(Self::new(log, Arc::new(store), config.interval, shutdown)))
    }

    /// 主循环：立即执行一次 → 周期执行 → 关闭连接池
    pub async fn run(self) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Event archive service started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Event archive service received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    // An in-flight cycle is dropped on shutdown; its open
                    // transaction rolls back and the segment stays on disk.
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            tracing::info!("Event archive service interrupted mid-cycle");
                            break;
                        }
                        result = self.run_cycle() => {
                            if let Err(e) = result {
                                tracing::warn!(error = %e, "Event archive cycle failed");
                            }
                        }
                    }
                }
            }
        }

        self.store.close().await;
        tracing::info!("Event archive service stopped");
    }

    /// One rotate + upload pass over every context.
    ///
    /// Only listing contexts and the schema bootstrap can fail the whole
    /// cycle; everything else is isolated per context or per segment.
    pub async fn run_cycle(&self) -> ArchiveResult<CycleReport> {
        let contexts = self.log.list_contexts().await?;
        let mut report = CycleReport {
            contexts: contexts.len(),
            ..CycleReport::default()
        };
        if contexts.is_empty() {
            return Ok(report);
        }

        if !self.schema_ready.load(Ordering::Acquire) {
            self.store.ensure_schema().await?;
            self.schema_ready.store(true, Ordering::Release);
        }

        for context in &contexts {
            match self.log.rotate(context).await {
                Ok(Some(_)) => report.rotated += 1,
                Ok(None) => {}
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(
                        branch_id = %context.branch_id,
                        module_id = %context.module_id,
                        error = %e,
                        "Failed to rotate event log"
                    );
                }
            }

            // Includes segments left behind by earlier failed cycles
            let segments = match self.log.list_closed_segments(context).await {
                Ok(segments) => segments,
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(
                        branch_id = %context.branch_id,
                        module_id = %context.module_id,
                        error = %e,
                        "Failed to list archived event logs"
                    );
                    continue;
                }
            };

            for segment in segments {
                match upload_segment(self.log.as_ref(), self.store.as_ref(), context, &segment).await {
                    Ok(UploadOutcome::Empty) => report.empty_segments += 1,
                    Ok(UploadOutcome::Uploaded(count)) => {
                        report.uploaded_segments += 1;
                        report.uploaded_entries += count;
                    }
                    Err(e) => {
                        report.failures += 1;
                        tracing::warn!(
                            branch_id = %context.branch_id,
                            module_id = %context.module_id,
                            segment = %segment.display(),
                            error = %e,
                            "Failed to archive event log"
                        );
                    }
                }
            }
        }

        tracing::debug!(?report, "Event archive cycle finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiving::FileEventLog;
    use crate::test_utils::MemoryArchiveStore;
    use shared::event::{ArchiveContext, DEFAULT_ACTION, EventLogEntry};
    use tempfile::TempDir;

    fn scheduler(dir: &TempDir, store: Arc<MemoryArchiveStore>) -> (Arc<FileEventLog>, ArchiveScheduler) {
        let log = Arc::new(FileEventLog::new(dir.path()));
        let scheduler = ArchiveScheduler::new(
            log.clone(),
            store,
            Duration::from_secs(60),
            CancellationToken::new(),
        );
        (log, scheduler)
    }

    #[test]
    fn test_config_is_active() {
        let mut config = ArchiveConfig {
            disabled: false,
            pg_url: Some("postgres://localhost/events".into()),
            interval: Duration::from_secs(60),
        };
        assert!(config.is_active());

        config.disabled = true;
        assert!(!config.is_active());

        config.disabled = false;
        config.pg_url = Some(String::new());
        assert!(!config.is_active());
        config.pg_url = None;
        assert!(!config.is_active());
    }

    #[test]
    fn test_inert_without_url() {
        let dir = TempDir::new().unwrap();
        let config = ArchiveConfig {
            disabled: false,
            pg_url: None,
            interval: Duration::from_secs(60),
        };
        let scheduler = ArchiveScheduler::from_config(
            &config,
            Arc::new(FileEventLog::new(dir.path())),
            CancellationToken::new(),
        )
        .unwrap();
        assert!(scheduler.is_none());
    }

    #[tokio::test]
    async fn test_no_contexts_no_store_interaction() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryArchiveStore::default());
        let (_, scheduler) = scheduler(&dir, store.clone());

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert_eq!(store.schema_calls(), 0);
        assert_eq!(store.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_cycle_uploads_and_bootstraps_schema_once() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryArchiveStore::default());
        let (log, scheduler) = scheduler(&dir, store.clone());
        let ctx = ArchiveContext::new("b1", "finance");

        log.append(&ctx, &EventLogEntry::new(&ctx, "journal", DEFAULT_ACTION)).await.unwrap();
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.rotated, 1);
        assert_eq!(report.uploaded_segments, 1);
        assert_eq!(report.uploaded_entries, 1);
        assert_eq!(store.len(), 1);
        assert!(log.list_closed_segments(&ctx).await.unwrap().is_empty());

        // Quiet context: nothing rotated, nothing uploaded
        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.rotated, 0);
        assert_eq!(report.uploaded_segments, 0);
        assert_eq!(store.upsert_calls(), 1);
        assert_eq!(store.schema_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_context_isolated() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryArchiveStore::failing_for("b1"));
        let (log, scheduler) = scheduler(&dir, store.clone());
        let a = ArchiveContext::new("b1", "finance");
        let b = ArchiveContext::new("b2", "finance");

        log.append(&a, &EventLogEntry::new(&a, "journal", DEFAULT_ACTION)).await.unwrap();
        log.append(&b, &EventLogEntry::new(&b, "journal", DEFAULT_ACTION)).await.unwrap();

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.failures, 1);
        assert_eq!(report.uploaded_segments, 1);
        assert_eq!(store.len(), 1);

        // A's segment survives for the next cycle
        assert_eq!(log.list_closed_segments(&a).await.unwrap().len(), 1);
        assert!(log.list_closed_segments(&b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_and_closes_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryArchiveStore::default());
        let log = Arc::new(FileEventLog::new(dir.path()));
        let ctx = ArchiveContext::new("b1", "finance");
        log.append(&ctx, &EventLogEntry::new(&ctx, "journal", DEFAULT_ACTION)).await.unwrap();

        let shutdown = CancellationToken::new();
        let scheduler = ArchiveScheduler::new(
            log.clone(),
            store.clone(),
            Duration::from_secs(3600),
            shutdown.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        // The first cycle runs immediately
        for _ in 0..100 {
            if store.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.len(), 1);

        shutdown.cancel();
        handle.await.unwrap();
        assert!(store.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_stuck_cycle() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryArchiveStore::default());
        store.stall();
        let log = Arc::new(FileEventLog::new(dir.path()));
        let ctx = ArchiveContext::new("b1", "finance");
        log.append(&ctx, &EventLogEntry::new(&ctx, "journal", DEFAULT_ACTION)).await.unwrap();

        let shutdown = CancellationToken::new();
        let scheduler = ArchiveScheduler::new(
            log.clone(),
            store.clone(),
            Duration::from_secs(3600),
            shutdown.clone(),
        );
        let handle = tokio::spawn(scheduler.run());

        for _ in 0..100 {
            if store.upsert_calls() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.upsert_calls(), 1);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(store.is_closed());
        assert!(store.is_empty());
        // The rotated segment waits for the next run
        assert_eq!(log.list_closed_segments(&ctx).await.unwrap().len(), 1);
    }
}
