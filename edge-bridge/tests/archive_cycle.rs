use edge_bridge::archiving::{ArchiveScheduler, EventLog, FileEventLog};
use edge_bridge::test_utils::MemoryArchiveStore;
use serde_json::json;
use shared::event::{ArchiveContext, DEFAULT_ACTION, EventLogEntry};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn setup() -> (TempDir, Arc<FileEventLog>, Arc<MemoryArchiveStore>, ArchiveScheduler) {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(FileEventLog::new(dir.path()));
    let archive = Arc::new(MemoryArchiveStore::default());
    let scheduler = ArchiveScheduler::new(
        log.clone(),
        archive.clone(),
        Duration::from_secs(3600),
        CancellationToken::new(),
    );
    (dir, log, archive, scheduler)
}

async fn append(log: &FileEventLog, ctx: &ArchiveContext, n: i64) -> Vec<String> {
    let mut ids = Vec::new();
    for seq in 0..n {
        let entry = EventLogEntry::new(ctx, "journal", DEFAULT_ACTION)
            .with_record(json!({"seq": seq}))
            .with_sequence(seq);
        ids.push(entry.id.clone());
        log.append(ctx, &entry).await.unwrap();
    }
    ids
}

#[tokio::test]
async fn test_cycle_archives_every_context() {
    let (_dir, log, archive, scheduler) = setup();
    let a = ArchiveContext::new("b1", "finance");
    let b = ArchiveContext::new("b2", "pos");
    let mut ids = append(&log, &a, 3).await;
    ids.extend(append(&log, &b, 2).await);

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.contexts, 2);
    assert_eq!(report.uploaded_entries, 5);
    assert_eq!(report.failures, 0);

    let rows = archive.rows();
    assert_eq!(rows.len(), 5);
    assert!(ids.iter().all(|id| rows.contains_key(id)));
    assert!(log.list_closed_segments(&a).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_context_does_not_block_others_and_retries() {
    let (_dir, log, archive, scheduler) = setup();
    let a = ArchiveContext::new("b1", "finance");
    let b = ArchiveContext::new("b2", "finance");
    let a_ids = append(&log, &a, 2).await;
    let b_ids = append(&log, &b, 2).await;

    archive.fail_branch("b1");
    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.failures, 1);
    let rows = archive.rows();
    assert!(b_ids.iter().all(|id| rows.contains_key(id)));
    assert!(a_ids.iter().all(|id| !rows.contains_key(id)));
    assert_eq!(log.list_closed_segments(&a).await.unwrap().len(), 1);

    // Leftover segment is picked up by the next cycle, together with new writes
    archive.heal();
    let more = append(&log, &a, 1).await;
    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.failures, 0);
    assert_eq!(report.uploaded_segments, 2);
    let rows = archive.rows();
    assert!(a_ids.iter().chain(&more).all(|id| rows.contains_key(id)));
    assert_eq!(rows.len(), 5);
}

#[tokio::test]
async fn test_reupload_after_crash_keeps_one_row_per_id() {
    let (dir, log, archive, scheduler) = setup();
    let ctx = ArchiveContext::new("b1", "finance");
    let ids = append(&log, &ctx, 2).await;

    // Keep a copy of the closed segment to simulate a crash before discard
    let segment = log.rotate(&ctx).await.unwrap().unwrap();
    let content = std::fs::read_to_string(&segment).unwrap();
    scheduler.run_cycle().await.unwrap();
    let first = archive.rows();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let replay = dir.path().join("b1/finance/archive/0000000000000-replay.jsonl");
    std::fs::write(&replay, content.replace("\"meta\":{}", "\"meta\":{\"replayed\":true}")).unwrap();
    scheduler.run_cycle().await.unwrap();
    let second = archive.rows();

    assert_eq!(second.len(), 2);
    for id in &ids {
        let (before, after) = (&first[id], &second[id]);
        assert_eq!(after.record, before.record);
        assert_eq!(after.action, before.action);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.branch_id, "b1");
        assert_eq!(after.meta, json!({"replayed": true}));
        assert!(after.recorded_at > before.recorded_at);
    }
    assert!(!replay.exists());
}

#[tokio::test]
async fn test_quiet_context_causes_no_store_interaction() {
    let (_dir, log, archive, scheduler) = setup();
    let ctx = ArchiveContext::new("b1", "finance");
    append(&log, &ctx, 1).await;
    scheduler.run_cycle().await.unwrap();
    let upserts = archive.upsert_calls();

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.rotated, 0);
    assert_eq!(archive.upsert_calls(), upserts);
}

#[tokio::test]
async fn test_scheduler_stops_on_cancel() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(FileEventLog::new(dir.path()));
    let archive = Arc::new(MemoryArchiveStore::default());
    let ctx = ArchiveContext::new("b1", "finance");
    append(&log, &ctx, 1).await;

    let shutdown = CancellationToken::new();
    let scheduler = ArchiveScheduler::new(
        log.clone(),
        archive.clone(),
        Duration::from_millis(20),
        shutdown.clone(),
    );
    let handle = tokio::spawn(scheduler.run());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(archive.rows().len(), 1);

    // Entries written while running are archived by a later tick
    append(&log, &ctx, 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(archive.rows().len(), 2);

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(archive.is_closed());
}
