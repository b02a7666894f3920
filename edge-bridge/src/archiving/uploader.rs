//! Upload of one closed segment

use super::{ArchiveResult, ArchiveStore, EventLog};
use chrono::Utc;
use shared::event::ArchiveContext;
use std::path::Path;

/// What happened to a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No entries; discarded without touching the store
    Empty,
    /// Entries committed, segment discarded
    Uploaded(usize),
}

/// Upload `segment` and discard it.
///
/// On error the segment stays on disk and is retried by a later cycle. The
/// store upsert is keyed by entry id, so a retry after a crash between commit
/// and discard does not duplicate rows.
pub async fn upload_segment(
    log: &dyn EventLog,
    store: &dyn ArchiveStore,
    context: &ArchiveContext,
    segment: &Path,
) -> ArchiveResult<UploadOutcome> {
    let entries = log.read_segment(segment).await?;
    if entries.is_empty() {
        log.discard_segment(segment).await?;
        tracing::debug!(context = %context, segment = %segment.display(), "Discarded empty segment");
        return Ok(UploadOutcome::Empty);
    }

    let count = store.upsert_batch(context, &entries, Utc::now()).await?;
    log.discard_segment(segment).await?;

    tracing::info!(
        branch_id = %context.branch_id,
        module_id = %context.module_id,
        segment = %segment.display(),
        events = count,
        "Archived event log segment"
    );
    Ok(UploadOutcome::Uploaded(count))
}
