//! Event log segments on disk
//!
//! ```text
//! <root>/<branch>/<module>/events.jsonl                  open segment
//! <root>/<branch>/<module>/archive/<millis>-<uuid>.jsonl closed segments
//! ```
//!
//! Appends and rotations on the same context are serialized by a per-context
//! async lock, so a rotation never splits a line.

use super::{ArchiveError, ArchiveResult};
use async_trait::async_trait;
use dashmap::DashMap;
use shared::event::{ArchiveContext, EventLogEntry};
use shared::util::now_millis;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const OPEN_SEGMENT: &str = "events.jsonl";
const ARCHIVE_DIR: &str = "archive";
const SEGMENT_EXT: &str = "jsonl";

/// Event-log collaborator used by the archiver
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Every context with an open or closed segment
    async fn list_contexts(&self) -> ArchiveResult<Vec<ArchiveContext>>;

    async fn append(&self, context: &ArchiveContext, entry: &EventLogEntry) -> ArchiveResult<()>;

    /// Close the open segment; `None` when nothing was written
    async fn rotate(&self, context: &ArchiveContext) -> ArchiveResult<Option<PathBuf>>;

    /// Closed segments, oldest first
    async fn list_closed_segments(&self, context: &ArchiveContext) -> ArchiveResult<Vec<PathBuf>>;

    async fn read_segment(&self, path: &Path) -> ArchiveResult<Vec<EventLogEntry>>;

    async fn discard_segment(&self, path: &Path) -> ArchiveResult<()>;
}

/// JSON-lines event log rooted at a directory
pub struct FileEventLog {
    root: PathBuf,
    locks: DashMap<ArchiveContext, Arc<Mutex<()>>>,
}

impl FileEventLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_for(&self, context: &ArchiveContext) -> Arc<Mutex<()>> {
        self.locks
            .entry(context.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn context_dir(&self, context: &ArchiveContext) -> ArchiveResult<PathBuf> {
        check_component(&context.branch_id)?;
        check_component(&context.module_id)?;
        Ok(self.root.join(&context.branch_id).join(&context.module_id))
    }

    /// Path of the open segment for `context`
    pub fn open_segment(&self, context: &ArchiveContext) -> ArchiveResult<PathBuf> {
        Ok(self.context_dir(context)?.join(OPEN_SEGMENT))
    }
}

/// Context ids become directory names
fn check_component(component: &str) -> ArchiveResult<()> {
    let invalid = component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\']);
    if invalid {
        return Err(ArchiveError::InvalidContext(component.to_string()));
    }
    Ok(())
}

async fn subdirs(dir: &Path) -> ArchiveResult<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(ArchiveError::io(dir)(e)),
    };

    while let Some(entry) = entries.next_entry().await.map_err(ArchiveError::io(dir))? {
        let is_dir = entry
            .file_type()
            .await
            .map_err(ArchiveError::io(&entry.path()))?
            .is_dir();
        if is_dir && let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl EventLog for FileEventLog {
    async fn list_contexts(&self) -> ArchiveResult<Vec<ArchiveContext>> {
        let mut contexts = Vec::new();
        for branch in subdirs(&self.root).await? {
            for module in subdirs(&self.root.join(&branch)).await? {
                contexts.push(ArchiveContext::new(branch.clone(), module));
            }
        }
        Ok(contexts)
    }

    async fn append(&self, context: &ArchiveContext, entry: &EventLogEntry) -> ArchiveResult<()> {
        let dir = self.context_dir(context)?;
        let path = dir.join(OPEN_SEGMENT);

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let lock = self.lock_for(context);
        let _guard = lock.lock().await;

        fs::create_dir_all(&dir).await.map_err(ArchiveError::io(&dir))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(ArchiveError::io(&path))?;
        file.write_all(&line).await.map_err(ArchiveError::io(&path))?;
        file.flush().await.map_err(ArchiveError::io(&path))?;
        Ok(())
    }

    async fn rotate(&self, context: &ArchiveContext) -> ArchiveResult<Option<PathBuf>> {
        let dir = self.context_dir(context)?;
        let open = dir.join(OPEN_SEGMENT);

        let lock = self.lock_for(context);
        let _guard = lock.lock().await;

        let len = match fs::metadata(&open).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ArchiveError::io(&open)(e)),
        };
        if len == 0 {
            return Ok(None);
        }

        let archive_dir = dir.join(ARCHIVE_DIR);
        fs::create_dir_all(&archive_dir)
            .await
            .map_err(ArchiveError::io(&archive_dir))?;

        // Zero-padded millis keep lexical order chronological
        let closed = archive_dir.join(format!(
            "{:013}-{}.{SEGMENT_EXT}",
            now_millis(),
            uuid::Uuid::new_v4()
        ));
        fs::rename(&open, &closed).await.map_err(ArchiveError::io(&open))?;

        tracing::debug!(context = %context, segment = %closed.display(), "Rotated event log");
        Ok(Some(closed))
    }

    async fn list_closed_segments(&self, context: &ArchiveContext) -> ArchiveResult<Vec<PathBuf>> {
        let archive_dir = self.context_dir(context)?.join(ARCHIVE_DIR);
        let mut entries = match fs::read_dir(&archive_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArchiveError::io(&archive_dir)(e)),
        };

        let mut segments = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(ArchiveError::io(&archive_dir))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(SEGMENT_EXT) {
                segments.push(path);
            }
        }
        segments.sort();
        Ok(segments)
    }

    async fn read_segment(&self, path: &Path) -> ArchiveResult<Vec<EventLogEntry>> {
        // Decoded per line, so a torn multi-byte tail only costs its own line
        let content = fs::read(path).await.map_err(ArchiveError::io(path))?;

        let mut entries = Vec::new();
        for (index, line) in content.split(|b| *b == b'\n').enumerate() {
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<EventLogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(
                        segment = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping malformed event log line"
                    );
                }
            }
        }
        Ok(entries)
    }

    async fn discard_segment(&self, path: &Path) -> ArchiveResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ArchiveError::io(path)(e)),
        }
    }
}
