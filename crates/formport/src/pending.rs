use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

/// A file produced by a converter. Never touches disk before the join.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Output-relative path.
    pub path: PathBuf,
    #[serde(skip)]
    pub content: Vec<u8>,
}

impl GeneratedFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn text(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self::new(path, content.into().into_bytes())
    }

    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// A source file to delete, pruning emptied parents up to `limit`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingDeletion {
    pub path: PathBuf,
    pub limit: PathBuf,
}

/// Deletions and writes appended by every file task, drained once after the
/// join.
#[derive(Default)]
pub struct PendingWork {
    deletions: Mutex<Vec<PendingDeletion>>,
    /// Each write with the source file that produced it.
    writes: Mutex<Vec<(PathBuf, GeneratedFile)>>,
}

impl PendingWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_deletion(&self, deletion: PendingDeletion) {
        self.deletions.lock().push(deletion);
    }

    pub fn push_writes(&self, source: &Path, files: impl IntoIterator<Item = GeneratedFile>) {
        self.writes
            .lock()
            .extend(files.into_iter().map(|file| (source.to_path_buf(), file)));
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.lock().len()
    }

    /// Takes everything accumulated so far, sorted so the apply phase never
    /// depends on task completion order. Writes sharing an output path are
    /// ordered by source path; the last one lands on disk.
    pub fn drain(&self) -> (Vec<PendingDeletion>, Vec<GeneratedFile>) {
        let mut deletions = std::mem::take(&mut *self.deletions.lock());
        let mut writes = std::mem::take(&mut *self.writes.lock());
        deletions.sort();
        writes.sort_by(|(a_source, a), (b_source, b)| {
            a.path.cmp(&b.path).then_with(|| a_source.cmp(b_source))
        });
        for pair in writes.windows(2) {
            let [(first, earlier), (second, later)] = pair else {
                continue;
            };
            if earlier.path == later.path {
                warn!(
                    path = %later.path.display(),
                    replaced = %first.display(),
                    kept = %second.display(),
                    "several sources produce the same output path"
                );
            }
        }
        (deletions, writes.into_iter().map(|(_, file)| file).collect())
    }
}
