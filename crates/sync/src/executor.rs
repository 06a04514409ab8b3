//! Concurrent transfer execution.
//!
//! Runs the active tasks of a [`SyncPlan`] (and, in the other direction,
//! upload batches) on a bounded pool of concurrent transfers. Tasks are
//! isolated: each owns its source and destination paths exclusively, so a
//! failing file never aborts the rest of the batch. Completion order is
//! unspecified; the aggregate report is deterministic regardless.

use crate::error::{ErrorKind, Result};
use crate::plan::{Acquisition, ConflictDisposition, SyncAction, SyncPlan, SyncTask};
use futures::StreamExt;
use futures::TryStreamExt;
use futures::stream::FuturesUnordered;
use packrat_blob::{BlobHandle, ByteStream};
use packrat_proto::{AuthorityHandle, BlobLocator, ConfirmUpload};
use packrat_scan::{LocalFileRecord, hash_file};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

/// Default transfer concurrency, suited to a typical NIC/disk pairing.
pub const DEFAULT_WORKERS: usize = 8;

/// Callback invoked once per settled task with (completed, total, path).
///
/// Invocations are serialized: results are consumed in a single loop even
/// though transfers complete concurrently and out of order.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u64, u64, &str) + Send);

/// How one task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    /// Terminal before any work: destination up to date, or a conflict the
    /// policy said to keep.
    Skipped,
    Failed(String),
    /// Abandoned because the batch was cancelled before this task ran (or
    /// mid-download).
    Cancelled,
}

/// One per-file outcome, reported individually.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub path: String,
    pub outcome: TaskOutcome,
}

/// Batch-level aggregate, produced even when some tasks fail.
#[derive(Debug, Default)]
pub struct TransferReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub results: Vec<TaskResult>,
}

impl TransferReport {
    fn record(&mut self, result: TaskResult) {
        match &result.outcome {
            TaskOutcome::Succeeded => self.succeeded += 1,
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
        }
        self.results.push(result);
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// No failures and nothing abandoned.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

/// An upload batch's aggregate plus the confirmations already persisted.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub transfers: TransferReport,
    /// One confirmation per successfully uploaded asset, already recorded
    /// with the metadata authority.
    pub confirmed: Vec<ConfirmUpload>,
}

fn backup_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(format!(".{}.bak", time::UtcDateTime::now().unix_timestamp()));
    PathBuf::from(name)
}

/// Bounded-concurrency executor over a blob store.
pub struct TransferExecutor {
    blob: BlobHandle,
    workers: usize,
    cancel: CancellationToken,
}

impl TransferExecutor {
    pub fn new(blob: BlobHandle) -> Self {
        Self { blob, workers: DEFAULT_WORKERS, cancel: CancellationToken::new() }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Attach an external cancellation token. Cancelling abandons queued
    /// tasks and stops in-flight downloads at the next chunk boundary; both
    /// are reported as [`TaskOutcome::Cancelled`], never silently dropped.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute a plan: settle terminal tasks immediately, then run the active
    /// ones at bounded concurrency. Per-file failures land in the report, not
    /// in an error.
    pub async fn execute_plan(&self, plan: &SyncPlan, progress: ProgressFn<'_>) -> TransferReport {
        let total = plan.tasks.len() as u64;
        let mut completed = 0u64;
        let mut report = TransferReport::default();

        for task in plan.tasks.iter().filter(|t| t.is_terminal()) {
            completed += 1;
            progress(completed, total, &task.path);
            report.record(TaskResult { path: task.path.clone(), outcome: TaskOutcome::Skipped });
        }

        let mut queued: Vec<_> = plan.tasks.iter().filter(|t| !t.is_terminal()).map(|t| self.run_task(t)).collect();
        let mut in_flight = FuturesUnordered::new();
        in_flight.extend(queued.drain(..self.workers.min(queued.len())));
        while let Some(result) = in_flight.next().await {
            completed += 1;
            progress(completed, total, &result.path);
            report.record(result);
            // Pop-n-push, but FIFO instead of LIFO.
            if !queued.is_empty() {
                in_flight.push(queued.remove(0));
            }
        }

        tracing::info!(
            project = %plan.project,
            tag = %plan.tag,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "plan executed"
        );
        report
    }

    async fn run_task(&self, task: &SyncTask) -> TaskResult {
        if self.cancel.is_cancelled() {
            return TaskResult { path: task.path.clone(), outcome: TaskOutcome::Cancelled };
        }
        let outcome = match self.transfer(task).await {
            Ok(()) => TaskOutcome::Succeeded,
            Err(err) if matches!(&*err, ErrorKind::Cancelled) => TaskOutcome::Cancelled,
            Err(err) => {
                tracing::warn!(path = %task.path, %err, "transfer failed");
                TaskOutcome::Failed(err.to_string())
            },
        };
        TaskResult { path: task.path.clone(), outcome }
    }

    async fn transfer(&self, task: &SyncTask) -> Result<()> {
        let SyncAction::Acquire { method, conflict } = &task.action else {
            return Ok(());
        };
        // Resolve the conflict first, acquire second.
        if tokio::fs::try_exists(&task.destination).await.map_err(ErrorKind::Io)? {
            match conflict {
                ConflictDisposition::Untouched => {},
                ConflictDisposition::BackupExisting => {
                    let backup = backup_path(&task.destination);
                    tokio::fs::rename(&task.destination, &backup).await.map_err(ErrorKind::Io)?;
                    tracing::info!(path = %task.path, backup = %backup.display(), "backed up conflicting file");
                },
                ConflictDisposition::DeleteExisting => {
                    tokio::fs::remove_file(&task.destination).await.map_err(ErrorKind::Io)?;
                },
            }
        }
        if let Some(parent) = task.destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        }
        match method {
            Acquisition::LocalCopy { source } => {
                tokio::fs::copy(source, &task.destination).await.map_err(ErrorKind::Io)?;
                Ok(())
            },
            Acquisition::Download { locator } => self.download(task, locator).await,
        }
    }

    async fn download(&self, task: &SyncTask, locator: &BlobLocator) -> Result<()> {
        let mut stream = self.blob.get(locator).await.map_err(ErrorKind::blob)?;
        let mut file = tokio::fs::File::create(&task.destination).await.map_err(ErrorKind::Io)?;
        let mut written = 0u64;
        while let Some(chunk) = stream.try_next().await.map_err(ErrorKind::Io)? {
            if self.cancel.is_cancelled() {
                exn::bail!(ErrorKind::Cancelled);
            }
            file.write_all(&chunk).await.map_err(ErrorKind::Io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(ErrorKind::Io)?;
        drop(file);
        // A mismatch is a failure even though bytes were written; the corrupt
        // file stays on disk for inspection.
        if written != task.size {
            exn::bail!(ErrorKind::Integrity {
                path: task.path.clone(),
                detail: format!("expected {} bytes, wrote {written}", task.size),
            });
        }
        let actual = hash_file(&task.destination).await.map_err(ErrorKind::scan)?;
        if actual != task.hash {
            exn::bail!(ErrorKind::Integrity {
                path: task.path.clone(),
                detail: "content hash mismatch after download".to_string(),
            });
        }
        Ok(())
    }

    /// Upload a batch of local files, confirming each with the authority as
    /// it lands. The report's `confirmed` list is what actually made it; a
    /// caller seeing any failure should not commit.
    pub async fn execute_uploads(
        &self,
        authority: &AuthorityHandle,
        files: &[LocalFileRecord],
        progress: ProgressFn<'_>,
    ) -> UploadReport {
        let total = files.len() as u64;
        let mut completed = 0u64;
        let mut report = UploadReport::default();

        let mut queued: Vec<_> = files.iter().map(|f| self.upload_one(authority, f)).collect();
        let mut in_flight = FuturesUnordered::new();
        in_flight.extend(queued.drain(..self.workers.min(queued.len())));
        while let Some((result, confirmation)) = in_flight.next().await {
            completed += 1;
            progress(completed, total, &result.path);
            report.transfers.record(result);
            report.confirmed.extend(confirmation);
            if !queued.is_empty() {
                in_flight.push(queued.remove(0));
            }
        }

        tracing::info!(
            uploaded = report.transfers.succeeded,
            failed = report.transfers.failed,
            cancelled = report.transfers.cancelled,
            "upload batch executed"
        );
        report
    }

    async fn upload_one(
        &self,
        authority: &AuthorityHandle,
        record: &LocalFileRecord,
    ) -> (TaskResult, Option<ConfirmUpload>) {
        if self.cancel.is_cancelled() {
            return (TaskResult { path: record.path.clone(), outcome: TaskOutcome::Cancelled }, None);
        }
        match self.upload(authority, record).await {
            Ok(confirmation) => {
                (TaskResult { path: record.path.clone(), outcome: TaskOutcome::Succeeded }, Some(confirmation))
            },
            Err(_) if self.cancel.is_cancelled() => {
                (TaskResult { path: record.path.clone(), outcome: TaskOutcome::Cancelled }, None)
            },
            Err(err) => {
                tracing::warn!(path = %record.path, %err, "upload failed");
                (TaskResult { path: record.path.clone(), outcome: TaskOutcome::Failed(err.to_string()) }, None)
            },
        }
    }

    async fn upload(&self, authority: &AuthorityHandle, record: &LocalFileRecord) -> Result<ConfirmUpload> {
        let locator = BlobLocator::for_hash(&record.hash);
        let file = tokio::fs::File::open(&record.absolute).await.map_err(ErrorKind::Io)?;
        let cancel = self.cancel.clone();
        let stream: ByteStream = Box::pin(ReaderStream::new(file).map(move |chunk| {
            if cancel.is_cancelled() {
                return Err(std::io::Error::other("upload cancelled"));
            }
            chunk
        }));
        self.blob.put(&locator, record.size, stream).await.map_err(ErrorKind::blob)?;
        let confirmation = ConfirmUpload::for_entry(record.manifest());
        authority.confirm_upload(confirmation.clone()).await.map_err(ErrorKind::authority)?;
        Ok(confirmation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packrat_blob::MockBlobStore;
    use std::sync::Arc;

    fn hash_of(data: &[u8]) -> String {
        blake3::hash(data).to_hex().to_string()
    }

    fn download_task(root: &Path, rel: &str, data: &[u8], conflict: ConflictDisposition) -> SyncTask {
        let hash = hash_of(data);
        SyncTask {
            path: rel.to_string(),
            hash: hash.clone(),
            size: data.len() as u64,
            destination: root.join(rel),
            action: SyncAction::Acquire {
                method: Acquisition::Download { locator: BlobLocator::for_hash(&hash) },
                conflict,
            },
        }
    }

    fn plan_of(tasks: Vec<SyncTask>) -> SyncPlan {
        SyncPlan { project: "film".to_string(), tag: "v1.0".to_string(), tasks }
    }

    fn store_with(blobs: &[&[u8]]) -> Arc<MockBlobStore> {
        Arc::new(MockBlobStore::with_blobs(
            blobs.iter().map(|data| (BlobLocator::for_hash(&hash_of(data)), data.to_vec())),
        ))
    }

    #[tokio::test]
    async fn test_download_writes_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&[b"alpha"]);
        let executor = TransferExecutor::new(store);
        let plan = plan_of(vec![download_task(dir.path(), "d/a.bin", b"alpha", ConflictDisposition::Untouched)]);
        let report = executor.execute_plan(&plan, &mut |_, _, _| {}).await;
        assert_eq!(report.succeeded, 1);
        assert!(report.is_clean());
        assert_eq!(tokio::fs::read(dir.path().join("d/a.bin")).await.unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&[b"alpha", b"beta", b"gamma"]);
        let executor = TransferExecutor::new(store).with_workers(2);
        let plan = plan_of(vec![
            download_task(dir.path(), "a.bin", b"alpha", ConflictDisposition::Untouched),
            download_task(dir.path(), "b.bin", b"beta", ConflictDisposition::Untouched),
            download_task(dir.path(), "c.bin", b"gamma", ConflictDisposition::Untouched),
        ]);
        let mut seen = Vec::new();
        let report = executor.execute_plan(&plan, &mut |done, total, _| seen.push((done, total))).await;
        assert_eq!(report.total(), 3);
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_local_copy_never_touches_the_store() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("source.bin"), b"alpha").await.unwrap();
        // Empty store: any download attempt would fail.
        let executor = TransferExecutor::new(Arc::new(MockBlobStore::default()));
        let hash = hash_of(b"alpha");
        let plan = plan_of(vec![SyncTask {
            path: "copied.bin".to_string(),
            hash,
            size: 5,
            destination: dir.path().join("copied.bin"),
            action: SyncAction::Acquire {
                method: Acquisition::LocalCopy { source: dir.path().join("source.bin") },
                conflict: ConflictDisposition::Untouched,
            },
        }]);
        let report = executor.execute_plan(&plan, &mut |_, _, _| {}).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(tokio::fs::read(dir.path().join("copied.bin")).await.unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn test_backup_disposition_renames_aside() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.bin"), b"stale local edit").await.unwrap();
        let store = store_with(&[b"alpha"]);
        let executor = TransferExecutor::new(store);
        let plan = plan_of(vec![download_task(dir.path(), "a.bin", b"alpha", ConflictDisposition::BackupExisting)]);
        let report = executor.execute_plan(&plan, &mut |_, _, _| {}).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(tokio::fs::read(dir.path().join("a.bin")).await.unwrap(), b"alpha");
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        let backup = names.iter().find(|n| n.starts_with("a.bin.") && n.ends_with(".bak")).unwrap();
        assert_eq!(tokio::fs::read(dir.path().join(backup)).await.unwrap(), b"stale local edit");
    }

    #[tokio::test]
    async fn test_delete_disposition_leaves_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.bin"), b"stale local edit").await.unwrap();
        let store = store_with(&[b"alpha"]);
        let executor = TransferExecutor::new(store);
        let plan = plan_of(vec![download_task(dir.path(), "a.bin", b"alpha", ConflictDisposition::DeleteExisting)]);
        executor.execute_plan(&plan, &mut |_, _, _| {}).await;
        assert_eq!(tokio::fs::read(dir.path().join("a.bin")).await.unwrap(), b"alpha");
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_terminal_tasks_are_counted_not_run() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("kept.bin"), b"local").await.unwrap();
        let executor = TransferExecutor::new(Arc::new(MockBlobStore::default()));
        let plan = plan_of(vec![SyncTask {
            path: "kept.bin".to_string(),
            hash: hash_of(b"other"),
            size: 5,
            destination: dir.path().join("kept.bin"),
            action: SyncAction::KeepLocal,
        }]);
        let report = executor.execute_plan(&plan, &mut |_, _, _| {}).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(tokio::fs::read(dir.path().join("kept.bin")).await.unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_corrupt_download_fails_but_stays_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&[b"alpha"]);
        // Same length, different bytes: the size check passes, the hash
        // check must not.
        store.poison(&BlobLocator::for_hash(&hash_of(b"alpha")), *b"bravo").await;
        let executor = TransferExecutor::new(store);
        let plan = plan_of(vec![download_task(dir.path(), "a.bin", b"alpha", ConflictDisposition::Untouched)]);
        let report = executor.execute_plan(&plan, &mut |_, _, _| {}).await;
        assert_eq!(report.failed, 1);
        assert!(matches!(&report.results[0].outcome, TaskOutcome::Failed(reason) if reason.contains("integrity")));
        assert_eq!(tokio::fs::read(dir.path().join("a.bin")).await.unwrap(), b"bravo");
    }

    #[tokio::test]
    async fn test_truncated_download_is_a_size_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&[b"alp"]);
        let executor = TransferExecutor::new(store);
        // Task expects 5 bytes but the stored blob has 3.
        let mut task = download_task(dir.path(), "a.bin", b"alpha", ConflictDisposition::Untouched);
        task.action = SyncAction::Acquire {
            method: Acquisition::Download { locator: BlobLocator::for_hash(&hash_of(b"alp")) },
            conflict: ConflictDisposition::Untouched,
        };
        let report = executor.execute_plan(&plan_of(vec![task]), &mut |_, _, _| {}).await;
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn test_one_failure_never_aborts_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&[b"alpha"]);
        let executor = TransferExecutor::new(store);
        let plan = plan_of(vec![
            download_task(dir.path(), "missing.bin", b"never uploaded", ConflictDisposition::Untouched),
            download_task(dir.path(), "a.bin", b"alpha", ConflictDisposition::Untouched),
        ]);
        let report = executor.execute_plan(&plan, &mut |_, _, _| {}).await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(tokio::fs::read(dir.path().join("a.bin")).await.unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_abandons_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(&[b"alpha"]);
        let executor = TransferExecutor::new(store);
        executor.cancellation_token().cancel();
        let plan = plan_of(vec![download_task(dir.path(), "a.bin", b"alpha", ConflictDisposition::Untouched)]);
        let report = executor.execute_plan(&plan, &mut |_, _, _| {}).await;
        assert_eq!(report.cancelled, 1);
        assert!(!report.is_clean());
        assert!(!dir.path().join("a.bin").exists());
    }
}
