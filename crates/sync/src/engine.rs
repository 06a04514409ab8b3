//! Push and pull orchestration.

use crate::error::{ErrorKind, Result};
use crate::executor::{ProgressFn, TransferExecutor, TransferReport, UploadReport};
use crate::marker::WorkspaceMarker;
use crate::plan::{ConflictPolicy, SyncPlan, generate_plan};
use packrat_blob::BlobHandle;
use packrat_proto::{AuthorityHandle, CommitReceipt, CommitRequest, HandshakeRequest, version};
use packrat_scan::{LocalFileRecord, RuleSet, scan_tree};
use std::collections::HashSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Everything a push needs besides the tree itself.
#[derive(Debug, Clone)]
pub struct PushOptions {
    pub project: String,
    /// Explicit version tag. `None` auto-increments from the project's
    /// latest.
    pub tag: Option<String>,
    pub message: String,
    pub author: String,
}

/// What a completed push did.
#[derive(Debug)]
pub struct PushOutcome {
    /// The tag actually committed (normalized or auto-incremented).
    pub tag: String,
    pub receipt: CommitReceipt,
    pub uploads: UploadReport,
}

/// What a completed pull did.
#[derive(Debug)]
pub struct PullOutcome {
    pub plan: SyncPlan,
    pub report: TransferReport,
}

/// The two sync flows, wired over an authority and a blob store.
///
/// Push: scan → validate tag → handshake → upload the novel content → commit.
/// Pull: checkout → plan → execute → record the workspace marker.
pub struct SyncEngine {
    authority: AuthorityHandle,
    executor: TransferExecutor,
    policy: ConflictPolicy,
}

impl SyncEngine {
    pub fn new(authority: AuthorityHandle, blob: BlobHandle) -> Self {
        Self { authority, executor: TransferExecutor::new(blob), policy: ConflictPolicy::default() }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.executor = self.executor.with_workers(workers);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.executor = self.executor.with_cancellation(cancel);
        self
    }

    /// Snapshot the tree at `root` as a new immutable version of the project.
    ///
    /// The tag is validated against existing versions before any scanning or
    /// transfer, so a doomed push costs nothing. Content the system already
    /// holds (anywhere, in any project) is never re-uploaded, and a novel
    /// hash shared by several paths uploads only once. Any upload failure
    /// aborts before commit: uncommitted partial state is safer than a commit
    /// referencing missing content.
    pub async fn push(
        &self,
        root: impl AsRef<Path>,
        options: PushOptions,
        progress: ProgressFn<'_>,
    ) -> Result<PushOutcome> {
        let root = root.as_ref();
        let existing = self.authority.list_versions(&options.project).await.map_err(ErrorKind::authority)?;
        let tag = match &options.tag {
            Some(tag) => version::validate(tag, &existing).map_err(ErrorKind::authority)?,
            None => version::increment(existing.first().map(String::as_str)),
        };

        let rules = RuleSet::load(root).await.map_err(ErrorKind::scan)?;
        let outcome = scan_tree(root, &rules).await.map_err(ErrorKind::scan)?;
        let manifest = outcome.manifest();
        tracing::info!(
            project = %options.project,
            %tag,
            files = manifest.len(),
            skipped = outcome.skipped.len(),
            "pushing tree"
        );

        let response = self
            .authority
            .handshake(HandshakeRequest { project: options.project.clone(), manifest: manifest.clone() })
            .await
            .map_err(ErrorKind::authority)?;
        let required: HashSet<&str> = response.required_paths.iter().map(String::as_str).collect();
        // One physical upload per novel hash, no matter how many paths
        // share it.
        let mut unique = HashSet::new();
        let to_upload: Vec<LocalFileRecord> = outcome
            .files
            .iter()
            .filter(|f| required.contains(f.path.as_str()))
            .filter(|f| unique.insert(f.hash.clone()))
            .cloned()
            .collect();

        let uploads = self.executor.execute_uploads(&self.authority, &to_upload, progress).await;
        if uploads.transfers.cancelled > 0 {
            exn::bail!(ErrorKind::Cancelled);
        }
        if uploads.transfers.failed > 0 {
            exn::bail!(ErrorKind::UploadFailed(uploads.transfers.failed));
        }

        let receipt = self
            .authority
            .commit(CommitRequest {
                project: options.project.clone(),
                tag: tag.clone(),
                message: options.message.clone(),
                author: options.author.clone(),
                manifest,
                allow_partial: false,
            })
            .await
            .map_err(ErrorKind::authority)?;
        Ok(PushOutcome { tag, receipt, uploads })
    }

    /// Bring the tree at `root` to the named version of the project.
    ///
    /// Content already on local disk (at the right path, or anywhere else) is
    /// reused; only genuinely missing content is downloaded. Per-file
    /// failures land in the report rather than aborting the batch. The
    /// workspace marker is only rewritten after a fully clean run.
    pub async fn pull(
        &self,
        root: impl AsRef<Path>,
        project: &str,
        tag: &str,
        progress: ProgressFn<'_>,
    ) -> Result<PullOutcome> {
        let root = root.as_ref();
        let manifest = self.authority.checkout(project, tag).await.map_err(ErrorKind::authority)?;
        tokio::fs::create_dir_all(root).await.map_err(ErrorKind::Io)?;
        let plan = generate_plan(&manifest, root, self.policy).await?;
        let report = self.executor.execute_plan(&plan, progress).await;
        if report.is_clean() {
            WorkspaceMarker::new(project, tag).write(root).await?;
        }
        Ok(PullOutcome { plan, report })
    }

    /// All version tags of a project, newest first.
    pub async fn versions(&self, project: &str) -> Result<Vec<String>> {
        self.authority.list_versions(project).await.map_err(ErrorKind::authority)
    }
}
