//! Concurrent chunk transfer over a bounded worker pool.
//!
//! Workers pull chunk indices from a shared counter, so at most
//! `concurrency` chunks are in flight and no worker ever waits on a queue
//! lock. Local I/O is positional and runs on the blocking pool.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TransferError;
use crate::checksum::{ChecksumStatus, file_md5, verify_checksum};
use crate::chunked::{ChunkDescriptor, LocalFile};
use crate::remote::{ObjectCommit, RemoteObject};
use crate::types::{Direction, TransferJob};

/// Result of a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub job_id: String,
    pub direction: Direction,
    pub bytes_transferred: u64,
    pub checksum: ChecksumStatus,
    /// Non-fatal conditions the caller should surface.
    pub warnings: Vec<String>,
}

/// Runs [`TransferJob`]s.
///
/// Any chunk failure aborts the job: remaining workers stop pulling new
/// chunks, in-flight chunks finish, and the first error is returned.
/// Already transferred chunks are left in place.
pub struct TransferEngine {
    cancel: CancellationToken,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl TransferEngine {
    /// Creates an engine stopped by `cancel`.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Returns a clone of the engine's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `job` in its planned direction.
    ///
    /// Uploads read from `local`; downloads write into it (it should be
    /// pre-sized with [`LocalFile::create`]). With `checksum_requested`, an
    /// upload attaches the MD5 of the source and a download verifies the
    /// reassembled bytes against the stored MD5.
    pub async fn execute(
        &self,
        job: Arc<TransferJob>,
        local: Arc<LocalFile>,
        remote: Arc<dyn RemoteObject>,
        checksum_requested: bool,
    ) -> Result<TransferOutcome, TransferError> {
        let result = match job.direction() {
            Direction::Upload => self.upload(&job, local, remote, checksum_requested).await,
            Direction::Download => self.download(&job, local, remote, checksum_requested).await,
        };

        match &result {
            Ok(outcome) => {
                job.complete();
                info!(
                    job = %job.id(),
                    object = %job.name(),
                    direction = ?job.direction(),
                    bytes = outcome.bytes_transferred,
                    elapsed_ms = job.elapsed().as_millis() as u64,
                    "transfer completed"
                );
            }
            Err(e) => {
                job.fail();
                warn!(
                    job = %job.id(),
                    object = %job.name(),
                    direction = ?job.direction(),
                    error = %e,
                    "transfer failed"
                );
            }
        }
        result
    }

    async fn upload(
        &self,
        job: &Arc<TransferJob>,
        source: Arc<LocalFile>,
        remote: Arc<dyn RemoteObject>,
        content_hash: bool,
    ) -> Result<TransferOutcome, TransferError> {
        let layout = job.layout();
        let kind = layout.kind();

        if let Some(existing) = remote.properties().await?
            && existing.kind != kind
        {
            return Err(TransferError::TypeMismatch {
                name: remote.name().to_string(),
                expected: kind,
                actual: existing.kind,
            });
        }

        let source_len = source.len()?;
        if source_len < job.total_bytes() {
            return Err(TransferError::Validation(format!(
                "source is {source_len} bytes, job expects {}",
                job.total_bytes()
            )));
        }

        remote
            .create(kind, layout.remote_size(job.total_bytes()))
            .await?;
        job.start();

        // The source is hashed sequentially alongside the chunk workers.
        let digest_task = content_hash.then(|| spawn_file_md5(&source, job.total_bytes()));

        let worker_remote = Arc::clone(&remote);
        self.run_workers(job, move |chunk| {
            let source = Arc::clone(&source);
            let remote = Arc::clone(&worker_remote);
            async move {
                let data = if chunk.length == 0 {
                    Vec::new()
                } else {
                    tokio::task::spawn_blocking(move || source.read_at(chunk.offset, chunk.length))
                        .await
                        .map_err(|e| TransferError::Worker(e.to_string()))??
                };
                if let Some(write) = layout.prepare(&chunk, data) {
                    remote.write_chunk(write).await?;
                }
                Ok(chunk.length)
            }
        })
        .await?;

        let content_md5 = match digest_task {
            Some(task) => Some(
                task.await
                    .map_err(|e| TransferError::Worker(e.to_string()))??,
            ),
            None => None,
        };

        let commit = ObjectCommit {
            kind,
            size: job.total_bytes(),
            block_ids: layout.block_ids(job.chunks()),
            content_md5: content_md5.clone(),
        };
        debug!(
            job = %job.id(),
            blocks = commit.block_ids.len(),
            md5 = ?commit.content_md5,
            "committing object"
        );
        remote.commit(commit).await?;

        let checksum = match content_md5 {
            Some(md5) => ChecksumStatus::Attached { md5 },
            None => ChecksumStatus::NotRequested,
        };
        Ok(TransferOutcome {
            job_id: job.id().to_string(),
            direction: Direction::Upload,
            bytes_transferred: job.transferred_bytes(),
            checksum,
            warnings: Vec::new(),
        })
    }

    async fn download(
        &self,
        job: &Arc<TransferJob>,
        dest: Arc<LocalFile>,
        remote: Arc<dyn RemoteObject>,
        verify: bool,
    ) -> Result<TransferOutcome, TransferError> {
        let props = remote
            .properties()
            .await?
            .ok_or_else(|| TransferError::NotFound(remote.name().to_string()))?;

        let kind = job.layout().kind();
        if props.kind != kind {
            return Err(TransferError::TypeMismatch {
                name: props.name,
                expected: kind,
                actual: props.kind,
            });
        }
        if props.size != job.total_bytes() {
            return Err(TransferError::Validation(format!(
                "{} is {} bytes, job was planned for {}",
                props.name,
                props.size,
                job.total_bytes()
            )));
        }

        job.start();

        let worker_remote = Arc::clone(&remote);
        let worker_dest = Arc::clone(&dest);
        self.run_workers(job, move |chunk| {
            let dest = Arc::clone(&worker_dest);
            let remote = Arc::clone(&worker_remote);
            async move {
                if chunk.length == 0 {
                    return Ok(0);
                }

                let data = remote.read_chunk(chunk).await?;
                if data.len() as u64 != chunk.length {
                    return Err(TransferError::Transport(format!(
                        "chunk {} returned {} bytes, expected {}",
                        chunk.index,
                        data.len(),
                        chunk.length
                    )));
                }
                tokio::task::spawn_blocking(move || dest.write_at(chunk.offset, &data))
                    .await
                    .map_err(|e| TransferError::Worker(e.to_string()))??;
                Ok(chunk.length)
            }
        })
        .await?;

        let synced = Arc::clone(&dest);
        tokio::task::spawn_blocking(move || synced.sync())
            .await
            .map_err(|e| TransferError::Worker(e.to_string()))??;

        let mut warnings = Vec::new();
        let checksum = if verify {
            // Hashed in byte order from the finished file, after every chunk landed.
            let local = spawn_file_md5(&dest, job.total_bytes())
                .await
                .map_err(|e| TransferError::Worker(e.to_string()))??;
            let status = verify_checksum(props.content_md5.as_deref(), local)?;
            warnings.extend(status.warning());
            status
        } else {
            ChecksumStatus::NotRequested
        };

        Ok(TransferOutcome {
            job_id: job.id().to_string(),
            direction: Direction::Download,
            bytes_transferred: job.transferred_bytes(),
            checksum,
            warnings,
        })
    }

    /// Transfers every chunk of `job` with `work`, which returns the number
    /// of bytes it moved.
    async fn run_workers<F, Fut>(&self, job: &Arc<TransferJob>, work: F) -> Result<(), TransferError>
    where
        F: Fn(ChunkDescriptor) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<u64, TransferError>> + Send + 'static,
    {
        let chunk_count = job.chunks().len();
        let workers = job.concurrency().workers(chunk_count);
        let next = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let stop = self.cancel.child_token();

        debug!(
            job = %job.id(),
            chunks = chunk_count,
            chunk_size = job.chunk_size(),
            workers,
            "starting transfer workers"
        );

        let mut set = JoinSet::new();
        for worker in 0..workers {
            let job = Arc::clone(job);
            let next = Arc::clone(&next);
            let done = Arc::clone(&done);
            let stop = stop.clone();
            let work = work.clone();
            set.spawn(async move {
                loop {
                    if stop.is_cancelled() {
                        return Ok(());
                    }
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(chunk) = job.chunks().get(i).copied() else {
                        return Ok(());
                    };

                    match work(chunk).await {
                        Ok(bytes) => {
                            job.add_transferred(bytes);
                            done.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!(
                                job = %job.id(),
                                worker,
                                chunk = chunk.index,
                                offset = chunk.offset,
                                error = %e,
                                "chunk failed, stopping job"
                            );
                            stop.cancel();
                            return Err(e);
                        }
                    }
                }
            });
        }
        drop(work);

        let mut first_error = None;
        while let Some(joined) = set.join_next().await {
            let result = joined.map_err(|e| TransferError::Worker(e.to_string()));
            if let Err(e) = result.and_then(|r| r)
                && first_error.is_none()
            {
                stop.cancel();
                first_error = Some(e);
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if done.load(Ordering::Relaxed) < chunk_count {
            return Err(TransferError::Cancelled);
        }
        Ok(())
    }
}

/// Hashes the first `len` bytes of `file` on the blocking pool.
fn spawn_file_md5(file: &Arc<LocalFile>, len: u64) -> JoinHandle<Result<String, TransferError>> {
    let file = Arc::clone(file);
    tokio::task::spawn_blocking(move || file_md5(&file, len))
}
