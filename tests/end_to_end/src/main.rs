//! End-to-end scenarios across the protocol, control and transfer crates,
//! run against an in-memory object store.

use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "run `cargo test -p end-to-end` to execute the end-to-end scenarios"
    );
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use cloudctl_control::{
        ClientConfig, ControlError, LongRunningOperationPoller, OperationApi, PageRequest,
        PollPolicy, collect, list_matching,
    };
    use cloudctl_protocol::{ApiResponse, ErrorKind, ObjectKind, ObjectProperties, Page};
    use cloudctl_transfer::{
        BoxFuture, ChecksumStatus, ChunkDescriptor, ChunkWrite, Concurrency, LocalFile,
        ObjectCommit, ProgressReporter, RemoteObject, SpeedSummary, TransferEngine,
        TransferError, TransferJob, TransferState, content_md5,
    };
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use tracing_subscriber::EnvFilter;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    }

    // -----------------------------------------------------------------------
    // In-memory object store
    // -----------------------------------------------------------------------

    struct StoredObject {
        kind: ObjectKind,
        data: Vec<u8>,
        size: u64,
        blocks: HashMap<String, Vec<u8>>,
        content_md5: Option<String>,
    }

    #[derive(Default)]
    struct Store {
        objects: Mutex<BTreeMap<String, StoredObject>>,
    }

    const LIST_PAGE_SIZE: usize = 2;

    impl Store {
        fn object(self: &Arc<Self>, name: &str) -> Arc<ObjectHandle> {
            Arc::new(ObjectHandle {
                store: Arc::clone(self),
                name: name.to_string(),
            })
        }

        /// Lists committed objects two at a time; the token is the offset of
        /// the next page.
        fn list(&self, req: PageRequest) -> Result<Page<ObjectProperties>, ControlError> {
            let skip = match req.continuation.as_deref() {
                None => 0,
                Some(t) => t
                    .parse::<usize>()
                    .map_err(|_| ControlError::Validation(format!("bad continuation token {t}")))?,
            };
            let objects = self.objects.lock().unwrap();
            let matching: Vec<ObjectProperties> = objects
                .iter()
                .filter(|(name, _)| req.prefix.as_deref().is_none_or(|p| name.starts_with(p)))
                .map(|(name, o)| properties(name, o))
                .collect();

            let end = (skip + LIST_PAGE_SIZE).min(matching.len());
            let token = (end < matching.len()).then(|| end.to_string());
            Ok(Page::new(matching[skip.min(end)..end].to_vec(), token))
        }

        fn put(&self, name: &str, kind: ObjectKind, data: Vec<u8>) {
            self.objects.lock().unwrap().insert(
                name.to_string(),
                StoredObject {
                    kind,
                    size: data.len() as u64,
                    content_md5: Some(content_md5(&data)),
                    data,
                    blocks: HashMap::new(),
                },
            );
        }
    }

    fn properties(name: &str, o: &StoredObject) -> ObjectProperties {
        ObjectProperties {
            name: name.to_string(),
            size: o.size,
            kind: o.kind,
            content_md5: o.content_md5.clone(),
        }
    }

    struct ObjectHandle {
        store: Arc<Store>,
        name: String,
    }

    impl ObjectHandle {
        fn with_object<T>(
            &self,
            f: impl FnOnce(&mut StoredObject) -> Result<T, TransferError>,
        ) -> Result<T, TransferError> {
            let mut objects = self.store.objects.lock().unwrap();
            let object = objects
                .get_mut(&self.name)
                .ok_or_else(|| TransferError::NotFound(self.name.clone()))?;
            f(object)
        }
    }

    impl RemoteObject for ObjectHandle {
        fn name(&self) -> &str {
            &self.name
        }

        fn properties(&self) -> BoxFuture<'_, Result<Option<ObjectProperties>, TransferError>> {
            let props = self
                .store
                .objects
                .lock()
                .unwrap()
                .get(&self.name)
                .map(|o| properties(&self.name, o));
            Box::pin(async move { Ok(props) })
        }

        fn create(&self, kind: ObjectKind, size: u64) -> BoxFuture<'_, Result<(), TransferError>> {
            let data = match kind {
                ObjectKind::PageBlob => vec![0u8; size as usize],
                ObjectKind::BlockBlob => Vec::new(),
            };
            self.store.objects.lock().unwrap().insert(
                self.name.clone(),
                StoredObject {
                    kind,
                    data,
                    size,
                    blocks: HashMap::new(),
                    content_md5: None,
                },
            );
            Box::pin(async { Ok(()) })
        }

        fn write_chunk(&self, write: ChunkWrite) -> BoxFuture<'_, Result<(), TransferError>> {
            let result = self.with_object(|o| {
                match write {
                    ChunkWrite::Block { block_id, data } => {
                        o.blocks.insert(block_id, data);
                    }
                    ChunkWrite::Pages { offset, data } => {
                        if offset % 512 != 0 || data.len() % 512 != 0 {
                            return Err(TransferError::Transport(format!(
                                "unaligned page write at {offset} ({} bytes)",
                                data.len()
                            )));
                        }
                        let start = offset as usize;
                        o.data[start..start + data.len()].copy_from_slice(&data);
                    }
                }
                Ok(())
            });
            Box::pin(async move { result })
        }

        fn read_chunk(&self, chunk: ChunkDescriptor) -> BoxFuture<'_, Result<Vec<u8>, TransferError>> {
            let result = self.with_object(|o| {
                o.data
                    .get(chunk.offset as usize..chunk.end() as usize)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| TransferError::Transport("range out of bounds".into()))
            });
            Box::pin(async move { result })
        }

        fn commit(&self, commit: ObjectCommit) -> BoxFuture<'_, Result<(), TransferError>> {
            let result = self.with_object(|o| {
                if commit.kind == ObjectKind::BlockBlob {
                    let mut data = Vec::with_capacity(commit.size as usize);
                    for id in &commit.block_ids {
                        let block = o
                            .blocks
                            .remove(id)
                            .ok_or_else(|| TransferError::Transport(format!("unknown block {id}")))?;
                        data.extend_from_slice(&block);
                    }
                    o.data = data;
                } else {
                    o.data.truncate(commit.size as usize);
                }
                o.size = commit.size;
                o.content_md5 = commit.content_md5;
                Ok(())
            });
            Box::pin(async move { result })
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Deterministic pseudo-random bytes.
    fn sample_bytes(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed.wrapping_mul(2_654_435_761).max(1);
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x as u8
            })
            .collect()
    }

    fn write_source(dir: &Path, name: &str, data: &[u8]) -> Arc<LocalFile> {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        Arc::new(LocalFile::open(&path).unwrap())
    }

    async fn upload(
        store: &Arc<Store>,
        dir: &Path,
        name: &str,
        kind: ObjectKind,
        data: &[u8],
        chunk_size: u64,
    ) -> cloudctl_transfer::TransferOutcome {
        let source = write_source(dir, &format!("{name}.src"), data);
        let job = Arc::new(
            TransferJob::upload(name, kind, data.len() as u64, chunk_size, Concurrency::default())
                .unwrap(),
        );
        TransferEngine::default()
            .execute(job, source, store.object(name), true)
            .await
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn block_blob_round_trip_with_progress() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::default());
        let data = sample_bytes(1_048_576 + 17, 7);

        let job = Arc::new(
            TransferJob::upload(
                "backups/db.dump",
                ObjectKind::BlockBlob,
                data.len() as u64,
                64 * 1024,
                Concurrency::bounded(4).unwrap(),
            )
            .unwrap(),
        );
        assert_eq!(job.chunks().len(), 17);

        let snapshots: Arc<Mutex<Vec<SpeedSummary>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);
        let reporter = ProgressReporter::new(Some(Duration::from_millis(5)));
        let progress = reporter.spawn(
            Arc::clone(&job),
            Box::new(move |s| sink.lock().unwrap().push(s)),
        );

        let source = write_source(dir.path(), "db.dump", &data);
        let outcome = TransferEngine::default()
            .execute(
                Arc::clone(&job),
                source,
                store.object("backups/db.dump"),
                true,
            )
            .await
            .unwrap();
        assert_eq!(
            outcome.checksum,
            ChecksumStatus::Attached {
                md5: content_md5(&data)
            }
        );

        let last = progress.join().await.unwrap();
        assert!(last.is_final);
        assert_eq!(last.state, TransferState::Completed);
        assert_eq!(last.sample.bytes_transferred, data.len() as u64);
        assert!((last.percent - 100.0).abs() < f64::EPSILON);
        let seen = snapshots.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(
            seen.windows(2)
                .all(|w| w[0].sample.bytes_transferred <= w[1].sample.bytes_transferred)
        );

        // Download it back and verify against the stored digest.
        let props = store
            .object("backups/db.dump")
            .properties()
            .await
            .unwrap()
            .unwrap();
        let out_path = dir.path().join("db.restored");
        let dest = Arc::new(LocalFile::create(&out_path, props.size).unwrap());
        let job = Arc::new(TransferJob::download(&props, 100_000, Concurrency::Unbounded).unwrap());
        let outcome = TransferEngine::default()
            .execute(job, dest, store.object("backups/db.dump"), true)
            .await
            .unwrap();

        assert_eq!(
            outcome.checksum,
            ChecksumStatus::Verified {
                md5: content_md5(&data)
            }
        );
        assert_eq!(std::fs::read(&out_path).unwrap(), data);
    }

    #[tokio::test]
    async fn page_blob_round_trip() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::default());

        // Sparse disk image: a zero region in the middle and an unaligned tail.
        let mut data = sample_bytes(8192, 11);
        data.extend(vec![0u8; 16 * 1024]);
        data.extend(sample_bytes(3000, 13));

        let outcome = upload(&store, dir.path(), "disk.vhd", ObjectKind::PageBlob, &data, 4096).await;
        assert_eq!(outcome.bytes_transferred, data.len() as u64);

        let props = store.object("disk.vhd").properties().await.unwrap().unwrap();
        assert_eq!(props.kind, ObjectKind::PageBlob);
        assert_eq!(props.size, data.len() as u64);

        let out_path = dir.path().join("disk.restored");
        let dest = Arc::new(LocalFile::create(&out_path, props.size).unwrap());
        let job = Arc::new(TransferJob::download(&props, 4096, Concurrency::bounded(3).unwrap()).unwrap());
        let outcome = TransferEngine::default()
            .execute(job, dest, store.object("disk.vhd"), true)
            .await
            .unwrap();
        assert!(matches!(outcome.checksum, ChecksumStatus::Verified { .. }));
        assert_eq!(std::fs::read(&out_path).unwrap(), data);
    }

    #[tokio::test]
    async fn upload_onto_other_kind_is_rejected() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::default());
        store.put("disk.vhd", ObjectKind::PageBlob, vec![0u8; 512]);

        let source = write_source(dir.path(), "disk.src", &sample_bytes(1024, 3));
        let job = Arc::new(
            TransferJob::upload("disk.vhd", ObjectKind::BlockBlob, 1024, 512, Concurrency::default())
                .unwrap(),
        );
        let err = TransferEngine::default()
            .execute(job, source, store.object("disk.vhd"), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        let wrapped = ControlError::from(err);
        assert_eq!(wrapped.kind(), ErrorKind::TypeMismatch);
    }

    #[tokio::test]
    async fn tampered_object_fails_verification() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::default());
        let data = sample_bytes(10_000, 5);
        upload(&store, dir.path(), "report.csv", ObjectKind::BlockBlob, &data, 4096).await;

        store
            .objects
            .lock()
            .unwrap()
            .get_mut("report.csv")
            .unwrap()
            .data[42] ^= 0xff;

        let props = store.object("report.csv").properties().await.unwrap().unwrap();
        let dest = Arc::new(LocalFile::create(&dir.path().join("report.out"), props.size).unwrap());
        let job = Arc::new(TransferJob::download(&props, 4096, Concurrency::default()).unwrap());
        let err = TransferEngine::default()
            .execute(job, dest, store.object("report.csv"), true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    }

    #[tokio::test]
    async fn settings_from_config_file_drive_transfer() {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{"transfer":{"chunk_size":1024,"concurrency":"unbounded","verify_checksum":true}}"#,
        )
        .unwrap();
        let config = ClientConfig::load_from(&config_path).unwrap();

        let store = Arc::new(Store::default());
        let data = sample_bytes(5000, 17);
        let source = write_source(dir.path(), "notes.src", &data);
        let job = Arc::new(
            TransferJob::upload(
                "notes.txt",
                ObjectKind::BlockBlob,
                data.len() as u64,
                config.transfer.chunk_size,
                config.transfer.concurrency,
            )
            .unwrap(),
        );
        assert_eq!(job.chunks().len(), 5);

        let outcome = TransferEngine::default()
            .execute(job, source, store.object("notes.txt"), config.transfer.verify_checksum)
            .await
            .unwrap();
        assert!(matches!(outcome.checksum, ChecksumStatus::Attached { .. }));
    }

    // -----------------------------------------------------------------------
    // Listing
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn listing_follows_continuation_across_store() {
        init_tracing();
        let store = Arc::new(Store::default());
        for name in ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"] {
            store.put(name, ObjectKind::BlockBlob, name.as_bytes().to_vec());
        }

        let items = collect(|req| std::future::ready(store.list(req))).await.unwrap();
        let names: Vec<&str> = items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"]);
    }

    #[tokio::test]
    async fn listing_with_wildcard_pattern() {
        init_tracing();
        let store = Arc::new(Store::default());
        for name in [
            "data-01.csv",
            "data-02.csv",
            "data-100.csv",
            "data-ab.json",
            "logs-01.csv",
        ] {
            store.put(name, ObjectKind::BlockBlob, Vec::new());
        }

        let items = list_matching(
            Some("data-??.csv"),
            |req| std::future::ready(store.list(req)),
            |p: &ObjectProperties| p.name.as_str(),
        )
        .await
        .unwrap();
        let names: Vec<&str> = items.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["data-01.csv", "data-02.csv"]);
    }

    #[tokio::test]
    async fn listing_error_is_returned_unchanged() {
        init_tracing();
        let store = Arc::new(Store::default());
        for name in ["a", "b", "c"] {
            store.put(name, ObjectKind::BlockBlob, Vec::new());
        }

        let mut calls = 0;
        let err = collect(|mut req: PageRequest| {
            calls += 1;
            if req.continuation.is_some() {
                req.continuation = Some("garbage".into());
            }
            std::future::ready(store.list(req))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
        assert_eq!(calls, 2);
    }

    // -----------------------------------------------------------------------
    // Long-running operations
    // -----------------------------------------------------------------------

    /// Management API whose operation finishes after a fixed number of
    /// status checks.
    struct Management {
        statuses: Mutex<VecDeque<serde_json::Value>>,
    }

    impl OperationApi for Management {
        fn operation_status(
            &self,
            request_id: &str,
        ) -> BoxFuture<'_, Result<serde_json::Value, ControlError>> {
            let next = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ControlError::NotFound(format!("operation {request_id}")));
            Box::pin(async move { next })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_operation_completes_after_polling() {
        init_tracing();
        let api = Management {
            statuses: Mutex::new(
                vec![
                    serde_json::json!({"ID": "op-7", "Status": "Pending"}),
                    serde_json::json!({"ID": "op-7", "Status": "InProgress"}),
                    serde_json::json!({
                        "ID": "op-7",
                        "Status": "Succeeded",
                        "HttpStatusCode": 201,
                        "Result": {"SnapshotName": "disk-snap-1"}
                    }),
                ]
                .into(),
            ),
        };

        let config = ClientConfig::default();
        let start = tokio::time::Instant::now();
        let outcome = LongRunningOperationPoller::new(&api, config.poll.policy(), CancellationToken::new())
            .execute(async { Ok(ApiResponse::accepted(202, "op-7")) })
            .await
            .unwrap();

        assert_eq!(outcome.http_status, 201);
        assert_eq!(outcome.body["Result"]["SnapshotName"], "disk-snap-1");
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_poll_gives_up() {
        init_tracing();
        let api = Management {
            statuses: Mutex::new(
                std::iter::repeat_n(serde_json::json!({"Status": "InProgress"}), 10).collect(),
            ),
        };
        let policy = PollPolicy {
            max_attempts: Some(3),
            ..PollPolicy::default()
        };
        let err = LongRunningOperationPoller::new(&api, policy, CancellationToken::new())
            .execute(async { Ok(ApiResponse::accepted(202, "op-8")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(api.statuses.lock().unwrap().len(), 7);
    }
}
