use std::fmt;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use cloudctl_protocol::{ObjectKind, ObjectProperties};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::time::Instant;

use crate::TransferError;
use crate::chunked::{ChunkDescriptor, plan_chunks};
use crate::layout::ChunkLayout;
use crate::progress::SpeedSample;

/// Default number of chunks in flight.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Direction of a transfer relative to the local machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

/// Lifecycle of a [`TransferJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransferState {
    NotStarted = 0,
    InProgress = 1,
    Completed = 2,
    Failed = 3,
}

impl TransferState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NotStarted,
            1 => Self::InProgress,
            2 => Self::Completed,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

/// Upper bound on chunks in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Bounded(NonZeroUsize),
    /// One worker per chunk; only the I/O layer limits parallelism.
    Unbounded,
}

impl Default for Concurrency {
    fn default() -> Self {
        Self::Bounded(NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl Concurrency {
    /// Creates a bounded concurrency; zero is rejected.
    pub fn bounded(n: usize) -> Result<Self, TransferError> {
        NonZeroUsize::new(n)
            .map(Self::Bounded)
            .ok_or_else(|| TransferError::Validation("concurrency must be at least 1".into()))
    }

    /// Number of workers to spawn for `chunk_count` chunks.
    pub fn workers(&self, chunk_count: usize) -> usize {
        let n = match self {
            Self::Bounded(n) => n.get().min(chunk_count),
            Self::Unbounded => chunk_count,
        };
        n.max(1)
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "{n}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl FromStr for Concurrency {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("unbounded") {
            return Ok(Self::Unbounded);
        }
        let n: usize = s
            .parse()
            .map_err(|_| TransferError::Validation(format!("invalid concurrency: {s}")))?;
        Self::bounded(n)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ConcurrencyRepr {
    Count(usize),
    Word(String),
}

impl Serialize for Concurrency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bounded(n) => ConcurrencyRepr::Count(n.get()).serialize(serializer),
            Self::Unbounded => ConcurrencyRepr::Word("unbounded".into()).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Concurrency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match ConcurrencyRepr::deserialize(deserializer)? {
            ConcurrencyRepr::Count(n) => Self::bounded(n).map_err(serde::de::Error::custom),
            ConcurrencyRepr::Word(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// TransferJob
// ---------------------------------------------------------------------------

/// One object transfer: its chunk plan plus live progress counters.
///
/// Shared between the engine's workers and a progress reporter through
/// `Arc`; every mutable field is atomic so readers never wait on writers.
#[derive(Debug)]
pub struct TransferJob {
    id: String,
    name: String,
    direction: Direction,
    layout: ChunkLayout,
    total_bytes: u64,
    chunk_size: u64,
    chunks: Vec<ChunkDescriptor>,
    concurrency: Concurrency,
    transferred: AtomicU64,
    state: AtomicU8,
    started_at: OnceLock<Instant>,
    finished_at: OnceLock<Instant>,
}

impl TransferJob {
    /// Plans an upload of `total_bytes` into an object of the given kind.
    pub fn upload(
        name: impl Into<String>,
        kind: ObjectKind,
        total_bytes: u64,
        chunk_size: u64,
        concurrency: Concurrency,
    ) -> Result<Self, TransferError> {
        let layout = ChunkLayout::for_kind(kind);
        layout.validate_chunk_size(chunk_size)?;
        Self::new(
            name.into(),
            Direction::Upload,
            layout,
            total_bytes,
            chunk_size,
            concurrency,
        )
    }

    /// Plans a download of the object described by `props`.
    pub fn download(
        props: &ObjectProperties,
        chunk_size: u64,
        concurrency: Concurrency,
    ) -> Result<Self, TransferError> {
        Self::new(
            props.name.clone(),
            Direction::Download,
            ChunkLayout::for_kind(props.kind),
            props.size,
            chunk_size,
            concurrency,
        )
    }

    fn new(
        name: String,
        direction: Direction,
        layout: ChunkLayout,
        total_bytes: u64,
        chunk_size: u64,
        concurrency: Concurrency,
    ) -> Result<Self, TransferError> {
        let chunks = plan_chunks(total_bytes, chunk_size)?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            direction,
            layout,
            total_bytes,
            chunk_size,
            chunks,
            concurrency,
            transferred: AtomicU64::new(0),
            state: AtomicU8::new(TransferState::NotStarted as u8),
            started_at: OnceLock::new(),
            finished_at: OnceLock::new(),
        })
    }

    /// Moves `NotStarted -> InProgress` and starts the clock.
    pub fn start(&self) -> bool {
        let ok = self.transition(TransferState::NotStarted, TransferState::InProgress);
        if ok {
            let _ = self.started_at.set(Instant::now());
        }
        ok
    }

    /// Moves `InProgress -> Completed`.
    pub fn complete(&self) -> bool {
        let ok = self.transition(TransferState::InProgress, TransferState::Completed);
        if ok {
            let _ = self.finished_at.set(Instant::now());
        }
        ok
    }

    /// Moves any non-terminal state to `Failed`.
    pub fn fail(&self) -> bool {
        let ok = self.transition(TransferState::InProgress, TransferState::Failed)
            || self.transition(TransferState::NotStarted, TransferState::Failed);
        if ok {
            let _ = self.finished_at.set(Instant::now());
        }
        ok
    }

    fn transition(&self, from: TransferState, to: TransferState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Adds `bytes` to the transferred counter.
    pub fn add_transferred(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> TransferState {
        TransferState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Wall-clock time since `start`, frozen once the job is terminal.
    pub fn elapsed(&self) -> Duration {
        let Some(start) = self.started_at.get() else {
            return Duration::ZERO;
        };
        let end = self.finished_at.get().copied().unwrap_or_else(Instant::now);
        end.saturating_duration_since(*start)
    }

    /// Snapshot of the live counters.
    pub fn sample(&self) -> SpeedSample {
        SpeedSample {
            elapsed: self.elapsed(),
            bytes_transferred: self.transferred_bytes(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }
}
