use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use crate::types::{TransferJob, TransferState};

/// Default reporting interval.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Callback invoked with each progress snapshot.
pub type ProgressCallback = Box<dyn Fn(SpeedSummary) + Send + Sync>;

/// Point-in-time reading of a job's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedSample {
    /// Time since the job started.
    pub elapsed: Duration,
    pub bytes_transferred: u64,
}

/// Derived view of a job's progress, recomputed on every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedSummary {
    pub job_id: String,
    pub sample: SpeedSample,
    pub total_bytes: u64,
    /// 0–100.
    pub percent: f64,
    /// Bytes per second since the job started.
    pub average_bps: f64,
    /// Bytes per second over the recent sliding window.
    pub window_bps: f64,
    /// Estimated time to completion at the window speed, or at the average
    /// speed while the window is still empty.
    pub eta: Option<Duration>,
    pub state: TransferState,
    /// `true` for the last snapshot a reporter emits.
    pub is_final: bool,
}

impl SpeedSummary {
    fn new(job: &TransferJob, sample: SpeedSample, speed: &SpeedCalculator, is_final: bool) -> Self {
        let total = job.total_bytes();
        let percent = if total == 0 {
            if job.state() == TransferState::Completed {
                100.0
            } else {
                0.0
            }
        } else {
            (sample.bytes_transferred as f64 / total as f64 * 100.0).min(100.0)
        };

        let secs = sample.elapsed.as_secs_f64();
        let average_bps = if secs > 0.0 {
            sample.bytes_transferred as f64 / secs
        } else {
            0.0
        };

        let remaining = total.saturating_sub(sample.bytes_transferred);
        let eta = if remaining == 0 {
            Some(Duration::ZERO)
        } else {
            speed.eta(remaining).or_else(|| {
                (average_bps > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / average_bps))
            })
        };

        Self {
            job_id: job.id().to_string(),
            sample,
            total_bytes: total,
            percent,
            average_bps,
            window_bps: speed.bytes_per_second(),
            eta,
            state: job.state(),
            is_final,
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Samples a [`TransferJob`] on a fixed timer, independent of the workers.
///
/// The reporter only reads the job's atomic counters, so it never waits on
/// a transfer worker and a worker never waits on it.
pub struct ProgressReporter {
    interval: Duration,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ProgressReporter {
    /// Creates a reporter; `None` or a zero interval defaults to 1 s.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval: interval
                .filter(|d| !d.is_zero())
                .unwrap_or(DEFAULT_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts reporting on `job` in a background tokio task.
    ///
    /// The task emits one snapshot per tick and exits after emitting a final
    /// snapshot, either once the job is terminal or when stopped.
    pub fn spawn(&self, job: Arc<TransferJob>, callback: ProgressCallback) -> ProgressHandle {
        let (tx, mut rx) = oneshot::channel::<()>();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let speed = SpeedCalculator::new(None, None);
            let mut last_bytes = 0u64;

            loop {
                let stopped = tokio::select! {
                    _ = ticker.tick() => false,
                    _ = &mut rx => true,
                };

                let sample = job.sample();
                speed.add_sample(sample.bytes_transferred.saturating_sub(last_bytes));
                last_bytes = sample.bytes_transferred;

                let is_final = stopped || job.is_terminal();
                let summary = SpeedSummary::new(&job, sample, &speed, is_final);
                trace!(
                    job = %summary.job_id,
                    bytes = summary.sample.bytes_transferred,
                    percent = summary.percent,
                    "progress tick"
                );
                callback(summary.clone());

                if is_final {
                    return summary;
                }
            }
        });

        ProgressHandle {
            stop: Some(tx),
            task,
        }
    }
}

/// Handle to a running reporter task.
pub struct ProgressHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<SpeedSummary>,
}

impl ProgressHandle {
    /// Waits for the reporter to observe a terminal job state and returns
    /// the final snapshot.
    pub async fn join(self) -> Option<SpeedSummary> {
        let Self { stop, task } = self;
        let result = task.await.ok();
        drop(stop);
        result
    }

    /// Stops the reporter now; it still emits one final snapshot.
    pub async fn stop(mut self) -> Option<SpeedSummary> {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        self.task.await.ok()
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct WindowSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<WindowSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records `bytes` transferred since the previous sample.
    pub fn add_sample(&self, bytes: u64) {
        let Ok(mut s) = self.inner.lock() else {
            return;
        };
        let now = Instant::now();
        s.samples.push(WindowSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        let window = s.window_size;
        s.samples
            .retain(|sample| now.saturating_duration_since(sample.timestamp) <= window);

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Returns the speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let Ok(s) = self.inner.lock() else {
            return 0.0;
        };
        if s.samples.len() < 2 {
            return 0.0;
        }

        let first = &s.samples[0];
        let last = &s.samples[s.samples.len() - 1];
        let elapsed = last.timestamp.saturating_duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        // Bytes of the first sample were transferred before the window opened.
        let total_bytes: u64 = s.samples[1..].iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }
}
