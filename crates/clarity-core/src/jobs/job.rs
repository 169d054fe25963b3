//! Batch job driver.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::processor::{ItemProcessor, ProcessError};

use super::types::{ItemResult, JobEvent, JobPhase, JobTotals};

/// Receiving end of a job's event stream. Closes after `Completed`.
pub type JobEvents = mpsc::UnboundedReceiver<JobEvent>;

/// Errors surfaced synchronously to the caller of a job operation.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job is already running")]
    AlreadyRunning,
    #[error("job was never started")]
    NotStarted,
    #[error("no tokio runtime available to run the job")]
    NoRuntime,
    #[error("job worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Immutable description of a batch: what to process, where, and how.
#[derive(Clone)]
pub struct JobRequest {
    inputs: Vec<PathBuf>,
    output_dir: PathBuf,
    processor: Arc<dyn ItemProcessor>,
}

impl JobRequest {
    /// Inputs are processed in the given order. Duplicates are not filtered.
    pub fn new(
        inputs: Vec<PathBuf>,
        output_dir: impl Into<PathBuf>,
        processor: Arc<dyn ItemProcessor>,
    ) -> Self {
        Self {
            inputs,
            output_dir: output_dir.into(),
            processor,
        }
    }
}

impl std::fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRequest")
            .field("inputs", &self.inputs)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

/// Cloneable handle for requesting cancellation from any context.
#[derive(Clone)]
pub struct CancelHandle {
    token: CancellationToken,
    phase: Arc<AtomicU8>,
}

impl CancelHandle {
    /// Ask the driver to stop at its next item boundary.
    ///
    /// Idempotent and non-blocking. An item already being processed is
    /// allowed to finish.
    pub fn request_cancel(&self) {
        self.token.cancel();
        let _ = self.phase.compare_exchange(
            JobPhase::Running as u8,
            JobPhase::Cancelling as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A single batch run over a [`JobRequest`].
pub struct BatchJob {
    request: Arc<JobRequest>,
    cancel: CancelHandle,
    worker: Option<JoinHandle<JobTotals>>,
}

impl BatchJob {
    pub fn new(request: JobRequest) -> Self {
        Self {
            request: Arc::new(request),
            cancel: CancelHandle {
                token: CancellationToken::new(),
                phase: Arc::new(AtomicU8::new(JobPhase::Idle as u8)),
            },
            worker: None,
        }
    }

    pub fn phase(&self) -> JobPhase {
        JobPhase::from_u8(self.cancel.phase.load(Ordering::Acquire))
    }

    /// Start the run on a blocking-pool thread and return its event stream.
    ///
    /// Returns immediately. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<JobEvents, JobError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| JobError::NoRuntime)?;

        self.cancel
            .phase
            .compare_exchange(
                JobPhase::Idle as u8,
                JobPhase::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| JobError::AlreadyRunning)?;

        // Cancelled before start: the run stops at its first boundary
        if self.cancel.token.is_cancelled() {
            self.cancel
                .phase
                .store(JobPhase::Cancelling as u8, Ordering::Release);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let request = self.request.clone();
        let cancel = self.cancel.clone();

        tracing::info!(
            inputs = request.inputs.len(),
            output_dir = %request.output_dir.display(),
            "Starting batch job"
        );

        self.worker = Some(runtime.spawn_blocking(move || drive(&request, &cancel, &tx)));

        Ok(rx)
    }

    /// See [`CancelHandle::request_cancel`].
    pub fn request_cancel(&self) {
        self.cancel.request_cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Wait for the worker to exit and return the final totals.
    pub async fn wait(self) -> Result<JobTotals, JobError> {
        let worker = self.worker.ok_or(JobError::NotStarted)?;
        worker
            .await
            .map_err(|e| JobError::WorkerPanicked(e.to_string()))
    }
}

/// The driver loop. Runs on exactly one thread per job.
fn drive(
    request: &JobRequest,
    cancel: &CancelHandle,
    tx: &mpsc::UnboundedSender<JobEvent>,
) -> JobTotals {
    let total = request.inputs.len();
    let mut totals = JobTotals::default();
    let mut stopped = false;

    for (index, input) in request.inputs.iter().enumerate() {
        let name = display_name(input);
        emit(tx, JobEvent::status(format!("Compressing: {}", name)));

        if cancel.is_cancel_requested() {
            tracing::info!(
                processed = totals.processed_count,
                remaining = total - index,
                "Batch job cancelled"
            );
            stopped = true;
            break;
        }

        match process_item(request, input) {
            ItemResult::Success {
                original_size_bytes,
                compressed_size_bytes,
            } => {
                tracing::debug!(
                    input = %input.display(),
                    original = original_size_bytes,
                    compressed = compressed_size_bytes,
                    "Item compressed"
                );
                totals.record(original_size_bytes, compressed_size_bytes);
            }
            ItemResult::Failure { input, error } => {
                tracing::warn!(input = %input.display(), "Item failed: {}", error);
                emit(
                    tx,
                    JobEvent::status(format!("Error compressing {}: {}", name, error)),
                );
            }
        }

        emit(
            tx,
            JobEvent::ProgressChanged {
                percent: progress_percent(index, total),
            },
        );
    }

    let phase = if stopped {
        JobPhase::Stopped
    } else {
        JobPhase::Completed
    };

    tracing::info!(
        processed = totals.processed_count,
        original_bytes = totals.original_size_total,
        compressed_bytes = totals.compressed_size_total,
        %phase,
        "Batch job finished"
    );

    // A finished phase implies `Completed` is already queued for the host
    emit(tx, totals.into());
    cancel.phase.store(phase as u8, Ordering::Release);
    totals
}

/// Run the processor on one input, absorbing errors and panics into a result.
fn process_item(request: &JobRequest, input: &Path) -> ItemResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        request.processor.process(input, &request.output_dir)
    }))
    .unwrap_or_else(|_| Err(ProcessError::Other("processor panicked".to_string())));

    match outcome {
        Ok(sizes) => sizes.into(),
        Err(e) => ItemResult::Failure {
            input: input.to_path_buf(),
            error: e.to_string(),
        },
    }
}

/// Percent of inputs visited after finishing the item at `index`.
fn progress_percent(index: usize, total: usize) -> u8 {
    ((index + 1) * 100 / total) as u8
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn emit(tx: &mpsc::UnboundedSender<JobEvent>, event: JobEvent) {
    if tx.send(event).is_err() {
        tracing::debug!("Dropping job event - receiver closed");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{mpsc as std_mpsc, Mutex};

    use super::*;
    use crate::processor::ItemSizes;

    /// Reports sizes derived from the file name length; fails for listed names.
    struct FakeProcessor {
        failing: HashSet<String>,
        calls: AtomicUsize,
    }

    impl FakeProcessor {
        fn new() -> Self {
            Self::failing(&[])
        }

        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|s| s.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ItemProcessor for FakeProcessor {
        fn process(&self, input: &Path, _output_dir: &Path) -> Result<ItemSizes, ProcessError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = display_name(input);
            if self.failing.contains(&name) {
                return Err(ProcessError::Other("unsupported image".to_string()));
            }
            Ok(ItemSizes {
                original: 1000 * name.len() as u64,
                compressed: 400 * name.len() as u64,
            })
        }
    }

    /// Blocks on the first call until released by the test.
    struct GatedProcessor {
        started: Mutex<std_mpsc::Sender<()>>,
        release: Mutex<std_mpsc::Receiver<()>>,
    }

    impl ItemProcessor for GatedProcessor {
        fn process(&self, _input: &Path, _output_dir: &Path) -> Result<ItemSizes, ProcessError> {
            let _ = self.started.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            Ok(ItemSizes {
                original: 10,
                compressed: 5,
            })
        }
    }

    struct PanickingProcessor;

    impl ItemProcessor for PanickingProcessor {
        fn process(&self, input: &Path, _output_dir: &Path) -> Result<ItemSizes, ProcessError> {
            if input.ends_with("boom.png") {
                panic!("decoder exploded");
            }
            Ok(ItemSizes {
                original: 8,
                compressed: 4,
            })
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/in").join(n)).collect()
    }

    fn request(names: &[&str], processor: Arc<dyn ItemProcessor>) -> JobRequest {
        JobRequest::new(paths(names), "/out", processor)
    }

    async fn collect(mut events: JobEvents) -> Vec<JobEvent> {
        let mut all = Vec::new();
        while let Some(event) = events.recv().await {
            all.push(event);
        }
        all
    }

    fn progress_values(events: &[JobEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                JobEvent::ProgressChanged { percent } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_full_run_event_order() {
        let mut job = BatchJob::new(request(&["a.png", "bb.jpg"], Arc::new(FakeProcessor::new())));
        let events = collect(job.start().unwrap()).await;

        assert_eq!(
            events,
            vec![
                JobEvent::status("Compressing: a.png"),
                JobEvent::ProgressChanged { percent: 50 },
                JobEvent::status("Compressing: bb.jpg"),
                JobEvent::ProgressChanged { percent: 100 },
                JobEvent::Completed {
                    processed_count: 2,
                    original_size_total: 5000 + 6000,
                    compressed_size_total: 2000 + 2400,
                },
            ]
        );
        assert_eq!(job.phase(), JobPhase::Completed);

        let totals = job.wait().await.unwrap();
        assert_eq!(totals.processed_count, 2);
    }

    #[tokio::test]
    async fn test_empty_request_completes_immediately() {
        let mut job = BatchJob::new(request(&[], Arc::new(FakeProcessor::new())));
        let events = collect(job.start().unwrap()).await;

        assert_eq!(events, vec![JobEvent::from(JobTotals::default())]);
        assert_eq!(job.wait().await.unwrap(), JobTotals::default());
    }

    #[tokio::test]
    async fn test_progress_is_floor_of_fraction() {
        let names = ["a.png", "b.png", "c.png"];
        let mut job = BatchJob::new(request(&names, Arc::new(FakeProcessor::new())));
        let events = collect(job.start().unwrap()).await;

        assert_eq!(progress_values(&events), vec![33, 66, 100]);

        let names: Vec<String> = (0..7).map(|i| format!("{i}.png")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut job = BatchJob::new(request(&refs, Arc::new(FakeProcessor::new())));
        let events = collect(job.start().unwrap()).await;

        let expected: Vec<u8> = (0..7).map(|i| ((i + 1) * 100 / 7) as u8).collect();
        assert_eq!(progress_values(&events), expected);
    }

    #[tokio::test]
    async fn test_failing_item_does_not_stop_batch() {
        let processor = Arc::new(FakeProcessor::failing(&["b.png"]));
        let mut job = BatchJob::new(request(&["a.png", "b.png", "cc.png"], processor.clone()));
        let events = collect(job.start().unwrap()).await;

        assert_eq!(
            events,
            vec![
                JobEvent::status("Compressing: a.png"),
                JobEvent::ProgressChanged { percent: 33 },
                JobEvent::status("Compressing: b.png"),
                JobEvent::status("Error compressing b.png: unsupported image"),
                JobEvent::ProgressChanged { percent: 66 },
                JobEvent::status("Compressing: cc.png"),
                JobEvent::ProgressChanged { percent: 100 },
                JobEvent::Completed {
                    processed_count: 2,
                    original_size_total: 5000 + 6000,
                    compressed_size_total: 2000 + 2400,
                },
            ]
        );
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_totals_ignore_failures_in_any_position() {
        for failing in ["a.png", "bb.png", "ccc.png"] {
            let processor = Arc::new(FakeProcessor::failing(&[failing]));
            let mut job = BatchJob::new(request(&["a.png", "bb.png", "ccc.png"], processor));
            collect(job.start().unwrap()).await;
            let totals = job.wait().await.unwrap();

            let expected: u64 = ["a.png", "bb.png", "ccc.png"]
                .iter()
                .filter(|n| **n != failing)
                .map(|n| n.len() as u64)
                .sum();
            assert_eq!(totals.processed_count, 2);
            assert_eq!(totals.original_size_total, 1000 * expected);
            assert_eq!(totals.compressed_size_total, 400 * expected);
        }
    }

    #[tokio::test]
    async fn test_cancel_before_start_processes_nothing() {
        let processor = Arc::new(FakeProcessor::new());
        let names = ["a.png", "b.png", "c.png", "d.png", "e.png"];
        let mut job = BatchJob::new(request(&names, processor.clone()));

        job.request_cancel();
        assert_eq!(job.phase(), JobPhase::Idle);

        let events = collect(job.start().unwrap()).await;

        assert_eq!(
            events,
            vec![
                JobEvent::status("Compressing: a.png"),
                JobEvent::from(JobTotals::default()),
            ]
        );
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(job.phase(), JobPhase::Stopped);
    }

    #[tokio::test]
    async fn test_cancel_lets_in_flight_item_finish() {
        let (started_tx, started_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let processor = Arc::new(GatedProcessor {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        });

        let mut job = BatchJob::new(request(&["a.png", "b.png", "c.png"], processor));
        let events = job.start().unwrap();

        tokio::task::spawn_blocking(move || started_rx.recv())
            .await
            .unwrap()
            .unwrap();

        let handle = job.cancel_handle();
        std::thread::spawn(move || handle.request_cancel())
            .join()
            .unwrap();
        assert_eq!(job.phase(), JobPhase::Cancelling);
        release_tx.send(()).unwrap();

        let events = collect(events).await;
        assert_eq!(
            events,
            vec![
                JobEvent::status("Compressing: a.png"),
                JobEvent::ProgressChanged { percent: 33 },
                JobEvent::status("Compressing: b.png"),
                JobEvent::Completed {
                    processed_count: 1,
                    original_size_total: 10,
                    compressed_size_total: 5,
                },
            ]
        );
        assert_eq!(job.phase(), JobPhase::Stopped);
    }

    #[tokio::test]
    async fn test_request_cancel_is_idempotent() {
        let once = {
            let mut job = BatchJob::new(request(&["a.png", "b.png"], Arc::new(FakeProcessor::new())));
            job.request_cancel();
            collect(job.start().unwrap()).await
        };
        let many = {
            let mut job = BatchJob::new(request(&["a.png", "b.png"], Arc::new(FakeProcessor::new())));
            job.request_cancel();
            job.request_cancel();
            job.cancel_handle().request_cancel();
            let events = job.start().unwrap();
            job.request_cancel();
            collect(events).await
        };
        assert_eq!(once, many);
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let mut job = BatchJob::new(request(&["a.png"], Arc::new(FakeProcessor::new())));
        let events = job.start().unwrap();

        assert!(matches!(job.start(), Err(JobError::AlreadyRunning)));

        // Still rejected once the run is over
        collect(events).await;
        assert!(matches!(job.start(), Err(JobError::AlreadyRunning)));
    }

    #[test]
    fn test_start_outside_runtime_stays_idle() {
        let mut job = BatchJob::new(request(&["a.png"], Arc::new(FakeProcessor::new())));
        assert!(matches!(job.start(), Err(JobError::NoRuntime)));
        assert_eq!(job.phase(), JobPhase::Idle);
    }

    #[tokio::test]
    async fn test_wait_without_start() {
        let job = BatchJob::new(request(&["a.png"], Arc::new(FakeProcessor::new())));
        assert!(matches!(job.wait().await, Err(JobError::NotStarted)));
    }

    #[tokio::test]
    async fn test_panicking_processor_is_item_failure() {
        let names = ["a.png", "boom.png", "c.png"];
        let mut job = BatchJob::new(request(&names, Arc::new(PanickingProcessor)));
        let events = collect(job.start().unwrap()).await;

        assert!(events.contains(&JobEvent::status(
            "Error compressing boom.png: processor panicked"
        )));
        assert_eq!(
            events.last(),
            Some(&JobEvent::Completed {
                processed_count: 2,
                original_size_total: 16,
                compressed_size_total: 8,
            })
        );
    }

    #[tokio::test]
    async fn test_run_continues_when_receiver_dropped() {
        let processor = Arc::new(FakeProcessor::new());
        let mut job = BatchJob::new(request(&["a.png", "b.png"], processor.clone()));
        drop(job.start().unwrap());

        let totals = job.wait().await.unwrap();
        assert_eq!(totals.processed_count, 2);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_finished_phase_follows_completed_event() {
        let mut job = BatchJob::new(request(&["a.png", "b.png"], Arc::new(FakeProcessor::new())));
        let mut events = job.start().unwrap();

        while job.phase().is_active() {
            tokio::task::yield_now().await;
        }
        assert_eq!(job.phase(), JobPhase::Completed);

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert!(last.is_some_and(|e| e.is_terminal()));
    }

    #[tokio::test]
    async fn test_status_and_progress_pairs_follow_input_order() {
        let names = ["a.png", "b.png", "c.png", "d.png"];
        let processor = Arc::new(FakeProcessor::failing(&["c.png"]));
        let mut job = BatchJob::new(request(&names, processor));
        let events = collect(job.start().unwrap()).await;

        let visited: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                JobEvent::StatusChanged { message } => message
                    .strip_prefix("Compressing: ")
                    .map(str::to_string),
                _ => None,
            })
            .collect();
        assert_eq!(visited, names);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.last().unwrap().is_terminal());
    }
}
