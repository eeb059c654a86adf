use crate::cancel::CancelToken;
use crate::cleanup::{cleanup_partial_artifacts, Baseline, CleanupReport};
use crate::config::Config;
use crate::engine::{Engine, EngineError, EngineOptions, EngineProgress, Flow, TransferStatus};
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Phrase used for user-initiated stops; recognized downstream as benign.
pub const CANCELLED_BY_USER: &str = "cancelled by user";

pub const STARTING_STATUS: &str = "Starting download...";
pub const CONVERTING_STATUS: &str = "Converting/Embedding...";

const DISPLAY_NAME_MAX: usize = 40;

pub type JobId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub source: String,
    pub target_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Cancelling,
    Succeeded,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Cancelled | JobState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl Outcome {
    /// True for cancellations, including failures whose detail is the
    /// cancellation phrase.
    pub fn is_user_cancellation(&self) -> bool {
        match self {
            Outcome::Cancelled => true,
            Outcome::Failed(detail) => detail.to_lowercase().contains(CANCELLED_BY_USER),
            Outcome::Completed => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub percent: f64,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress(ProgressEvent),
    Status(String),
    Outcome(Outcome),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub job: JobId,
    pub event: JobEvent,
}

pub fn percentage(downloaded: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => (downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0),
        _ => 0.0,
    }
}

pub fn short_file_name(path: &str, max: usize) -> String {
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    if name.chars().count() <= max {
        return name;
    }
    let keep = max.saturating_sub(1);
    let mut short: String = name.chars().take(keep).collect();
    short.push('…');
    short
}

pub fn describe_progress(progress: &EngineProgress) -> ProgressEvent {
    let percent = percentage(progress.downloaded_bytes, progress.total());
    let descriptor = match progress.status {
        TransferStatus::Transferring => format!(
            "Downloading: {percent:5.1}% — {}",
            short_file_name(&progress.filename, DISPLAY_NAME_MAX)
        ),
        TransferStatus::Finished => CONVERTING_STATUS.to_string(),
    };
    ProgressEvent { percent, descriptor }
}

#[derive(Debug, Default)]
struct Lifecycle {
    state: Mutex<JobState>,
}

impl Lifecycle {
    fn get(&self) -> JobState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forward-only transition; terminal states are final.
    fn advance(&self, next: JobState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_terminal() || next <= *state {
            return false;
        }
        *state = next;
        true
    }
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub audio_format: String,
    pub bitrate_kbps: u32,
    pub retry_count: u32,
    pub min_valid_output_size: u64,
    pub cancel_ack_timeout: Duration,
}

impl From<&Config> for RunnerSettings {
    fn from(config: &Config) -> Self {
        Self {
            audio_format: config.audio_format.clone(),
            bitrate_kbps: config.target_bitrate_kbps,
            retry_count: config.retry_count,
            min_valid_output_size: config.min_valid_output_size_bytes,
            cancel_ack_timeout: config.cancel_ack_timeout(),
        }
    }
}

impl RunnerSettings {
    fn engine_options(&self, target_dir: &Path) -> EngineOptions {
        EngineOptions {
            output_template: crate::storage::output_template(target_dir),
            audio_format: self.audio_format.clone(),
            bitrate_kbps: self.bitrate_kbps,
            embed_thumbnail: true,
            retries: self.retry_count,
            resumable: true,
            expand_playlist: true,
        }
    }
}

pub struct JobRunner {
    engine: Arc<dyn Engine>,
    settings: RunnerSettings,
    next_id: AtomicU64,
}

impl JobRunner {
    pub fn new(engine: Arc<dyn Engine>, settings: RunnerSettings) -> Self {
        Self {
            engine,
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn start(&self, request: JobRequest, tx: Sender<Notification>) -> Result<JobHandle> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancelToken::new();
        let lifecycle = Arc::new(Lifecycle::default());
        let (done_tx, done_rx) = bounded(1);
        let baseline = Arc::new(Baseline::capture(&request.target_dir));
        let worker = Worker {
            id,
            engine: Arc::clone(&self.engine),
            options: self.settings.engine_options(&request.target_dir),
            settings: self.settings.clone(),
            request: request.clone(),
            token: token.clone(),
            lifecycle: Arc::clone(&lifecycle),
            baseline: Arc::clone(&baseline),
            tx,
        };
        lifecycle.advance(JobState::Running);
        let join = thread::Builder::new()
            .name(format!("tubetone-job-{id}"))
            .spawn(move || {
                worker.run();
                let _ = done_tx.send(());
            })
            .context("spawn job thread")?;
        tracing::info!(
            job = id,
            source = %request.source,
            dir = %request.target_dir.display(),
            "job started"
        );
        Ok(JobHandle {
            id,
            token,
            lifecycle,
            done_rx,
            join: Some(join),
            target_dir: request.target_dir,
            baseline,
            settings: self.settings.clone(),
        })
    }
}

struct Worker {
    id: JobId,
    engine: Arc<dyn Engine>,
    options: EngineOptions,
    settings: RunnerSettings,
    request: JobRequest,
    token: CancelToken,
    lifecycle: Arc<Lifecycle>,
    baseline: Arc<Baseline>,
    tx: Sender<Notification>,
}

impl Worker {
    fn run(self) {
        self.emit(JobEvent::Status(STARTING_STATUS.to_string()));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.retrieve(
                &self.request.source,
                &self.options,
                &self.token,
                &mut |progress| {
                    if self.token.is_cancelled() {
                        return Flow::Abort;
                    }
                    self.emit(JobEvent::Progress(describe_progress(&progress)));
                    Flow::Continue
                },
            )
        }))
        .unwrap_or_else(|_| Err(EngineError::Other("engine panicked".to_string())));

        let outcome = self.resolve(result);
        let report = sweep_artifacts(&self.request.target_dir, &self.baseline, &self.settings);
        tracing::info!(job = self.id, removed = report.removed, outcome = ?outcome, "job finished");
        self.emit(JobEvent::Outcome(outcome));
    }

    /// A cancellation observed before the engine returned wins over success.
    fn resolve(&self, result: Result<(), EngineError>) -> Outcome {
        if self.token.is_cancelled() {
            self.lifecycle.advance(JobState::Cancelling);
            self.lifecycle.advance(JobState::Cancelled);
            return Outcome::Cancelled;
        }
        match result {
            Ok(()) => {
                self.lifecycle.advance(JobState::Succeeded);
                Outcome::Completed
            }
            Err(EngineError::Aborted) => {
                self.lifecycle.advance(JobState::Cancelling);
                self.lifecycle.advance(JobState::Cancelled);
                Outcome::Cancelled
            }
            Err(err) => {
                self.lifecycle.advance(JobState::Failed);
                let detail = failure_detail(err);
                tracing::error!(job = self.id, error = %detail, "engine failed");
                Outcome::Failed(format!("An error occurred: {detail}"))
            }
        }
    }

    fn emit(&self, event: JobEvent) {
        let notification = Notification { job: self.id, event };
        if self.tx.send(notification).is_err() {
            tracing::debug!(job = self.id, "notification receiver gone");
        }
    }
}

/// Full error chain; the engine's stderr tail is part of its own message.
fn failure_detail(err: EngineError) -> String {
    format!("{:#}", anyhow::Error::new(err))
}

fn sweep_artifacts(dir: &Path, baseline: &Baseline, settings: &RunnerSettings) -> CleanupReport {
    cleanup_partial_artifacts(
        dir,
        baseline,
        &settings.audio_format,
        settings.min_valid_output_size,
    )
}

pub struct JobHandle {
    id: JobId,
    token: CancelToken,
    lifecycle: Arc<Lifecycle>,
    done_rx: Receiver<()>,
    join: Option<thread::JoinHandle<()>>,
    target_dir: PathBuf,
    baseline: Arc<Baseline>,
    settings: RunnerSettings,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.lifecycle.get()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(|j| j.is_finished()).unwrap_or(true)
    }

    /// Requests a stop, sweeps partial artifacts, and waits briefly for the
    /// worker. Returns whether the worker acknowledged within the bound.
    pub fn cancel(&self) -> bool {
        if self.token.cancel() {
            self.lifecycle.advance(JobState::Cancelling);
            tracing::info!(job = self.id, "cancellation requested");
        }
        sweep_artifacts(&self.target_dir, &self.baseline, &self.settings);
        match self.done_rx.recv_timeout(self.settings.cancel_ack_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(job = self.id, "worker still winding down after cancel");
                false
            }
        }
    }

    pub fn join(mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                tracing::error!(job = self.id, "job thread panicked");
            }
        }
    }
}
