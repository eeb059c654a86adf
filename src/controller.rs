use crate::config::Config;
use crate::engine::Engine;
use crate::job::{
    JobEvent, JobHandle, JobId, JobRequest, JobRunner, Notification, Outcome, RunnerSettings,
};
use crate::preflight::Environment;
use crate::storage;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub const READY_STATUS: &str = "Ready";
pub const QUEUED_STATUS: &str = "Queued";
pub const DONE_STATUS: &str = "Done";
pub const CANCELLED_STATUS: &str = "Cancelled";
pub const ERROR_STATUS: &str = "Error";

const NOTIFICATION_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("{0} was not found on PATH. Install FFmpeg and try again.")]
    MissingTranscoder(String),
    #[error("No internet connection. Check your network and try again.")]
    Offline,
    #[error("Please paste a video link.")]
    EmptySource,
    #[error("A download is already running.")]
    JobActive,
    #[error("Could not start the download: {0}")]
    Spawn(String),
}

impl Rejection {
    pub fn title(&self) -> &'static str {
        match self {
            Rejection::MissingTranscoder(_) => "FFmpeg Missing",
            Rejection::Offline => "Offline",
            Rejection::EmptySource => "No Link",
            Rejection::JobActive => "Busy",
            Rejection::Spawn(_) => "Error",
        }
    }

    /// Rejections that deserve a blocking dialog rather than a status line.
    fn is_alarming(&self) -> bool {
        !matches!(self, Rejection::EmptySource | Rejection::JobActive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewState {
    pub input: String,
    pub target_dir: PathBuf,
    pub status: String,
    pub percent: u8,
    pub start_enabled: bool,
    pub cancel_enabled: bool,
    pub dialog: Option<Dialog>,
}

impl ViewState {
    fn ready(target_dir: PathBuf) -> Self {
        Self {
            input: String::new(),
            target_dir,
            status: READY_STATUS.to_string(),
            percent: 0,
            start_enabled: true,
            cancel_enabled: false,
            dialog: None,
        }
    }
}

pub struct Controller {
    config: Config,
    runner: JobRunner,
    environment: Box<dyn Environment>,
    tx: Sender<Notification>,
    rx: Receiver<Notification>,
    active: Option<JobHandle>,
    retiring: Option<JobHandle>,
    view: ViewState,
    reset_at: Option<Instant>,
}

impl Controller {
    pub fn new(config: Config, engine: Arc<dyn Engine>, environment: Box<dyn Environment>) -> Self {
        let (tx, rx) = bounded(NOTIFICATION_CAPACITY);
        let runner = JobRunner::new(engine, RunnerSettings::from(&config));
        let view = ViewState::ready(config.default_output_dir.clone());
        Self {
            config,
            runner,
            environment,
            tx,
            rx,
            active: None,
            retiring: None,
            view,
            reset_at: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_job(&self) -> Option<JobId> {
        self.active.as_ref().map(JobHandle::id)
    }

    pub fn set_input(&mut self, text: &str) {
        self.view.input = text.to_string();
    }

    pub fn set_target_dir(&mut self, dir: PathBuf) {
        tracing::info!(dir = %dir.display(), "target directory changed");
        self.view.target_dir = dir;
    }

    pub fn request_start(&mut self, source: &str, target_dir: &Path) -> Result<JobId, Rejection> {
        self.view.input = source.to_string();
        match self.admit(source, target_dir) {
            Ok(id) => Ok(id),
            Err(rejection) => {
                tracing::warn!(reason = %rejection, "download rejected");
                if rejection.is_alarming() {
                    self.view.dialog = Some(Dialog {
                        title: rejection.title().to_string(),
                        message: rejection.to_string(),
                    });
                } else if rejection == Rejection::EmptySource {
                    self.view.status = rejection.to_string();
                }
                Err(rejection)
            }
        }
    }

    fn admit(&mut self, source: &str, target_dir: &Path) -> Result<JobId, Rejection> {
        if self.is_busy() {
            return Err(Rejection::JobActive);
        }
        if !self.environment.transcoder_available(&self.config.transcoder) {
            return Err(Rejection::MissingTranscoder(self.config.transcoder.clone()));
        }
        if !self.environment.is_online() {
            return Err(Rejection::Offline);
        }
        let source = source.trim();
        if source.is_empty() {
            return Err(Rejection::EmptySource);
        }
        storage::ensure_dir_best_effort(target_dir);

        let request = JobRequest {
            source: source.to_string(),
            target_dir: target_dir.to_path_buf(),
        };
        let handle = self
            .runner
            .start(request, self.tx.clone())
            .map_err(|err| Rejection::Spawn(format!("{err:#}")))?;
        let id = handle.id();
        self.active = Some(handle);
        self.view.target_dir = target_dir.to_path_buf();
        self.view.start_enabled = false;
        self.view.cancel_enabled = true;
        self.view.percent = 0;
        self.view.status = QUEUED_STATUS.to_string();
        self.view.dialog = None;
        self.reset_at = None;
        Ok(id)
    }

    /// A single-flight slot is free only once the previous worker thread has
    /// exited, even when its cancellation was already presented as final.
    fn is_busy(&mut self) -> bool {
        self.reap_retired();
        self.active.is_some() || self.retiring.is_some()
    }

    pub fn request_cancel(&mut self, now: Instant) -> bool {
        let Some(handle) = self.active.take() else {
            return false;
        };
        let acknowledged = handle.cancel();
        tracing::info!(job = handle.id(), acknowledged, "download cancelled");
        self.retiring = Some(handle);
        self.present_cancelled(now);
        true
    }

    pub fn poll(&mut self, now: Instant) -> Option<Outcome> {
        let mut handled = None;
        while let Ok(notification) = self.rx.try_recv() {
            if let Some(outcome) = self.handle_notification(notification, now) {
                handled = Some(outcome);
            }
        }
        self.reap_retired();
        if self.reset_at.is_some_and(|at| at <= now) {
            self.reset_view();
        }
        handled
    }

    pub fn dismiss_dialog(&mut self) {
        if self.view.dialog.take().is_some() && self.active.is_none() {
            self.reset_view();
        }
    }

    fn handle_notification(&mut self, notification: Notification, now: Instant) -> Option<Outcome> {
        if self.active_job() != Some(notification.job) {
            tracing::debug!(job = notification.job, "dropping notification from inactive job");
            return None;
        }
        match notification.event {
            JobEvent::Progress(progress) => {
                self.view.percent = progress.percent as u8;
                self.view.status = progress.descriptor;
                None
            }
            JobEvent::Status(text) => {
                self.view.status = text;
                None
            }
            JobEvent::Outcome(outcome) => {
                self.retiring = self.active.take();
                self.apply_outcome(&outcome, now);
                Some(outcome)
            }
        }
    }

    fn apply_outcome(&mut self, outcome: &Outcome, now: Instant) {
        match outcome {
            Outcome::Completed => {
                self.view.percent = 100;
                self.view.status = DONE_STATUS.to_string();
                self.view.start_enabled = true;
                self.view.cancel_enabled = false;
                self.reset_at = Some(now + self.config.completed_reset_delay());
            }
            other if other.is_user_cancellation() => self.present_cancelled(now),
            Outcome::Failed(detail) => {
                self.view.status = ERROR_STATUS.to_string();
                self.view.start_enabled = true;
                self.view.cancel_enabled = false;
                self.view.dialog = Some(Dialog {
                    title: "Error".to_string(),
                    message: detail.clone(),
                });
                self.reset_at = None;
            }
            Outcome::Cancelled => self.present_cancelled(now),
        }
    }

    fn present_cancelled(&mut self, now: Instant) {
        self.view.status = CANCELLED_STATUS.to_string();
        self.view.input.clear();
        self.view.start_enabled = true;
        self.view.cancel_enabled = false;
        self.reset_at = Some(now + self.config.cancelled_reset_delay());
    }

    fn reset_view(&mut self) {
        self.view.input.clear();
        self.view.percent = 0;
        self.view.status = READY_STATUS.to_string();
        self.view.start_enabled = self.active.is_none();
        self.view.cancel_enabled = self.active.is_some();
        self.reset_at = None;
    }

    fn reap_retired(&mut self) {
        if self.retiring.as_ref().is_some_and(JobHandle::is_finished) {
            if let Some(handle) = self.retiring.take() {
                handle.join();
            }
        }
    }
}
