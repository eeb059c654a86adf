use crate::cancel::CancelToken;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::thread;

const PROGRESS_TAG: &str = "tubetone-progress";
const STDERR_TAIL_LINES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Transferring,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineProgress {
    pub status: TransferStatus,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    pub filename: String,
}

impl EngineProgress {
    pub fn total(&self) -> Option<u64> {
        self.total_bytes.or(self.total_bytes_estimate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub output_template: String,
    pub audio_format: String,
    pub bitrate_kbps: u32,
    pub embed_thumbnail: bool,
    pub retries: u32,
    pub resumable: bool,
    pub expand_playlist: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Download cancelled by user.")]
    Aborted,
    #[error("failed to launch {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Exited {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("engine i/o failed")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Other(String),
}

/// `on_progress` is invoked on the calling thread for every progress tick;
/// returning [`Flow::Abort`] must stop the transfer and yield
/// [`EngineError::Aborted`].
pub trait Engine: Send + Sync {
    fn retrieve(
        &self,
        source: &str,
        options: &EngineOptions,
        token: &CancelToken,
        on_progress: &mut dyn FnMut(EngineProgress) -> Flow,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    program: String,
    leading_args: Vec<String>,
}

impl YtDlpEngine {
    pub fn new(program: impl Into<String>, leading_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    /// Accepts a whitespace separated command such as `python3 -m yt_dlp`.
    pub fn from_command_line(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "yt-dlp".to_string());
        Self::new(program, parts.collect())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn build_args(&self, source: &str, options: &EngineOptions) -> Vec<String> {
        let template = format!(
            "download:{PROGRESS_TAG}|%(progress.status)s|%(progress.downloaded_bytes)s|\
             %(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.filename)s"
        );
        let mut args = self.leading_args.clone();
        args.extend(
            [
                "--newline",
                "--quiet",
                "--no-warnings",
                "--progress",
                "--progress-template",
            ]
            .map(String::from),
        );
        args.push(template);
        args.extend(
            ["--format", "bestaudio/best", "--extract-audio", "--audio-format"].map(String::from),
        );
        args.push(options.audio_format.clone());
        args.push("--audio-quality".to_string());
        args.push(format!("{}K", options.bitrate_kbps));
        if options.embed_thumbnail {
            args.push("--embed-thumbnail".to_string());
        }
        args.push("--retries".to_string());
        args.push(options.retries.to_string());
        args.push(if options.resumable { "--continue" } else { "--no-continue" }.to_string());
        args.push(
            if options.expand_playlist {
                "--yes-playlist"
            } else {
                "--no-playlist"
            }
            .to_string(),
        );
        args.push("--output".to_string());
        args.push(options.output_template.clone());
        args.push("--".to_string());
        args.push(source.to_string());
        args
    }
}

impl Default for YtDlpEngine {
    fn default() -> Self {
        Self::new("yt-dlp", Vec::new())
    }
}

impl Engine for YtDlpEngine {
    fn retrieve(
        &self,
        source: &str,
        options: &EngineOptions,
        token: &CancelToken,
        on_progress: &mut dyn FnMut(EngineProgress) -> Flow,
    ) -> Result<(), EngineError> {
        tracing::debug!(program = %self.program, source, "spawning engine");
        let mut command = Command::new(&self.program);
        command
            .args(self.build_args(source, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // own process group so the transcoder it launches is signalled too
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);
        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let pid = child.id();
        token.set_interrupter(move || terminate(pid));

        let stderr_tail = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>().join("\n")
            })
        });

        let mut aborted = false;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        tracing::debug!(error = %err, "engine stdout closed");
                        break;
                    }
                };
                let Some(progress) = parse_progress_line(&line) else {
                    tracing::debug!(line = %line, "engine output");
                    continue;
                };
                if on_progress(progress) == Flow::Abort {
                    aborted = true;
                    break;
                }
            }
        }

        // The pid stays reserved until `wait` reaps it, so the interrupter
        // must be gone before then.
        token.clear_interrupter();
        if aborted || token.is_cancelled() {
            terminate(pid);
            kill_child(&mut child);
        }
        let status = child.wait();
        let stderr = stderr_tail
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        let status = status?;

        if aborted || token.is_cancelled() {
            return Err(EngineError::Aborted);
        }
        if !status.success() {
            return Err(EngineError::Exited {
                program: self.program.clone(),
                status: status.to_string(),
                stderr,
            });
        }
        Ok(())
    }
}

pub fn parse_progress_line(line: &str) -> Option<EngineProgress> {
    let rest = line.trim_end().strip_prefix(PROGRESS_TAG)?.strip_prefix('|')?;
    let mut fields = rest.splitn(5, '|');
    let status = match fields.next()? {
        "downloading" => TransferStatus::Transferring,
        "finished" => TransferStatus::Finished,
        _ => return None,
    };
    let downloaded_bytes = parse_bytes(fields.next()?).unwrap_or(0);
    let total_bytes = parse_bytes(fields.next()?);
    let total_bytes_estimate = parse_bytes(fields.next()?);
    let filename = fields.next().unwrap_or_default().to_string();
    Some(EngineProgress {
        status,
        downloaded_bytes,
        total_bytes,
        total_bytes_estimate,
        filename,
    })
}

fn parse_bytes(field: &str) -> Option<u64> {
    let value: f64 = field.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

fn kill_child(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "engine already exited");
    }
}

/// Signals the engine's whole process group.
#[cfg(unix)]
fn terminate(pid: u32) {
    // SAFETY: plain signal delivery to a group led by our unreaped child.
    let rc = unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGTERM) };
    if rc != 0 {
        tracing::debug!(pid, "terminate signal not delivered");
    }
}

#[cfg(not(unix))]
fn terminate(pid: u32) {
    tracing::debug!(pid, "no out-of-band interrupt on this platform; waiting for next tick");
}
