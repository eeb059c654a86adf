#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tubetone::cancel::CancelToken;
use tubetone::engine::{Engine, EngineError, EngineOptions, EngineProgress, Flow, TransferStatus};
use tubetone::job::RunnerSettings;

pub const MIN_VALID: u64 = 200 * 1024;
const TICK: Duration = Duration::from_millis(20);
const PATIENCE: Duration = Duration::from_secs(5);

pub fn settings() -> RunnerSettings {
    RunnerSettings {
        audio_format: "mp3".to_string(),
        bitrate_kbps: 320,
        retry_count: 3,
        min_valid_output_size: MIN_VALID,
        cancel_ack_timeout: Duration::from_millis(1200),
    }
}

pub fn target_dir(options: &EngineOptions) -> PathBuf {
    Path::new(&options.output_template)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

pub fn transferring(downloaded: u64, total: u64, name: &str) -> EngineProgress {
    EngineProgress {
        status: TransferStatus::Transferring,
        downloaded_bytes: downloaded,
        total_bytes: Some(total),
        total_bytes_estimate: None,
        filename: name.to_string(),
    }
}

pub fn finished(total: u64, name: &str) -> EngineProgress {
    EngineProgress {
        status: TransferStatus::Finished,
        ..transferring(total, total, name)
    }
}

pub fn write_len(dir: &Path, name: &str, len: u64) {
    let _ = fs::write(dir.join(name), vec![0u8; len as usize]);
}

/// How the scripted engine behaves once its progress script is exhausted.
#[derive(Debug, Clone)]
pub enum Ending {
    /// Writes a finished output of the given size and succeeds.
    Succeed { output_len: u64 },
    /// Fails with the given message.
    Fail(String),
    /// Keeps ticking progress until told to abort.
    TickUntilAborted,
    /// Waits for the token without further callbacks, then succeeds.
    SucceedAfterCancel,
    Panic,
}

/// In-process engine that replays a transfer into the target directory.
pub struct ScriptedEngine {
    pub title: String,
    pub ending: Ending,
}

impl ScriptedEngine {
    pub fn new(ending: Ending) -> Self {
        Self {
            title: "Sample Track".to_string(),
            ending,
        }
    }
}

impl Engine for ScriptedEngine {
    fn retrieve(
        &self,
        _source: &str,
        options: &EngineOptions,
        token: &CancelToken,
        on_progress: &mut dyn FnMut(EngineProgress) -> Flow,
    ) -> Result<(), EngineError> {
        let dir = target_dir(options);
        let output = format!("{}.{}", self.title, options.audio_format);
        let part = format!("{}.f251.webm.part", self.title);
        let total = 1000;
        write_len(&dir, &part, 10);

        for downloaded in [100, 400, 700] {
            if on_progress(transferring(downloaded, total, &dir.join(&part).to_string_lossy()))
                == Flow::Abort
            {
                return Err(EngineError::Aborted);
            }
        }

        match &self.ending {
            Ending::Succeed { output_len } => {
                if on_progress(finished(total, &part)) == Flow::Abort {
                    return Err(EngineError::Aborted);
                }
                let _ = fs::remove_file(dir.join(&part));
                write_len(&dir, &format!("{}.webp", self.title), 64);
                write_len(&dir, &output, *output_len);
                Ok(())
            }
            Ending::Fail(message) => {
                write_len(&dir, &output, 512);
                Err(EngineError::Other(message.clone()))
            }
            Ending::TickUntilAborted => {
                let deadline = Instant::now() + PATIENCE;
                while Instant::now() < deadline {
                    thread::sleep(TICK);
                    if on_progress(transferring(700, total, &part)) == Flow::Abort {
                        return Err(EngineError::Aborted);
                    }
                }
                Err(EngineError::Other("scripted engine was never cancelled".to_string()))
            }
            Ending::SucceedAfterCancel => {
                let deadline = Instant::now() + PATIENCE;
                while !token.is_cancelled() && Instant::now() < deadline {
                    thread::sleep(TICK);
                }
                write_len(&dir, &output, MIN_VALID * 2);
                Ok(())
            }
            Ending::Panic => panic!("scripted engine blew up"),
        }
    }
}

pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|rd| {
            rd.flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
