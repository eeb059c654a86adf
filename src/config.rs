use anyhow::{Context, Result};
use directories::{BaseDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const KIB: u64 = 1024;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub target_bitrate_kbps: u32,
    pub default_output_dir: PathBuf,
    pub min_valid_output_size_bytes: u64,
    pub retry_count: u32,
    pub audio_format: String,
    pub transcoder: String,
    pub engine_binary: String,
    pub reachability_probe: String,
    pub reachability_timeout_ms: u64,
    pub cancel_ack_timeout_ms: u64,
    pub completed_reset_secs: u64,
    pub cancelled_reset_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_bitrate_kbps: 320,
            default_output_dir: default_downloads_dir(),
            min_valid_output_size_bytes: 200 * KIB,
            retry_count: 3,
            audio_format: "mp3".to_string(),
            transcoder: "ffmpeg".to_string(),
            engine_binary: "yt-dlp".to_string(),
            reachability_probe: "8.8.8.8:53".to_string(),
            reachability_timeout_ms: 3000,
            cancel_ack_timeout_ms: 1200,
            completed_reset_secs: 10,
            cancelled_reset_secs: 4,
        }
    }
}

impl Config {
    pub fn reachability_timeout(&self) -> Duration {
        Duration::from_millis(self.reachability_timeout_ms)
    }

    pub fn cancel_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_ack_timeout_ms)
    }

    pub fn completed_reset_delay(&self) -> Duration {
        Duration::from_secs(self.completed_reset_secs)
    }

    pub fn cancelled_reset_delay(&self) -> Duration {
        Duration::from_secs(self.cancelled_reset_secs)
    }
}

fn default_downloads_dir() -> PathBuf {
    if let Some(dir) = UserDirs::new().and_then(|dirs| dirs.download_dir().map(Path::to_path_buf)) {
        return dir;
    }
    BaseDirs::new()
        .map(|base| base.home_dir().join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new() -> Result<Self> {
        let base = BaseDirs::new().context("unable to resolve home directory")?;
        let path = base.home_dir().join(".config").join("tubetone.yaml");
        Ok(Self { path })
    }

    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            return Ok(Config::default());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read config {}", self.path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parse config {}", self.path.display()))?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let contents = serde_yaml::to_string(config)?;
        fs::write(&self.path, contents)
            .with_context(|| format!("write config {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn config_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let store = ConfigStore::at(dir.path().join("nested").join("tubetone.yaml"));
        let mut cfg = Config::default();
        cfg.target_bitrate_kbps = 192;
        cfg.default_output_dir = PathBuf::from("music");
        cfg.retry_count = 5;
        cfg.completed_reset_secs = 2;
        store.save(&cfg)?;
        let loaded = store.load()?;
        assert_eq!(loaded.target_bitrate_kbps, 192);
        assert_eq!(loaded.default_output_dir, PathBuf::from("music"));
        assert_eq!(loaded.retry_count, 5);
        assert_eq!(loaded.completed_reset_delay(), Duration::from_secs(2));
        assert_eq!(loaded.min_valid_output_size_bytes, 200 * KIB);
        Ok(())
    }

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = tempdir()?;
        let store = ConfigStore::at(dir.path().join("absent.yaml"));
        let cfg = store.load()?;
        assert_eq!(cfg.target_bitrate_kbps, 320);
        assert_eq!(cfg.retry_count, 3);
        assert_eq!(cfg.min_valid_output_size_bytes, 204_800);
        Ok(())
    }

    #[test]
    fn partial_yaml_fills_remaining_fields() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("tubetone.yaml");
        fs::write(&path, "retry_count: 7\ntranscoder: avconv\n")?;
        let cfg = ConfigStore::at(path).load()?;
        assert_eq!(cfg.retry_count, 7);
        assert_eq!(cfg.transcoder, "avconv");
        assert_eq!(cfg.engine_binary, "yt-dlp");
        Ok(())
    }
}
