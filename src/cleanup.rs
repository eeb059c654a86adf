use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

const INTERMEDIATE_EXTENSIONS: &[&str] = &[
    "part", "ytdl", "temp", "tmp", "webm", "m4a", "mp4", "mkv", "opus", "ogg", "aac", "flv",
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

/// Files that were already in a target directory before a job started,
/// keyed by name with their modification time at that moment.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    files: HashMap<OsString, Option<SystemTime>>,
}

impl Baseline {
    pub fn capture(dir: &Path) -> Self {
        let files = fs::read_dir(dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| {
                        let meta = entry.metadata().ok()?;
                        meta.is_file().then(|| (entry.file_name(), meta.modified().ok()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { files }
    }

    /// A file predates the job unless it is new or was rewritten since capture.
    fn predates(&self, name: &OsStr, modified: Option<SystemTime>) -> bool {
        self.files.get(name).is_some_and(|before| *before == modified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    Intermediate,
    Thumbnail,
    Undersized,
}

/// Deletes leftovers the job produced in `dir`: intermediate files,
/// thumbnails, and `output_ext` files smaller than `min_valid_size` bytes.
/// Anything recorded in `baseline` and left unmodified is kept.
pub fn cleanup_partial_artifacts(
    dir: &Path,
    baseline: &Baseline,
    output_ext: &str,
    min_valid_size: u64,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(dir = %dir.display(), error = %err, "cleanup skipped");
            return report;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if !meta.is_file() || baseline.predates(&entry.file_name(), meta.modified().ok()) {
            continue;
        }
        let verdict = classify(&path, meta.len(), output_ext, min_valid_size);
        if verdict == Verdict::Keep {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), kind = ?verdict, "removed partial artifact");
                report.removed += 1;
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "could not remove artifact");
                report.failed += 1;
            }
        }
    }
    report
}

fn classify(path: &Path, len: u64, output_ext: &str, min_valid_size: u64) -> Verdict {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return Verdict::Keep;
    };
    let ext = ext.to_ascii_lowercase();
    if ext.eq_ignore_ascii_case(output_ext) {
        if len < min_valid_size {
            Verdict::Undersized
        } else {
            Verdict::Keep
        }
    } else if INTERMEDIATE_EXTENSIONS.contains(&ext.as_str()) {
        Verdict::Intermediate
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Verdict::Thumbnail
    } else {
        Verdict::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const MIN: u64 = 200 * 1024;

    fn write_len(dir: &Path, name: &str, len: usize) -> Result<()> {
        fs::write(dir.join(name), vec![0u8; len])?;
        Ok(())
    }

    #[test]
    fn removes_recognized_leftovers_only() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_len(root, "song.f251.webm.part", 10)?;
        write_len(root, "song.webm", 10)?;
        write_len(root, "song.webp", 10)?;
        write_len(root, "Cover.JPG", 10)?;
        write_len(root, "short.mp3", 1024)?;
        write_len(root, "full.mp3", MIN as usize)?;
        write_len(root, "notes.txt", 10)?;
        write_len(root, "README", 10)?;
        fs::create_dir(root.join("clip.mp4"))?;

        let report = cleanup_partial_artifacts(root, &Baseline::default(), "mp3", MIN);
        assert_eq!(report.removed, 5);
        assert_eq!(report.failed, 0);

        let mut left: Vec<String> = fs::read_dir(root)?
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["README", "clip.mp4", "full.mp3", "notes.txt"]);
        Ok(())
    }

    #[test]
    fn second_pass_is_a_no_op() -> Result<()> {
        let dir = tempdir()?;
        write_len(dir.path(), "a.part", 1)?;
        write_len(dir.path(), "b.mp3", 3)?;
        let first = cleanup_partial_artifacts(dir.path(), &Baseline::default(), "mp3", MIN);
        let second = cleanup_partial_artifacts(dir.path(), &Baseline::default(), "mp3", MIN);
        assert_eq!(first.removed, 2);
        assert_eq!(second, CleanupReport::default());
        Ok(())
    }

    #[test]
    fn missing_directory_is_silent() {
        let dir = Path::new("/definitely/not/here");
        let report = cleanup_partial_artifacts(dir, &Baseline::capture(dir), "mp3", MIN);
        assert_eq!(report, CleanupReport::default());
    }

    #[test]
    fn threshold_follows_configured_format() -> Result<()> {
        let dir = tempdir()?;
        write_len(dir.path(), "tiny.mp3", 10)?;
        write_len(dir.path(), "tiny.flac", 10)?;
        let report = cleanup_partial_artifacts(dir.path(), &Baseline::default(), "flac", MIN);
        assert_eq!(report.removed, 1);
        assert!(dir.path().join("tiny.mp3").exists());
        Ok(())
    }

    #[test]
    fn files_present_before_the_job_survive() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        write_len(root, "holiday-photo.jpg", 500_000)?;
        write_len(root, "home-video.mp4", 500_000)?;
        write_len(root, "ringtone.mp3", 50_000)?;
        let baseline = Baseline::capture(root);

        write_len(root, "Track.f251.webm.part", 10)?;
        write_len(root, "Track.webp", 10)?;
        let report = cleanup_partial_artifacts(root, &baseline, "mp3", MIN);
        assert_eq!(report.removed, 2);

        let mut left: Vec<String> = fs::read_dir(root)?
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["holiday-photo.jpg", "home-video.mp4", "ringtone.mp3"]);
        Ok(())
    }

    #[test]
    fn rewritten_baseline_file_is_treated_as_job_output() -> Result<()> {
        let dir = tempdir()?;
        let part = dir.path().join("Track.webm.part");
        fs::write(&part, b"old")?;
        let baseline = Baseline::capture(dir.path());
        let earlier = fs::metadata(&part)?.modified()?;
        let file = fs::OpenOptions::new().append(true).open(&part)?;
        file.set_modified(earlier + std::time::Duration::from_secs(5))?;
        drop(file);

        let report = cleanup_partial_artifacts(dir.path(), &baseline, "mp3", MIN);
        assert_eq!(report.removed, 1);
        assert!(!part.exists());
        Ok(())
    }

    #[test]
    fn output_format_sharing_an_intermediate_extension_is_kept() -> Result<()> {
        let dir = tempdir()?;
        write_len(dir.path(), "Song.m4a", 5 * 1024 * 1024)?;
        write_len(dir.path(), "Broken.m4a", 1024)?;
        write_len(dir.path(), "Song.f140.mp4.part", 10)?;
        let report = cleanup_partial_artifacts(dir.path(), &Baseline::default(), "m4a", MIN);
        assert_eq!(report.removed, 2);
        assert!(dir.path().join("Song.m4a").exists());
        Ok(())
    }
}
