use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create dir {}", path.display()))?;
    Ok(())
}

/// Create-if-missing without failing; later write errors surface through the
/// job outcome instead.
pub fn ensure_dir_best_effort(path: &Path) -> bool {
    match ensure_dir(path) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "target directory not created");
            false
        }
    }
}

pub fn output_template(dir: &Path) -> String {
    dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned()
}

pub fn finished_outputs(dir: &Path, ext: &str, min_valid_size: u64) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(ext))
            .unwrap_or(false);
        if matches_ext && entry.metadata()?.len() >= min_valid_size {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
