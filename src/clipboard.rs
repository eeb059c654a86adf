use anyhow::{Context, Result};

/// Current clipboard text, trimmed. Used as the source link input.
pub fn read_link() -> Result<String> {
    let mut clipboard = arboard::Clipboard::new().context("init clipboard")?;
    let text = clipboard.get_text().context("read clipboard text")?;
    Ok(text.trim().to_string())
}
