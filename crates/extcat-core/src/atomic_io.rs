use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::time_utils::current_unix_timestamp_ms;

/// Replaces `path` with `content` in one rename.
///
/// The content is flushed to a sibling temp file first, so a crash mid-save
/// leaves the previous repository config in place.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<()> {
    let Some(file_name) = path.file_name() else {
        bail!("config path '{}' has no file name", path.display());
    };
    if path.is_dir() {
        bail!("config path '{}' is a directory", path.display());
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let staged = staging_path(dir, &file_name.to_string_lossy());
    let mut file = File::create(&staged)
        .with_context(|| format!("failed to create staged config {}", staged.display()))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to flush staged config {}", staged.display()))?;
    drop(file);

    if let Err(error) = std::fs::rename(&staged, path) {
        let _ = std::fs::remove_file(&staged);
        return Err(error)
            .with_context(|| format!("failed to replace config {}", path.display()));
    }
    Ok(())
}

fn staging_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(format!(
        ".{file_name}.{}-{}.partial",
        std::process::id(),
        current_unix_timestamp_ms()
    ))
}
