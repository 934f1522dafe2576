//! Idempotent line registration in shell startup files.
//!
//! Lines are compared after trimming whitespace; a file that does not exist
//! is created by `ensure` and ignored by `remove`.

use crate::error::Result;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// A set of startup files that should all carry the same registrations.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    files: Vec<PathBuf>,
}

impl ProfileRegistry {
    /// Manage registrations across `files`.
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    /// Files under management.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Append `line` to every file that does not already contain it.
    ///
    /// Returns the number of files that were modified.
    pub async fn ensure(&self, line: &str) -> Result<usize> {
        let mut changed = 0;
        for file in &self.files {
            if ensure_line(file, line).await? {
                tracing::info!(file = %file.display(), "Registered line in shell profile");
                changed += 1;
            } else {
                tracing::debug!(file = %file.display(), "Line already present");
            }
        }
        Ok(changed)
    }

    /// Remove every occurrence of `line` from every file. Never fails.
    ///
    /// Returns the number of files that were modified.
    pub async fn remove(&self, line: &str) -> usize {
        let mut changed = 0;
        for file in &self.files {
            match remove_line(file, line).await {
                Ok(true) => {
                    tracing::info!(file = %file.display(), "Removed line from shell profile");
                    changed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "Failed to update shell profile")
                }
            }
        }
        changed
    }

    /// Check whether every managed file contains `line`.
    pub async fn contains(&self, line: &str) -> Result<bool> {
        for file in &self.files {
            if !has_line(&read_or_empty(file).await?, line) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

async fn read_or_empty(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e.into()),
    }
}

fn has_line(content: &str, line: &str) -> bool {
    let needle = line.trim();
    content.lines().any(|l| l.trim() == needle)
}

async fn ensure_line(path: &Path, line: &str) -> Result<bool> {
    let content = read_or_empty(path).await?;
    if has_line(&content, line) {
        return Ok(false);
    }

    let mut entry = String::new();
    if !content.is_empty() && !content.ends_with('\n') {
        entry.push('\n');
    }
    entry.push_str(line.trim());
    entry.push('\n');

    let mut f = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    f.write_all(entry.as_bytes()).await?;
    f.flush().await?;
    Ok(true)
}

async fn remove_line(path: &Path, line: &str) -> Result<bool> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if !has_line(&content, line) {
        return Ok(false);
    }

    let needle = line.trim();
    let mut kept: String = content
        .lines()
        .filter(|l| l.trim() != needle)
        .collect::<Vec<_>>()
        .join("\n");
    if content.ends_with('\n') && !kept.is_empty() {
        kept.push('\n');
    }
    tokio::fs::write(path, kept).await?;
    Ok(true)
}
