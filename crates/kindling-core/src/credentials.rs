//! Credential file normalization and default-path ownership.

use crate::error::Result;
use std::io::ErrorKind;
use std::path::Path;

const LOCALHOST_SERVER: &str = "server: https://localhost:";
const LOOPBACK_SERVER: &str = "server: https://127.0.0.1:";

/// Replace `localhost` API endpoints with the loopback literal.
///
/// Returns `None` when nothing needed rewriting.
pub fn rewrite_localhost(contents: &str) -> Option<String> {
    contents
        .contains(LOCALHOST_SERVER)
        .then(|| contents.replace(LOCALHOST_SERVER, LOOPBACK_SERVER))
}

/// Apply [`rewrite_localhost`] to a file in place. Returns whether it changed.
pub async fn normalize_server(path: &Path) -> Result<bool> {
    let contents = tokio::fs::read_to_string(path).await?;
    match rewrite_localhost(&contents) {
        Some(rewritten) => {
            tokio::fs::write(path, rewritten).await?;
            tracing::info!(path = %path.display(), "Rewrote localhost API endpoint to 127.0.0.1");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Restrict a file to owner read/write.
pub async fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Point `default` at `managed` if `default` is missing or empty.
///
/// A non-empty default (including a symlink to some other non-empty file)
/// is never replaced. A dangling symlink counts as missing. Returns whether
/// the link was created.
pub async fn link_default(default: &Path, managed: &Path) -> Result<bool> {
    match tokio::fs::metadata(default).await {
        Ok(meta) if meta.len() > 0 => {
            tracing::info!(
                path = %default.display(),
                "Default kubeconfig already has content, leaving it alone"
            );
            return Ok(false);
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    // Empty file or dangling link in the way.
    match tokio::fs::remove_file(default).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if let Some(parent) = default.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    symlink(managed, default).await?;
    tracing::info!(
        link = %default.display(),
        target = %managed.display(),
        "Linked default kubeconfig"
    );
    Ok(true)
}

/// Remove `default` only if it is a symlink that resolves to `managed`.
///
/// Never fails; returns whether the link was removed.
pub async fn unlink_default_if_owned(default: &Path, managed: &Path) -> bool {
    let is_link = matches!(
        tokio::fs::symlink_metadata(default).await,
        Ok(meta) if meta.file_type().is_symlink()
    );
    if !is_link {
        return false;
    }

    match tokio::fs::read_link(default).await {
        Ok(target) if target == managed => match tokio::fs::remove_file(default).await {
            Ok(()) => {
                tracing::info!(path = %default.display(), "Removed default kubeconfig link");
                true
            }
            Err(e) => {
                tracing::warn!(path = %default.display(), error = %e, "Failed to remove default kubeconfig link");
                false
            }
        },
        Ok(target) => {
            tracing::info!(
                path = %default.display(),
                target = %target.display(),
                "Default kubeconfig points elsewhere, keeping it"
            );
            false
        }
        Err(_) => false,
    }
}

#[cfg(unix)]
async fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(not(unix))]
async fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        ErrorKind::Unsupported,
        "symlinks require a unix host",
    ))
}
