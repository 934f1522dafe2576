//! Host integration: boot registration and the Docker CLI context.

use super::{BOOT_AGENT, DOCKER_CONTEXT};
use crate::context::Context;
use crate::dag::Step;
use crate::error::Result;
use crate::paths::Platform;
use async_trait::async_trait;
use kindling_vm::CommandSpec;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Where limactl is expected when it is not on `PATH`.
const FALLBACK_LIMACTL_MACOS: &str = "/opt/homebrew/bin/limactl";
const FALLBACK_LIMACTL_LINUX: &str = "/usr/local/bin/limactl";

fn limactl_path(platform: Platform) -> PathBuf {
    which::which("limactl").unwrap_or_else(|_| {
        PathBuf::from(match platform {
            Platform::MacOs => FALLBACK_LIMACTL_MACOS,
            Platform::Linux => FALLBACK_LIMACTL_LINUX,
        })
    })
}

/// launchd agent that starts the VM at login.
pub fn render_plist(vm: &str, limactl: &Path) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>dev.lima.{vm}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{limactl}</string>
        <string>start</string>
        <string>{vm}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <false/>
</dict>
</plist>
"#,
        limactl = limactl.display()
    )
}

/// systemd user unit that starts the VM at login.
pub fn render_unit(vm: &str, limactl: &Path) -> String {
    format!(
        "[Unit]
Description=Lima VM {vm}

[Service]
Type=oneshot
RemainAfterExit=yes
ExecStart={limactl} start --tty=false {vm}
ExecStop={limactl} stop {vm}

[Install]
WantedBy=default.target
",
        limactl = limactl.display()
    )
}

fn unit_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Registers the VM to start at login (launchd on macOS, systemd elsewhere).
pub struct BootAgent;

#[async_trait]
impl Step<Context> for BootAgent {
    fn name(&self) -> &'static str {
        BOOT_AGENT
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        let path = &ctx.paths.boot_agent;
        let vm = &ctx.settings.vm_name;
        let limactl = limactl_path(ctx.platform);

        let (contents, activate) = match ctx.platform {
            Platform::MacOs => (
                render_plist(vm, &limactl),
                vec![CommandSpec::new("launchctl")
                    .arg("load")
                    .arg(path.to_string_lossy())],
            ),
            Platform::Linux => (
                render_unit(vm, &limactl),
                vec![
                    CommandSpec::new("systemctl").args(["--user", "daemon-reload"]),
                    CommandSpec::new("systemctl")
                        .args(["--user", "enable"])
                        .arg(unit_name(path)),
                ],
            ),
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        tracing::info!(path = %path.display(), "Wrote boot agent");

        for spec in &activate {
            if !ctx.runner.run_best_effort(spec).await {
                tracing::warn!(cmd = %spec, "Failed to register boot agent");
            }
        }
        Ok(())
    }

    async fn delete(&self, ctx: &Context) {
        let path = &ctx.paths.boot_agent;
        let deactivate = match ctx.platform {
            Platform::MacOs => CommandSpec::new("launchctl")
                .arg("unload")
                .arg(path.to_string_lossy()),
            Platform::Linux => CommandSpec::new("systemctl")
                .args(["--user", "disable"])
                .arg(unit_name(path)),
        };
        ctx.runner.run_best_effort(&deactivate).await;

        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::info!(path = %path.display(), "Removed boot agent"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove boot agent"),
        }
        if ctx.platform == Platform::Linux {
            ctx.runner
                .run_best_effort(&CommandSpec::new("systemctl").args(["--user", "daemon-reload"]))
                .await;
        }
    }
}

/// Points the Docker CLI at the VM's engine.
///
/// Every command is tolerated: a stale context is removed first, and a
/// failure to create or switch is only logged.
pub struct DockerContext;

#[async_trait]
impl Step<Context> for DockerContext {
    fn name(&self) -> &'static str {
        DOCKER_CONTEXT
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        let name = ctx.settings.docker_context();
        let host = format!("host={}", ctx.docker_host());

        ctx.runner
            .run_best_effort(&CommandSpec::new("docker").args(["context", "rm", name.as_str()]))
            .await;

        let create = CommandSpec::new("docker").args(["context", "create", name.as_str(), "--docker", host.as_str()]);
        if !ctx.runner.run_best_effort(&create).await {
            tracing::warn!(context = %name, "Failed to create Docker context");
        }
        let switch = CommandSpec::new("docker").args(["context", "use", name.as_str()]);
        if !ctx.runner.run_best_effort(&switch).await {
            tracing::warn!(context = %name, "Failed to switch Docker context");
        }

        let show = CommandSpec::new("docker").args(["context", "show"]);
        if let Ok(out) = ctx.runner.run(&show).await {
            tracing::info!(context = %out.stdout.trim(), "Current Docker context");
        }
        Ok(())
    }

    async fn delete(&self, ctx: &Context) {
        let name = ctx.settings.docker_context();
        ctx.runner
            .run_best_effort(&CommandSpec::new("docker").args(["context", "use", "default"]))
            .await;
        ctx.runner
            .run_best_effort(&CommandSpec::new("docker").args(["context", "rm", name.as_str()]))
            .await;
        tracing::info!(context = %name, "Removed Docker context");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plist() {
        let plist = render_plist("myk8s-docker", Path::new("/opt/homebrew/bin/limactl"));
        assert!(plist.contains("<string>dev.lima.myk8s-docker</string>"));
        assert!(plist.contains(
            "<string>/opt/homebrew/bin/limactl</string>\n        <string>start</string>\n        <string>myk8s-docker</string>"
        ));
        assert!(plist.contains("<key>RunAtLoad</key>\n    <true/>"));
        assert!(plist.contains("<key>KeepAlive</key>\n    <false/>"));
    }

    #[test]
    fn test_render_unit() {
        let unit = render_unit("dev", Path::new("/usr/bin/limactl"));
        assert!(unit.contains("ExecStart=/usr/bin/limactl start --tty=false dev"));
        assert!(unit.contains("WantedBy=default.target"));
    }

    #[test]
    fn test_unit_name() {
        assert_eq!(
            unit_name(Path::new("/h/.config/systemd/user/lima-dev.service")),
            "lima-dev.service"
        );
    }
}
