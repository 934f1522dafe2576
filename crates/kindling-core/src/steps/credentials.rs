//! Credential export and the shell-side activation of it.

use super::{EXPORT_KUBECONFIG, SHELL_PROFILES};
use crate::context::Context;
use crate::credentials::{link_default, normalize_server, restrict_permissions, unlink_default_if_owned};
use crate::dag::Step;
use crate::error::Result;
use crate::kube::Kubectl;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;

async fn remove_if_present(path: &Path, what: &str) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::info!(path = %path.display(), "Removed {what}"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove {what}"),
    }
}

/// Exports cluster credentials to the cluster-scoped file and makes them
/// usable without extra flags.
pub struct ExportKubeconfig;

#[async_trait]
impl Step<Context> for ExportKubeconfig {
    fn name(&self) -> &'static str {
        EXPORT_KUBECONFIG
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        let managed = &ctx.paths.kubeconfig;
        tokio::fs::create_dir_all(&ctx.paths.kube_dir).await?;

        tracing::info!(path = %managed.display(), "Exporting kubeconfig");
        ctx.cluster().export_kubeconfig(managed).await?;
        restrict_permissions(managed).await?;
        link_default(&ctx.paths.default_kubeconfig, managed).await?;
        normalize_server(managed).await?;

        let kubectl = ctx.kubectl();
        let context = ctx.settings.kube_context();
        let switch = kubectl.cmd(["config", "use-context", context.as_str()]);
        if !ctx.runner.run_best_effort(&switch).await {
            tracing::warn!(context = %context, "Failed to switch kubectl context");
        }

        ctx.runner.run_best_effort(&kubectl.cmd(["version", "--client"])).await;
        if let Ok(out) = ctx.runner.run(&kubectl.cmd(["config", "current-context"])).await {
            tracing::info!(context = %out.stdout.trim(), "Current kubectl context");
        }
        Ok(())
    }

    async fn delete(&self, ctx: &Context) {
        // Entries were merged into whatever the default config resolves to.
        let kubectl = Kubectl::new(ctx.paths.default_kubeconfig.clone());
        let context = ctx.settings.kube_context();
        for verb in ["delete-context", "delete-cluster", "delete-user"] {
            ctx.runner
                .run_best_effort(&kubectl.cmd(["config", verb, context.as_str()]))
                .await;
        }

        remove_if_present(&ctx.paths.kubeconfig, "kubeconfig").await;
        unlink_default_if_owned(&ctx.paths.default_kubeconfig, &ctx.paths.kubeconfig).await;
    }
}

/// Helper script that activates the cluster in the current shell.
pub fn render_activation_script(kubeconfig: &Path, cluster: &str) -> String {
    format!(
        "#!/bin/bash\nexport KUBECONFIG={}\necho \"Kubernetes context set to {cluster}\"\nkubectl cluster-info\n",
        kubeconfig.display()
    )
}

/// Registers the `KUBECONFIG` export in shell startup files and writes the
/// activation helper.
pub struct ShellProfiles;

#[async_trait]
impl Step<Context> for ShellProfiles {
    fn name(&self) -> &'static str {
        SHELL_PROFILES
    }

    async fn create(&self, ctx: &Context) -> Result<()> {
        let changed = ctx.profiles().ensure(&ctx.paths.kubeconfig_export()).await?;
        tracing::info!(changed, "Shell profiles updated");

        let script = &ctx.paths.activation_script;
        if let Some(parent) = script.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(
            script,
            render_activation_script(&ctx.paths.kubeconfig, &ctx.settings.cluster_name),
        )
        .await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755)).await?;
        }
        tracing::info!(path = %script.display(), "Created activation script");
        Ok(())
    }

    async fn delete(&self, ctx: &Context) {
        ctx.profiles().remove(&ctx.paths.kubeconfig_export()).await;
        remove_if_present(&ctx.paths.activation_script, "activation script").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_script() {
        let script = render_activation_script(Path::new("/h/.kube/myk8s-config"), "myk8s");
        assert_eq!(
            script,
            "#!/bin/bash\nexport KUBECONFIG=/h/.kube/myk8s-config\necho \"Kubernetes context set to myk8s\"\nkubectl cluster-info\n"
        );
    }
}
