use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use super::SoftwareResolver;
use crate::errors::{LocalnetError, LocalnetResult};

/// Builds every executable whose piece resolves to a source tree. Prebuilt
/// pieces are left alone.
pub async fn build_binaries(resolver: &SoftwareResolver) -> LocalnetResult<()> {
    let chain_cmd = resolver.chain.cmd_folder()?;
    if resolver.chain.source_folder()?.is_some() {
        go_build(&chain_cmd.join("node")).await?;
        go_build(&chain_cmd.join("seednode")).await?;
    }

    let proxy_cmd = resolver.proxy.cmd_folder()?;
    if resolver.proxy.source_folder()?.is_some() {
        go_build(&proxy_cmd.join("proxy")).await?;
    }
    Ok(())
}

async fn go_build(folder: &Path) -> LocalnetResult<()> {
    let label = folder.display().to_string();
    info!(target = "localnet::software", folder = %label, "running go build");

    let output = Command::new("go")
        .arg("build")
        .current_dir(folder)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|err| LocalnetError::Process {
            label: label.clone(),
            message: format!("unable to run `go build`: {err}"),
        })?;

    if !output.status.success() {
        return Err(LocalnetError::Process {
            label,
            message: format!(
                "`go build` exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}
