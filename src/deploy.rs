//! Runs the external deploy script

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::info;

use crate::error::{DeployError, Result};
use crate::webhook::PushEvent;

/// Outcome of one completed deploy script run
#[derive(Debug, Clone, PartialEq)]
pub struct DeployResult {
    /// `-1` when the script was terminated by a signal
    pub exit_code: i32,
    pub stderr: String,
    pub stdout: String,
}

impl DeployResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Maps a non-zero exit to `DeployScriptFailed`, carrying stderr verbatim.
    pub fn into_result(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(DeployError::DeployScriptFailed {
                code: self.exit_code,
                stderr: self.stderr,
            })
        }
    }
}

/// Push metadata exposed to the deploy script as environment variables.
pub fn deploy_env(event: &PushEvent) -> Vec<(&'static str, String)> {
    let mut vars = vec![("DEPLOY_BRANCH", event.branch().to_string())];
    let optional = [
        ("DEPLOY_COMMIT_SHA", event.commit_sha()),
        ("DEPLOY_COMMIT_MESSAGE", event.commit_message()),
        ("DEPLOY_COMMIT_AUTHOR", event.commit_author()),
        ("DEPLOY_PUSHER", event.pusher_name()),
        ("DEPLOY_REPOSITORY", event.repository_name()),
    ];
    vars.extend(
        optional
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v.to_string()))),
    );
    vars
}

/// True if `path` is a regular file with at least one execute bit set.
pub async fn is_executable_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => has_exec_bit(&meta),
        _ => false,
    }
}

#[cfg(unix)]
fn has_exec_bit(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_meta: &std::fs::Metadata) -> bool {
    true
}

/// Runs `script_path <branch>` inside `working_dir` and waits for it.
///
/// A missing or non-executable script is reported without starting
/// anything. A script that runs and exits non-zero is still `Ok`; use
/// [`DeployResult::into_result`] to turn that into an error. With a
/// `timeout`, the child is killed once it elapses.
pub async fn invoke(
    script_path: &Path,
    branch: &str,
    working_dir: &Path,
    env: &[(&'static str, String)],
    timeout: Option<Duration>,
) -> Result<DeployResult> {
    if !is_executable_file(script_path).await {
        return Err(DeployError::DeployScriptMissing(script_path.to_path_buf()));
    }
    // A relative program path would otherwise be resolved against `working_dir`.
    let script_path = std::path::absolute(script_path)?;

    info!(
        "Running (cwd = '{}'): {} {}",
        working_dir.display(),
        script_path.display(),
        branch
    );

    let mut command = Command::new(&script_path);
    command
        .arg(branch)
        .current_dir(working_dir)
        .envs(env.iter().map(|(key, value)| (*key, value.as_str())))
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| DeployError::DeployTimedOut(limit.as_secs()))?,
        None => command.output().await,
    }
    .map_err(DeployError::Launch)?;

    let result = DeployResult {
        exit_code: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    };

    if !result.stdout.is_empty() {
        info!("Deploy script output:\n{}", result.stdout.trim_end());
    }
    info!("Deploy script exited with code {}", result.exit_code);

    Ok(result)
}
