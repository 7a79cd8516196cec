//! Hook Runner (§4.9): spawns a user-supplied script at one of four points
//! around an install/uninstall batch, with a deadline and a fixed set of
//! `LMM_*` environment variables describing the operation.

use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const KILL_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub game_id: String,
    pub game_path: String,
    pub mod_path: String,
    /// Empty for `*_all` hooks, which run once per batch with no single mod.
    pub mod_id: String,
    pub mod_name: String,
    pub mod_version: String,
}

#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub struct HookRunner {
    timeout: Duration,
}

impl Default for HookRunner {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT }
    }
}

impl HookRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn run(
        &self,
        script_path: &Path,
        slot_name: &str,
        ctx: &HookContext,
        cancel: &CancelToken,
    ) -> CoreResult<HookOutcome> {
        cancel.check()?;
        check_executable(script_path)?;

        let mut command = tokio::process::Command::new(script_path);
        command
            .env("LMM_GAME_ID", &ctx.game_id)
            .env("LMM_GAME_PATH", &ctx.game_path)
            .env("LMM_MOD_PATH", &ctx.mod_path)
            .env("LMM_MOD_ID", &ctx.mod_id)
            .env("LMM_MOD_NAME", &ctx.mod_name)
            .env("LMM_MOD_VERSION", &ctx.mod_version)
            .env("LMM_HOOK", slot_name)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command.spawn()?;
        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        let status = tokio::select! {
            wait = timeout(self.timeout, child.wait()) => match wait {
                Ok(status) => status?,
                Err(_) => {
                    let _ = child.start_kill();
                    tokio::time::sleep(KILL_GRACE).await;
                    let _ = child.kill().await;
                    return Err(CoreError::HookTimeout(slot_name.to_string()));
                }
            },
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                tokio::time::sleep(KILL_GRACE).await;
                let _ = child.kill().await;
                return Err(CoreError::Cancelled);
            }
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = stdout_handle.take() {
            use tokio::io::AsyncReadExt;
            let _ = out.read_to_string(&mut stdout).await;
        }
        if let Some(mut err) = stderr_handle.take() {
            use tokio::io::AsyncReadExt;
            let _ = err.read_to_string(&mut stderr).await;
        }

        let exit_code = status.code().unwrap_or(-1);
        if !status.success() {
            return Err(CoreError::HookFailed {
                slot: slot_name.to_string(),
                code: exit_code,
                stdout,
                stderr,
            });
        }

        Ok(HookOutcome { stdout, stderr, exit_code })
    }
}

fn check_executable(script_path: &Path) -> CoreResult<()> {
    let metadata = std::fs::metadata(script_path)
        .map_err(|_| CoreError::HookNotFound(script_path.display().to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o111 == 0 {
            return Err(CoreError::HookNotExecutable(script_path.display().to_string()));
        }
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
    }

    Ok(())
}

/// A `*_each` context for a specific mod.
pub fn mod_context(game_id: &str, game_path: &str, mod_path: &str, mod_id: &str, mod_name: &str, mod_version: &str) -> HookContext {
    HookContext {
        game_id: game_id.to_string(),
        game_path: game_path.to_string(),
        mod_path: mod_path.to_string(),
        mod_id: mod_id.to_string(),
        mod_name: mod_name.to_string(),
        mod_version: mod_version.to_string(),
    }
}

/// A `*_all` context: no single mod is in scope.
pub fn batch_context(game_id: &str, game_path: &str, mod_path: &str) -> HookContext {
    HookContext {
        game_id: game_id.to_string(),
        game_path: game_path.to_string(),
        mod_path: mod_path.to_string(),
        mod_id: String::new(),
        mod_name: String::new(),
        mod_version: String::new(),
    }
}

pub fn hook_path(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}
