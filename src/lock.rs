//! Advisory single-process lock (§10.6): a PID-stamped lockfile created
//! atomically so a second concurrent invocation fails fast with `LockHeld`
//! instead of racing the first on the SQLite store and deployed files.

use crate::error::{CoreError, CoreResult};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct ProcessLock {
    path: PathBuf,
}

impl ProcessLock {
    /// Attempt to acquire the lock at `path`. `create_new` makes the check
    /// and the creation a single atomic filesystem operation, so two
    /// processes racing to acquire it can't both succeed.
    pub fn acquire(path: impl Into<PathBuf>) -> CoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if stale(&path) {
                    std::fs::remove_file(&path)?;
                    return Self::acquire(path);
                }
                Err(CoreError::LockHeld)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A lockfile is stale if the PID it names is no longer running. Checked
/// via `/proc/<pid>`, which is always present on the Linux targets this
/// crate supports.
fn stale(path: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(path) else {
        return true;
    };
    let Ok(pid) = content.trim().parse::<u32>() else {
        return true;
    };
    !Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_then_drop_releases_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lmm.lock");
        {
            let _lock = ProcessLock::acquire(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn second_acquire_while_held_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lmm.lock");
        let _lock = ProcessLock::acquire(&path).unwrap();
        let err = ProcessLock::acquire(&path).unwrap_err();
        assert!(matches!(err, CoreError::LockHeld));
    }

    #[test]
    fn stale_lock_from_dead_pid_is_reclaimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lmm.lock");
        std::fs::write(&path, "999999999\n").unwrap();
        let _lock = ProcessLock::acquire(&path).unwrap();
        assert!(path.exists());
    }
}
