//! Archive extraction (§4.3): a native ZIP reader plus an external `7z`
//! invocation for `.7z`/`.rar`, both writing into a sandboxed destination
//! directory. Every entry's target path is checked against the destination
//! root before a single byte is written.

use crate::cancel::CancelToken;
use crate::error::{CoreError, CoreResult};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;

const EXTERNAL_TOOL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
    Rar,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())?;
        match ext.as_str() {
            "zip" => Some(Self::Zip),
            "7z" => Some(Self::SevenZip),
            "rar" => Some(Self::Rar),
            _ => None,
        }
    }

    fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x50, 0x4B]) {
            Some(Self::Zip)
        } else if bytes.starts_with(&[0x37, 0x7A, 0xBC, 0xAF]) {
            Some(Self::SevenZip)
        } else if bytes.starts_with(&[0x52, 0x61, 0x72, 0x21]) {
            Some(Self::Rar)
        } else {
            None
        }
    }
}

/// Collapse `.`/`..` components without touching the filesystem (no
/// symlink resolution), mirroring §4.3's "normalise" definition.
fn normalise(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve an archive entry's logical name against `dest`, rejecting any
/// result that is not `dest` itself and does not have `dest` + separator
/// as a prefix.
fn sandbox_target(dest: &Path, entry_name: &str) -> CoreResult<PathBuf> {
    let normalized_name = entry_name.replace('\\', "/");
    let candidate = normalise(&dest.join(&normalized_name));
    if candidate == dest || candidate.starts_with(dest) {
        Ok(candidate)
    } else {
        Err(CoreError::PathTraversal(entry_name.to_string()))
    }
}

pub async fn extract(archive: &Path, dest: &Path, cancel: &CancelToken) -> CoreResult<()> {
    cancel.check()?;
    tokio::fs::create_dir_all(dest).await?;

    let format = match ArchiveFormat::from_path(archive) {
        Some(f) => f,
        None => {
            let bytes = tokio::fs::read(archive).await?;
            ArchiveFormat::from_magic(&bytes[..bytes.len().min(8)]).ok_or_else(|| {
                CoreError::UnsupportedFormat(archive.display().to_string())
            })?
        }
    };

    match format {
        ArchiveFormat::Zip => extract_zip(archive, dest, cancel),
        ArchiveFormat::SevenZip | ArchiveFormat::Rar => extract_external(archive, dest, cancel).await,
    }
}

fn extract_zip(archive: &Path, dest: &Path, cancel: &CancelToken) -> CoreResult<()> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| CoreError::UnsupportedFormat(format!("invalid zip: {e}")))?;

    for i in 0..zip.len() {
        cancel.check()?;
        let mut entry = zip
            .by_index(i)
            .map_err(|e| CoreError::UnsupportedFormat(e.to_string()))?;
        let name = entry.name().to_string();
        let outpath = sandbox_target(dest, &name)?;

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            #[cfg(unix)]
            set_mode(&outpath, 0o755);
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = std::fs::File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                set_mode(&outpath, mode);
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
}

async fn extract_external(archive: &Path, dest: &Path, cancel: &CancelToken) -> CoreResult<()> {
    cancel.check()?;
    let tool = which::which("7z")
        .map_err(|_| CoreError::UnsupportedFormat("7z not found on PATH".to_string()))?;

    let mut child = tokio::process::Command::new(tool)
        .arg("x")
        .arg("-y")
        .arg(format!("-o{}", dest.display()))
        .arg(archive)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .spawn()?;

    let status = tokio::select! {
        result = timeout(EXTERNAL_TOOL_TIMEOUT, child.wait()) => match result {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.start_kill();
                return Err(CoreError::UnsupportedFormat(
                    "external extractor timed out".to_string(),
                ));
            }
        },
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            return Err(CoreError::Cancelled);
        }
    };

    if !status.success() {
        let mut stderr = String::new();
        if let Some(mut out) = child.stderr.take() {
            use tokio::io::AsyncReadExt;
            let _ = out.read_to_string(&mut stderr).await;
        }
        return Err(CoreError::UnsupportedFormat(format!(
            "7z exited with {status}: {stderr}"
        )));
    }

    // 7z does not expose per-entry path-traversal detection; verify the
    // extracted tree did not escape `dest` via a post-hoc walk.
    for entry in walkdir::WalkDir::new(dest) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !normalise(entry.path()).starts_with(dest) {
            return Err(CoreError::PathTraversal(entry.path().display().to_string()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn format_detection_is_case_insensitive() {
        assert_eq!(ArchiveFormat::from_path(Path::new("a.ZIP")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.7z")), Some(ArchiveFormat::SevenZip));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.rar")), Some(ArchiveFormat::Rar));
        assert_eq!(ArchiveFormat::from_path(Path::new("a.txt")), None);
    }

    #[test]
    fn sandbox_target_rejects_traversal() {
        let dest = Path::new("/tmp/extract-root");
        let err = sandbox_target(dest, "../../../etc/passwd").unwrap_err();
        assert!(matches!(err, CoreError::PathTraversal(_)));
    }

    #[test]
    fn sandbox_target_accepts_nested_entry() {
        let dest = Path::new("/tmp/extract-root");
        let target = sandbox_target(dest, "sub/file.txt").unwrap();
        assert_eq!(target, dest.join("sub/file.txt"));
    }

    #[test]
    fn sandbox_target_rejects_absolute_escape_disguised_with_dotdot() {
        let dest = Path::new("/tmp/extract-root");
        let err = sandbox_target(dest, "sub/../../evil").unwrap_err();
        assert!(matches!(err, CoreError::PathTraversal(_)));
    }

    #[tokio::test]
    async fn extract_zip_preserves_directory_and_file() {
        let tmp = tempdir().unwrap();
        let archive_path = tmp.path().join("mod.zip");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let opts = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
            zip.add_directory("sub/", opts).unwrap();
            let file_opts = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
            zip.start_file("sub/file.txt", file_opts).unwrap();
            zip.write_all(b"original bytes").unwrap();
            zip.finish().unwrap();
        }

        let dest = tmp.path().join("out");
        extract(&archive_path, &dest, &CancelToken::new()).await.unwrap();

        assert!(dest.join("sub").is_dir());
        assert_eq!(
            std::fs::read(dest.join("sub/file.txt")).unwrap(),
            b"original bytes"
        );
    }

    #[tokio::test]
    async fn extract_zip_with_malicious_entry_fails_without_writing_outside() {
        let tmp = tempdir().unwrap();
        let archive_path = tmp.path().join("evil.zip");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let opts = zip::write::SimpleFileOptions::default();
            zip.start_file("../../../etc/passwd", opts).unwrap();
            zip.write_all(b"pwned").unwrap();
            zip.finish().unwrap();
        }

        let dest = tmp.path().join("out");
        let err = extract(&archive_path, &dest, &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::PathTraversal(_)));
        assert!(!tmp.path().join("etc/passwd").exists());
    }

    #[tokio::test]
    async fn extract_rejects_an_already_cancelled_token() {
        let tmp = tempdir().unwrap();
        let archive_path = tmp.path().join("mod.zip");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let zip = zip::ZipWriter::new(file);
            zip.finish().unwrap();
        }

        let cancel = CancelToken::new();
        cancel.cancel();
        let dest = tmp.path().join("out");
        let err = extract(&archive_path, &dest, &cancel).await.unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
    }
}
