//! Deployment strategies (§4.1): symlink, hardlink, and copy, behind one
//! contract. Symlink is the only variant invertible enough to be verified
//! before undeploy, which is what makes profile-switch rollback (§4.11)
//! safe to trust.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::os::unix::fs::symlink;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LinkMethod {
    #[default]
    Symlink,
    Hardlink,
    Copy,
}

/// The materialisation contract every link method implements identically.
pub trait Deployer: Send + Sync {
    fn method(&self) -> LinkMethod;

    /// Ensure `dst`'s parent exists, remove any existing entry at `dst`,
    /// then create the chosen representation pointing at `src`.
    fn deploy(&self, src: &Path, dst: &Path) -> CoreResult<()>;

    /// Remove the entry at `dst`. Returns ok if already absent.
    fn undeploy(&self, dst: &Path) -> CoreResult<()>;

    /// Whether `dst` currently holds an entry this method considers "deployed".
    fn is_deployed(&self, dst: &Path) -> CoreResult<bool>;
}

pub fn for_method(method: LinkMethod) -> Box<dyn Deployer> {
    match method {
        LinkMethod::Symlink => Box::new(SymlinkDeployer),
        LinkMethod::Hardlink => Box::new(HardlinkDeployer),
        LinkMethod::Copy => Box::new(CopyDeployer),
    }
}

fn ensure_parent(dst: &Path) -> CoreResult<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Remove whatever is at `dst` without following a symlink into its target.
fn remove_existing(dst: &Path) -> CoreResult<()> {
    match std::fs::symlink_metadata(dst) {
        Ok(meta) => {
            if meta.is_dir() {
                std::fs::remove_dir_all(dst)?;
            } else {
                std::fs::remove_file(dst)?;
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub struct SymlinkDeployer;

impl Deployer for SymlinkDeployer {
    fn method(&self) -> LinkMethod {
        LinkMethod::Symlink
    }

    fn deploy(&self, src: &Path, dst: &Path) -> CoreResult<()> {
        ensure_parent(dst)?;
        remove_existing(dst)?;
        symlink(src, dst)?;
        tracing::debug!(src = %src.display(), dst = %dst.display(), "symlinked");
        Ok(())
    }

    fn undeploy(&self, dst: &Path) -> CoreResult<()> {
        match std::fs::symlink_metadata(dst) {
            Ok(meta) if meta.file_type().is_symlink() => {
                std::fs::remove_file(dst)?;
                Ok(())
            }
            Ok(_) => Err(CoreError::InvalidPath(format!(
                "{} is not a symlink, refusing to undeploy",
                dst.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_deployed(&self, dst: &Path) -> CoreResult<bool> {
        match std::fs::symlink_metadata(dst) {
            Ok(meta) => Ok(meta.file_type().is_symlink()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct HardlinkDeployer;

impl Deployer for HardlinkDeployer {
    fn method(&self) -> LinkMethod {
        LinkMethod::Hardlink
    }

    fn deploy(&self, src: &Path, dst: &Path) -> CoreResult<()> {
        ensure_parent(dst)?;
        remove_existing(dst)?;
        std::fs::hard_link(src, dst)?;
        tracing::debug!(src = %src.display(), dst = %dst.display(), "hardlinked");
        Ok(())
    }

    fn undeploy(&self, dst: &Path) -> CoreResult<()> {
        match std::fs::remove_file(dst) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_deployed(&self, dst: &Path) -> CoreResult<bool> {
        Ok(dst.symlink_metadata().is_ok())
    }
}

pub struct CopyDeployer;

impl Deployer for CopyDeployer {
    fn method(&self) -> LinkMethod {
        LinkMethod::Copy
    }

    fn deploy(&self, src: &Path, dst: &Path) -> CoreResult<()> {
        ensure_parent(dst)?;
        remove_existing(dst)?;
        std::fs::copy(src, dst)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(src) {
                let _ = std::fs::set_permissions(dst, std::fs::Permissions::from_mode(meta.permissions().mode()));
            }
        }
        tracing::debug!(src = %src.display(), dst = %dst.display(), "copied");
        Ok(())
    }

    fn undeploy(&self, dst: &Path) -> CoreResult<()> {
        match std::fs::remove_file(dst) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_deployed(&self, dst: &Path) -> CoreResult<bool> {
        Ok(dst.symlink_metadata().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_src(dir: &Path, contents: &[u8]) -> std::path::PathBuf {
        let src = dir.join("source.txt");
        std::fs::write(&src, contents).unwrap();
        src
    }

    #[test]
    fn symlink_deploy_and_undeploy_round_trip() {
        let dir = tempdir().unwrap();
        let src = write_src(dir.path(), b"hello");
        let dst = dir.path().join("nested/dest.txt");

        let deployer = SymlinkDeployer;
        deployer.deploy(&src, &dst).unwrap();
        assert!(deployer.is_deployed(&dst).unwrap());
        assert_eq!(std::fs::read(&dst).unwrap(), b"hello");

        deployer.undeploy(&dst).unwrap();
        assert!(!deployer.is_deployed(&dst).unwrap());
    }

    #[test]
    fn symlink_undeploy_refuses_non_symlink() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("plain.txt");
        std::fs::write(&dst, b"not a link").unwrap();

        let deployer = SymlinkDeployer;
        let err = deployer.undeploy(&dst).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPath(_)));
        assert!(dst.exists());
    }

    #[test]
    fn hardlink_undeploy_treats_absent_as_success() {
        let dir = tempdir().unwrap();
        let dst = dir.path().join("missing.txt");
        HardlinkDeployer.undeploy(&dst).unwrap();
    }

    #[test]
    fn copy_deploy_preserves_bytes_independent_of_source() {
        let dir = tempdir().unwrap();
        let src = write_src(dir.path(), b"payload");
        let dst = dir.path().join("copy.txt");

        CopyDeployer.deploy(&src, &dst).unwrap();
        std::fs::write(&src, b"changed").unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn deploy_overwrites_existing_entry() {
        let dir = tempdir().unwrap();
        let src = write_src(dir.path(), b"v2");
        let dst = dir.path().join("dest.txt");
        std::fs::write(&dst, b"v1").unwrap();

        SymlinkDeployer.deploy(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"v2");
    }
}
