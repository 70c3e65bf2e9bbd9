//! Filesystem placement of finished trace profiles.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use runtally_core::ProfileCopier;

/// [`ProfileCopier`] backed by `std::fs`.
///
/// Creates the destination's parent directories as needed.
pub struct FsProfileCopier;

impl ProfileCopier for FsProfileCopier {
    fn copy(&self, src: &Path, dest: &Path) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::copy(src, dest)?;
        debug!(src = %src.display(), dest = %dest.display(), "profile copied");
        Ok(())
    }
}
