//! Dated archive of processed originals.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use tracing::debug;

use crate::error::ImportError;

/// `<archive_root>/<YYYY-MM-DD>`
pub fn archive_day_dir(archive_root: &Path, day: NaiveDate) -> PathBuf {
    archive_root.join(day.format("%Y-%m-%d").to_string())
}

fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Where `src` will land in the archive for `day`.
///
/// Keeps the original name when free, otherwise `<stem>-<n><.ext>` with the
/// smallest free `n`. Only inspects the filesystem.
pub fn plan_archive_destination(src: &Path, archive_root: &Path, day: NaiveDate) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| anyhow!("{:?} has no file name", src))?;
    let dir = archive_day_dir(archive_root, day);

    let preferred = dir.join(name);
    if !occupied(&preferred) {
        return Ok(preferred);
    }

    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = src
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let free = (1u32..)
        .map(|n| dir.join(format!("{}-{}{}", stem, n, ext)))
        .find(|p| !occupied(p))
        .ok_or_else(|| anyhow!("No free archive name for {:?}", src))?;
    debug!("{:?} already archived today, using {:?}", preferred, free);
    Ok(free)
}

/// Move `src` to `dest`, never overwriting an existing file.
///
/// Falls back to copy-then-remove when the archive is on another filesystem.
pub fn move_into_archive(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create archive directory {:?}", parent))?;
    }
    if occupied(dest) {
        return Err(ImportError::ArchiveCollision(dest.to_path_buf()).into());
    }

    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            copy_no_clobber(src, dest)
                .with_context(|| format!("Failed to copy {:?} to {:?}", src, dest))?;
            fs::remove_file(src).with_context(|| format!("Failed to remove {:?}", src))?;
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to move {:?} to {:?}", src, dest)),
    }
}

fn copy_no_clobber(src: &Path, dest: &Path) -> io::Result<()> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)?;
    io::copy(&mut reader, &mut writer)?;
    writer.sync_all()
}
