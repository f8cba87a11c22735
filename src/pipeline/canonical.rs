//! Atomic publication of canonical outputs.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Replace `dest` with `bytes` so readers see either the old or the new file.
///
/// Content goes to a temporary file in the destination directory first and
/// is renamed over `dest` only after it is fully written and synced.
pub fn publish_atomic(bytes: &[u8], dest: &Path) -> Result<()> {
    publish_with(dest, |file| file.write_all(bytes))
}

fn publish_with<F>(dest: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create output directory {:?}", parent))?;

    // Hidden, partial-suffixed name so a scanner never mistakes it for an export
    let mut tmp = tempfile::Builder::new()
        .prefix(".folio-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create temporary file in {:?}", parent))?;

    write(tmp.as_file_mut()).with_context(|| format!("Failed to write {:?}", tmp.path()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync {:?}", tmp.path()))?;

    tmp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {:?}", dest))?;

    debug!("Published {:?}", dest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_creates_parent_and_writes_content() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("private").join("fidelity-performance.csv");

        publish_atomic(b"Monthly,Beginning\n", &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"Monthly,Beginning\n");
    }

    #[test]
    fn test_replaces_previous_content_entirely() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("valuations.json");
        fs::write(&dest, "a much longer previous payload").unwrap();

        publish_atomic(b"[]", &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"[]");
        assert_eq!(dir_entries(dir.path()), vec!["valuations.json"]);
    }

    #[test]
    fn test_interrupted_write_leaves_destination_intact() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("valuations.json");
        fs::write(&dest, "previous").unwrap();

        let result = publish_with(&dest, |file| {
            file.write_all(b"[{\"summa")?;
            Err(io::Error::new(io::ErrorKind::Interrupted, "simulated crash"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "previous");
        assert_eq!(
            dir_entries(dir.path()),
            vec!["valuations.json"],
            "temporary file must be cleaned up"
        );
    }

    #[test]
    fn test_interrupted_first_write_leaves_no_destination() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("valuations.json");

        let result = publish_with(&dest, |_| {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        assert!(result.is_err());
        assert!(!dest.exists());
    }
}
