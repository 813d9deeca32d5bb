//! Gzipped tar archive of the output directory for binary builds.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::task::spawn_blocking;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// An archive on disk that is removed when dropped.
#[derive(Debug)]
pub struct ArchiveGuard {
    path: PathBuf,
    bytes: Bytes,
}

impl ArchiveGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive contents, cheap to clone.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for ArchiveGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed build archive"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove build archive")
            }
        }
    }
}

/// Archive every file under `src` into a tar.gz at `dest`, replacing any
/// archive already there.
pub async fn create_archive(src: &Path, dest: &Path) -> io::Result<ArchiveGuard> {
    let src = src.to_owned();
    let dest = dest.to_owned();
    spawn_blocking(move || create_archive_sync(&src, &dest)).await?
}

fn create_archive_sync(src: &Path, dest: &Path) -> io::Result<ArchiveGuard> {
    match std::fs::remove_file(dest) {
        Ok(()) => debug!(path = %dest.display(), "Removed stale build archive"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    {
        let mut tar_builder = tar::Builder::new(&mut encoder);
        tar_builder.follow_symlinks(false);

        for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(io::Error::other)?;
            let path = entry.path();
            let relative_path = path
                .strip_prefix(src)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

            if entry.file_type().is_file() {
                tar_builder.append_path_with_name(path, relative_path)?;
            } else if entry.file_type().is_dir() {
                tar_builder.append_dir(relative_path, path)?;
            }
        }

        tar_builder.finish()?;
    }
    let compressed = encoder.finish()?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::File::create(dest)?;
    file.write_all(&compressed)?;
    file.flush()?;

    debug!(
        src = %src.display(),
        dest = %dest.display(),
        compressed_size = compressed.len(),
        "Created build archive"
    );

    Ok(ArchiveGuard {
        path: dest.to_owned(),
        bytes: Bytes::from(compressed),
    })
}
