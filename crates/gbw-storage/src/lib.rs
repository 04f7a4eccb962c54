use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

static TEMP_SEQUENCE: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot read `{}`: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write `{}`: {source}", path.display())]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    #[must_use]
    pub fn io_kind(&self) -> std::io::ErrorKind {
        match self {
            Self::SourceUnavailable { source, .. } | Self::SinkWrite { source, .. } => {
                source.kind()
            }
        }
    }
}

pub fn read_source(path: &Path) -> Result<Vec<u8>, StorageError> {
    fs::read(path).map_err(|source| StorageError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces `path` with `bytes` via a synced temp file and rename. On error the
/// previous contents of `path`, if any, are left as they were.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let sink_error = |source| StorageError::SinkWrite {
        path: path.to_path_buf(),
        source,
    };

    let parent_dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir).map_err(sink_error)?;

    let temp_file = temp_file_path(parent_dir, path);
    if let Err(error) = write_synced(&temp_file, bytes) {
        let _ = fs::remove_file(&temp_file);
        return Err(sink_error(error));
    }
    if let Err(error) = fs::rename(&temp_file, path) {
        let _ = fs::remove_file(&temp_file);
        return Err(sink_error(error));
    }

    if let Ok(directory_handle) = OpenOptions::new().read(true).open(parent_dir) {
        let _ = directory_handle.sync_all();
    }

    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let mut handle = open_private(path)?;
    handle.write_all(bytes)?;
    handle.sync_all()
}

// The output holds plaintext passwords, so the file is owner-only from the
// moment it exists.
fn open_private(path: &Path) -> Result<fs::File, std::io::Error> {
    let mut options = OpenOptions::new();
    options.create_new(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        options.mode(0o600);
    }
    options.open(path)
}

/// `.<output name>.<pid>-<sequence>.tmp` in the output's directory, so the
/// final rename never crosses a filesystem.
fn temp_file_path(parent_dir: &Path, path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("output");
    let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    parent_dir.join(format!(
        ".{file_name}.{}-{sequence}.tmp",
        std::process::id()
    ))
}
