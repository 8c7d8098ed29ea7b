//! File storage provider.
//!
//! Sample files are named `m<class><sample>.txt`; all samples share one
//! weight file. Reads are bounded: a file larger than the limit is rejected
//! rather than truncated, since a truncated file would parse as a shorter,
//! silently different recording.

use crate::error::StorageError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default name of the shared weight resource.
pub const DEFAULT_WEIGHTS_FILE: &str = "mw.txt";

/// Name of the event resource for a class digit and sample digit.
pub fn event_resource_name(true_class: u8, sample: u8) -> String {
    format!("m{true_class}{sample}.txt")
}

/// Source of named resources.
pub trait Storage {
    /// Read the whole of `name`, failing if it is larger than `max_bytes`.
    fn read(&self, name: &str, max_bytes: usize) -> Result<Vec<u8>, StorageError>;
}

/// Storage rooted at a local directory (typically a mounted card).
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Full path of a resource.
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl Storage for DirStorage {
    fn read(&self, name: &str, max_bytes: usize) -> Result<Vec<u8>, StorageError> {
        let path = self.path_of(name);

        let file = std::fs::File::open(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound { path: path.clone() }
            } else {
                StorageError::Io {
                    path: path.clone(),
                    source,
                }
            }
        })?;

        // Read one byte past the limit to detect oversize files
        let mut buf = Vec::new();
        file.take(max_bytes as u64 + 1)
            .read_to_end(&mut buf)
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;

        if buf.len() > max_bytes {
            let size = std::fs::metadata(&path)
                .map(|m| m.len())
                .unwrap_or(buf.len() as u64);
            return Err(StorageError::TooLarge {
                path,
                size,
                limit: max_bytes,
            });
        }

        debug!(path = %path.display(), bytes = buf.len(), "resource loaded");
        Ok(buf)
    }
}
