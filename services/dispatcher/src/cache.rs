//! Content-addressed filesystem cache.
//!
//! One file per cache key at `<root>/<queue_name>/<digest>`; the file mtime
//! is the authoritative freshness timestamp.  Reads hand back the open file
//! (streamed by the HTTP layer, handle released when the stream is dropped);
//! writes go through a temp file + rename so readers never observe a partial
//! body.

use std::io;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache entry {0} is not a regular file")]
    NotRegularFile(String),
    #[error("cache io error: {0}")]
    Io(#[from] io::Error),
}

/// A readable cache entry.
#[derive(Debug)]
pub struct CacheHit {
    pub file: fs::File,
    pub len: u64,
    pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Create the cache directory for a queue.  Called on registration.
    pub async fn ensure_queue_dir(&self, queue_name: &str) -> Result<(), CacheError> {
        fs::create_dir_all(self.root.join(queue_name)).await?;
        Ok(())
    }

    /// Open an entry for reading.
    ///
    /// `Ok(None)` is a miss: no entry, or the entry is older than the
    /// caller-supplied `expire` (milliseconds).  An entry path that exists
    /// but is not a regular file is an error, not a miss.
    pub async fn open_for_read(
        &self,
        key: &str,
        expire: Option<i64>,
    ) -> Result<Option<CacheHit>, CacheError> {
        let path = self.entry_path(key);
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(CacheError::NotRegularFile(key.to_owned()));
        }

        let modified = meta.modified()?;
        if let Some(expire) = expire {
            let age_ms = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default()
                .as_millis() as i64;
            if age_ms > expire {
                return Ok(None);
            }
        }

        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(CacheHit {
            file,
            len: meta.len(),
            modified,
        }))
    }

    /// Write an entry atomically (temp file + rename).
    ///
    /// Callers treat failures as best-effort: the delivering client is never
    /// told about them.
    pub async fn write(&self, key: &str, body: &[u8]) -> Result<(), CacheError> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}
