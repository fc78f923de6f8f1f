//! Cursor store: category → last confirmed skiptoken
//!
//! File layout (`progress.json`):
//! ```text
//! {
//!   "format_version": 1,
//!   "cursors": {
//!     "Document": { "skiptoken": 123456, "updated_at": "2026-..." }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Cursor value meaning "start from the feed origin"
pub const NO_PROGRESS: i64 = -1;

const CURRENT_FORMAT_VERSION: u32 = 1;

#[derive(Debug)]
pub enum StoreError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// File exists but cannot be understood; never silently reset
    Corrupt { path: PathBuf, message: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cursor store {}: {source}", path.display()),
            Self::Corrupt { path, message } => {
                write!(f, "corrupt cursor store {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Corrupt { .. } => None,
        }
    }
}

/// Durable category → token mapping.
///
/// A token passed to `set` must be visible to every later `get`, including
/// from a new process after a crash.
pub trait CursorStore: Send + Sync {
    fn get(&self, category: &str) -> Result<Option<i64>, StoreError>;
    fn set(&self, category: &str, token: i64) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRecord {
    pub skiptoken: i64,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorFile {
    format_version: u32,
    cursors: BTreeMap<String, CursorRecord>,
}

impl Default for CursorFile {
    fn default() -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            cursors: BTreeMap::new(),
        }
    }
}

/// JSON-file cursor store.
///
/// Opens, reads and closes the file on every call; writes go to a tmp file
/// that is fsynced and renamed over the original.
#[derive(Debug, Clone)]
pub struct JsonCursorStore {
    path: PathBuf,
}

impl JsonCursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored cursors, sorted by category
    pub fn entries(&self) -> Result<BTreeMap<String, CursorRecord>, StoreError> {
        Ok(self.load()?.cursors)
    }

    /// Drop a category's cursor. Returns whether one existed.
    pub fn remove(&self, category: &str) -> Result<bool, StoreError> {
        let mut file = self.load()?;
        let existed = file.cursors.remove(category).is_some();
        if existed {
            self.save(&file)?;
        }
        Ok(existed)
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<CursorFile, StoreError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CursorFile::default()),
            Err(e) => return Err(self.io_err(e)),
        };
        let file: CursorFile = serde_json::from_str(&json).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        if file.format_version != CURRENT_FORMAT_VERSION {
            return Err(StoreError::Corrupt {
                path: self.path.clone(),
                message: format!(
                    "format_version {} != supported {CURRENT_FORMAT_VERSION}",
                    file.format_version
                ),
            });
        }
        Ok(file)
    }

    fn save(&self, file: &CursorFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_string_pretty(file).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        let mut tmp = fs::File::create(&tmp_path).map_err(|e| self.io_err(e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| self.io_err(e))?;
        tmp.sync_all().map_err(|e| self.io_err(e))?;
        drop(tmp);
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_err(e))
    }
}

impl CursorStore for JsonCursorStore {
    fn get(&self, category: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.load()?.cursors.get(category).map(|r| r.skiptoken))
    }

    fn set(&self, category: &str, token: i64) -> Result<(), StoreError> {
        let mut file = self.load()?;
        file.cursors.insert(
            category.to_string(),
            CursorRecord {
                skiptoken: token,
                updated_at: chrono::Utc::now(),
            },
        );
        self.save(&file)?;
        log::debug!("cursor {category} = {token} ({})", self.path.display());
        Ok(())
    }
}

/// In-memory store for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<BTreeMap<String, i64>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one cursor
    pub fn with_cursor(category: &str, token: i64) -> Self {
        let store = Self::default();
        store
            .cursors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(category.to_string(), token);
        store
    }
}

impl CursorStore for MemoryCursorStore {
    fn get(&self, category: &str) -> Result<Option<i64>, StoreError> {
        let cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        Ok(cursors.get(category).copied())
    }

    fn set(&self, category: &str, token: i64) -> Result<(), StoreError> {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        cursors.insert(category.to_string(), token);
        Ok(())
    }
}
