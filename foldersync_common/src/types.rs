use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum number of entries kept in the recent pair history
pub const MAX_RECENT: usize = 10;

/// Kind of a filesystem entry, read without following symbolic links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
    SymbolicLink,
    Other,
}

impl EntryKind {
    pub fn from_file_type(file_type: std::fs::FileType) -> Self {
        if file_type.is_symlink() {
            EntryKind::SymbolicLink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        }
    }
}

/// Floor of `time` in minutes since the Unix epoch (negative before it)
pub fn minute_stamp(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (after.as_secs() / 60) as i64,
        Err(before) => {
            let secs = before.duration().as_secs_f64();
            -((secs / 60.0).ceil() as i64)
        }
    }
}

/// How much of the filesystem a diff node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// The entire file, link, or subtree is one atomic action
    Whole,
    /// A directory whose children are individually represented
    Partial,
}

/// Tri-state checkbox value attached to every diff node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionState {
    Checked,
    Unchecked,
    Indeterminate,
}

/// Flat action lists handed to the executor once per confirmed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLists {
    /// Backup paths to remove
    pub to_delete: Vec<PathBuf>,
    /// Source paths to copy into the backup
    pub to_copy: Vec<PathBuf>,
    /// Backup paths of a different kind that must go before the copy
    pub to_delete_before_copy: Vec<PathBuf>,
}

impl ActionLists {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_copy.is_empty()
    }
}

/// A source/backup pair as remembered in the recent and favorite lists
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncPair {
    pub source: PathBuf,
    pub backup: PathBuf,
}

impl SyncPair {
    pub fn new(source: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            backup: backup.into(),
        }
    }

    pub fn exists(&self) -> bool {
        self.source.exists() && self.backup.exists()
    }
}

impl fmt::Display for SyncPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.display(), self.backup.display())
    }
}

fn default_true() -> bool {
    true
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Copy symbolic links found on the source side
    #[serde(default = "default_true")]
    pub copy_links: bool,

    /// Compute byte totals before confirming a run
    #[serde(default = "default_true")]
    pub show_size: bool,

    /// Names never copied; `*.ext` entries exclude an extension
    #[serde(default)]
    pub exclude_copy: Vec<String>,

    /// Absolute backup paths never deleted
    #[serde(default)]
    pub exclude_delete: Vec<PathBuf>,

    /// Send deleted entries to the platform trash
    #[serde(default)]
    pub use_trash: bool,

    /// Most recent pair first
    #[serde(default)]
    pub recent: Vec<SyncPair>,

    #[serde(default)]
    pub favorites: Vec<SyncPair>,

    /// Directory for lane logs and PID markers
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            copy_links: true,
            show_size: true,
            exclude_copy: Vec::new(),
            exclude_delete: Vec::new(),
            use_trash: false,
            recent: Vec::new(),
            favorites: Vec::new(),
            log_dir: None,
            portable_mode: false,
        }
    }
}

impl AppConfig {
    /// Move `pair` to the front of the recent list, keeping at most `MAX_RECENT`
    pub fn push_recent(&mut self, pair: SyncPair) {
        self.recent.retain(|p| p != &pair);
        self.recent.insert(0, pair);
        self.recent.truncate(MAX_RECENT);
    }

    /// Returns false when the pair is invalid or already a favorite
    pub fn add_favorite(&mut self, pair: SyncPair) -> bool {
        if pair.source.as_os_str().is_empty()
            || pair.backup.as_os_str().is_empty()
            || pair.source == pair.backup
            || !pair.exists()
            || self.favorites.contains(&pair)
        {
            return false;
        }
        self.favorites.push(pair);
        true
    }

    pub fn remove_favorite(&mut self, pair: &SyncPair) -> bool {
        let before = self.favorites.len();
        self.favorites.retain(|p| p != pair);
        before != self.favorites.len()
    }
}
