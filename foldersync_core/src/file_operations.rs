use crate::classifier::ExclusionRules;
use foldersync_common::FolderSyncError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Copy,
    Remove,
}

impl FileOperation {
    pub fn label(&self) -> &'static str {
        match self {
            FileOperation::Copy => "copy",
            FileOperation::Remove => "remove",
        }
    }
}

/// Result of a file operation
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub operation: FileOperation,
    pub bytes_processed: u64,
}

/// File operations engine
#[derive(Debug, Clone)]
pub struct FileOperations {
    dry_run: bool,
    use_trash: bool,
    /// Applied to the contents of directories copied as a unit
    rules: Arc<ExclusionRules>,
    copy_links: bool,
}

impl Default for FileOperations {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl FileOperations {
    pub fn new(dry_run: bool, use_trash: bool) -> Self {
        Self {
            dry_run,
            use_trash,
            rules: Arc::new(ExclusionRules::none()),
            copy_links: true,
        }
    }

    /// Skip excluded names, and links when `copy_links` is off, below copied directories
    pub fn with_copy_filter(mut self, rules: ExclusionRules, copy_links: bool) -> Self {
        self.rules = Arc::new(rules);
        self.copy_links = copy_links;
        self
    }

    /// Copy `path` (under `source_root`) to the same relative location
    /// under `backup_root`, creating missing parents.
    pub fn copy_entry(
        &self,
        source_root: &Path,
        backup_root: &Path,
        path: &Path,
    ) -> Result<OperationResult, FolderSyncError> {
        let rel = path.strip_prefix(source_root).map_err(|_| {
            FolderSyncError::Path(format!(
                "{} is not under {}",
                path.display(),
                source_root.display()
            ))
        })?;
        let dest = backup_root.join(rel);

        if self.dry_run {
            info!("DRY RUN: Would copy {} to {}", path.display(), dest.display());
            return Ok(OperationResult {
                source: path.to_path_buf(),
                destination: Some(dest),
                operation: FileOperation::Copy,
                bytes_processed: 0,
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = self.copy_recursive(path, &dest)?;
        info!("Copied {} bytes from {} to {}", bytes, path.display(), dest.display());

        Ok(OperationResult {
            source: path.to_path_buf(),
            destination: Some(dest),
            operation: FileOperation::Copy,
            bytes_processed: bytes,
        })
    }

    /// Remove a file, link or directory tree (with optional trash support).
    /// Links are removed themselves, never their targets.
    pub fn remove_entry(&self, path: &Path) -> Result<OperationResult, FolderSyncError> {
        if self.dry_run {
            info!("DRY RUN: Would remove {}", path.display());
            return Ok(OperationResult {
                source: path.to_path_buf(),
                destination: None,
                operation: FileOperation::Remove,
                bytes_processed: 0,
            });
        }

        let metadata = fs::symlink_metadata(path)?;
        let bytes = if metadata.is_file() { metadata.len() } else { 0 };

        if self.use_trash {
            debug!("Moving {} to trash", path.display());
            trash::delete(path).map_err(|e| FolderSyncError::Io(io::Error::other(e.to_string())))?;
            info!("Moved {} to trash", path.display());
        } else if metadata.is_dir() {
            debug!("Removing directory tree {}", path.display());
            fs::remove_dir_all(path)?;
            info!("Removed {}", path.display());
        } else {
            debug!("Permanently deleting {}", path.display());
            remove_non_dir(path)?;
            info!("Deleted {}", path.display());
        }

        Ok(OperationResult {
            source: path.to_path_buf(),
            destination: None,
            operation: FileOperation::Remove,
            bytes_processed: bytes,
        })
    }

    /// Copy one entry to `dest`, recursing into directories; returns bytes written
    fn copy_recursive(&self, source: &Path, dest: &Path) -> io::Result<u64> {
        let metadata = fs::symlink_metadata(source)?;
        let file_type = metadata.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(source)?;
            if fs::symlink_metadata(dest).is_ok() {
                remove_existing(dest)?;
            }
            create_symlink(&target, source, dest)?;
            debug!("Linked {} -> {}", dest.display(), target.display());
            return Ok(0);
        }

        if file_type.is_dir() {
            fs::create_dir_all(dest)?;
            let mut bytes = 0;
            for entry in fs::read_dir(source)? {
                let entry = entry?;
                let name = entry.file_name();
                let is_link = entry.file_type()?.is_symlink();
                if (is_link && !self.copy_links) || (!is_link && self.rules.excludes_name(&name)) {
                    debug!("Skipping excluded {}", entry.path().display());
                    continue;
                }
                bytes += self.copy_recursive(&entry.path(), &dest.join(name))?;
            }
            preserve_mtime(&metadata, dest);
            return Ok(bytes);
        }

        if fs::symlink_metadata(dest).map(|m| m.file_type().is_symlink()).unwrap_or(false) {
            // Write the file in place of the link, not through it
            fs::remove_file(dest)?;
        }
        let bytes = fs::copy(source, dest)?;
        preserve_mtime(&metadata, dest);
        Ok(bytes)
    }
}

fn preserve_mtime(metadata: &fs::Metadata, dest: &Path) {
    let modified = match metadata.modified() {
        Ok(modified) => modified,
        Err(e) => {
            warn!("Cannot read modification time for {}: {}", dest.display(), e);
            return;
        }
    };
    if let Err(e) = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(modified)) {
        warn!("Cannot preserve modification time on {}: {}", dest.display(), e);
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        remove_non_dir(path)
    }
}

#[cfg(windows)]
fn remove_non_dir(path: &Path) -> io::Result<()> {
    // Directory links are removed with remove_dir on Windows
    fs::remove_file(path).or_else(|_| fs::remove_dir(path))
}

#[cfg(not(windows))]
fn remove_non_dir(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

#[cfg(unix)]
fn create_symlink(target: &Path, _source: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(windows)]
fn create_symlink(target: &Path, source: &Path, dest: &Path) -> io::Result<()> {
    if fs::metadata(source).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(target, dest)
    } else {
        std::os::windows::fs::symlink_file(target, dest)
    }
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &Path, source: &Path, _dest: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("symbolic links unsupported for {}", source.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    fn roots() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        let backup = temp.path().join("bak");
        fs::create_dir(&source).unwrap();
        fs::create_dir(&backup).unwrap();
        (temp, source, backup)
    }

    #[test]
    fn test_copy_recreates_relative_path() {
        let (_temp, source, backup) = roots();
        let file = source.join("a/b/file.txt");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"test content").unwrap();
        set_file_mtime(&file, FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

        let ops = FileOperations::new(false, false);
        let result = ops.copy_entry(&source, &backup, &file).unwrap();

        let dest = backup.join("a/b/file.txt");
        assert_eq!(result.destination.as_deref(), Some(dest.as_path()));
        assert_eq!(result.bytes_processed, 12);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "test content");
        let mtime = FileTime::from_last_modification_time(&fs::metadata(&dest).unwrap());
        assert_eq!(mtime.unix_seconds(), 1_000_000_000);
    }

    #[test]
    fn test_copy_directory_recursively() {
        let (_temp, source, backup) = roots();
        fs::create_dir_all(source.join("d/e")).unwrap();
        fs::write(source.join("d/one.txt"), b"1").unwrap();
        fs::write(source.join("d/e/two.txt"), b"22").unwrap();

        let ops = FileOperations::new(false, false);
        let result = ops.copy_entry(&source, &backup, &source.join("d")).unwrap();

        assert_eq!(result.bytes_processed, 3);
        assert_eq!(fs::read_to_string(backup.join("d/one.txt")).unwrap(), "1");
        assert_eq!(fs::read_to_string(backup.join("d/e/two.txt")).unwrap(), "22");
    }

    #[test]
    fn test_copied_directory_skips_excluded_names() {
        let (_temp, source, backup) = roots();
        fs::create_dir_all(source.join("pkg/__pycache__")).unwrap();
        fs::write(source.join("pkg/foo.py"), b"py").unwrap();
        fs::write(source.join("pkg/bar.pyc"), b"pyc").unwrap();
        fs::write(source.join("pkg/__pycache__/foo.bin"), b"bin").unwrap();

        let rules = ExclusionRules::new(
            vec!["__pycache__".to_string()],
            vec![".pyc".to_string()],
            Vec::new(),
        );
        let ops = FileOperations::new(false, false).with_copy_filter(rules, true);
        let result = ops.copy_entry(&source, &backup, &source.join("pkg")).unwrap();

        assert_eq!(result.bytes_processed, 2);
        assert!(backup.join("pkg/foo.py").exists());
        assert!(!backup.join("pkg/bar.pyc").exists());
        assert!(!backup.join("pkg/__pycache__").exists());
    }

    #[test]
    fn test_copied_directory_keeps_mtime() {
        let (_temp, source, backup) = roots();
        fs::create_dir(source.join("d")).unwrap();
        fs::write(source.join("d/f.txt"), b"f").unwrap();
        set_file_mtime(source.join("d"), FileTime::from_unix_time(1_000_000_000, 0)).unwrap();

        FileOperations::default()
            .copy_entry(&source, &backup, &source.join("d"))
            .unwrap();
        let mtime = FileTime::from_last_modification_time(&fs::metadata(backup.join("d")).unwrap());
        assert_eq!(mtime.unix_seconds(), 1_000_000_000);
    }

    #[test]
    fn test_mtime_failure_is_not_fatal() {
        let (_temp, source, backup) = roots();
        let metadata = fs::metadata(&source).unwrap();
        preserve_mtime(&metadata, &backup.join("vanished"));
        assert!(!backup.join("vanished").exists());
    }

    #[test]
    fn test_copy_outside_source_root_fails() {
        let (temp, source, backup) = roots();
        let stray = temp.path().join("stray.txt");
        fs::write(&stray, b"x").unwrap();

        let ops = FileOperations::new(false, false);
        assert!(ops.copy_entry(&source, &backup, &stray).is_err());
    }

    #[test]
    fn test_dry_run() {
        let (_temp, source, backup) = roots();
        let file = source.join("source.txt");
        fs::write(&file, b"test").unwrap();

        let ops = FileOperations::new(true, false);
        ops.copy_entry(&source, &backup, &file).unwrap();
        assert!(!backup.join("source.txt").exists());

        ops.remove_entry(&file).unwrap();
        assert!(file.exists());
    }

    #[test]
    fn test_remove_file_and_directory() {
        let (_temp, _source, backup) = roots();
        let file = backup.join("old.txt");
        fs::write(&file, b"old").unwrap();
        fs::create_dir_all(backup.join("tree/deep")).unwrap();
        fs::write(backup.join("tree/deep/x"), b"x").unwrap();

        let ops = FileOperations::new(false, false);
        let result = ops.remove_entry(&file).unwrap();
        assert_eq!(result.bytes_processed, 3);
        assert!(!file.exists());

        ops.remove_entry(&backup.join("tree")).unwrap();
        assert!(!backup.join("tree").exists());
    }

    #[test]
    fn test_remove_missing_entry_fails() {
        let (_temp, _source, backup) = roots();
        let ops = FileOperations::new(false, false);
        assert!(ops.remove_entry(&backup.join("nothing")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_links_copied_and_removed_as_links() {
        use std::os::unix::fs::symlink;

        let (_temp, source, backup) = roots();
        let target = source.join("target.txt");
        fs::write(&target, b"target").unwrap();
        let link = source.join("link");
        symlink(&target, &link).unwrap();

        let ops = FileOperations::new(false, false);
        ops.copy_entry(&source, &backup, &link).unwrap();
        let copied = backup.join("link");
        assert!(fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&copied).unwrap(), target);

        ops.remove_entry(&link).unwrap();
        assert!(fs::symlink_metadata(&link).is_err());
        assert!(target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_links_inside_copied_directory_follow_link_policy() {
        use std::os::unix::fs::symlink;

        let (_temp, source, backup) = roots();
        fs::create_dir(source.join("d")).unwrap();
        fs::write(source.join("d/real.txt"), b"real").unwrap();
        symlink(source.join("d/real.txt"), source.join("d/alias")).unwrap();

        let ops = FileOperations::new(false, false).with_copy_filter(ExclusionRules::none(), false);
        ops.copy_entry(&source, &backup, &source.join("d")).unwrap();
        assert!(backup.join("d/real.txt").exists());
        assert!(fs::symlink_metadata(backup.join("d/alias")).is_err());
    }
}
