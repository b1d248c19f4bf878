//! Run-instance bookkeeping.
//!
//! Concurrent runs share one log directory. Each run claims the lowest
//! free numeric slot through a `foldersync{i}.pid` marker; its lane logs
//! carry the same suffix.

use foldersync_common::FolderSyncError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Liveness check for the process named in a PID marker
pub trait ProcessProbe {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    #[cfg(target_os = "linux")]
    fn is_alive(&self, pid: u32) -> bool {
        Path::new("/proc").join(pid.to_string()).exists()
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn is_alive(&self, pid: u32) -> bool {
        use std::process::{Command, Stdio};
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(true)
    }

    #[cfg(not(unix))]
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}

/// A claimed run slot; the PID marker is removed on drop
#[derive(Debug)]
pub struct RunInstance {
    index: u32,
    dir: PathBuf,
    pid_path: PathBuf,
}

impl RunInstance {
    /// Claim the lowest slot whose marker is absent, unreadable as a PID,
    /// or names a dead process.
    pub fn acquire(dir: &Path, probe: &dyn ProcessProbe) -> Result<Self, FolderSyncError> {
        fs::create_dir_all(dir)?;

        for index in 0..u32::MAX {
            let pid_path = dir.join(format!("foldersync{}.pid", index));
            let taken = match fs::read_to_string(&pid_path) {
                Ok(content) => match content.trim().parse::<u32>() {
                    Ok(pid) => probe.is_alive(pid),
                    Err(_) => false,
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                Err(e) => {
                    return Err(FolderSyncError::Instance(format!(
                        "cannot read {}: {}",
                        pid_path.display(),
                        e
                    )))
                }
            };
            if taken {
                debug!("Run slot {} is in use", index);
                continue;
            }

            fs::write(&pid_path, std::process::id().to_string())?;
            info!("Claimed run slot {} in {}", index, dir.display());
            return Ok(Self {
                index,
                dir: dir.to_path_buf(),
                pid_path,
            });
        }

        Err(FolderSyncError::Instance(format!(
            "no free run slot in {}",
            dir.display()
        )))
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn pid_path(&self) -> &Path {
        &self.pid_path
    }

    pub fn copy_log_path(&self) -> PathBuf {
        self.dir.join(format!("copy{}.log", self.index))
    }

    pub fn delete_log_path(&self) -> PathBuf {
        self.dir.join(format!("delete{}.log", self.index))
    }
}

impl Drop for RunInstance {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.pid_path) {
            warn!("Failed to remove {}: {}", self.pid_path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct FixedProbe(HashSet<u32>);

    impl ProcessProbe for FixedProbe {
        fn is_alive(&self, pid: u32) -> bool {
            self.0.contains(&pid)
        }
    }

    #[test]
    fn test_lowest_free_slot() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("foldersync0.pid"), "111").unwrap();
        fs::write(temp.path().join("foldersync1.pid"), "222").unwrap();
        let probe = FixedProbe([111].into_iter().collect());

        let instance = RunInstance::acquire(temp.path(), &probe).unwrap();
        assert_eq!(instance.index(), 1);
        assert_eq!(instance.copy_log_path(), temp.path().join("copy1.log"));
        assert_eq!(instance.delete_log_path(), temp.path().join("delete1.log"));
        let pid = fs::read_to_string(instance.pid_path()).unwrap();
        assert_eq!(pid, std::process::id().to_string());
    }

    #[test]
    fn test_concurrent_slots_and_release() {
        let temp = TempDir::new().unwrap();
        let probe = FixedProbe([std::process::id()].into_iter().collect());

        let first = RunInstance::acquire(temp.path(), &probe).unwrap();
        let second = RunInstance::acquire(temp.path(), &probe).unwrap();
        assert_eq!((first.index(), second.index()), (0, 1));

        let marker = first.pid_path().to_path_buf();
        drop(first);
        assert!(!marker.exists());

        let third = RunInstance::acquire(temp.path(), &probe).unwrap();
        assert_eq!(third.index(), 0);
        drop(second);
    }

    #[test]
    fn test_garbage_marker_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("foldersync0.pid"), "not a pid").unwrap();
        let probe = FixedProbe(HashSet::new());

        let instance = RunInstance::acquire(temp.path(), &probe).unwrap();
        assert_eq!(instance.index(), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_probe_sees_current_process() {
        assert!(SystemProbe.is_alive(std::process::id()));
    }
}
