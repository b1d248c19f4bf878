use crate::{AppConfig, FolderSyncError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "foldersync.toml";

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    pub exists: bool,
    pub portable: bool,
}

pub fn load_config(prefer_portable: bool) -> Result<LoadedConfig, FolderSyncError> {
    let (path, portable) = resolve_config_path(prefer_portable)?;
    load_config_from(path, portable)
}

/// Load the configuration stored at `path`, falling back to defaults
pub fn load_config_from(path: PathBuf, portable: bool) -> Result<LoadedConfig, FolderSyncError> {
    let exists = path.exists();

    let mut config = if exists {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data).map_err(|e| FolderSyncError::Serialization(e.to_string()))?
    } else {
        AppConfig::default()
    };

    config.portable_mode = portable;

    Ok(LoadedConfig {
        config,
        path,
        exists,
        portable,
    })
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), FolderSyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = toml::to_string_pretty(config)
        .map_err(|e| FolderSyncError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

/// Directory holding lane logs and PID markers
pub fn default_log_dir(portable: bool, config_path: &Path) -> Result<PathBuf, FolderSyncError> {
    if portable {
        let base = config_path
            .parent()
            .map(|path| path.to_path_buf())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        return Ok(base.join("foldersync_logs"));
    }

    let dirs = ProjectDirs::from("", "", "foldersync")
        .ok_or_else(|| FolderSyncError::Config("Unable to determine data directory".to_string()))?;
    Ok(dirs.data_local_dir().to_path_buf())
}

fn resolve_config_path(prefer_portable: bool) -> Result<(PathBuf, bool), FolderSyncError> {
    if let Some(portable_path) = portable_config_path() {
        if prefer_portable || portable_path.exists() {
            return Ok((portable_path, true));
        }
    }

    let dirs = ProjectDirs::from("", "", "foldersync")
        .ok_or_else(|| FolderSyncError::Config("Unable to determine config directory".to_string()))?;
    Ok((dirs.config_dir().join(CONFIG_FILE_NAME), false))
}

fn portable_config_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.join(CONFIG_FILE_NAME)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncPair;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let loaded = load_config_from(temp.path().join(CONFIG_FILE_NAME), false).unwrap();
        assert!(!loaded.exists);
        assert!(loaded.config.copy_links);
        assert!(loaded.config.show_size);
        assert!(loaded.config.exclude_copy.is_empty());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.copy_links = false;
        config.exclude_copy = vec!["*.pyc".to_string(), "__pycache__".to_string()];
        config.exclude_delete = vec![PathBuf::from("/backup/keep")];
        config.push_recent(SyncPair::new("/src", "/backup"));
        save_config(&path, &config).unwrap();

        let loaded = load_config_from(path, false).unwrap();
        assert!(loaded.exists);
        assert!(!loaded.config.copy_links);
        assert_eq!(loaded.config.exclude_copy, config.exclude_copy);
        assert_eq!(loaded.config.exclude_delete, config.exclude_delete);
        assert_eq!(loaded.config.recent, config.recent);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "use_trash = true\n").unwrap();

        let loaded = load_config_from(path, false).unwrap();
        assert!(loaded.config.use_trash);
        assert!(loaded.config.copy_links);
        assert!(loaded.config.show_size);
    }
}
