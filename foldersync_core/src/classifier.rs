use foldersync_common::AppConfig;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Exclusion rules deciding which entries take part in a diff
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    names: HashSet<String>,
    /// Extensions including the leading dot
    extensions: HashSet<String>,
    delete_paths: Vec<PathBuf>,
}

impl ExclusionRules {
    /// Rules that exclude nothing
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<N, E, P>(names: N, extensions: E, delete_paths: P) -> Self
    where
        N: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
        P: IntoIterator<Item = PathBuf>,
    {
        Self {
            names: names.into_iter().collect(),
            extensions: extensions
                .into_iter()
                .map(|ext| {
                    if ext.starts_with('.') {
                        ext
                    } else {
                        format!(".{}", ext)
                    }
                })
                .collect(),
            delete_paths: delete_paths.into_iter().collect(),
        }
    }

    /// Split `exclude_copy` into exact names and `*.ext` extension rules
    pub fn from_config(config: &AppConfig) -> Self {
        let mut names = Vec::new();
        let mut extensions = Vec::new();
        for rule in config.exclude_copy.iter().filter(|r| !r.is_empty()) {
            match rule.strip_prefix("*.") {
                Some(ext) if !ext.is_empty() => extensions.push(format!(".{}", ext)),
                _ => names.push(rule.clone()),
            }
        }
        Self::new(names, extensions, config.exclude_delete.iter().cloned())
    }

    /// True if `name` is an excluded name or `extension` (with its dot) an excluded extension
    pub fn is_excluded_from_copy(&self, name: &str, extension: &str) -> bool {
        self.names.contains(name) || (!extension.is_empty() && self.extensions.contains(extension))
    }

    /// Copy exclusion check for a raw directory entry name
    pub fn excludes_name(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        let extension = Path::new(name.as_ref())
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        self.is_excluded_from_copy(&name, &extension)
    }

    /// True if `path` equals or lies below an exclusion path that is itself under `backup_root`
    pub fn is_excluded_from_delete(&self, path: &Path, backup_root: &Path) -> bool {
        self.delete_paths
            .iter()
            .filter(|excluded| excluded.starts_with(backup_root))
            .any(|excluded| path.starts_with(excluded))
    }
}
