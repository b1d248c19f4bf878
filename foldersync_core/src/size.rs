use jwalk::WalkDir;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

/// Total size in bytes of the regular files at or below `path`.
///
/// Links are not followed; entries that vanish or cannot be read count as zero.
pub fn path_size(path: &Path) -> u64 {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Skipping size of {}: {}", path.display(), e);
            return 0;
        }
    };
    if !metadata.is_dir() {
        return if metadata.is_file() { metadata.len() } else { 0 };
    }

    WalkDir::new(path)
        .follow_links(false)
        .skip_hidden(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

pub fn total_size(paths: &[PathBuf]) -> u64 {
    paths.iter().map(|path| path_size(path)).sum()
}

/// Human readable size: `0 B`, otherwise one decimal in powers of 1024
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
