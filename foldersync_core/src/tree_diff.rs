use crate::classifier::ExclusionRules;
use crate::diff_tree::{DiffTree, NewNode, NodeId};
use foldersync_common::{minute_stamp, ActionLists, AppConfig, EntryKind, FolderSyncError};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Check that both roots are set, disjoint, existing directories
pub fn validate_roots(source: &Path, backup: &Path) -> Result<(), FolderSyncError> {
    if source.as_os_str().is_empty() || backup.as_os_str().is_empty() {
        return Err(FolderSyncError::Validation(
            "both a source and a backup directory are required".to_string(),
        ));
    }
    if source == backup {
        return Err(FolderSyncError::Validation(format!(
            "source and backup are the same directory: {}",
            source.display()
        )));
    }
    if source.starts_with(backup) || backup.starts_with(source) {
        return Err(FolderSyncError::Validation(format!(
            "{} and {} are nested inside each other",
            source.display(),
            backup.display()
        )));
    }
    for root in [source, backup] {
        if !root.is_dir() {
            return Err(FolderSyncError::Validation(format!(
                "{} is not an existing directory",
                root.display()
            )));
        }
    }
    Ok(())
}

/// Result of comparing a source tree with its backup
#[derive(Debug, Clone, Default)]
pub struct Preview {
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
    /// Entries to copy from the source into the backup
    pub copy_tree: DiffTree,
    /// Entries to remove from the backup
    pub delete_tree: DiffTree,
    /// Source paths whose backup counterpart has a different kind
    pub conflicts: Vec<PathBuf>,
    /// Listing and metadata errors met during the walk
    pub errors: Vec<String>,
}

impl Preview {
    pub fn is_empty(&self) -> bool {
        self.copy_tree.is_empty() && self.delete_tree.is_empty()
    }

    /// Backup-side counterpart of a source path
    pub fn backup_twin(&self, source_path: &Path) -> Option<PathBuf> {
        source_path
            .strip_prefix(&self.source_root)
            .ok()
            .map(|rel| self.backup_root.join(rel))
    }

    /// Conflict paths paired with their backup twin, for kind warnings
    pub fn warning_paths(&self) -> Vec<(PathBuf, PathBuf)> {
        self.conflicts
            .iter()
            .filter_map(|path| self.backup_twin(path).map(|twin| (path.clone(), twin)))
            .collect()
    }

    /// Flatten the current selection into the executor's action lists
    pub fn action_lists(&self) -> ActionLists {
        let to_delete = self.delete_tree.flatten();
        let to_copy = self.copy_tree.flatten();
        let selected: HashSet<&PathBuf> = to_copy.iter().collect();
        let to_delete_before_copy = self
            .conflicts
            .iter()
            .filter(|path| selected.contains(path))
            .filter_map(|path| self.backup_twin(path))
            .collect();

        ActionLists {
            to_delete,
            to_copy,
            to_delete_before_copy,
        }
    }
}

/// Which tree an expanded subtree belongs to
#[derive(Clone, Copy, PartialEq, Eq)]
enum Side {
    Copy,
    Delete,
}

/// Accumulators threaded through the recursive walk
#[derive(Default)]
struct WalkState {
    copy_tree: DiffTree,
    delete_tree: DiffTree,
    conflicts: Vec<PathBuf>,
    errors: Vec<String>,
}

/// Recursive lock-step comparison of a source tree and its backup
pub struct TreeDiffEngine {
    rules: ExclusionRules,
    copy_links: bool,
}

impl TreeDiffEngine {
    pub fn new(rules: ExclusionRules) -> Self {
        Self {
            rules,
            copy_links: true,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(ExclusionRules::from_config(config)).with_copy_links(config.copy_links)
    }

    pub fn with_copy_links(mut self, enabled: bool) -> Self {
        self.copy_links = enabled;
        self
    }

    /// Compare `source_root` with `backup_root`.
    ///
    /// Both roots must be distinct readable directories. The walk is best
    /// effort: per-entry failures end up in `errors` and never abort it.
    pub fn diff(&self, source_root: &Path, backup_root: &Path) -> Preview {
        info!(
            "Diffing {} against {}",
            source_root.display(),
            backup_root.display()
        );

        let mut walk = WalkState::default();
        let copy_root = walk.copy_tree.insert(
            None,
            NewNode::partial(source_root, source_root.display().to_string()),
        );
        let delete_root = walk.delete_tree.insert(
            None,
            NewNode::partial(backup_root, backup_root.display().to_string()),
        );

        let (copied, deleted) = self.compare_dirs(
            source_root,
            backup_root,
            backup_root,
            copy_root,
            delete_root,
            true,
            &mut walk,
        );
        if !copied {
            walk.copy_tree.clear();
        }
        if !deleted {
            walk.delete_tree.clear();
        }

        info!(
            "Diff finished: {} copy nodes, {} delete nodes, {} conflicts, {} errors",
            walk.copy_tree.len(),
            walk.delete_tree.len(),
            walk.conflicts.len(),
            walk.errors.len()
        );

        Preview {
            source_root: source_root.to_path_buf(),
            backup_root: backup_root.to_path_buf(),
            copy_tree: walk.copy_tree,
            delete_tree: walk.delete_tree,
            conflicts: walk.conflicts,
            errors: walk.errors,
        }
    }

    /// Compare one directory pair; returns whether anything was
    /// materialized below it in the copy and delete trees.
    #[allow(clippy::too_many_arguments)]
    fn compare_dirs(
        &self,
        src: &Path,
        dst: &Path,
        backup_root: &Path,
        copy_parent: NodeId,
        delete_parent: NodeId,
        search_delete: bool,
        walk: &mut WalkState,
    ) -> (bool, bool) {
        let src_names = list_dir(src, &mut walk.errors);
        let dst_names = list_dir(dst, &mut walk.errors);
        let src_set: HashSet<&OsString> = src_names.iter().collect();
        let dst_set: HashSet<&OsString> = dst_names.iter().collect();

        let mut copied = false;
        let mut deleted = false;

        if search_delete {
            for name in dst_names.iter().filter(|n| !src_set.contains(n)) {
                let dst_path = dst.join(name);
                if self.rules.is_excluded_from_delete(&dst_path, backup_root) {
                    debug!("Keeping excluded {}", dst_path.display());
                    continue;
                }
                let Some(kind) = entry_kind(&dst_path) else {
                    continue;
                };
                debug!("To delete: {}", dst_path.display());
                let mut node = NewNode::whole(&dst_path, display_name(name));
                if kind == EntryKind::SymbolicLink {
                    node = node.link();
                }
                let id = walk.delete_tree.insert(Some(delete_parent), node);
                deleted = true;
                if kind == EntryKind::Directory {
                    self.expand(&dst_path, id, Side::Delete, walk);
                }
            }
        }

        for name in &src_names {
            if self.rules.excludes_name(name) {
                continue;
            }
            let src_path = src.join(name);
            let Some(src_kind) = entry_kind(&src_path) else {
                continue;
            };
            let dst_path = dst.join(name);
            let dst_kind = if dst_set.contains(name) {
                entry_kind(&dst_path)
            } else {
                None
            };

            let Some(dst_kind) = dst_kind else {
                // Absent from the backup
                match src_kind {
                    EntryKind::SymbolicLink if !self.copy_links => {}
                    EntryKind::SymbolicLink => {
                        debug!("To copy (new link): {}", src_path.display());
                        walk.copy_tree.insert(
                            Some(copy_parent),
                            NewNode::whole(&src_path, display_name(name)).link(),
                        );
                        copied = true;
                    }
                    _ => {
                        debug!("To copy (new): {}", src_path.display());
                        let id = walk
                            .copy_tree
                            .insert(Some(copy_parent), NewNode::whole(&src_path, display_name(name)));
                        copied = true;
                        if src_kind == EntryKind::Directory {
                            self.expand(&src_path, id, Side::Copy, walk);
                        }
                    }
                }
                continue;
            };

            match src_kind {
                EntryKind::SymbolicLink => {
                    // Broken links are never copied
                    if !self.copy_links || fs::metadata(&src_path).is_err() {
                        continue;
                    }
                    let mut node = NewNode::whole(&src_path, display_name(name)).link();
                    if dst_kind != EntryKind::SymbolicLink {
                        node = node.conflict();
                        walk.conflicts.push(src_path.clone());
                    }
                    walk.copy_tree.insert(Some(copy_parent), node);
                    copied = true;
                }
                EntryKind::File if dst_kind == EntryKind::File => {
                    match is_newer(&src_path, &dst_path) {
                        Ok(true) => {
                            debug!("To copy (modified): {}", src_path.display());
                            walk.copy_tree
                                .insert(Some(copy_parent), NewNode::whole(&src_path, display_name(name)));
                            copied = true;
                        }
                        Ok(false) => {}
                        Err(e) => walk.errors.push(e.to_string()),
                    }
                }
                EntryKind::Directory if dst_kind == EntryKind::Directory => {
                    let copy_id = walk
                        .copy_tree
                        .insert(Some(copy_parent), NewNode::partial(&src_path, display_name(name)));
                    let delete_id = walk
                        .delete_tree
                        .insert(Some(delete_parent), NewNode::partial(&dst_path, display_name(name)));
                    let search_below =
                        search_delete && !self.rules.is_excluded_from_delete(&dst_path, backup_root);
                    let (c, s) = self.compare_dirs(
                        &src_path,
                        &dst_path,
                        backup_root,
                        copy_id,
                        delete_id,
                        search_below,
                        walk,
                    );
                    if c {
                        copied = true;
                    } else {
                        walk.copy_tree.discard(copy_id);
                    }
                    if s {
                        deleted = true;
                    } else {
                        walk.delete_tree.discard(delete_id);
                    }
                }
                EntryKind::File | EntryKind::Directory => {
                    debug!(
                        "Kind conflict: {} is {:?}, backup is {:?}",
                        src_path.display(),
                        src_kind,
                        dst_kind
                    );
                    walk.conflicts.push(src_path.clone());
                    let id = walk.copy_tree.insert(
                        Some(copy_parent),
                        NewNode::whole(&src_path, display_name(name)).conflict(),
                    );
                    copied = true;
                    if src_kind == EntryKind::Directory {
                        self.expand(&src_path, id, Side::Copy, walk);
                    }
                }
                EntryKind::Other => {}
            }
        }

        (copied, deleted)
    }

    /// Materialize every descendant of `dir` under `parent`.
    ///
    /// Entries vanishing mid-walk are skipped; links are never descended.
    fn expand(&self, dir: &Path, parent: NodeId, side: Side, walk: &mut WalkState) {
        if entry_kind(dir) != Some(EntryKind::Directory) {
            return;
        }
        for name in list_dir(dir, &mut walk.errors) {
            let path = dir.join(&name);
            let Some(kind) = entry_kind(&path) else {
                continue;
            };
            let node = NewNode::whole(&path, display_name(&name));
            let tree = match side {
                Side::Copy => &mut walk.copy_tree,
                Side::Delete => &mut walk.delete_tree,
            };

            if kind == EntryKind::SymbolicLink {
                if side == Side::Delete || self.copy_links {
                    tree.insert(Some(parent), node.link());
                }
                continue;
            }
            if side == Side::Copy && self.rules.excludes_name(&name) {
                continue;
            }
            let id = tree.insert(Some(parent), node);
            if kind == EntryKind::Directory {
                self.expand(&path, id, side, walk);
            }
        }
    }
}

/// Kind of `path` without following links; `None` if it vanished
fn entry_kind(path: &Path) -> Option<EntryKind> {
    fs::symlink_metadata(path)
        .ok()
        .map(|meta| EntryKind::from_file_type(meta.file_type()))
}

/// Directory entry names in case-insensitive order; failures are recorded
/// and yield an empty listing.
fn list_dir(dir: &Path, errors: &mut Vec<String>) -> Vec<OsString> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) => {
            errors.push(FolderSyncError::listing(dir, e).to_string());
            return Vec::new();
        }
    };

    let mut names: Vec<OsString> = read
        .filter_map(|entry| entry.ok().map(|e| e.file_name()))
        .collect();
    names.sort_by_cached_key(|name| name.to_string_lossy().to_lowercase());
    names
}

/// Source strictly newer than backup at minute granularity
fn is_newer(src: &Path, dst: &Path) -> Result<bool, FolderSyncError> {
    let src_time = fs::symlink_metadata(src)?.modified()?;
    let dst_time = fs::symlink_metadata(dst)?.modified()?;
    Ok(minute_stamp(src_time) > minute_stamp(dst_time))
}

fn display_name(name: &OsString) -> String {
    name.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        backup: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let source = temp.path().join("source");
            let backup = temp.path().join("backup");
            fs::create_dir(&source).unwrap();
            fs::create_dir(&backup).unwrap();
            Self {
                _temp: temp,
                source,
                backup,
            }
        }

        fn write(root: &Path, rel: &str, mtime: i64) -> PathBuf {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, rel).unwrap();
            set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
            path
        }

        fn src(&self, rel: &str) -> PathBuf {
            Self::write(&self.source, rel, 1_000_000_020)
        }

        fn dst(&self, rel: &str) -> PathBuf {
            Self::write(&self.backup, rel, 1_000_000_020)
        }
    }

    fn engine() -> TreeDiffEngine {
        TreeDiffEngine::new(ExclusionRules::none())
    }

    #[test]
    fn test_validate_roots() {
        let fx = Fixture::new();
        assert!(validate_roots(&fx.source, &fx.backup).is_ok());
        assert!(validate_roots(&fx.source, &fx.source).is_err());
        assert!(validate_roots(Path::new(""), &fx.backup).is_err());
        assert!(validate_roots(&fx.source, &fx.backup.join("missing")).is_err());

        let file = fx.src("plain.txt");
        let err = validate_roots(&file, &fx.backup).unwrap_err();
        assert!(matches!(err, FolderSyncError::Validation(_)));
    }

    #[test]
    fn test_nested_roots_are_rejected() {
        let fx = Fixture::new();
        let inner_backup = fx.source.join("b");
        fs::create_dir(&inner_backup).unwrap();
        fx.src("f.txt");
        let inner_source = fx.backup.join("s");
        fs::create_dir(&inner_source).unwrap();

        for (source, backup) in [
            (&fx.source, &inner_backup),
            (&inner_source, &fx.backup),
        ] {
            assert!(matches!(
                validate_roots(source, backup),
                Err(FolderSyncError::Validation(_))
            ));
        }

        // Sibling names sharing a prefix are not nested
        let sibling = fx.source.with_file_name("source-old");
        fs::create_dir(&sibling).unwrap();
        assert!(validate_roots(&fx.source, &sibling).is_ok());
    }

    #[test]
    fn test_new_and_stale_entries() {
        let fx = Fixture::new();
        let new_file = fx.src("a/b.txt");
        let stale = fx.dst("a/old.txt");

        let result = engine().diff(&fx.source, &fx.backup);
        assert!(result.errors.is_empty());
        assert_eq!(result.copy_tree.flatten(), vec![new_file]);
        assert_eq!(result.delete_tree.flatten(), vec![stale]);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn test_identical_trees_produce_nothing() {
        let fx = Fixture::new();
        fx.src("d/e/f.txt");
        fx.dst("d/e/f.txt");
        fx.src("top.txt");
        fx.dst("top.txt");

        let result = engine().diff(&fx.source, &fx.backup);
        assert!(result.is_empty());
        assert!(result.copy_tree.root().is_none());
        assert!(result.delete_tree.root().is_none());
    }

    #[test]
    fn test_unchanged_directories_are_pruned() {
        let fx = Fixture::new();
        fx.src("same/x.txt");
        fx.dst("same/x.txt");
        let deep = fx.src("deep/er/new.txt");
        fs::create_dir_all(fx.backup.join("deep/er")).unwrap();

        let result = engine().diff(&fx.source, &fx.backup);
        assert!(result.copy_tree.find(&fx.source.join("same")).is_none());
        assert!(result.copy_tree.find(&fx.source.join("deep/er")).is_some());
        assert!(result.delete_tree.is_empty());
        assert_eq!(result.copy_tree.flatten(), vec![deep]);

        for (id, node) in result.copy_tree.iter() {
            if !node.is_whole() {
                assert!(!result.copy_tree.children(id).is_empty(), "empty dir {:?}", node.path);
            }
        }
    }

    #[test]
    fn test_mtime_compared_by_whole_minutes() {
        let fx = Fixture::new();
        let same_minute = Fixture::write(&fx.source, "same.txt", 1_000_000_050);
        Fixture::write(&fx.backup, "same.txt", 1_000_000_020);
        let newer = Fixture::write(&fx.source, "newer.txt", 1_000_000_080);
        Fixture::write(&fx.backup, "newer.txt", 1_000_000_020);
        Fixture::write(&fx.source, "older.txt", 1_000_000_020);
        Fixture::write(&fx.backup, "older.txt", 1_000_000_200);

        let result = engine().diff(&fx.source, &fx.backup);
        let copied = result.copy_tree.flatten();
        assert_eq!(copied, vec![newer]);
        assert!(!copied.contains(&same_minute));
    }

    #[test]
    fn test_directory_replacing_file_is_a_conflict() {
        let fx = Fixture::new();
        fx.src("x/inner.txt");
        let backup_x = fx.dst("x");

        let result = engine().diff(&fx.source, &fx.backup);
        let source_x = fx.source.join("x");
        let id = result.copy_tree.find(&source_x).expect("conflict node");
        let node = result.copy_tree.node(id);
        assert!(node.is_conflict);
        assert!(node.is_whole());
        assert_eq!(result.copy_tree.children(id).len(), 1);
        assert_eq!(result.conflicts, vec![source_x.clone()]);
        assert_eq!(result.copy_tree.conflict_paths(), result.conflicts);

        let lists = result.action_lists();
        assert_eq!(lists.to_copy, vec![source_x]);
        assert_eq!(lists.to_delete_before_copy, vec![backup_x]);
    }

    #[test]
    fn test_deselected_conflict_is_not_deleted_first() {
        let fx = Fixture::new();
        fx.src("x");
        fs::create_dir_all(fx.backup.join("x")).unwrap();

        let mut result = engine().diff(&fx.source, &fx.backup);
        let id = result.copy_tree.find(&fx.source.join("x")).unwrap();
        result.copy_tree.toggle(id);

        let lists = result.action_lists();
        assert!(lists.to_copy.is_empty());
        assert!(lists.to_delete_before_copy.is_empty());
    }

    #[test]
    fn test_file_conflict_survives_pruning() {
        let fx = Fixture::new();
        fx.src("dir/clash");
        fs::create_dir_all(fx.backup.join("dir/clash")).unwrap();

        let result = engine().diff(&fx.source, &fx.backup);
        assert!(result.copy_tree.find(&fx.source.join("dir")).is_some());
        assert_eq!(result.conflicts, vec![fx.source.join("dir/clash")]);
    }

    #[test]
    fn test_excluded_extension_never_materialized() {
        let fx = Fixture::new();
        fx.src("foo.pyc");
        fx.src("pkg/bar.pyc");
        let kept = fx.src("pkg/bar.py");

        let mut config = AppConfig::default();
        config.exclude_copy = vec!["*.pyc".to_string()];
        let result = TreeDiffEngine::from_config(&config).diff(&fx.source, &fx.backup);

        assert!(result.copy_tree.find(&fx.source.join("foo.pyc")).is_none());
        assert!(result.copy_tree.find(&fx.source.join("pkg/bar.pyc")).is_none());
        assert!(result.copy_tree.find(&kept).is_some());
    }

    #[test]
    fn test_delete_exclusions() {
        let fx = Fixture::new();
        fx.dst("keep/a.txt");
        fx.src("shared/new.txt");
        fx.dst("shared/stale.txt");
        let gone = fx.dst("gone.txt");

        let mut config = AppConfig::default();
        config.exclude_delete = vec![fx.backup.join("keep"), fx.backup.join("shared")];
        let result = TreeDiffEngine::from_config(&config).diff(&fx.source, &fx.backup);

        assert_eq!(result.delete_tree.flatten(), vec![gone]);
        assert_eq!(result.copy_tree.flatten(), vec![fx.source.join("shared/new.txt")]);
    }

    #[test]
    fn test_stale_directory_is_expanded_in_full() {
        let fx = Fixture::new();
        fx.dst("old/a/b.txt");
        fx.dst("old/c.txt");

        let result = engine().diff(&fx.source, &fx.backup);
        let old = result.delete_tree.find(&fx.backup.join("old")).unwrap();
        assert!(result.delete_tree.node(old).is_whole());
        assert!(result.delete_tree.find(&fx.backup.join("old/a/b.txt")).is_some());
        assert!(result.delete_tree.find(&fx.backup.join("old/c.txt")).is_some());
        assert_eq!(result.delete_tree.flatten(), vec![fx.backup.join("old")]);
    }

    #[test]
    fn test_children_sorted_case_insensitively() {
        let fx = Fixture::new();
        fx.src("b.txt");
        fx.src("A.txt");
        fx.src("c.txt");

        let result = engine().diff(&fx.source, &fx.backup);
        let root = result.copy_tree.root().unwrap();
        let names: Vec<_> = result
            .copy_tree
            .children(root)
            .iter()
            .map(|&id| result.copy_tree.node(id).name.clone())
            .collect();
        assert_eq!(names, vec!["A.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn test_every_new_and_stale_leaf_appears_once() {
        let fx = Fixture::new();
        let mut new_leaves = Vec::new();
        let mut stale_leaves = Vec::new();
        for i in 0..4 {
            new_leaves.push(fx.src(&format!("d{}/n{}.txt", i % 2, i)));
            stale_leaves.push(fx.dst(&format!("d{}/s{}.txt", i % 2, i)));
        }

        let result = engine().diff(&fx.source, &fx.backup);
        for leaf in &new_leaves {
            let count = result.copy_tree.iter().filter(|(_, n)| &n.path == leaf).count();
            assert_eq!(count, 1);
        }
        for leaf in &stale_leaves {
            let count = result.delete_tree.iter().filter(|(_, n)| &n.path == leaf).count();
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn test_diff_is_idempotent() {
        let fx = Fixture::new();
        fx.src("a/new.txt");
        fx.dst("a/old.txt");
        fx.src("clash/x");
        fx.dst("clash");

        let first = engine().diff(&fx.source, &fx.backup);
        let second = engine().diff(&fx.source, &fx.backup);
        let paths = |tree: &DiffTree| tree.iter().map(|(_, n)| n.path.clone()).collect::<Vec<_>>();
        assert_eq!(paths(&first.copy_tree), paths(&second.copy_tree));
        assert_eq!(paths(&first.delete_tree), paths(&second.delete_tree));
        assert_eq!(first.conflicts, second.conflicts);
    }

    #[test]
    fn test_unreadable_backup_is_treated_as_empty() {
        let fx = Fixture::new();
        let file = fx.src("a.txt");
        let missing = fx.backup.join("missing");

        let result = engine().diff(&fx.source, &missing);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.copy_tree.flatten(), vec![file]);
    }

    #[cfg(unix)]
    #[test]
    fn test_link_policy() {
        use std::os::unix::fs::symlink;

        let fx = Fixture::new();
        let target = fx.src("target.txt");
        fx.dst("target.txt");
        symlink(&target, fx.source.join("new_link")).unwrap();
        symlink(fx.source.join("nowhere"), fx.source.join("broken")).unwrap();
        symlink(fx.backup.join("nowhere"), fx.backup.join("broken")).unwrap();
        symlink(&target, fx.source.join("was_file")).unwrap();
        fx.dst("was_file");

        let without = engine().with_copy_links(false).diff(&fx.source, &fx.backup);
        assert!(without.is_empty());

        let with = engine().diff(&fx.source, &fx.backup);
        let new_link = with.copy_tree.find(&fx.source.join("new_link")).unwrap();
        assert!(with.copy_tree.node(new_link).is_link);
        assert!(!with.copy_tree.node(new_link).is_conflict);
        assert!(with.copy_tree.find(&fx.source.join("broken")).is_none());
        let was_file = with.copy_tree.find(&fx.source.join("was_file")).unwrap();
        assert!(with.copy_tree.node(was_file).is_conflict);
        assert_eq!(with.conflicts, vec![fx.source.join("was_file")]);
    }
}
