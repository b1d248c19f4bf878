use crate::classifier::ExclusionRules;
use crate::diff_tree::{DiffTree, NodeId};
use crate::executor::{ProgressSnapshot, SyncExecutor, SyncOutcome, SyncRequest, POLL_INTERVAL};
use crate::file_operations::FileOperations;
use crate::instance::{ProcessProbe, RunInstance, SystemProbe};
use crate::size::total_size;
use crate::tree_diff::{validate_roots, Preview, TreeDiffEngine};
use foldersync_common::{ActionLists, AppConfig, FolderSyncError, SelectionState, SyncPair};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Interactive directory selection supplied by the front end
pub trait DirectoryPicker {
    fn pick_directory(&mut self, title: &str, initial: Option<&Path>) -> Option<PathBuf>;
}

/// Final approval of a run, shown both action lists
pub trait SyncConfirmer {
    fn confirm(&mut self, plan: &SyncPlan) -> bool;
}

/// What a run would do, as presented for confirmation
#[derive(Debug, Clone, Serialize)]
pub struct SyncPlan {
    pub lists: ActionLists,
    pub source_root: PathBuf,
    pub backup_root: PathBuf,
    pub copy_size: Option<u64>,
    pub delete_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSide {
    Copy,
    Delete,
}

/// Holds the roots, the configuration and the current preview between
/// user interactions.
pub struct SyncSession {
    config: AppConfig,
    log_dir: PathBuf,
    source: Option<PathBuf>,
    backup: Option<PathBuf>,
    preview: Option<Preview>,
    dry_run: bool,
    probe: Box<dyn ProcessProbe>,
}

impl SyncSession {
    pub fn new(config: AppConfig, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            log_dir: log_dir.into(),
            source: None,
            backup: None,
            preview: None,
            dry_run: false,
            probe: Box::new(SystemProbe),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn backup(&self) -> Option<&Path> {
        self.backup.as_deref()
    }

    pub fn current_preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// Changing roots drops any preview computed for the old ones
    pub fn set_roots(&mut self, source: impl Into<PathBuf>, backup: impl Into<PathBuf>) {
        self.set_source(source);
        self.set_backup(backup);
    }

    pub fn set_source(&mut self, source: impl Into<PathBuf>) {
        self.source = Some(source.into());
        self.preview = None;
    }

    pub fn set_backup(&mut self, backup: impl Into<PathBuf>) {
        self.backup = Some(backup.into());
        self.preview = None;
    }

    /// Ask for both roots; a cancelled pick keeps the previous value.
    /// Returns true when both roots are set afterwards.
    pub fn pick_roots(&mut self, picker: &mut dyn DirectoryPicker) -> bool {
        if let Some(source) = picker.pick_directory("Original", self.source.as_deref()) {
            self.source = Some(source);
            self.preview = None;
        }
        if let Some(backup) = picker.pick_directory("Backup", self.backup.as_deref()) {
            self.backup = Some(backup);
            self.preview = None;
        }
        self.source.is_some() && self.backup.is_some()
    }

    /// Validate the roots, diff them and remember the pair as recent
    pub fn preview(&mut self) -> Result<&Preview, FolderSyncError> {
        let source = self.source.clone().unwrap_or_default();
        let backup = self.backup.clone().unwrap_or_default();
        validate_roots(&source, &backup)?;

        let preview = TreeDiffEngine::from_config(&self.config).diff(&source, &backup);
        self.config.push_recent(SyncPair::new(source, backup));
        Ok(self.preview.insert(preview))
    }

    /// Toggle the node at `path` in one of the preview trees
    pub fn toggle(&mut self, side: TreeSide, path: &Path) -> Result<SelectionState, FolderSyncError> {
        let (tree, id) = self.locate(side, path)?;
        tree.toggle(id);
        Ok(tree.state(id))
    }

    /// Force the node at `path` and its subtree to one state
    pub fn set_checked(
        &mut self,
        side: TreeSide,
        path: &Path,
        checked: bool,
    ) -> Result<SelectionState, FolderSyncError> {
        let (tree, id) = self.locate(side, path)?;
        tree.select(id, checked);
        Ok(tree.state(id))
    }

    fn locate(&mut self, side: TreeSide, path: &Path) -> Result<(&mut DiffTree, NodeId), FolderSyncError> {
        let preview = self
            .preview
            .as_mut()
            .ok_or_else(|| FolderSyncError::Path("no preview to select from".to_string()))?;
        let tree = match side {
            TreeSide::Copy => &mut preview.copy_tree,
            TreeSide::Delete => &mut preview.delete_tree,
        };
        let id = tree
            .find(path)
            .ok_or_else(|| FolderSyncError::Path(format!("{} is not in the preview", path.display())))?;
        Ok((tree, id))
    }

    /// Flatten the current selection, with byte totals when enabled
    pub fn plan(&self) -> Option<SyncPlan> {
        let preview = self.preview.as_ref()?;
        let lists = preview.action_lists();
        let (copy_size, delete_size) = if self.config.show_size {
            (Some(total_size(&lists.to_copy)), Some(total_size(&lists.to_delete)))
        } else {
            (None, None)
        };
        Some(SyncPlan {
            lists,
            source_root: preview.source_root.clone(),
            backup_root: preview.backup_root.clone(),
            copy_size,
            delete_size,
        })
    }

    /// Confirm and run the current selection.
    ///
    /// Returns `Ok(None)` when there is nothing selected or the user
    /// declines. A completed run discards the preview.
    pub fn synchronize<F>(
        &mut self,
        confirmer: &mut dyn SyncConfirmer,
        on_progress: F,
    ) -> Result<Option<SyncOutcome>, FolderSyncError>
    where
        F: FnMut(&ProgressSnapshot),
    {
        let Some(plan) = self.plan() else {
            return Ok(None);
        };
        if plan.lists.is_empty() {
            info!("Nothing selected, skipping synchronization");
            return Ok(None);
        }
        if !confirmer.confirm(&plan) {
            info!("Synchronization declined");
            return Ok(None);
        }

        let instance = RunInstance::acquire(&self.log_dir, self.probe.as_ref())?;
        let ops = FileOperations::new(self.dry_run, self.config.use_trash)
            .with_copy_filter(ExclusionRules::from_config(&self.config), self.config.copy_links);
        let executor = SyncExecutor::new(ops);
        let outcome = executor.run(
            SyncRequest {
                lists: plan.lists,
                source_root: plan.source_root,
                backup_root: plan.backup_root,
            },
            instance.copy_log_path(),
            instance.delete_log_path(),
            POLL_INTERVAL,
            on_progress,
        );
        self.preview = None;
        Ok(Some(outcome))
    }
}
