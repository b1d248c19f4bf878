pub mod classifier;
pub mod diff_tree;
pub mod executor;
pub mod file_operations;
pub mod instance;
pub mod session;
pub mod size;
pub mod tree_diff;

pub use classifier::ExclusionRules;
pub use diff_tree::{DiffNode, DiffTree, NewNode, NodeId};
pub use executor::{
    LaneKind, LaneProgress, LaneReport, ProgressSnapshot, RunningSync, SyncExecutor, SyncOutcome,
    SyncRequest, POLL_INTERVAL,
};
pub use file_operations::{FileOperation, FileOperations, OperationResult};
pub use instance::{ProcessProbe, RunInstance, SystemProbe};
pub use session::{DirectoryPicker, SyncConfirmer, SyncPlan, SyncSession, TreeSide};
pub use size::{format_size, path_size, total_size};
pub use tree_diff::{validate_roots, Preview, TreeDiffEngine};
