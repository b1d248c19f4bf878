use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use foldersync_common::{
    default_log_dir, load_config, load_config_from, save_config, AppConfig, LoadedConfig,
    SelectionState, SyncPair,
};
use foldersync_core::{
    format_size, DirectoryPicker, DiffTree, NodeId, Preview, ProgressSnapshot, SyncConfirmer,
    SyncPlan, SyncSession, TreeSide,
};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "foldersync")]
#[command(author = "FolderSync Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Keep a backup directory synchronized with its original", long_about = None)]
struct Cli {
    /// Use this configuration file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a synchronization would copy and delete
    Preview {
        #[command(flatten)]
        roots: RootArgs,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Output results as JSON
        #[arg(long)]
        json: bool,

        /// Disable ANSI colors in output
        #[arg(long)]
        no_color: bool,
    },
    /// Synchronize the backup with the original
    Sync {
        #[command(flatten)]
        roots: RootArgs,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Leave this path out of the run (can be specified multiple times)
        #[arg(short, long)]
        skip: Vec<PathBuf>,

        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,

        /// Log the actions without touching the filesystem
        #[arg(long)]
        dry_run: bool,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recently synchronized pairs
    Recent,
    /// Manage favorite pairs
    Favorites {
        #[command(subcommand)]
        action: FavoriteAction,
    },
}

#[derive(Subcommand)]
enum FavoriteAction {
    /// List favorite pairs
    List,
    /// Add a pair to the favorites
    Add { source: PathBuf, backup: PathBuf },
    /// Remove a pair from the favorites
    Remove { source: PathBuf, backup: PathBuf },
}

#[derive(Args)]
struct RootArgs {
    /// Original directory
    source: Option<PathBuf>,

    /// Backup directory
    backup: Option<PathBuf>,

    /// Reuse the Nth recent pair (see `foldersync recent`)
    #[arg(long, value_name = "N", conflicts_with_all = ["source", "favorite"])]
    recent: Option<usize>,

    /// Reuse the Nth favorite pair (see `foldersync favorites list`)
    #[arg(long, value_name = "N", conflicts_with_all = ["source"])]
    favorite: Option<usize>,
}

/// Per-invocation overrides of the stored configuration
#[derive(Args)]
struct ConfigOverrides {
    /// Never copy entries with this name, or `*.ext` for an extension
    #[arg(short, long)]
    exclude: Vec<String>,

    /// Never delete this backup path or anything below it
    #[arg(long)]
    exclude_delete: Vec<PathBuf>,

    /// Do not copy symbolic links
    #[arg(long)]
    no_links: bool,

    /// Copy symbolic links
    #[arg(long, conflicts_with = "no_links")]
    links: bool,

    /// Send deleted entries to the trash
    #[arg(long)]
    trash: bool,

    /// Skip computing the size of the changes
    #[arg(long)]
    no_size: bool,
}

impl ConfigOverrides {
    fn apply(self, mut config: AppConfig) -> anyhow::Result<AppConfig> {
        config.exclude_copy.extend(self.exclude);
        for path in self.exclude_delete {
            config.exclude_delete.push(absolute(path)?);
        }
        if self.no_links {
            config.copy_links = false;
        }
        if self.links {
            config.copy_links = true;
        }
        if self.trash {
            config.use_trash = true;
        }
        if self.no_size {
            config.show_size = false;
        }
        Ok(config)
    }
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut loaded = match cli.config {
        Some(path) => load_config_from(absolute(path)?, false),
        None => load_config(false),
    }
    .context("loading configuration")?;

    match cli.command {
        Commands::Preview {
            roots,
            overrides,
            json,
            no_color,
        } => run_preview(&mut loaded, roots, overrides, json, no_color),
        Commands::Sync {
            roots,
            overrides,
            skip,
            yes,
            dry_run,
            json,
        } => run_sync(&mut loaded, roots, overrides, skip, yes, dry_run, json),
        Commands::Recent => {
            print_pairs("Recent", &loaded.config.recent);
            Ok(0)
        }
        Commands::Favorites { action } => run_favorites(&mut loaded, action),
    }
}

/// Build a session over the requested roots and compute its preview
fn open_session(
    loaded: &mut LoadedConfig,
    roots: RootArgs,
    overrides: ConfigOverrides,
    dry_run: bool,
) -> anyhow::Result<SyncSession> {
    let config = overrides.apply(loaded.config.clone())?;
    let log_dir = match config.log_dir.clone() {
        Some(dir) => dir,
        None => default_log_dir(loaded.portable, &loaded.path)?,
    };
    let mut session = SyncSession::new(config, log_dir).with_dry_run(dry_run);

    let stored = match (roots.recent, roots.favorite) {
        (Some(n), _) => Some(pick_pair(&loaded.config.recent, n, "recent")?),
        (_, Some(n)) => Some(pick_pair(&loaded.config.favorites, n, "favorite")?),
        _ => None,
    };
    match stored {
        Some(pair) => session.set_roots(pair.source, pair.backup),
        None => {
            if let Some(source) = roots.source {
                session.set_source(absolute(source)?);
            }
            if let Some(backup) = roots.backup {
                session.set_backup(absolute(backup)?);
            }
        }
    }
    if session.source().is_none() || session.backup().is_none() {
        session.pick_roots(&mut StdinPicker);
    }

    info!("Comparing:");
    info!("  Original: {}", display_opt(session.source()));
    info!("  Backup:   {}", display_opt(session.backup()));

    let preview = session.preview()?;
    for message in &preview.errors {
        warn!("{}", message);
    }

    // Only the recent list is persisted; overrides stay local to this run
    loaded.config.recent = session.config().recent.clone();
    if let Err(e) = save_config(&loaded.path, &loaded.config) {
        warn!("Could not save recent pairs: {}", e);
    }

    Ok(session)
}

fn run_preview(
    loaded: &mut LoadedConfig,
    roots: RootArgs,
    overrides: ConfigOverrides,
    json: bool,
    no_color: bool,
) -> anyhow::Result<i32> {
    let session = open_session(loaded, roots, overrides, false)?;
    let preview = session
        .current_preview()
        .ok_or_else(|| anyhow!("no preview available"))?;

    if json {
        let report = JsonPreview::new(preview);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    let use_color = !no_color && io::stdout().is_terminal();
    print_preview(preview, use_color);
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
fn run_sync(
    loaded: &mut LoadedConfig,
    roots: RootArgs,
    overrides: ConfigOverrides,
    skip: Vec<PathBuf>,
    yes: bool,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<i32> {
    let mut session = open_session(loaded, roots, overrides, dry_run)?;
    let (source, backup) = {
        let preview = session
            .current_preview()
            .ok_or_else(|| anyhow!("no preview available"))?;
        (preview.source_root.clone(), preview.backup_root.clone())
    };

    for path in skip {
        let path = absolute(path)?;
        let side = if path.starts_with(&source) {
            TreeSide::Copy
        } else if path.starts_with(&backup) {
            TreeSide::Delete
        } else {
            bail!("{} is neither under {} nor under {}", path.display(), source.display(), backup.display());
        };
        session
            .set_checked(side, &path, false)
            .with_context(|| format!("cannot skip {}", path.display()))?;
    }

    if session
        .current_preview()
        .map_or(true, |preview| preview.action_lists().is_empty())
    {
        println!("Nothing to synchronize.");
        return Ok(0);
    }

    let mut confirmer = StdinConfirmer { assume_yes: yes };
    let bars = LaneBars::new(json);
    let outcome = session.synchronize(&mut confirmer, |snapshot| bars.update(snapshot))?;
    bars.finish();

    let Some(outcome) = outcome else {
        println!("Synchronization cancelled.");
        return Ok(0);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!(
            "Copied {}/{} entries, deleted {}/{} entries.",
            outcome.copy.processed, outcome.copy.total, outcome.delete.processed, outcome.delete.total
        );
    }

    match outcome.error_summary() {
        Some(summary) => {
            eprintln!("{}", summary);
            Ok(2)
        }
        None => Ok(0),
    }
}

fn run_favorites(loaded: &mut LoadedConfig, action: FavoriteAction) -> anyhow::Result<i32> {
    match action {
        FavoriteAction::List => {
            print_pairs("Favorites", &loaded.config.favorites);
            return Ok(0);
        }
        FavoriteAction::Add { source, backup } => {
            let pair = SyncPair::new(absolute(source)?, absolute(backup)?);
            if !loaded.config.add_favorite(pair.clone()) {
                bail!("cannot add {} to the favorites (missing, identical or already present)", pair);
            }
            println!("Added favorite {}", pair);
        }
        FavoriteAction::Remove { source, backup } => {
            let pair = SyncPair::new(absolute(source)?, absolute(backup)?);
            if !loaded.config.remove_favorite(&pair) {
                bail!("{} is not a favorite", pair);
            }
            println!("Removed favorite {}", pair);
        }
    }
    save_config(&loaded.path, &loaded.config).context("saving configuration")?;
    Ok(0)
}

fn pick_pair(pairs: &[SyncPair], n: usize, what: &str) -> anyhow::Result<SyncPair> {
    n.checked_sub(1)
        .and_then(|index| pairs.get(index))
        .cloned()
        .ok_or_else(|| anyhow!("there is no {} pair number {}", what, n))
}

fn print_pairs(title: &str, pairs: &[SyncPair]) {
    if pairs.is_empty() {
        println!("{}: none", title);
        return;
    }
    println!("{}:", title);
    for (i, pair) in pairs.iter().enumerate() {
        println!("  {}. {}", i + 1, pair);
    }
}

fn absolute(path: PathBuf) -> anyhow::Result<PathBuf> {
    if path.is_absolute() || path.as_os_str().is_empty() {
        return Ok(path);
    }
    Ok(std::env::current_dir()
        .context("resolving the current directory")?
        .join(path))
}

fn display_opt(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}

/// Reads directories from stdin; an empty answer keeps the current value
struct StdinPicker;

impl DirectoryPicker for StdinPicker {
    fn pick_directory(&mut self, title: &str, initial: Option<&Path>) -> Option<PathBuf> {
        match initial {
            Some(path) => eprint!("{} directory [{}]: ", title, path.display()),
            None => eprint!("{} directory: ", title),
        }
        let _ = io::stderr().flush();

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer).ok()?;
        let answer = answer.trim();
        if answer.is_empty() {
            return None;
        }
        absolute(PathBuf::from(answer)).ok()
    }
}

/// Shows the plan on stderr and asks for a yes/no answer
struct StdinConfirmer {
    assume_yes: bool,
}

impl SyncConfirmer for StdinConfirmer {
    fn confirm(&mut self, plan: &SyncPlan) -> bool {
        print_plan(plan);
        if self.assume_yes {
            return true;
        }

        eprint!("Proceed with the synchronization? [y/N] ");
        let _ = io::stderr().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

fn print_plan(plan: &SyncPlan) {
    let lists = &plan.lists;
    eprintln!("\n{}", "=".repeat(80));
    eprintln!("Synchronization of {} -> {}", plan.source_root.display(), plan.backup_root.display());
    eprintln!("{}", "=".repeat(80));

    eprintln!("To copy ({}):", lists.to_copy.len());
    for path in &lists.to_copy {
        eprintln!("  + {}", path.display());
    }
    if !lists.to_delete_before_copy.is_empty() {
        eprintln!("Replaced (not of the same kind) ({}):", lists.to_delete_before_copy.len());
        for path in &lists.to_delete_before_copy {
            eprintln!("  ! {}", path.display());
        }
    }
    eprintln!("To delete ({}):", lists.to_delete.len());
    for path in &lists.to_delete {
        eprintln!("  - {}", path.display());
    }

    if let (Some(copy), Some(delete)) = (plan.copy_size, plan.delete_size) {
        eprintln!("Copy: {}    Remove: {}", format_size(copy), format_size(delete));
    }
    eprintln!("{}", "=".repeat(80));
}

/// One progress bar per lane
struct LaneBars {
    _multi: MultiProgress,
    copy: ProgressBar,
    delete: ProgressBar,
}

impl LaneBars {
    fn new(hidden: bool) -> Self {
        let target = if hidden {
            ProgressDrawTarget::hidden()
        } else {
            ProgressDrawTarget::stderr()
        };
        let multi = MultiProgress::with_draw_target(target);
        let style = ProgressStyle::with_template("{prefix:>7} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let copy = multi.add(ProgressBar::new(0));
        copy.set_style(style.clone());
        copy.set_prefix("copy");
        let delete = multi.add(ProgressBar::new(0));
        delete.set_style(style);
        delete.set_prefix("delete");

        Self {
            _multi: multi,
            copy,
            delete,
        }
    }

    fn update(&self, snapshot: &ProgressSnapshot) {
        self.copy.set_length(snapshot.copy.total as u64);
        self.copy.set_position(snapshot.copy.processed as u64);
        self.delete.set_length(snapshot.delete.total as u64);
        self.delete.set_position(snapshot.delete.processed as u64);
    }

    fn finish(&self) {
        self.copy.finish();
        self.delete.finish();
    }
}

fn print_preview(preview: &Preview, use_color: bool) {
    println!("\n{}", "=".repeat(80));
    println!("To copy from {}", preview.source_root.display());
    println!("{}", "=".repeat(80));
    print_tree(&preview.copy_tree, use_color);

    println!("\n{}", "=".repeat(80));
    println!("To delete from {}", preview.backup_root.display());
    println!("{}", "=".repeat(80));
    print_tree(&preview.delete_tree, use_color);

    let warnings = preview.warning_paths();
    if !warnings.is_empty() {
        println!("\nNot of the same kind (the backup entry will be replaced):");
        for (source, backup) in warnings {
            println!("  {} / {}", source.display(), backup.display());
        }
    }

    if !preview.errors.is_empty() {
        println!("\nErrors:");
        for message in &preview.errors {
            println!("  {}", message);
        }
    }

    let lists = preview.action_lists();
    println!("\n{}", "=".repeat(80));
    println!("Summary:");
    println!("  To copy:    {}", lists.to_copy.len());
    println!("  To delete:  {}", lists.to_delete.len());
    println!("  Conflicts:  {}", preview.conflicts.len());
    println!("  Errors:     {}", preview.errors.len());
    println!("{}", "=".repeat(80));
}

fn print_tree(tree: &DiffTree, use_color: bool) {
    let Some(root) = tree.root() else {
        println!("  (nothing)");
        return;
    };
    for (id, depth) in walk_tree(tree, root) {
        let node = tree.node(id);
        let checkbox = match node.state {
            SelectionState::Checked => "[x]",
            SelectionState::Unchecked => "[ ]",
            SelectionState::Indeterminate => "[-]",
        };
        let (marker, color, reset) = if node.is_conflict {
            ("! ", "\x1b[31m", "\x1b[0m")
        } else if node.is_link {
            ("@ ", "\x1b[36m", "\x1b[0m")
        } else {
            ("", "", "")
        };
        let (color, reset) = if use_color { (color, reset) } else { ("", "") };
        println!(
            "{}{} {}{}{}{}",
            "  ".repeat(depth),
            checkbox,
            color,
            marker,
            node.name,
            reset
        );
    }
}

/// Nodes below `root` in display order with their depth
fn walk_tree(tree: &DiffTree, root: NodeId) -> Vec<(NodeId, usize)> {
    let mut out = Vec::with_capacity(tree.len());
    let mut stack = vec![(root, 0usize)];
    while let Some((id, depth)) = stack.pop() {
        out.push((id, depth));
        for &child in tree.children(id).iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    out
}

#[derive(Serialize)]
struct JsonPreview {
    source: String,
    backup: String,
    copy: Vec<JsonNode>,
    delete: Vec<JsonNode>,
    conflicts: Vec<JsonConflict>,
    errors: Vec<String>,
    to_copy: Vec<String>,
    to_delete: Vec<String>,
    to_delete_before_copy: Vec<String>,
}

#[derive(Serialize)]
struct JsonNode {
    path: String,
    name: String,
    depth: usize,
    whole: bool,
    state: SelectionState,
    conflict: bool,
    link: bool,
}

#[derive(Serialize)]
struct JsonConflict {
    source: String,
    backup: String,
}

impl JsonPreview {
    fn new(preview: &Preview) -> Self {
        let lists = preview.action_lists();
        Self {
            source: path_string(&preview.source_root),
            backup: path_string(&preview.backup_root),
            copy: json_nodes(&preview.copy_tree),
            delete: json_nodes(&preview.delete_tree),
            conflicts: preview
                .warning_paths()
                .into_iter()
                .map(|(source, backup)| JsonConflict {
                    source: path_string(&source),
                    backup: path_string(&backup),
                })
                .collect(),
            errors: preview.errors.clone(),
            to_copy: lists.to_copy.iter().map(|p| path_string(p)).collect(),
            to_delete: lists.to_delete.iter().map(|p| path_string(p)).collect(),
            to_delete_before_copy: lists
                .to_delete_before_copy
                .iter()
                .map(|p| path_string(p))
                .collect(),
        }
    }
}

fn json_nodes(tree: &DiffTree) -> Vec<JsonNode> {
    let Some(root) = tree.root() else {
        return Vec::new();
    };
    walk_tree(tree, root)
        .into_iter()
        .map(|(id, depth)| {
            let node = tree.node(id);
            JsonNode {
                path: path_string(&node.path),
                name: node.name.clone(),
                depth,
                whole: node.is_whole(),
                state: node.state,
                conflict: node.is_conflict,
                link: node.is_link,
            }
        })
        .collect()
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
