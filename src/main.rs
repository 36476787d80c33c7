//! `ai` — the thin CLI surface over the single-project memory store
//! (SPEC_FULL.md §1, §6). Grounded on the teacher's `cli/*.rs` commands:
//! inspection subcommands (`status`, `threads`, `thread`, `bridges`,
//! `search`, `recall`, `health`, `heartbeat`) read the project's JSON store
//! directly, the same way the teacher's CLI opens its own SQLite connection
//! rather than going through the daemon — the store's atomic write+rename
//! gives any reader a consistent snapshot (see spec §5), so a daemon isn't
//! required just to look at memory state. Commands that mutate shared
//! daemon-only state (`daemon start/stop`, and anything that would race the
//! maintenance ticker) go over the IPC client instead.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use thread_memory::config::{AiConfig, ThreadMode};
use thread_memory::constants::{truncate_safe, RECALL_BUDGET_CHARS};
use thread_memory::intelligence::{health, injector, retriever};
use thread_memory::storage::{path_utils, records as record_store, BridgeStore, ThreadStore};
use thread_memory::thread::ThreadStatus;
use thread_memory::{daemon, processing::daemon_ipc_client, AiError, AiResult};

#[derive(Parser)]
#[command(name = "ai", version, about = "Persistent semantic working memory for a coding agent")]
struct App {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Aggregate counts and current mode
    Status,
    /// List threads
    Threads {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        /// Suspend active threads beyond the configured quota before listing
        #[arg(long)]
        prune: bool,
        #[arg(long)]
        show_weight: bool,
    },
    /// Show one thread in full
    Thread { id: String },
    /// List bridges
    Bridges {
        #[arg(long)]
        thread: Option<String>,
        /// Drop dead bridges (below their death threshold) before listing
        #[arg(long)]
        prune: bool,
        #[arg(long)]
        show_weight: bool,
    },
    /// Title/topic/summary substring search over threads
    Search { query: String },
    /// Ranked recall text for a query, as the injector would produce it
    Recall { query: String },
    /// Print the heartbeat record
    Heartbeat,
    /// Print a health report (corruption/quarantine, record counts)
    Health,
    /// Recompute embeddings and topics for every non-archived thread
    Reindex {
        #[arg(long)]
        verbose: bool,
    },
    /// Manage the background daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// View or change the thread-capacity mode
    Mode {
        /// Omit to print the current mode
        target: Option<String>,
    },
    /// Print usage
    Help,
}

#[derive(Subcommand)]
enum DaemonAction {
    Status,
    Start,
    Stop,
    /// Internal: run the daemon loop in this process (used by `daemon start`)
    #[command(hide = true, name = "run-foreground")]
    RunForeground,
}

fn project_root() -> AiResult<PathBuf> {
    path_utils::resolve_project_root().map_err(AiError::Io)
}

fn main() -> ExitCode {
    let app = App::parse();
    match app.command {
        None | Some(Command::Help) => {
            print_help();
            ExitCode::SUCCESS
        }
        Some(cmd) => run(cmd),
    }
}

fn run(cmd: Command) -> ExitCode {
    let result = match cmd {
        Command::Status => cmd_status(),
        Command::Threads { status, limit, prune, show_weight } => cmd_threads(status.as_deref(), limit, prune, show_weight),
        Command::Thread { id } => cmd_thread(&id),
        Command::Bridges { thread, prune, show_weight } => cmd_bridges(thread.as_deref(), prune, show_weight),
        Command::Search { query } => cmd_search(&query),
        Command::Recall { query } => cmd_recall(&query),
        Command::Heartbeat => cmd_heartbeat(),
        Command::Health => cmd_health(),
        Command::Reindex { verbose } => cmd_reindex(verbose),
        Command::Daemon { action } => cmd_daemon(action),
        Command::Mode { target } => cmd_mode(target.as_deref()),
        Command::Help => {
            print_help();
            return ExitCode::SUCCESS;
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e.error_kind() {
                "NotFound" | "InvalidState" => ExitCode::from(1),
                "InvalidInput" => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

fn print_help() {
    println!(
        "ai — persistent semantic working memory\n\n\
Usage: ai <COMMAND>\n\n\
Commands:\n  \
status                show aggregate counts and current mode\n  \
threads               list threads [--status X] [--limit N] [--prune] [--show-weight]\n  \
thread <id>           show one thread in full\n  \
bridges               list bridges [--thread <id>] [--prune] [--show-weight]\n  \
search <query>        substring search over thread titles/topics/summaries\n  \
recall <query>        ranked recall text, as the injector would produce it\n  \
heartbeat             print the heartbeat record\n  \
health                print a health report\n  \
reindex [--verbose]   recompute embeddings and topics for every live thread\n  \
daemon {{status|start|stop}}   manage the background daemon\n  \
mode {{status|light|normal|heavy|max}}   view or change the thread-capacity mode\n  \
help                  print this message"
    );
}

fn cmd_status() -> AiResult<ExitCode> {
    let root = project_root()?;
    let cfg = AiConfig::load(&root);
    let alive = daemon::is_running(&root);
    let report = health::build(&root, alive)?;

    println!("Project: {}", root.display());
    println!("Mode: {:?}", cfg.mode);
    println!("Daemon: {}", if alive { "running" } else { "not running" });
    println!("Threads: {} active, {} suspended, {} archived", report.threads_active, report.threads_suspended, report.threads_archived);
    println!("Bridges: {}", report.bridges_total);
    if report.quarantined_files > 0 {
        println!("Quarantined files: {}", report.quarantined_files);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_threads(status: Option<&str>, limit: Option<usize>, prune: bool, show_weight: bool) -> AiResult<ExitCode> {
    let root = project_root()?;
    let cfg = AiConfig::load(&root);
    let store = ThreadStore::new(&root);

    if prune {
        let suspended = thread_memory::intelligence::thread_manager::ThreadManager::enforce_quota(&root, &cfg)?;
        if suspended > 0 {
            println!("Suspended {} thread(s) over quota", suspended);
        }
    }

    let mut threads = match status {
        Some(s) => {
            let parsed: ThreadStatus = s.parse().map_err(AiError::InvalidInput)?;
            store.list_by_status(&parsed)?
        }
        None => store.list_all()?,
    };
    threads.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    if let Some(limit) = limit {
        threads.truncate(limit);
    }

    if threads.is_empty() {
        println!("No threads.");
        return Ok(ExitCode::SUCCESS);
    }

    if show_weight {
        println!("{:<14}  {:<10}  {:>6}  {:<30}  {}", "ID", "STATUS", "WEIGHT", "TITLE", "TOPICS");
    } else {
        println!("{:<14}  {:<10}  {:<30}  {}", "ID", "STATUS", "TITLE", "TOPICS");
    }
    println!("{}", "-".repeat(80));

    for t in &threads {
        let id_short = truncate_safe(&t.id, 12);
        let title = truncate_safe(&t.title, 29);
        let topics = t.topics.join(", ");
        if show_weight {
            println!("{:<14}  {:<10}  {:>6.2}  {:<30}  {}", id_short, t.status.as_str(), t.weight, title, topics);
        } else {
            println!("{:<14}  {:<10}  {:<30}  {}", id_short, t.status.as_str(), title, topics);
        }
    }
    println!("\n{} thread(s)", threads.len());
    Ok(ExitCode::SUCCESS)
}

fn cmd_thread(id: &str) -> AiResult<ExitCode> {
    let root = project_root()?;
    let store = ThreadStore::new(&root);
    let t = store.try_get(id)?.ok_or_else(|| AiError::ThreadNotFound(id.to_string()))?;

    println!("ID: {}", t.id);
    println!("Title: {}", t.title);
    println!("Status: {}", t.status.as_str());
    println!("Weight: {:.2}  Relevance: {:.2}  Activations: {}", t.weight, t.relevance_score, t.activation_count);
    println!("Origin: {}", t.origin_type.as_str());
    println!("Topics: {}", t.topics.join(", "));
    if !t.labels.is_empty() {
        println!("Labels: {}", t.labels.join(", "));
    }
    if let Some(parent) = &t.parent_id {
        println!("Parent: {}", parent);
    }
    if !t.child_ids.is_empty() {
        println!("Children: {}", t.child_ids.join(", "));
    }
    if !t.summary.is_empty() {
        println!("Summary: {}", t.summary);
    }
    println!("\nMessages ({}):", t.messages.len());
    for m in &t.messages {
        println!("  [{}] {}", m.source.as_str(), truncate_safe(&m.content, 200));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_bridges(thread: Option<&str>, prune: bool, show_weight: bool) -> AiResult<ExitCode> {
    let root = project_root()?;
    let store = BridgeStore::new(&root);

    if prune {
        let dead: Vec<String> = store.list_all()?.into_iter().filter(|b| b.is_dead()).map(|b| b.id).collect();
        for id in &dead {
            store.delete(id)?;
        }
        if !dead.is_empty() {
            println!("Removed {} dead bridge(s)", dead.len());
        }
    }

    let mut bridges = match thread {
        Some(id) => store.list_for_thread(id)?,
        None => store.list_all()?,
    };
    bridges.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));

    if bridges.is_empty() {
        println!("No bridges.");
        return Ok(ExitCode::SUCCESS);
    }

    if show_weight {
        println!("{:<14}  {:<14}  {:<12}  {:>6}  {}", "SOURCE", "TARGET", "TYPE", "WEIGHT", "REASON");
    } else {
        println!("{:<14}  {:<14}  {:<12}  {}", "SOURCE", "TARGET", "TYPE", "REASON");
    }
    println!("{}", "-".repeat(80));
    for b in &bridges {
        let src = truncate_safe(&b.source_id, 12);
        let dst = truncate_safe(&b.target_id, 12);
        let reason = truncate_safe(&b.reason, 40);
        if show_weight {
            println!("{:<14}  {:<14}  {:<12}  {:>6.2}  {}", src, dst, b.relation_type.as_str(), b.weight, reason);
        } else {
            println!("{:<14}  {:<14}  {:<12}  {}", src, dst, b.relation_type.as_str(), reason);
        }
    }
    println!("\n{} bridge(s)", bridges.len());
    Ok(ExitCode::SUCCESS)
}

fn cmd_search(query: &str) -> AiResult<ExitCode> {
    let root = project_root()?;
    let store = ThreadStore::new(&root);
    let needle = query.to_lowercase();

    let mut matches: Vec<_> = store
        .list_all()?
        .into_iter()
        .filter(|t| {
            t.title.to_lowercase().contains(&needle)
                || t.summary.to_lowercase().contains(&needle)
                || t.topics.iter().any(|topic| topic.to_lowercase().contains(&needle))
        })
        .collect();
    matches.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));

    if matches.is_empty() {
        println!("No results for: {}", query);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Results for: {}\n", query);
    println!("{:<14}  {:<10}  {:<30}  {}", "ID", "STATUS", "TITLE", "TOPICS");
    println!("{}", "-".repeat(80));
    for t in &matches {
        println!(
            "{:<14}  {:<10}  {:<30}  {}",
            truncate_safe(&t.id, 12),
            t.status.as_str(),
            truncate_safe(&t.title, 29),
            t.topics.join(", "),
        );
    }
    println!("\nFound: {} thread(s)", matches.len());
    Ok(ExitCode::SUCCESS)
}

fn cmd_recall(query: &str) -> AiResult<ExitCode> {
    let root = project_root()?;
    let cfg = AiConfig::load(&root);
    let matches = retriever::recall(&root, query, false, &cfg)?;
    let text = injector::format_recall(&root, &matches, RECALL_BUDGET_CHARS)?;
    println!("{}", text);
    Ok(ExitCode::SUCCESS)
}

fn cmd_heartbeat() -> AiResult<ExitCode> {
    let root = project_root()?;
    let hb = record_store::load_heartbeat(&root)?;
    println!("Beat: {}", hb.beat);
    println!("Started: {}", hb.started_at);
    println!("Last beat: {}", hb.last_beat_at);
    println!("Last interaction: {} (beat {})", hb.last_interaction_at, hb.last_interaction_beat);
    println!("Beats since last interaction: {}", hb.since_last());
    if let Some(thread) = &hb.last_thread_title {
        println!("Last thread: {}", thread);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_health() -> AiResult<ExitCode> {
    let root = project_root()?;
    let alive = daemon::is_running(&root);
    let report = health::build(&root, alive)?;
    println!("{}", serde_json::to_string_pretty(&report).map_err(AiError::Serialization)?);
    if report.is_ok() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

/// Recompute embedding + topics for every active/suspended thread. No
/// counterpart in `ThreadManager` since a daemon never needs to recompute a
/// thread it hasn't touched — this is purely an offline maintenance command
/// for when the embedding model itself changes.
fn cmd_reindex(verbose: bool) -> AiResult<ExitCode> {
    use thread_memory::processing::cleaner::extract_topics;
    use thread_memory::processing::embeddings::EmbeddingManager;

    let root = project_root()?;
    let store = ThreadStore::new(&root);
    let mut threads = store.list_by_status(&ThreadStatus::Active)?;
    threads.extend(store.list_by_status(&ThreadStatus::Suspended)?);

    let emb = EmbeddingManager::global();
    let mut n = 0;
    for mut t in threads {
        let corpus = t.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n");
        t.embedding = Some(emb.embed(&corpus));
        t.topics = extract_topics(&corpus);
        store.put(&t)?;
        n += 1;
        if verbose {
            println!("reindexed {} ({})", t.id, t.title);
        }
    }
    println!("Reindexed {} thread(s)", n);
    Ok(ExitCode::SUCCESS)
}

fn cmd_daemon(action: DaemonAction) -> AiResult<ExitCode> {
    let root = project_root()?;
    match action {
        DaemonAction::RunForeground => {
            daemon::run(&root)?;
            Ok(ExitCode::SUCCESS)
        }
        DaemonAction::Start => {
            daemon::start_detached(&root)?;
            println!("Daemon started for {}", root.display());
            Ok(ExitCode::SUCCESS)
        }
        DaemonAction::Stop => {
            daemon::stop(&root)?;
            println!("Daemon stopped");
            Ok(ExitCode::SUCCESS)
        }
        DaemonAction::Status => {
            if daemon::is_running(&root) {
                match daemon_ipc_client::daemon_status(&root) {
                    Ok(v) => println!("Daemon: running\n{}", serde_json::to_string_pretty(&v).map_err(AiError::Serialization)?),
                    Err(_) => println!("Daemon: running (status unavailable)"),
                }
                Ok(ExitCode::SUCCESS)
            } else {
                println!("Daemon: not running");
                Ok(ExitCode::from(1))
            }
        }
    }
}

fn cmd_mode(target: Option<&str>) -> AiResult<ExitCode> {
    let root = project_root()?;
    let mut cfg = AiConfig::load(&root);

    match target {
        None | Some("status") => {
            let quota = cfg.active_threads_limit.unwrap_or_else(|| cfg.mode.quota());
            println!("Mode: {:?} (quota {})", cfg.mode, quota);
            Ok(ExitCode::SUCCESS)
        }
        Some(s) => {
            let mode: ThreadMode = s.parse().map_err(AiError::InvalidInput)?;
            cfg.mode = mode;
            cfg.save(&root)?;
            let quota = cfg.active_threads_limit.unwrap_or_else(|| cfg.mode.quota());
            println!("Mode set to {:?} (quota {})", cfg.mode, quota);
            Ok(ExitCode::SUCCESS)
        }
    }
}
