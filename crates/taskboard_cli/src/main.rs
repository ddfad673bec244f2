//! Command-line front end for the task board.
//!
//! # Responsibility
//! - Render board state (loading, error, empty list, tasks).
//! - Validate user text and confirm deletions before calling board actions.
//!
//! Each command runs in its own process, so the store is always file-backed:
//! `TASKBOARD_DATA_DIR` when set, `./.taskboard` otherwise.

use clap::{Parser, Subcommand};
use log::info;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use taskboard_core::{
    core_version, init_logging_from_env, normalize_task_text, RuntimeContext, SqliteDocumentStore,
    StoreClient, StoreConfig, Task, TaskBoard,
};

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);
const SHORT_ID_LEN: usize = 8;
const DEFAULT_DATA_DIR: &str = ".taskboard";

type Board = TaskBoard<SqliteDocumentStore>;

#[derive(Parser, Debug)]
#[command(name = "taskboard", version = core_version(), about = "Minimal live to-do list")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show all tasks, newest first.
    #[command(alias = "ls")]
    List,
    /// Create a task.
    Add { text: String },
    /// Flip the completion flag of a task.
    Toggle { id: String },
    /// Replace the text of a task.
    Edit { id: String, text: String },
    /// Delete a task after confirmation.
    #[command(alias = "rm")]
    Remove {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging_from_env() {
        eprintln!("warning: file logging disabled: {err}");
    }

    let client = store_client(
        |name| std::env::var(name).ok(),
        PathBuf::from(DEFAULT_DATA_DIR),
    );
    let mut board = client.board();
    settle(&mut board);

    let command = cli.command.unwrap_or(Command::List);
    info!("event=cli_command module=cli status=start command={command:?}");
    let outcome = run(command, &mut board);

    board.sync();
    render(&board);
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, board: &mut Board) -> Result<(), String> {
    match command {
        Command::List => Ok(()),
        Command::Add { text } => {
            let text = normalize_task_text(&text).map_err(|err| err.to_string())?;
            board
                .add(&text)
                .map(|id| println!("added {}", short_id(&id)))
                .map_err(|err| action_failure(board, err))
        }
        Command::Toggle { id } => {
            let task = find_task(board, &id)?;
            board
                .toggle(&task.id, !task.completed)
                .map_err(|err| action_failure(board, err))
        }
        Command::Edit { id, text } => {
            let text = normalize_task_text(&text).map_err(|err| err.to_string())?;
            let task = find_task(board, &id)?;
            board
                .edit(&task.id, &text)
                .map_err(|err| action_failure(board, err))
        }
        Command::Remove { id, yes } => {
            let task = find_task(board, &id)?;
            if !yes && !confirm(&format!("Delete \"{}\"? [y/N] ", task.text))? {
                println!("kept {}", short_id(&task.id));
                return Ok(());
            }
            board
                .remove(&task.id)
                .map_err(|err| action_failure(board, err))
        }
    }
}

/// Client whose store falls back to `default_dir` when no data dir is configured.
fn store_client<L>(lookup: L, default_dir: PathBuf) -> StoreClient
where
    L: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    StoreClient::with_loader(RuntimeContext::Interactive, move || {
        StoreConfig::from_lookup(&lookup).map(|config| config.or_data_dir(default_dir.clone()))
    })
}

/// Waits for the first snapshot so commands see current tasks.
fn settle(board: &mut Board) {
    board.sync();
    while board.is_loading() && board.wait(SNAPSHOT_TIMEOUT) {}
}

/// Resolves a full id or a unique id prefix against the current snapshot.
fn find_task(board: &Board, id: &str) -> Result<Task, String> {
    let matches: Vec<&Task> = board
        .tasks()
        .iter()
        .filter(|task| task.id.starts_with(id))
        .collect();
    match matches.as_slice() {
        [task] => Ok((*task).clone()),
        [] => Err(format!("no task matches `{id}`")),
        _ => Err(format!("`{id}` matches {} tasks; use a longer id", matches.len())),
    }
}

fn action_failure(board: &Board, err: taskboard_core::StoreError) -> String {
    match board.error() {
        Some(message) => format!("{message}: {err}"),
        None => err.to_string(),
    }
}

fn confirm(prompt: &str) -> Result<bool, String> {
    print!("{prompt}");
    io::stdout().flush().map_err(|err| err.to_string())?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|err| err.to_string())?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn render(board: &Board) {
    if let Some(error) = board.error() {
        println!("! {error}");
    }
    if board.is_loading() {
        println!("Loading tasks...");
        return;
    }
    if board.tasks().is_empty() {
        println!("No tasks yet.");
        return;
    }
    for task in board.tasks() {
        let mark = if task.completed { "x" } else { " " };
        println!("[{mark}] {}  {}", short_id(&task.id), task.text);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}
