//! Self-healing drift control loop for workgraph tasks.
//!
//! `therapydrift wg check` evaluates tasks carrying a ```` ```therapydrift ````
//! block and, with `--create-followups`, creates one `drift-therapy-<task>`
//! recovery task when drift persists and the loop guards allow it.
//! `therapydrift wg ack` resets a task's circuit breaker.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use therapydrift::ack::acknowledge;
use therapydrift::check::{CheckOptions, check_workgraph};
use therapydrift::exit_codes;
use therapydrift::io::paths::{WorkgraphPaths, find_workgraph_dir};
use therapydrift::io::state_store::FileStateStore;
use therapydrift::io::wg::{DEFAULT_WG_PROGRAM, WgCli};
use therapydrift::io::workgraph::TaskGraph;
use therapydrift::logging;

#[derive(Parser)]
#[command(
    name = "therapydrift",
    version,
    about = "Self-healing drift control loop for workgraph tasks"
)]
struct Cli {
    /// Project directory (or .workgraph dir). Defaults to searching upward from cwd.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    /// JSON output.
    #[arg(long, global = true)]
    json: bool,
    /// `wg` executable used to write logs and tasks.
    #[arg(long, global = true, env = "THERAPYDRIFT_WG_BIN", default_value = DEFAULT_WG_PROGRAM)]
    wg_bin: String,
    /// Timeout for each `wg` invocation, in seconds.
    #[arg(long, global = true, env = "THERAPYDRIFT_WG_TIMEOUT_SECS", default_value_t = 30)]
    wg_timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Workgraph-integrated commands.
    Wg {
        #[command(subcommand)]
        command: WgCommand,
    },
}

#[derive(Subcommand)]
enum WgCommand {
    /// Check self-healing drift for tasks with a therapydrift block.
    Check {
        /// Task id to check (repeatable).
        #[arg(long = "task", required = true)]
        tasks: Vec<String>,
        /// Write a summary line into each task's wg log.
        #[arg(long)]
        write_log: bool,
        /// Create the recovery task when an action is allowed.
        #[arg(long)]
        create_followups: bool,
    },
    /// Acknowledge automated actions for a task (closes its circuit breaker).
    Ack {
        /// Task id to acknowledge.
        #[arg(long)]
        task: String,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let wg_dir = find_workgraph_dir(cli.dir.as_deref())?;
    let paths = WorkgraphPaths::new(wg_dir);
    match &cli.command {
        Command::Wg {
            command:
                WgCommand::Check {
                    tasks,
                    write_log,
                    create_followups,
                },
        } => cmd_check(
            &cli,
            &paths,
            tasks,
            CheckOptions {
                write_log: *write_log,
                create_followups: *create_followups,
            },
        ),
        Command::Wg {
            command: WgCommand::Ack { task },
        } => cmd_ack(&cli, &paths, task),
    }
}

fn cmd_check(cli: &Cli, paths: &WorkgraphPaths, tasks: &[String], options: CheckOptions) -> Result<i32> {
    let store = FileStateStore::new(&paths.state_path);
    let writer = WgCli {
        program: cli.wg_bin.clone(),
        timeout: Duration::from_secs(cli.wg_timeout_secs),
        ..WgCli::new(&paths.project_dir)
    };
    let outcome = check_workgraph(paths, tasks, &store, &writer, options, Utc::now())?;

    if cli.json {
        print_json(&outcome.last_report())?;
    } else {
        let rendered: Vec<String> = outcome.reports.iter().map(|r| r.render_text()).collect();
        print!("{}", rendered.join("\n"));
    }
    Ok(outcome.exit_code())
}

fn cmd_ack(cli: &Cli, paths: &WorkgraphPaths, task: &str) -> Result<i32> {
    let graph = TaskGraph::load(&paths.graph_path).context("load task graph for ack")?;
    if graph.get(task).is_none() {
        return Err(anyhow!("task not found: {task}"));
    }
    let store = FileStateStore::new(&paths.state_path);
    let state = acknowledge(&store, task, Utc::now())?;

    if cli.json {
        print_json(&state)?;
    } else {
        println!(
            "{task}: acknowledged ({} automated actions total)",
            state.total_actions
        );
    }
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json output")?;
    println!("{payload}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_check_with_repeated_tasks() {
        let cli = Cli::parse_from([
            "therapydrift",
            "--json",
            "wg",
            "check",
            "--task",
            "t1",
            "--task",
            "t2",
            "--create-followups",
        ]);
        assert!(cli.json);
        match cli.command {
            Command::Wg {
                command:
                    WgCommand::Check {
                        tasks,
                        write_log,
                        create_followups,
                    },
            } => {
                assert_eq!(tasks, vec!["t1".to_string(), "t2".to_string()]);
                assert!(!write_log);
                assert!(create_followups);
            }
            Command::Wg { .. } => panic!("expected check"),
        }
    }

    #[test]
    fn check_requires_a_task() {
        let err = Cli::try_parse_from(["therapydrift", "wg", "check"]).err();
        assert!(err.is_some());
    }

    #[test]
    fn parse_ack_with_dir_after_subcommand() {
        let cli = Cli::parse_from(["therapydrift", "wg", "ack", "--task", "t1", "--dir", "/p"]);
        assert_eq!(cli.dir, Some(PathBuf::from("/p")));
        assert!(matches!(
            cli.command,
            Command::Wg {
                command: WgCommand::Ack { .. }
            }
        ));
    }
}
