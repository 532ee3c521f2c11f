//! esh: ホビー OS 向けの小さなシェル
//!
//! 起動モード:
//!
//! | 呼び出し | モード |
//! |----------|--------|
//! | `esh` | 対話（rustyline の行エディタ、履歴、Tab 補完） |
//! | `esh -c CMD [ARG...]` | 単一の式を実行して終了 |
//! | `esh SCRIPT [ARG...]` | スクリプトを 1 行ずつ実行（`$0` はスクリプトパス） |
//! | `esh -v` | バージョン表示 |

use std::fs;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use nix::unistd;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config as EditorConfig, Editor};
use tracing_subscriber::EnvFilter;

use esh::complete::EshHelper;
use esh::config::Config;
use esh::error::ShellError;
use esh::shell::{Mode, ShellState};
use esh::{interp, job, signal};

#[derive(Parser, Debug)]
#[command(name = "esh", version, disable_version_flag = true)]
#[command(about = "A small, non-POSIX command interpreter")]
struct Cli {
    /// 単一の式を実行して終了する
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,

    /// バージョンを表示する
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// 実行するスクリプト（`-c` 指定時は `$0`）
    script: Option<PathBuf>,

    /// 位置パラメータ `$1..$N`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_logging(&config.log_filter);

    let mode = if cli.command.is_some() {
        Mode::Command
    } else if cli.script.is_some() {
        Mode::Script
    } else {
        Mode::Interactive
    };
    if let Err(e) = signal::install(mode == Mode::Interactive) {
        tracing::warn!(error = %e, "failed to install signal handlers");
    }

    let status = match run(cli, mode, &config) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("esh: {}", e);
            1
        }
    };
    std::process::exit(status);
}

fn run(cli: Cli, mode: Mode, config: &Config) -> Result<i32, ShellError> {
    let mut positional: Vec<String> = cli
        .script
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    positional.extend(cli.args);

    match (mode, cli.command, cli.script) {
        (Mode::Command, Some(command), _) => {
            let mut state = ShellState::new(Mode::Command);
            state.positional = positional;
            Ok(interp::run_line(&mut state, &command, &mut || None::<String>).unwrap_or(0))
        }
        (Mode::Script, _, Some(path)) => run_script(path, positional),
        _ => run_interactive(config),
    }
}

/// スクリプトを最後まで実行する。`exit` で抜けたらその値、最後まで行けば 0。
fn run_script(path: PathBuf, positional: Vec<String>) -> Result<i32, ShellError> {
    let text = fs::read_to_string(&path).map_err(|source| ShellError::Script {
        path: path.clone(),
        source,
    })?;
    let mut state = ShellState::new(Mode::Script);
    state.positional = positional;
    interp::run_source(&mut state, &text);
    Ok(if state.should_exit { state.last_status } else { 0 })
}

fn run_interactive(config: &Config) -> Result<i32, ShellError> {
    let mut state = ShellState::with_path_commands(Mode::Interactive);
    if state.job_control {
        claim_terminal(&mut state);
    }

    if let Some(rc_path) = &config.rc_path {
        if let Ok(text) = fs::read_to_string(rc_path) {
            tracing::debug!(path = %rc_path.display(), "running rc file");
            state.mode = Mode::Script;
            interp::run_source(&mut state, &text);
            state.mode = Mode::Interactive;
            if state.should_exit {
                return Ok(state.last_status);
            }
        }
    }

    // 履歴の記録は ShellState 側で行い、行エディタには同じ内容を渡す
    let editor_config = EditorConfig::builder()
        .history_ignore_dups(false)?
        .history_ignore_space(true)
        .auto_add_history(false)
        .build();
    let mut editor: Editor<EshHelper, DefaultHistory> = Editor::with_config(editor_config)?;
    editor.set_helper(Some(EshHelper::new(state.builtins.names())));
    if let Err(e) = editor.load_history(&config.history_path) {
        tracing::debug!(error = %e, "no history loaded");
    }
    state.seed_history(editor.history().iter());

    loop {
        let prompt = if state.last_status == 0 {
            "esh$ ".to_string()
        } else {
            format!("[{}] esh$ ", state.last_status)
        };

        match editor.readline(&prompt) {
            Ok(line) => {
                let recorded = state.history.len();
                let mut more = || editor.readline("> ").ok();
                if let Some(status) = interp::run_line(&mut state, &line, &mut more) {
                    state.last_status = status;
                }
                if state.history.len() > recorded {
                    if let Some(entry) = state.history.last() {
                        let _ = editor.add_history_entry(entry.as_str());
                    }
                }
                if state.should_exit {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    if let Err(e) = editor.save_history(&config.history_path) {
        tracing::warn!(path = %config.history_path.display(), error = %e, "failed to save history");
    }
    Ok(state.last_status)
}

/// シェルを自身のプロセスグループリーダーにして端末を掌握する。
fn claim_terminal(state: &mut ShellState) {
    let pid = unistd::getpid();
    if let Err(e) = unistd::setpgid(pid, pid) {
        tracing::debug!(error = %e, "setpgid on startup");
    }
    state.shell_pgid = unistd::getpgrp();
    job::give_terminal_to(state.shell_pgid);
    tracing::debug!(pgid = %state.shell_pgid, "terminal claimed");
}
