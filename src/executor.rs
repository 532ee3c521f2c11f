//! パイプライン実行: ビルトイン高速パス、fork + pipe 接続、フォアグラウンド待機。
//!
//! - 単一ステージ・フォアグラウンドでハンドラ付きビルトイン → fork せずシェル内で実行
//!   （`cd` / `export` / `exit` がシェルの状態を変えられる唯一の経路）
//! - それ以外 → 各ステージを左から順に fork。ビルトイン名でも子プロセス内で実行されるので、
//!   パイプライン中の `cd` はシェルに影響しない
//! - 子: `execvp` → 失敗したらレジストリのハンドラ → それもなければ 127
//! - フォアグラウンド: 端末をパイプラインのプロセスグループに渡し、
//!   [`job::reap_all`] で子がなくなるまで待つ
//! - バックグラウンド: 待たずに 0 を返す（次のフォアグラウンド待機で回収される）

use std::convert::Infallible;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd};

use nix::errno::Errno;
use nix::unistd::{self, ForkResult, Pid};

use crate::builtins::BuiltinFn;
use crate::job;
use crate::planner::{Pipeline, Redirect, RedirectMode, Stage};
use crate::shell::ShellState;
use crate::signal;

/// パイプラインを実行して終了ステータスを返す。
pub fn execute(pipeline: &Pipeline, state: &mut ShellState) -> i32 {
    if let [stage] = pipeline.stages.as_slice() {
        if !pipeline.background {
            if let Some(handler) = state.builtins.lookup(&stage.argv[0]) {
                return execute_builtin(handler, stage, state);
            }
        }
    }
    execute_job(pipeline, state)
}

// ── ビルトイン高速パス ──────────────────────────────────────────────

/// ビルトインをシェルのプロセス内で実行する。リダイレクトがあればファイルに書く。
fn execute_builtin(handler: BuiltinFn, stage: &Stage, state: &mut ShellState) -> i32 {
    tracing::debug!(name = %stage.argv[0], "builtin in-process");
    match &stage.redirect {
        Some(redirect) => match open_redirect(redirect) {
            Ok(mut file) => handler(state, &stage.argv, &mut file),
            Err(e) => {
                eprintln!("esh: {}: {}", redirect.path, e);
                1
            }
        },
        None => {
            let mut out = io::stdout().lock();
            let status = handler(state, &stage.argv, &mut out);
            let _ = out.flush();
            status
        }
    }
}

fn open_redirect(redirect: &Redirect) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true);
    match redirect.mode {
        RedirectMode::Truncate => options.truncate(true),
        RedirectMode::Append => options.append(true),
    };
    options.open(&redirect.path)
}

// ── fork パス ───────────────────────────────────────────────────────

fn execute_job(pipeline: &Pipeline, state: &mut ShellState) -> i32 {
    // 子にバッファ内容が複製されないよう先に吐き出す
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();

    let n = pipeline.stages.len();
    let mut prev_read: Option<OwnedFd> = None;
    let mut pgid: Option<Pid> = None;
    let mut last_child: Option<Pid> = None;

    for (i, stage) in pipeline.stages.iter().enumerate() {
        let pipe = if i + 1 < n {
            match unistd::pipe() {
                Ok(pair) => Some(pair),
                Err(e) => {
                    eprintln!("esh: pipe: {}", e);
                    break;
                }
            }
        } else {
            None
        };

        // SAFETY: 子は exec するか process::exit するまで親の状態を共有しない
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                let (unused_read, write) = match pipe {
                    Some((r, w)) => (Some(r), Some(w)),
                    None => (None, None),
                };
                drop(unused_read);
                run_child(stage, prev_read, write, pgid, state);
            }
            Ok(ForkResult::Parent { child }) => {
                if state.job_control {
                    let group = *pgid.get_or_insert(child);
                    // 子側でも setpgid するが、どちらが先でも同じ結果になる
                    if let Err(e) = unistd::setpgid(child, group) {
                        tracing::debug!(%child, error = %e, "parent setpgid");
                    }
                }
                tracing::debug!(%child, stage = i, pgid = ?pgid, argv = ?stage.argv, "forked");
                last_child = Some(child);
                // 前段の read end はここで閉じ、今回の write end も閉じる
                prev_read = pipe.map(|(r, w)| {
                    drop(w);
                    r
                });
            }
            Err(e) => {
                eprintln!("esh: fork: {}", e);
                tracing::warn!(stage = i, error = %e, "fork failed");
                break;
            }
        }
    }
    drop(prev_read);

    let Some(last) = last_child else {
        return 1;
    };
    if pipeline.background {
        tracing::debug!(%last, "background pipeline");
        return 0;
    }

    if state.job_control {
        if let Some(group) = pgid {
            job::give_terminal_to(group);
        }
    }
    signal::clear_pending();
    state.foreground = Some(last);
    let status = job::reap_all(state.foreground);
    state.foreground = None;
    if state.job_control {
        job::take_terminal_back(state.shell_pgid);
    }
    status
}

/// fork された子プロセス側。戻らない。
fn run_child(
    stage: &Stage,
    stdin: Option<OwnedFd>,
    stdout: Option<OwnedFd>,
    pgid: Option<Pid>,
    state: &mut ShellState,
) -> ! {
    if state.job_control {
        let _ = unistd::setpgid(Pid::from_raw(0), pgid.unwrap_or(Pid::from_raw(0)));
    }
    signal::reset_child_defaults();

    if let Some(fd) = stdin {
        redirect_fd(&fd, libc::STDIN_FILENO);
    }
    if let Some(fd) = stdout {
        redirect_fd(&fd, libc::STDOUT_FILENO);
    } else if let Some(redirect) = &stage.redirect {
        match open_redirect(redirect) {
            Ok(file) => redirect_fd(&file, libc::STDOUT_FILENO),
            Err(e) => {
                eprintln!("esh: {}: {}", redirect.path, e);
                std::process::exit(1);
            }
        }
    }

    let status = run_command(&stage.argv, state);
    let _ = io::stdout().flush();
    std::process::exit(status)
}

/// `fd` を `target` に複製する。元の fd は呼び出し側の drop で閉じる。
fn redirect_fd(fd: &impl AsRawFd, target: i32) {
    if let Err(e) = unistd::dup2(fd.as_raw_fd(), target) {
        eprintln!("esh: dup2: {}", e);
        std::process::exit(1);
    }
}

/// 子プロセス内でコマンドを実行する。戻るのは exec に失敗したときだけ。
fn run_command(argv: &[String], state: &mut ShellState) -> i32 {
    let err = match exec(argv) {
        Ok(never) => match never {},
        Err(e) => e,
    };

    if let Some(handler) = state.builtins.lookup(&argv[0]) {
        let mut out = io::stdout().lock();
        let status = handler(state, argv, &mut out);
        let _ = out.flush();
        return status;
    }

    if err == Errno::ENOENT {
        eprintln!("esh: {}: command not found", argv[0]);
    } else {
        eprintln!("esh: {}: {}", argv[0], err);
    }
    127
}

fn exec(argv: &[String]) -> Result<Infallible, Errno> {
    let args = argv
        .iter()
        .map(|a| CString::new(a.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Errno::ENOENT)?;
    unistd::execvp(&args[0], &args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glob;
    use crate::lexer::tokenize;
    use crate::planner::plan;
    use crate::shell::Mode;
    use serial_test::serial;
    use std::path::Path;
    use std::time::{Duration, Instant};

    fn run(line: &str, state: &mut ShellState) -> i32 {
        let tokens = tokenize(line, state).tokens;
        let tokens = glob::expand_tokens(tokens, Path::new("."));
        let pipeline = plan(tokens).unwrap().unwrap();
        execute(&pipeline, state)
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    #[serial]
    fn builtin_cd_changes_shell_directory() {
        let original = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().canonicalize().unwrap();
        let mut state = ShellState::new(Mode::Command);

        assert_eq!(run(&format!("cd {}", target.display()), &mut state), 0);
        assert_eq!(std::env::current_dir().unwrap(), target);

        std::env::set_current_dir(&original).unwrap();
    }

    #[test]
    #[serial]
    fn piped_cd_runs_in_child() {
        let original = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut state = ShellState::new(Mode::Command);

        run(&format!("cd {} | true", dir.path().display()), &mut state);
        assert_eq!(std::env::current_dir().unwrap(), original);
    }

    #[test]
    #[serial]
    fn external_exit_status() {
        let mut state = ShellState::new(Mode::Command);
        assert_eq!(run("sh -c 'exit 3'", &mut state), 3);
        assert_eq!(run("true", &mut state), 0);
    }

    #[test]
    #[serial]
    fn signal_killed_child_status() {
        let mut state = ShellState::new(Mode::Command);
        assert_eq!(run("sh -c 'kill -9 $$'", &mut state), 137);
    }

    #[test]
    #[serial]
    fn command_not_found_is_127() {
        let mut state = ShellState::new(Mode::Command);
        assert_eq!(run("esh-no-such-command-xyz", &mut state), 127);
    }

    #[test]
    #[serial]
    fn redirect_truncate_and_append() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let mut state = ShellState::new(Mode::Command);

        run(&format!("echo one > {}", out.display()), &mut state);
        run(&format!("echo two >> {}", out.display()), &mut state);
        assert_eq!(read(&out), "one\ntwo\n");

        run(&format!("echo three > {}", out.display()), &mut state);
        assert_eq!(read(&out), "three\n");
    }

    #[test]
    #[serial]
    fn pipeline_feeds_next_stage() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("upper.txt");
        let mut state = ShellState::new(Mode::Command);

        let status = run(
            &format!("echo hello | tr a-z A-Z | cat > {}", out.display()),
            &mut state,
        );
        assert_eq!(status, 0);
        assert_eq!(read(&out), "HELLO\n");
    }

    #[test]
    #[serial]
    fn builtin_redirect_in_process() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("help.txt");
        let mut state = ShellState::new(Mode::Command);

        assert_eq!(run(&format!("help > {}", out.display()), &mut state), 0);
        assert!(read(&out).contains("Built-in commands:"));
    }

    #[test]
    #[serial]
    fn builtin_fallback_inside_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("help.txt");
        let mut state = ShellState::new(Mode::Command);

        assert_eq!(run(&format!("help | cat > {}", out.display()), &mut state), 0);
        assert!(read(&out).contains(" exit                 - exit the shell"));
    }

    #[test]
    #[serial]
    fn redirect_open_failure() {
        let mut state = ShellState::new(Mode::Command);
        assert_eq!(run("echo hi > /no/such/dir/out", &mut state), 1);
        assert_eq!(run("help > /no/such/dir/out", &mut state), 1);
    }

    #[test]
    #[serial]
    fn sigpipe_is_default_in_children() {
        let mut state = ShellState::new(Mode::Command);
        assert_eq!(run("sh -c 'kill -PIPE $$; exit 0'", &mut state), 141);
    }

    #[test]
    #[serial]
    fn upstream_stage_dies_quietly_on_closed_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let err = dir.path().join("err.txt");
        let out = dir.path().join("out.txt");
        let mut state = ShellState::new(Mode::Command);

        let line = format!(
            "sh -c 'yes 2> {}' | head -n 1 > {}",
            err.display(),
            out.display()
        );
        assert_eq!(run(&line, &mut state), 0);
        assert_eq!(read(&out), "y\n");
        assert_eq!(read(&err), "");
    }

    #[test]
    #[serial]
    fn interrupt_forwarded_to_foreground_child() {
        use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

        signal::install(false).unwrap();
        let waiter = unsafe { libc::pthread_self() };
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            // プロセス全体ではなく待機中のスレッドだけに送る
            unsafe { libc::pthread_kill(waiter, libc::SIGINT) };
        });

        let mut state = ShellState::new(Mode::Command);
        let start = Instant::now();
        assert_eq!(run("sleep 3", &mut state), 130);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(state.foreground.is_none());
        sender.join().unwrap();

        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        unsafe { sigaction(Signal::SIGINT, &default) }.unwrap();
    }

    #[test]
    #[serial]
    fn background_returns_immediately() {
        let mut state = ShellState::new(Mode::Command);
        let start = Instant::now();
        assert_eq!(run("sleep 1 &", &mut state), 0);
        assert!(start.elapsed() < Duration::from_millis(900));
        assert!(state.foreground.is_none());
        // 次のフォアグラウンド待機がバックグラウンドの子も回収する
        assert_eq!(job::reap_all(None), 0);
    }

    #[test]
    #[serial]
    fn exit_builtin_sets_flag() {
        let mut state = ShellState::new(Mode::Command);
        assert_eq!(run("exit 4", &mut state), 4);
        assert!(state.should_exit);
    }

    #[test]
    #[serial]
    fn exit_inside_pipeline_does_not_stop_shell() {
        let mut state = ShellState::new(Mode::Command);
        run("exit 4 | true", &mut state);
        assert!(!state.should_exit);
    }
}
