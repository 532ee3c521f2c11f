//! ビルトインレジストリとビルトインコマンドの実装。
//!
//! レジストリは「名前 → ハンドラ（任意）+ 説明（任意）」の対応表。
//! 起動時に固定ビルトイン（`cd`, `exit`, `export`, `help`, `history`）を登録し、
//! さらに `$PATH` 内の実行可能ファイル名をハンドラなしで登録する。
//! ハンドラなしのエントリは Tab 補完の候補を広げるためだけに存在し、
//! [`BuiltinRegistry::lookup`] では見つからない（外部コマンドとして実行される）。
//!
//! ハンドラはフォークを挟まずに呼ばれたときだけシェルの状態（カレントディレクトリ、
//! 環境変数）を永続的に変更できる。子プロセス内で呼ばれた場合の変更は子の終了と共に消える。

use std::collections::HashSet;
use std::env;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::shell::ShellState;

/// ビルトインハンドラ。`argv[0]` はコマンド名。戻り値が終了ステータスになる。
///
/// 出力は `out` に書く。単独実行時はリダイレクト先ファイルか stdout、
/// 子プロセス内では（dup2 済みの）stdout が渡される。
pub type BuiltinFn = fn(&mut ShellState, &[String], &mut dyn Write) -> i32;

/// レジストリの 1 エントリ。
#[derive(Clone)]
pub struct BuiltinEntry {
    pub name: String,
    pub handler: Option<BuiltinFn>,
    pub description: Option<&'static str>,
}

/// 名前順に並んだビルトイン一覧。
#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    entries: Vec<BuiltinEntry>,
}

impl BuiltinRegistry {
    /// 空のレジストリ。
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定ビルトインを登録済みのレジストリ。
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("cd", Some(builtin_cd), Some("change directory"));
        registry.register("exit", Some(builtin_exit), Some("exit the shell"));
        registry.register("export", Some(builtin_export), Some("set environment variables"));
        registry.register("help", Some(builtin_help), Some("display this help text"));
        registry.register("history", Some(builtin_history), Some("list command history"));
        registry.sort();
        registry
    }

    /// エントリを追加する。同名のエントリが既にあれば何もしない。
    pub fn register(
        &mut self,
        name: &str,
        handler: Option<BuiltinFn>,
        description: Option<&'static str>,
    ) {
        if self.entries.iter().any(|e| e.name == name) {
            return;
        }
        self.entries.push(BuiltinEntry {
            name: name.to_string(),
            handler,
            description,
        });
    }

    /// ハンドラを持つエントリを名前で引く。補完専用のエントリは `None`。
    pub fn lookup(&self, name: &str) -> Option<BuiltinFn> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.handler)
    }

    /// 全エントリ（名前順）。`help` と補完で使う。
    pub fn list(&self) -> &[BuiltinEntry] {
        &self.entries
    }

    /// 全エントリ名（名前順）。
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    fn sort(&mut self) {
        self.entries.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// `$PATH`（コロン区切り）の各ディレクトリを走査して実行可能ファイル名を登録する。
    /// `$PATH` 未設定時は `/bin` のみ。登録後は名前順に並べ直す。
    pub fn add_path_commands(&mut self) {
        let path = env::var("PATH").unwrap_or_else(|_| "/bin".to_string());
        self.add_search_path(&path);
    }

    /// `:` 区切りのディレクトリ列を走査する。既に登録済みの名前は飛ばす。
    fn add_search_path(&mut self, path: &str) {
        let mut seen: HashSet<String> = self.entries.iter().map(|e| e.name.clone()).collect();
        for dir in path.split(':').filter(|d| !d.is_empty()) {
            self.add_dir_commands(Path::new(dir), &mut seen);
        }
        self.sort();
    }

    fn add_dir_commands(&mut self, dir: &Path, seen: &mut HashSet<String>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(_) => return,
        };
        let mut added = 0usize;
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || seen.contains(&name) || !is_executable(&entry.path()) {
                continue;
            }
            seen.insert(name.clone());
            self.entries.push(BuiltinEntry {
                name,
                handler: None,
                description: None,
            });
            added += 1;
        }
        tracing::trace!(dir = %dir.display(), added, "scanned PATH directory");
    }
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

// ── ハンドラ ─────────────────────────────────────────────────────────

/// `cd [dir]`: カレントディレクトリを変更する。
/// 引数省略時は `$HOME`、未設定なら `/home/$USER`。
fn builtin_cd(_state: &mut ShellState, argv: &[String], _out: &mut dyn Write) -> i32 {
    let target = match argv.get(1) {
        Some(dir) => dir.clone(),
        None => match env::var("HOME") {
            Ok(home) => home,
            Err(_) => format!("/home/{}", env::var("USER").unwrap_or_default()),
        },
    };

    match env::set_current_dir(&target) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}: could not cd '{}': {}", argv[0], target, e);
            1
        }
    }
}

/// `exit [N]`: インタプリタを終了する。N が数値でなければ 0。
fn builtin_exit(state: &mut ShellState, argv: &[String], _out: &mut dyn Write) -> i32 {
    state.should_exit = true;
    argv.get(1).and_then(|s| s.parse().ok()).unwrap_or(0)
}

/// `export NAME=VALUE ...`: 環境変数を設定する。`=` を含まない引数は無視。
fn builtin_export(_state: &mut ShellState, argv: &[String], _out: &mut dyn Write) -> i32 {
    for assignment in &argv[1..] {
        if let Some((name, value)) = assignment.split_once('=') {
            if !name.is_empty() {
                env::set_var(name, value);
            }
        }
    }
    0
}

/// `help`: バージョンと説明付きエントリの一覧を表示する。
fn builtin_help(state: &mut ShellState, _argv: &[String], out: &mut dyn Write) -> i32 {
    let _ = writeln!(out, "esh {}", env!("CARGO_PKG_VERSION"));
    let _ = writeln!(out, "\nThis shell is not POSIX-compliant, please be careful.\n");
    let _ = writeln!(out, "Built-in commands:");
    for entry in state.builtins.list() {
        if let Some(desc) = entry.description {
            let _ = writeln!(out, " {:<20} - {}", entry.name, desc);
        }
    }
    0
}

/// `history`: 履歴を `番号<TAB>行` 形式で表示する（番号は 1 始まり）。
fn builtin_history(state: &mut ShellState, _argv: &[String], out: &mut dyn Write) -> i32 {
    for (i, line) in state.history.iter().enumerate() {
        let _ = writeln!(out, "{}\t{}", i + 1, line);
    }
    0
}
