//! インタプリタ全体の状態を保持するモジュール。
//!
//! 環境変数とカレントディレクトリはプロセスそのもの（`std::env`）を使い、
//! 子プロセスへの自動継承を活用する。ここに置くのはそれ以外の状態だけ:
//! 終了ステータス（`$?`）、位置パラメータ（`$0`〜`$N`）、ビルトインレジストリ、
//! 追跡中のフォアグラウンド子プロセス、履歴、ジョブ制御の有無。

use std::io::IsTerminal;

use nix::unistd::{self, Pid};

use crate::builtins::BuiltinRegistry;

/// 入力の供給元。未閉クォート時の継続ポリシーを決める。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 対話モード: `> ` プロンプトで継続行を読む。
    Interactive,
    /// スクリプトファイル実行: 次の行を読んで継続する。
    Script,
    /// `-c` の単一式: 継続できないので構文エラー（127）。
    Command,
}

/// インタプリタの実行状態。ライフタイム全体で 1 つだけ存在し、
/// lexer（`$?`/位置パラメータ参照）、executor、ビルトインに明示的に渡される。
pub struct ShellState {
    /// 直前のパイプラインの終了ステータス。`$?` 展開とプロンプトに使う。
    pub last_status: i32,
    /// 位置パラメータ。スクリプト実行時に一度だけ設定される（`$0` はスクリプトパス）。
    pub positional: Vec<String>,
    /// ビルトイン + `$PATH` 由来の補完候補。
    pub builtins: BuiltinRegistry,
    /// シグナル転送先のフォアグラウンド子プロセス。待機中のみ `Some`。
    pub foreground: Option<Pid>,
    /// `history` ビルトインと `!N` で参照するコマンド履歴（古い順）。
    pub history: Vec<String>,
    pub mode: Mode,
    /// 子をプロセスグループに分け、ターミナルを受け渡すかどうか。
    pub job_control: bool,
    /// シェル自身のプロセスグループ ID。ターミナルを取り戻すときに使う。
    pub shell_pgid: Pid,
    /// `exit` ビルトインで true になり、外側ループを終了させる。
    pub should_exit: bool,
}

impl ShellState {
    /// 固定ビルトインのみを登録した状態を作る（`$PATH` は走査しない）。
    pub fn new(mode: Mode) -> Self {
        let job_control = mode == Mode::Interactive && std::io::stdin().is_terminal();
        Self {
            last_status: 0,
            positional: Vec::new(),
            builtins: BuiltinRegistry::with_builtins(),
            foreground: None,
            history: Vec::new(),
            mode,
            job_control,
            shell_pgid: unistd::getpgrp(),
            should_exit: false,
        }
    }

    /// 固定ビルトインに加え、`$PATH` 内の実行可能ファイル名を補完候補として登録する。
    pub fn with_path_commands(mode: Mode) -> Self {
        let mut state = Self::new(mode);
        state.builtins.add_path_commands();
        state
    }

    /// 位置パラメータ `$index` を返す。範囲外なら `None`。
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    /// 対話モードの履歴に 1 行追加する。先頭が空白の行は記録しない。
    pub fn record_history(&mut self, line: &str) {
        if line.is_empty() || line.starts_with(' ') || line.starts_with('\n') {
            return;
        }
        self.history.push(line.to_string());
    }

    /// 保存済みの履歴で置き換える。行エディタの履歴と番号をそろえるため起動時に一度だけ呼ぶ。
    pub fn seed_history<I>(&mut self, entries: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.history.clear();
        for entry in entries {
            self.record_history(entry.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_defaults() {
        let state = ShellState::new(Mode::Command);
        assert_eq!(state.last_status, 0);
        assert!(state.foreground.is_none());
        assert!(!state.job_control);
        assert!(state.builtins.lookup("cd").is_some());
    }

    #[test]
    fn positional_out_of_range() {
        let mut state = ShellState::new(Mode::Script);
        state.positional = vec!["script.sh".into(), "one".into()];
        assert_eq!(state.positional(0), Some("script.sh"));
        assert_eq!(state.positional(1), Some("one"));
        assert_eq!(state.positional(2), None);
    }

    #[test]
    fn history_skips_leading_space() {
        let mut state = ShellState::new(Mode::Interactive);
        state.record_history("ls");
        state.record_history(" secret");
        state.record_history("");
        assert_eq!(state.history, vec!["ls"]);
    }

    #[test]
    fn seeded_history_keeps_order() {
        let mut state = ShellState::new(Mode::Interactive);
        state.record_history("stale");
        state.seed_history(["ls", "pwd", "ls"]);
        state.record_history("echo hi");
        assert_eq!(state.history, vec!["ls", "pwd", "ls", "echo hi"]);
    }
}
