//! 1 行分の解釈サイクル: 履歴呼び出し → 字句解析（継続行） → ワイルドカード展開 → 計画 → 実行。
//!
//! クォートが閉じないときの扱いはモードで変わる:
//!
//! | モード | 動作 |
//! |--------|------|
//! | 対話 | `> ` プロンプトで次の行を読み、改行でつないで解析し直す |
//! | スクリプト | ファイルの次の行を読んで同様につなぐ。EOF なら構文エラー |
//! | `-c` | 構文エラー（127） |

use std::path::Path;

use crate::executor;
use crate::glob;
use crate::lexer;
use crate::planner;
use crate::shell::{Mode, ShellState};

/// クォート未閉のまま入力が尽きたときのステータス。
const SYNTAX_ERROR_STATUS: i32 = 127;
/// パイプライン構造エラーのステータス。
const PLAN_ERROR_STATUS: i32 = 2;

/// 1 行を解釈・実行する。
///
/// `next_line` は継続行の供給元（対話なら行エディタ、スクリプトなら次の行）。
/// 戻り値は新しい終了ステータス。何も実行しなかった行（空行、コメントのみ）は `None`。
pub fn run_line(
    state: &mut ShellState,
    line: &str,
    next_line: &mut dyn FnMut() -> Option<String>,
) -> Option<i32> {
    let line = line.strip_suffix('\n').unwrap_or(line);

    let recalled;
    let line = match line.strip_prefix('!') {
        Some(event) => match recall(state, event) {
            Some(entry) => {
                println!("{}", entry);
                recalled = entry;
                recalled.as_str()
            }
            None => {
                eprintln!("esh: !{}: event not found", event);
                return Some(0);
            }
        },
        _ => line,
    };

    let mut source = line.to_string();
    let lexed = loop {
        let lexed = lexer::tokenize(&source, state);
        if !lexed.continuation_needed {
            break lexed;
        }
        let more = match state.mode {
            Mode::Command => None,
            Mode::Interactive | Mode::Script => next_line(),
        };
        match more {
            Some(next) => {
                source.push('\n');
                source.push_str(next.strip_suffix('\n').unwrap_or(&next));
            }
            None => {
                eprintln!("esh: syntax error: unterminated quoted string");
                return Some(SYNTAX_ERROR_STATUS);
            }
        }
    };

    if state.mode == Mode::Interactive {
        state.record_history(&source);
    }

    let tokens = glob::expand_tokens(lexed.tokens, Path::new("."));
    match planner::plan(tokens) {
        Ok(Some(pipeline)) => Some(executor::execute(&pipeline, state)),
        Ok(None) => None,
        Err(e) => {
            eprintln!("esh: syntax error: {}", e);
            Some(PLAN_ERROR_STATUS)
        }
    }
}

/// `!N` の履歴エントリ（1 始まり）。番号は先頭の数字だけを読み、続く文字は無視する。
fn recall(state: &ShellState, event: &str) -> Option<String> {
    let event = event.trim_start();
    let digits = event
        .find(|c: char| !c.is_ascii_digit())
        .map_or(event, |end| &event[..end]);
    let n: usize = digits.parse().ok()?;
    n.checked_sub(1)
        .and_then(|i| state.history.get(i))
        .cloned()
}

/// 複数行のテキストを 1 行ずつ実行する（rc ファイル、スクリプト本体）。
/// 継続行は同じテキストの後続行から読む。`exit` が呼ばれたら中断する。
pub fn run_source(state: &mut ShellState, text: &str) {
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let mut more = || lines.next().map(str::to_string);
        if let Some(status) = run_line(state, line, &mut more) {
            state.last_status = status;
        }
        if state.should_exit {
            break;
        }
    }
}
