//! Tab 補完と行エディタ（rustyline）用ヘルパー。
//!
//! カーソルより前を空白で区切り、カーソル位置の単語を補完する。
//!
//! - **コマンド名補完**: 最初の単語（先頭の `sudo` は読み飛ばす）で `/` を含まないとき。
//!   候補はビルトインレジストリの全エントリ名（`$PATH` 由来を含む）
//! - **ファイル名補完**: それ以外。単語の `/` までをディレクトリとして検索し、
//!   `.` で始まるエントリは除外、ディレクトリには末尾 `/` を付ける
//!
//! 候補の適用（共通接頭辞までの補完、一覧表示、再描画）は rustyline が行う。

use std::path::{Path, PathBuf};

use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

/// 補完結果。`start` から カーソルまでを候補で置き換える。
#[derive(Debug, PartialEq, Eq)]
pub struct Completion {
    pub start: usize,
    pub candidates: Vec<String>,
}

/// `line[..cursor]` の最後の単語に対する補完候補を返す。
/// ファイル名は `base` を基準に探す（絶対パスを除く）。
pub fn complete(line: &str, cursor: usize, commands: &[String], base: &Path) -> Completion {
    let before = &line[..cursor];
    let start = before.rfind([' ', '\t']).map_or(0, |i| i + 1);
    let word = &before[start..];

    let mut preceding = before[..start].split([' ', '\t']).filter(|w| !w.is_empty());
    let first = preceding.next();
    let mut index = usize::from(first.is_some()) + preceding.count();
    if first == Some("sudo") {
        index -= 1;
    }

    let candidates = if index == 0 && !word.contains('/') {
        find_commands(word, commands)
    } else {
        find_files(word, base)
    };
    Completion { start, candidates }
}

fn find_commands(prefix: &str, commands: &[String]) -> Vec<String> {
    let mut results: Vec<String> = commands
        .iter()
        .filter(|c| c.starts_with(prefix))
        .cloned()
        .collect();
    results.dedup();
    results
}

fn find_files(word: &str, base: &Path) -> Vec<String> {
    let (dir_part, file_prefix) = match word.rfind('/') {
        Some(i) => word.split_at(i + 1),
        None => ("", word),
    };
    let search: PathBuf = if dir_part.is_empty() {
        base.to_path_buf()
    } else if dir_part.starts_with('/') {
        PathBuf::from(dir_part)
    } else {
        base.join(dir_part)
    };

    let Ok(entries) = std::fs::read_dir(&search) else {
        return Vec::new();
    };
    let mut results: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if name.starts_with('.') || !name.starts_with(file_prefix) {
                return None;
            }
            let is_dir = entry.path().is_dir();
            Some(format!("{}{}{}", dir_part, name, if is_dir { "/" } else { "" }))
        })
        .collect();
    results.sort();
    results
}

// ── rustyline ヘルパー ──────────────────────────────────────────────

/// 行エディタに渡すヘルパー。補完以外（ヒント、ハイライト、入力検証）は既定動作。
pub struct EshHelper {
    commands: Vec<String>,
}

impl EshHelper {
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }
}

impl Completer for EshHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let result = complete(line, pos, &self.commands, &cwd);
        let pairs = result
            .candidates
            .into_iter()
            .map(|c| {
                // 候補が 1 つに決まったときの区切り空白（ディレクトリは続けて入力できるよう付けない）
                let replacement = if c.ends_with('/') { c.clone() } else { format!("{} ", c) };
                Pair {
                    display: c,
                    replacement,
                }
            })
            .collect();
        Ok((result.start, pairs))
    }
}

impl Hinter for EshHelper {
    type Hint = String;
}

impl Highlighter for EshHelper {}

impl Validator for EshHelper {}

impl Helper for EshHelper {}
