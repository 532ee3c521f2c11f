//! ワイルドカード展開: ワイルドカード位置を持つワードをディレクトリ内のエントリ名に展開する。
//!
//! 1 ワードにつきワイルドカードは 1 個だけ（位置は [`Word::wildcard`]）。
//! ワードは `prefix` と `suffix` に分かれ、エントリ名が `prefix` で始まり、
//! 残りが `suffix` で終わるものがマッチする（`prefix` と `suffix` は重ならない）。
//!
//! - `.` で始まるエントリは常に除外
//! - `prefix` に `/` を含む場合は展開しない（`*` を戻したリテラルを返す）
//! - 結果は `read_dir` の列挙順（ソートしない）
//! - マッチなし → `*` を戻したリテラル 1 個

use std::path::Path;

use crate::lexer::{Token, Word};

/// 1 ワードを展開する。ワイルドカードなしならテキストをそのまま返す。
pub fn expand(word: &Word, dir: &Path) -> Vec<String> {
    let Some(pos) = word.wildcard else {
        return vec![word.text.clone()];
    };
    let (prefix, suffix) = word.text.split_at(pos);
    if prefix.contains('/') {
        return vec![word.with_star()];
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "glob: cannot list directory");
            return vec![word.with_star()];
        }
    };

    let matches: Vec<String> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| !name.starts_with('.') && matches(name, prefix, suffix))
        .collect();

    tracing::trace!(pattern = %word.with_star(), count = matches.len(), "glob expanded");
    if matches.is_empty() {
        vec![word.with_star()]
    } else {
        matches
    }
}

/// `name` が `prefix` + 任意 + `suffix` の形か。
pub fn matches(name: &str, prefix: &str, suffix: &str) -> bool {
    name.strip_prefix(prefix)
        .is_some_and(|rest| rest.ends_with(suffix))
}

/// トークン列中のワイルドカード付きワードをすべて展開する。他のトークンはそのまま。
pub fn expand_tokens(tokens: Vec<Token>, dir: &Path) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Word(word) if word.wildcard.is_some() => {
                out.extend(expand(&word, dir).into_iter().map(|s| Token::Word(Word::literal(s))));
            }
            other => out.push(other),
        }
    }
    out
}
