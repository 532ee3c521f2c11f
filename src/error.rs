//! エラー型。
//!
//! - [`PlanError`]: パイプライン計画時の構造エラー（空ステージ、リダイレクト先なし等）
//! - [`ShellError`]: 外側ループ（スクリプト読み込み、行エディタ）の失敗
//!
//! どちらも 1 回のパイプライン実行に閉じたエラーで、インタプリタループは継続する。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// パイプライン計画時の構造エラー。終了ステータス 2 として報告される。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// `|` の前後にコマンドがない（`| ls`, `ls |`, `ls | | wc`、リダイレクトのみ）。
    #[error("empty command in pipeline")]
    EmptyStage,
    /// `>` / `>>` の後にファイル名がない。
    #[error("missing redirection target")]
    MissingRedirectTarget,
    /// リダイレクト付きステージの後に `|` が続いた。リダイレクトは最終ステージのみ。
    #[error("output redirection must be on the last command of a pipeline")]
    RedirectNotLast,
}

/// 外側ループで発生するエラー。
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Readline(#[from] rustyline::error::ReadlineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_error_messages() {
        assert_eq!(PlanError::EmptyStage.to_string(), "empty command in pipeline");
        assert_eq!(
            PlanError::MissingRedirectTarget.to_string(),
            "missing redirection target"
        );
    }

    #[test]
    fn script_error_includes_path() {
        let err = ShellError::Script {
            path: PathBuf::from("/no/such/script"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("/no/such/script: "));
    }
}
