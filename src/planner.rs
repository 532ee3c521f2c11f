//! パイプライン計画: 展開済みトークン列をステージ列に組み立てる。
//!
//! - `Word` は現在のステージの argv に追加される。ただし直前が `RedirectOut` なら
//!   リダイレクト先として消費される
//! - `Pipe` で現在のステージを閉じ、次のステージを開く
//! - 末尾の `Background` はバックグラウンドフラグになる（途中なら単語 `&`）
//! - ワードが 1 つもなければ `Ok(None)`（何もしない）
//!
//! 構造エラーは [`PlanError`] として返し、実行はしない。

use crate::error::PlanError;
use crate::lexer::Token;

// ── 計画 ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `>`: 作成 / 切り詰め
    Truncate,
    /// `>>`: 作成 / 追記
    Append,
}

/// 出力リダイレクト。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: String,
    pub mode: RedirectMode,
}

/// 1 コマンド分。`argv` は空にならない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub argv: Vec<String>,
    pub redirect: Option<Redirect>,
}

/// 左から右へ実行されるステージ列。リダイレクトを持てるのは最後のステージだけ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub background: bool,
}

#[derive(Default)]
struct StageBuilder {
    argv: Vec<String>,
    redirect: Option<Redirect>,
}

impl StageBuilder {
    fn is_empty(&self) -> bool {
        self.argv.is_empty() && self.redirect.is_none()
    }

    fn build(self) -> Result<Stage, PlanError> {
        if self.argv.is_empty() {
            return Err(PlanError::EmptyStage);
        }
        Ok(Stage {
            argv: self.argv,
            redirect: self.redirect,
        })
    }
}

/// トークン列をパイプラインにする。
pub fn plan(tokens: Vec<Token>) -> Result<Option<Pipeline>, PlanError> {
    if !tokens.iter().any(|t| matches!(t, Token::Word(_))) {
        // `&` 単独や演算子だけの行も含め、ワードがなければ何もしない
        return Ok(None);
    }

    let last = tokens.len() - 1;
    let mut stages = Vec::new();
    let mut current = StageBuilder::default();
    let mut pending: Option<RedirectMode> = None;
    let mut background = false;

    for (i, token) in tokens.into_iter().enumerate() {
        match token {
            Token::Word(word) => match pending.take() {
                Some(mode) => {
                    current.redirect = Some(Redirect {
                        path: word.text,
                        mode,
                    });
                }
                None => current.argv.push(word.text),
            },
            Token::Pipe => {
                if pending.is_some() {
                    return Err(PlanError::MissingRedirectTarget);
                }
                if current.redirect.is_some() && !current.argv.is_empty() {
                    return Err(PlanError::RedirectNotLast);
                }
                stages.push(std::mem::take(&mut current).build()?);
            }
            Token::RedirectOut { append } => {
                if pending.is_some() {
                    return Err(PlanError::MissingRedirectTarget);
                }
                pending = Some(if append {
                    RedirectMode::Append
                } else {
                    RedirectMode::Truncate
                });
            }
            Token::Background if i == last => {
                if pending.is_some() {
                    return Err(PlanError::MissingRedirectTarget);
                }
                background = true;
            }
            Token::Background => match pending.take() {
                Some(mode) => {
                    current.redirect = Some(Redirect {
                        path: "&".to_string(),
                        mode,
                    });
                }
                None => current.argv.push("&".to_string()),
            },
        }
    }

    if pending.is_some() {
        return Err(PlanError::MissingRedirectTarget);
    }
    if current.is_empty() && stages.is_empty() {
        return Ok(None);
    }
    stages.push(current.build()?);

    let pipeline = Pipeline { stages, background };
    tracing::debug!(?pipeline, "planned");
    Ok(Some(pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{tokenize, Word};
    use crate::shell::{Mode, ShellState};

    fn plan_line(line: &str) -> Result<Option<Pipeline>, PlanError> {
        let state = ShellState::new(Mode::Command);
        plan(tokenize(line, &state).tokens)
    }

    fn argvs(line: &str) -> Vec<Vec<String>> {
        plan_line(line)
            .unwrap()
            .unwrap()
            .stages
            .into_iter()
            .map(|s| s.argv)
            .collect()
    }

    #[test]
    fn single_stage() {
        assert_eq!(argvs("echo hello world"), vec![vec!["echo", "hello", "world"]]);
    }

    #[test]
    fn two_stage_pipeline() {
        let p = plan_line("ls | wc -l").unwrap().unwrap();
        assert_eq!(p.stages.len(), 2);
        assert_eq!(p.stages[0].argv, vec!["ls"]);
        assert_eq!(p.stages[1].argv, vec!["wc", "-l"]);
        assert!(p.stages.iter().all(|s| s.redirect.is_none()));
        assert!(!p.background);
    }

    #[test]
    fn redirect_attaches_to_last_stage() {
        let p = plan_line("ls | sort > out.txt").unwrap().unwrap();
        assert_eq!(p.stages[1].argv, vec!["sort"]);
        assert_eq!(
            p.stages[1].redirect,
            Some(Redirect {
                path: "out.txt".into(),
                mode: RedirectMode::Truncate,
            }),
        );
    }

    #[test]
    fn redirect_target_not_in_argv() {
        let p = plan_line("echo a >> log b").unwrap().unwrap();
        assert_eq!(p.stages[0].argv, vec!["echo", "a", "b"]);
        assert_eq!(p.stages[0].redirect.as_ref().unwrap().mode, RedirectMode::Append);
    }

    #[test]
    fn redirect_first_then_command() {
        let p = plan_line("> out echo hi").unwrap().unwrap();
        assert_eq!(p.stages[0].argv, vec!["echo", "hi"]);
        assert_eq!(p.stages[0].redirect.as_ref().unwrap().path, "out");
    }

    #[test]
    fn later_redirect_wins() {
        let p = plan_line("echo > a > b").unwrap().unwrap();
        assert_eq!(p.stages[0].redirect.as_ref().unwrap().path, "b");
    }

    #[test]
    fn background_flag() {
        let p = plan_line("sleep 5 &").unwrap().unwrap();
        assert!(p.background);
        assert_eq!(p.stages[0].argv, vec!["sleep", "5"]);
    }

    #[test]
    fn ampersand_in_middle_is_word() {
        let p = plan_line("echo & x").unwrap().unwrap();
        assert!(!p.background);
        assert_eq!(p.stages[0].argv, vec!["echo", "&", "x"]);
    }

    #[test]
    fn quoted_ampersand_not_background() {
        let p = plan_line("echo '&'").unwrap().unwrap();
        assert!(!p.background);
        assert_eq!(p.stages[0].argv, vec!["echo", "&"]);
    }

    #[test]
    fn no_words_is_noop() {
        assert_eq!(plan_line(""), Ok(None));
        assert_eq!(plan_line("   # comment"), Ok(None));
        assert_eq!(plan_line("&"), Ok(None));
        assert_eq!(plan_line("''"), Ok(None));
    }

    // ── エラーケース ──

    #[test]
    fn err_leading_pipe() {
        assert_eq!(plan_line("| ls"), Err(PlanError::EmptyStage));
    }

    #[test]
    fn err_trailing_pipe() {
        assert_eq!(plan_line("ls |"), Err(PlanError::EmptyStage));
    }

    #[test]
    fn err_double_pipe() {
        assert_eq!(plan_line("ls | | wc"), Err(PlanError::EmptyStage));
    }

    #[test]
    fn err_missing_target() {
        assert_eq!(plan_line("echo hi >"), Err(PlanError::MissingRedirectTarget));
        assert_eq!(plan_line("echo hi > | wc"), Err(PlanError::MissingRedirectTarget));
        assert_eq!(plan_line("echo hi > &"), Err(PlanError::MissingRedirectTarget));
    }

    #[test]
    fn err_redirect_not_last() {
        assert_eq!(plan_line("echo hi > f | wc"), Err(PlanError::RedirectNotLast));
    }

    #[test]
    fn err_redirect_only_stage() {
        assert_eq!(plan_line("ls | > out"), Err(PlanError::EmptyStage));
    }

    #[test]
    fn plan_from_raw_tokens() {
        let tokens = vec![
            Token::Word(Word::literal("cat")),
            Token::RedirectOut { append: true },
            Token::Word(Word::literal("log")),
            Token::Background,
        ];
        let p = plan(tokens).unwrap().unwrap();
        assert!(p.background);
        assert_eq!(
            p.stages,
            vec![Stage {
                argv: vec!["cat".into()],
                redirect: Some(Redirect {
                    path: "log".into(),
                    mode: RedirectMode::Append,
                }),
            }],
        );
    }
}
