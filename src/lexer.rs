//! 字句解析: 1 行の入力をトークン列に変換する。
//!
//! 状態は [`LexState`]（通常 / シングルクォート内 / ダブルクォート内）と
//! 「エスケープ待ち」フラグの組。1 文字ごとに [`classify`] で文字種を決め、
//! 純粋関数 [`transition`] が次の状態と [`Action`] を返す。
//! 副作用（ワードへの追記、トークン出力、変数展開）は [`tokenize`] 側で行う。
//!
//! ## 規則
//!
//! | 入力 | 通常 | `"..."` 内 | `'...'` 内 |
//! |------|------|-----------|-----------|
//! | 空白 / タブ | ワード終端 | リテラル | リテラル |
//! | `\` | 次の 1 文字をエスケープ | 同左 | リテラル |
//! | `$` | 変数展開 | 変数展開 | リテラル |
//! | `*` | ワイルドカード（1 ワード 1 個まで） | リテラル | リテラル |
//! | `\|` / `>` | パイプ / リダイレクト | リテラル | リテラル |
//! | `#` | ワード先頭ならコメント | リテラル | リテラル |
//! | 改行 | 行末 | リテラル | リテラル |
//!
//! クォートの開閉はワードを区切らない（`a"b c"d` は 1 ワード `ab cd`）。
//! 何も収集されなかったワード（`''` や空の展開結果）はトークンにならない。
//!
//! `>` の直後、ファイル名ワードを読む前にもう一度 `>` が来ると、
//! 直前の書き込みトークンが追記モードに切り替わる（`>>` も `> >` も追記）。

use crate::shell::ShellState;

/// `$NAME` 形式の変数名の最大長。超えた分は後続のリテラル文字として扱う。
const MAX_VAR_NAME: usize = 100;

// ── トークン ────────────────────────────────────────────────────────

/// ワードトークン。
///
/// `wildcard` はクォート・エスケープされていない最初の `*` の位置（`text` 内のバイトオフセット）。
/// `*` 自体は `text` に含まれない。展開前のワードだけが `Some` を持つ。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Word {
    pub text: String,
    pub wildcard: Option<usize>,
}

impl Word {
    /// ワイルドカードなしのワード。
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            wildcard: None,
        }
    }

    /// `*` を元の位置に戻した文字列。
    pub fn with_star(&self) -> String {
        match self.wildcard {
            Some(pos) => format!("{}*{}", &self.text[..pos], &self.text[pos..]),
            None => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(Word),
    /// `|`
    Pipe,
    /// `>`（`append` なら `>>`）。ターゲットは次の `Word`。
    RedirectOut { append: bool },
    /// クォートもエスケープもされていない単独の `&`。
    Background,
}

/// [`tokenize`] の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    /// クォートが閉じないまま行末に達した。`tokens` は不完全なので使わないこと。
    pub continuation_needed: bool,
}

// ── 状態遷移 ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexState {
    Normal,
    SingleQuoted,
    DoubleQuoted,
}

/// 遷移表の入力となる文字種。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Blank,
    Newline,
    SingleQuote,
    DoubleQuote,
    Backslash,
    Dollar,
    Star,
    Pipe,
    Greater,
    Hash,
    Ampersand,
    Other,
}

pub fn classify(ch: char) -> CharClass {
    match ch {
        ' ' | '\t' => CharClass::Blank,
        '\n' => CharClass::Newline,
        '\'' => CharClass::SingleQuote,
        '"' => CharClass::DoubleQuote,
        '\\' => CharClass::Backslash,
        '$' => CharClass::Dollar,
        '*' => CharClass::Star,
        '|' => CharClass::Pipe,
        '>' => CharClass::Greater,
        '#' => CharClass::Hash,
        '&' => CharClass::Ampersand,
        _ => CharClass::Other,
    }
}

/// 1 文字に対する動作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// 文字をそのままワードに追加
    Literal,
    /// `\` を残したまま文字を追加（特殊でない文字のエスケープ）
    EscapedLiteral,
    BeginEscape,
    /// クォート開閉。ワードは区切らない
    Quote,
    EndWord,
    Pipe,
    Redirect,
    /// ワイルドカード位置を記録
    Wildcard,
    /// `$` の後を変数参照として読む
    Variable,
    /// 行の残りを捨てる
    Comment,
    EndOfLine,
}

/// 状態遷移関数。
///
/// - `escaped`: 直前が `\`（通常 / ダブルクォート内のみ意味を持つ）
/// - `started`: 現在のワードに 1 文字以上（またはワイルドカード）が収集済み
/// - `has_wildcard`: 現在のワードにワイルドカードが記録済み
pub fn transition(
    state: LexState,
    escaped: bool,
    class: CharClass,
    started: bool,
    has_wildcard: bool,
) -> (LexState, Action) {
    use CharClass as C;

    match state {
        LexState::SingleQuoted => match class {
            C::SingleQuote => (LexState::Normal, Action::Quote),
            _ => (state, Action::Literal),
        },
        _ if escaped => match class {
            C::Other | C::Newline => (state, Action::EscapedLiteral),
            _ => (state, Action::Literal),
        },
        LexState::DoubleQuoted => match class {
            C::DoubleQuote => (LexState::Normal, Action::Quote),
            C::Backslash => (state, Action::BeginEscape),
            C::Dollar => (state, Action::Variable),
            _ => (state, Action::Literal),
        },
        LexState::Normal => match class {
            C::Blank => (state, Action::EndWord),
            C::Newline => (state, Action::EndOfLine),
            C::SingleQuote => (LexState::SingleQuoted, Action::Quote),
            C::DoubleQuote => (LexState::DoubleQuoted, Action::Quote),
            C::Backslash => (state, Action::BeginEscape),
            C::Dollar => (state, Action::Variable),
            C::Star if !has_wildcard => (state, Action::Wildcard),
            C::Pipe => (state, Action::Pipe),
            C::Greater => (state, Action::Redirect),
            C::Hash if !started => (state, Action::Comment),
            _ => (state, Action::Literal),
        },
    }
}

// ── トークナイザ ────────────────────────────────────────────────────

struct Lexer<'s> {
    shell: &'s ShellState,
    state: LexState,
    escaped: bool,
    word: Word,
    /// 現在のワードにクォートもエスケープも含まれていない
    plain: bool,
    tokens: Vec<Token>,
}

impl<'s> Lexer<'s> {
    fn new(shell: &'s ShellState) -> Self {
        Self {
            shell,
            state: LexState::Normal,
            escaped: false,
            word: Word::default(),
            plain: true,
            tokens: Vec::new(),
        }
    }

    fn started(&self) -> bool {
        !self.word.text.is_empty() || self.word.wildcard.is_some()
    }

    fn finish_word(&mut self) {
        if self.started() {
            let word = std::mem::take(&mut self.word);
            if self.plain && word.wildcard.is_none() && word.text == "&" {
                self.tokens.push(Token::Background);
            } else {
                self.tokens.push(Token::Word(word));
            }
        }
        self.plain = true;
    }

    fn redirect(&mut self) {
        self.finish_word();
        match self.tokens.last_mut() {
            Some(Token::RedirectOut { append }) if !*append => *append = true,
            _ => self.tokens.push(Token::RedirectOut { append: false }),
        }
    }

    /// `chars[i]` は `$` の次の文字。展開後の読み取り位置を返す。
    fn expand_variable(&mut self, chars: &[char], i: usize) -> usize {
        let (name, next): (String, usize) = match chars.get(i) {
            Some('{') => match chars[i + 1..].iter().position(|&c| c == '}') {
                Some(len) => (chars[i + 1..i + 1 + len].iter().collect(), i + len + 2),
                None => {
                    self.word.text.push('$');
                    return i;
                }
            },
            Some('?') => ("?".to_string(), i + 1),
            Some(c) if c.is_ascii_digit() => {
                let len = chars[i..].iter().take_while(|c| c.is_ascii_digit()).count();
                (chars[i..i + len].iter().collect(), i + len)
            }
            Some(&c) if is_name_char(c) => {
                let len = chars[i..]
                    .iter()
                    .take(MAX_VAR_NAME)
                    .take_while(|&&c| is_name_char(c))
                    .count();
                (chars[i..i + len].iter().collect(), i + len)
            }
            _ => {
                self.word.text.push('$');
                return i;
            }
        };
        let value = resolve_variable(&name, self.shell);
        self.word.text.push_str(&value);
        next
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// 変数名を値に解決する。`?` → 直前の終了ステータス、数字のみ → 位置パラメータ、
/// それ以外 → 環境変数。解決できなければ空文字列。
pub fn resolve_variable(name: &str, shell: &ShellState) -> String {
    if name == "?" {
        return shell.last_status.to_string();
    }
    if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
        return name
            .parse::<usize>()
            .ok()
            .and_then(|n| shell.positional(n))
            .unwrap_or_default()
            .to_string();
    }
    std::env::var(name).unwrap_or_default()
}

/// 1 行をトークン列に変換する。
///
/// 変数展開の結果はワードにそのまま挿入され、再解析されない。
pub fn tokenize(line: &str, shell: &ShellState) -> Lexed {
    let chars: Vec<char> = line.chars().collect();
    let mut lexer = Lexer::new(shell);
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        i += 1;
        let (next, action) = transition(
            lexer.state,
            lexer.escaped,
            classify(ch),
            lexer.started(),
            lexer.word.wildcard.is_some(),
        );
        lexer.state = next;
        lexer.escaped = false;

        match action {
            Action::Literal => lexer.word.text.push(ch),
            Action::EscapedLiteral => {
                lexer.word.text.push('\\');
                lexer.word.text.push(ch);
            }
            Action::BeginEscape => {
                lexer.escaped = true;
                lexer.plain = false;
            }
            Action::Quote => lexer.plain = false,
            Action::EndWord => lexer.finish_word(),
            Action::Pipe => {
                lexer.finish_word();
                lexer.tokens.push(Token::Pipe);
            }
            Action::Redirect => lexer.redirect(),
            Action::Wildcard => lexer.word.wildcard = Some(lexer.word.text.len()),
            Action::Variable => i = lexer.expand_variable(&chars, i),
            Action::Comment | Action::EndOfLine => break,
        }
    }

    if lexer.state != LexState::Normal {
        tracing::debug!(state = ?lexer.state, "unterminated quote");
        return Lexed {
            tokens: lexer.tokens,
            continuation_needed: true,
        };
    }
    // 行末の孤立した `\` はリテラル
    if lexer.escaped {
        lexer.word.text.push('\\');
    }
    lexer.finish_word();
    tracing::trace!(tokens = ?lexer.tokens, "tokenized");

    Lexed {
        tokens: lexer.tokens,
        continuation_needed: false,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
