//! esh ライブラリ: バイナリ（`main.rs`）・ベンチマーク・テストから使うモジュールを公開する。
//!
//! データの流れ: 入力行 → [`lexer`] → [`glob`] → [`planner`] → [`executor`] → 終了ステータス
//! （次の行の `$?` に反映される）。1 行分のサイクルは [`interp`] がまとめる。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`lexer`] | 字句解析（クォート、エスケープ、変数展開、ワイルドカード位置、`\|` / `>` / `>>` / `&`） |
//! | [`glob`] | ワイルドカード展開（1 ワード 1 個の `*`、カレントディレクトリのみ） |
//! | [`planner`] | パイプライン計画（ステージ分割、リダイレクト、バックグラウンド） |
//! | [`executor`] | 実行（ビルトイン高速パス、fork + pipe、exec 失敗時のビルトインフォールバック） |
//! | [`job`] | フォアグラウンド待機（`waitpid(-1)` ループ）、端末のプロセスグループ受け渡し |
//! | [`signal`] | SIGINT / SIGWINCH のフラグ化と子プロセスへの転送 |
//! | [`builtins`] | ビルトインレジストリ（`cd`, `exit`, `export`, `help`, `history` + `$PATH` 由来の補完候補） |
//! | [`shell`] | インタプリタの状態（`$?`、位置パラメータ、レジストリ、追跡中の子、履歴） |
//! | [`interp`] | 1 行の解釈サイクル（`!N`、継続行、構文エラー） |
//! | [`complete`] | Tab 補完と rustyline ヘルパー |
//! | [`config`] | 環境変数から決まる設定（履歴ファイル、rc ファイル、ログフィルタ） |
//! | [`error`] | エラー型 |

pub mod builtins;
pub mod complete;
pub mod config;
pub mod error;
pub mod executor;
pub mod glob;
pub mod interp;
pub mod job;
pub mod lexer;
pub mod planner;
pub mod shell;
pub mod signal;
