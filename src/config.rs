//! 起動時設定。すべて環境変数から決まる。
//!
//! | 項目 | 値 |
//! |------|-----|
//! | 履歴ファイル | `$HOME/.esh_history`（`HOME` 未設定なら `/tmp/.esh_history`） |
//! | rc ファイル | `$HOME/.eshrc`（`HOME` 未設定なら読まない） |
//! | ログフィルタ | `$ESH_LOG`（未設定なら `warn`） |

use std::path::PathBuf;

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub history_path: PathBuf,
    pub rc_path: Option<PathBuf>,
    /// `tracing_subscriber::EnvFilter` の書式
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("HOME").ok().filter(|h| !h.is_empty()),
            std::env::var("ESH_LOG").ok(),
        )
    }

    fn from_vars(home: Option<String>, log: Option<String>) -> Self {
        let history_path = match &home {
            Some(h) => PathBuf::from(h).join(".esh_history"),
            None => PathBuf::from("/tmp/.esh_history"),
        };
        Self {
            history_path,
            rc_path: home.map(|h| PathBuf::from(h).join(".eshrc")),
            log_filter: log.unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}
