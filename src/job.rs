//! フォアグラウンド待機とターミナル制御。
//!
//! ジョブテーブルは持たない。フォアグラウンドのパイプラインを起動したら
//! [`reap_all`] で子プロセスが 1 つも残らなくなるまで `waitpid(-1)` を繰り返し、
//! 最後に回収した子の終了ステータスを返す。回収順は OS 次第なので、
//! 複数ステージのパイプラインでは最終ステージのステータスになるとは限らない。
//! 以前のバックグラウンド実行で残った子もここで一緒に回収される。

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::signal;

/// 終了した子の `WaitStatus` を終了コードに変換する。
/// 通常終了 → コード、シグナル終了 → 128 + シグナル番号。それ以外は `None`。
pub fn exit_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
        _ => None,
    }
}

/// 子プロセスがなくなるまで回収し、最後に回収した子の終了コードを返す（なければ 0）。
///
/// `waitpid` がシグナルで中断されたら、保留中のシグナルを `foreground` に転送して待機を続ける。
pub fn reap_all(foreground: Option<Pid>) -> i32 {
    let mut last = 0;
    loop {
        match waitpid(None, None) {
            Ok(status) => {
                if let Some(code) = exit_code(status) {
                    tracing::debug!(pid = ?status.pid(), code, "reaped");
                    last = code;
                }
            }
            Err(Errno::EINTR) => signal::forward_pending(foreground),
            Err(Errno::ECHILD) => break,
            Err(e) => {
                tracing::warn!(error = %e, "waitpid failed");
                break;
            }
        }
    }
    last
}

// ── ターミナル制御 ───────────────────────────────────────────────────

/// 端末のフォアグラウンドプロセスグループを `pgid` にする。
///
/// シェルは SIGTTOU を無視しているため、シェルがバックグラウンドになった後に
/// [`take_terminal_back`] で呼んでも停止しない。
pub fn give_terminal_to(pgid: Pid) {
    // SAFETY: fd と pgid を渡すだけのシステムコール
    let rc = unsafe { libc::tcsetpgrp(libc::STDIN_FILENO, pgid.as_raw()) };
    if rc != 0 {
        tracing::warn!(%pgid, error = %Errno::last(), "tcsetpgrp failed");
    }
}

/// 端末のフォアグラウンドプロセスグループをシェルに戻す。
pub fn take_terminal_back(shell_pgid: Pid) {
    give_terminal_to(shell_pgid);
}
