//! シグナル処理。
//!
//! シグナルハンドラは [`AtomicBool`] のフラグを立てるだけ（async-signal-safe）。
//! フォアグラウンド待機中の `waitpid` は `SA_RESTART` なしのため `EINTR` で戻り、
//! [`job::reap_all`](crate::job::reap_all) が [`forward_pending`] を呼んで
//! 追跡中の子プロセスへ同じシグナルを転送する。
//!
//! | シグナル | シェル | 子プロセス |
//! |---------|--------|-----------|
//! | SIGINT / SIGWINCH | フラグを立てて転送 | SIG_DFL |
//! | SIGTSTP / SIGTTOU / SIGTTIN | 対話モードのみ無視 | SIG_DFL |
//! | SIGPIPE | 無視（Rust ランタイムの既定） | SIG_DFL |

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd::Pid;

static PENDING_INT: AtomicBool = AtomicBool::new(false);
static PENDING_WINCH: AtomicBool = AtomicBool::new(false);

extern "C" fn handle(sig: libc::c_int) {
    if sig == libc::SIGINT {
        PENDING_INT.store(true, Ordering::SeqCst);
    } else if sig == libc::SIGWINCH {
        PENDING_WINCH.store(true, Ordering::SeqCst);
    }
}

/// シェル本体のシグナル設定を行う。`interactive` ならジョブ制御シグナルも無視する。
pub fn install(interactive: bool) -> nix::Result<()> {
    let action = SigAction::new(SigHandler::Handler(handle), SaFlags::empty(), SigSet::empty());
    // SAFETY: ハンドラはアトミック変数への store のみ
    unsafe {
        signal::sigaction(Signal::SIGINT, &action)?;
        signal::sigaction(Signal::SIGWINCH, &action)?;
    }

    if interactive {
        let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        unsafe {
            signal::sigaction(Signal::SIGTSTP, &ignore)?;
            signal::sigaction(Signal::SIGTTOU, &ignore)?;
            signal::sigaction(Signal::SIGTTIN, &ignore)?;
        }
    }
    Ok(())
}

/// fork 直後の子プロセスでシグナル処置をデフォルトに戻す。
///
/// 無視設定は exec 後も引き継がれる。SIGPIPE はランタイムが無視にしているので、
/// ここで戻さないとパイプラインの上流が書き込み失敗で止まらない。
pub fn reset_child_defaults() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for sig in [
        Signal::SIGINT,
        Signal::SIGWINCH,
        Signal::SIGTSTP,
        Signal::SIGTTOU,
        Signal::SIGTTIN,
        Signal::SIGPIPE,
    ] {
        // SAFETY: SIG_DFL への変更のみ
        let _ = unsafe { signal::sigaction(sig, &default) };
    }
}

/// 保留中のフラグを捨てる。フォアグラウンド待機の開始前に呼ぶ。
pub fn clear_pending() {
    PENDING_INT.store(false, Ordering::SeqCst);
    PENDING_WINCH.store(false, Ordering::SeqCst);
}

/// 保留中のシグナルを取り出す（取り出したフラグは下ろす）。
pub fn take_pending() -> Vec<Signal> {
    let mut pending = Vec::new();
    if PENDING_INT.swap(false, Ordering::SeqCst) {
        pending.push(Signal::SIGINT);
    }
    if PENDING_WINCH.swap(false, Ordering::SeqCst) {
        pending.push(Signal::SIGWINCH);
    }
    pending
}

/// 保留中のシグナルを `child` に転送する。追跡中の子がなければ捨てるだけ。
pub fn forward_pending(child: Option<Pid>) {
    for sig in take_pending() {
        let Some(pid) = child else {
            continue;
        };
        match signal::kill(pid, sig) {
            Ok(()) => tracing::debug!(%pid, ?sig, "forwarded signal"),
            Err(e) => tracing::debug!(%pid, ?sig, error = %e, "signal forward failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn handler_sets_flags() {
        clear_pending();
        handle(libc::SIGINT);
        handle(libc::SIGWINCH);
        assert_eq!(take_pending(), vec![Signal::SIGINT, Signal::SIGWINCH]);
        assert!(take_pending().is_empty());
    }

    #[test]
    #[serial]
    fn clear_discards_pending() {
        handle(libc::SIGINT);
        clear_pending();
        assert!(take_pending().is_empty());
    }

    #[test]
    #[serial]
    fn forward_without_child_drops_signal() {
        handle(libc::SIGINT);
        forward_pending(None);
        assert!(take_pending().is_empty());
    }
}
