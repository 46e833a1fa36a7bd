//! The child's half of the pipe pair, installed once before the policy
//! module is imported so every `#[pyfunction]` stub in [`crate::pymodule`]
//! can reach it without threading a handle through Python call signatures.
//!
//! One child process only ever runs one hook invocation under one GIL, so a
//! single process-wide slot (rather than anything per-thread) is the right
//! shape here — this mirrors the original's own single global `ipc_pipe`
//! the child side reached for throughout `entrypoint.c`.

use std::sync::OnceLock;

use wire::PipeEnd;

pub struct Channel {
    pub to_parent: PipeEnd,
    pub from_parent: PipeEnd,
}

static CHANNEL: OnceLock<std::sync::Mutex<Channel>> = OnceLock::new();

/// Installs the channel. Must run exactly once, before any RPC stub is
/// called — the orchestrator does this immediately after `fork()`, before
/// the interpreter is even initialized.
pub fn install(to_parent: PipeEnd, from_parent: PipeEnd) {
    let channel = Channel {
        to_parent,
        from_parent,
    };
    CHANNEL
        .set(std::sync::Mutex::new(channel))
        .unwrap_or_else(|_| panic!("policy channel installed twice in one process"));
}

/// Runs `f` with exclusive access to the installed channel.
///
/// # Panics
///
/// Panics if [`install`] has not yet run — every RPC stub is only reachable
/// from Python after the policy module import, which happens after
/// installation, so this is a programming-error guard, not a runtime
/// condition a policy script can trigger.
pub fn with_channel<T>(f: impl FnOnce(&mut Channel) -> T) -> T {
    let mutex = CHANNEL.get().expect("policy channel not installed");
    let mut guard = mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    f(&mut guard)
}
