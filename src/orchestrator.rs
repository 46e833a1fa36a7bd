//! Fork-per-hook orchestration shared by all six `pam_sm_*` exports: parse
//! arguments, create the pipe pair, fork, and run the matching half of the
//! protocol in each process.

use std::ffi::{c_char, c_int, CStr};

use nix::sys::signal::{self, SigSet, Signal};
use nix::sys::wait::{self, WaitStatus};
use nix::unistd::{self, ForkResult};

use core::{Hook, PamCode};
use host::{PamHandleOps, RealPamHandle};
use wire::anonymous_pipe;

use crate::config::ModuleConfig;

/// Reads a PAM hook's raw `(argc, argv)` into owned `String`s, lossily for
/// anything that is not valid UTF-8 — stack-file arguments are operator
/// controlled text, not untrusted binary input.
///
/// # Safety
///
/// `argv` must point to `argc` valid, non-null, NUL-terminated C strings,
/// exactly as `libpam` passes them into a service module hook.
unsafe fn collect_argv(argc: c_int, argv: *const *const c_char) -> Vec<String> {
    if argc <= 0 || argv.is_null() {
        return Vec::new();
    }
    (0..argc as isize)
        .map(|i| {
            let ptr = *argv.offset(i);
            if ptr.is_null() {
                String::new()
            } else {
                CStr::from_ptr(ptr).to_string_lossy().into_owned()
            }
        })
        .collect()
}

/// Runs one hook end to end: parses arguments, installs this process's own
/// logging, forks a child to run the policy module, and relays the
/// dispatcher loop in this (parent) process until the child's side of the
/// protocol finishes.
///
/// # Safety
///
/// `pamh` must be the live handle `libpam` passed into the currently
/// running hook; `argv` must satisfy [`collect_argv`]'s precondition.
pub unsafe fn dispatch(
    hook: Hook,
    pamh: *mut host::pam_ffi::pam_handle_t,
    _flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    let raw_argv = collect_argv(argc, argv);
    let config = ModuleConfig::parse(&raw_argv);
    logging::init(config.debug);

    let Some(policy_module) = config.module.clone() else {
        tracing::error!(%hook, "no policy module configured (missing module=... argument)");
        return config
            .err_return
            .unwrap_or_else(|| hook.default_code()) as c_int;
    };

    // SAFETY: `pamh` is the live handle for this hook invocation, as
    // required by this function's own safety contract. Installing the
    // default conversation callback here, before the fork, is a parent-only
    // operation on the real handle — nothing in the child ever touches it.
    let mut handle = unsafe { RealPamHandle::from_raw(pamh) };
    let conv_retval = handle.install_default_conversation();
    if !PamCode::from_raw(conv_retval).is_success() {
        tracing::warn!(%hook, conv_retval, "failed to install the default conversation callback");
    }

    let (child_to_parent_read, child_to_parent_write) = match anonymous_pipe() {
        Ok(pair) => pair,
        Err(errno) => {
            tracing::error!(%hook, errno, "failed to create child-to-parent pipe");
            return config
                .err_return
                .unwrap_or_else(|| hook.default_code()) as c_int;
        }
    };
    let (parent_to_child_read, parent_to_child_write) = match anonymous_pipe() {
        Ok(pair) => pair,
        Err(errno) => {
            tracing::error!(%hook, errno, "failed to create parent-to-child pipe");
            return config
                .err_return
                .unwrap_or_else(|| hook.default_code()) as c_int;
        }
    };

    // Mask SIGCHLD for the duration of the fork + blocking waitpid below so
    // nothing else in this (possibly multi-threaded) host process can reap
    // this exact child out from under us first.
    let mut chld_only = SigSet::empty();
    chld_only.add(Signal::SIGCHLD);
    let old_mask = match signal::sigprocmask(signal::SigmaskHow::SIG_BLOCK, Some(&chld_only), None)
    {
        Ok(()) => {
            let mut previous = SigSet::empty();
            let _ = signal::sigprocmask(signal::SigmaskHow::SIG_BLOCK, None, Some(&mut previous));
            Some(previous)
        }
        Err(_) => None,
    };

    let code = match unsafe { unistd::fork() } {
        Ok(ForkResult::Child) => {
            drop(child_to_parent_read);
            drop(parent_to_child_write);
            let invocation = policy::ChildInvocation {
                hook,
                flags: _flags,
                argv: config.argv,
                policy_module,
            };
            let code = policy::run_child(invocation, child_to_parent_write, parent_to_child_read);
            std::process::exit(code);
        }
        Ok(ForkResult::Parent { child }) => {
            drop(child_to_parent_write);
            drop(parent_to_child_read);

            let mut from_child = child_to_parent_read;
            let mut to_child = parent_to_child_write;
            let dispatcher_code = host::run_dispatcher(
                hook,
                &mut handle,
                &mut from_child,
                &mut to_child,
                config.err_return,
            );
            drop(from_child);
            drop(to_child);

            // The child's own exit status is already a valid [0,255] code by
            // construction (`policy::run_child` clamps it before exiting);
            // re-clamping here only guards against a `waitpid` oddity, not a
            // real range violation.
            let child_code = match wait::waitpid(child, None) {
                Ok(WaitStatus::Exited(_, status)) => Some(status.clamp(0, 255)),
                _ => None,
            };

            map_result(hook, dispatcher_code, child_code, config.err_return)
        }
        Err(errno) => {
            tracing::error!(%hook, %errno, "fork failed");
            config
                .err_return
                .map_or_else(|| hook.default_code() as i32, |code| code as i32)
        }
    };

    if let Some(previous) = old_mask {
        let _ = signal::sigprocmask(signal::SigmaskHow::SIG_SETMASK, Some(&previous), None);
    }

    code as c_int
}

/// The return-code mapping rule: a dispatcher failure always wins over
/// whatever the child did; only a clean dispatcher exchange lets the
/// child's own exit status (or, failing that, the hook default) through.
///
/// `child_code` is the policy's own integer return, taken unchanged rather
/// than renormalized through the [`PamCode`] table — see
/// `policy::run_child`'s doc comment.
fn map_result(
    hook: Hook,
    dispatcher_code: PamCode,
    child_code: Option<i32>,
    err_return_override: Option<PamCode>,
) -> i32 {
    if !dispatcher_code.is_success() {
        return err_return_override.map_or(dispatcher_code as i32, |code| code as i32);
    }
    match child_code {
        Some(code) => code,
        None => err_return_override.map_or_else(|| hook.default_code() as i32, |code| code as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_failure_wins_over_a_successful_child_exit() {
        let code = map_result(
            Hook::Authenticate,
            PamCode::BufErr,
            Some(PamCode::Success as i32),
            None,
        );
        assert_eq!(code, PamCode::BufErr as i32);
    }

    #[test]
    fn successful_dispatch_passes_through_the_childs_own_code() {
        let code = map_result(
            Hook::Authenticate,
            PamCode::Success,
            Some(PamCode::AuthErr as i32),
            None,
        );
        assert_eq!(code, PamCode::AuthErr as i32);
    }

    #[test]
    fn abnormal_child_exit_falls_back_to_the_hook_default() {
        let code = map_result(Hook::OpenSession, PamCode::Success, None, None);
        assert_eq!(code, PamCode::SessionErr as i32);
    }

    #[test]
    fn err_return_override_wins_on_a_dispatcher_failure() {
        let code = map_result(
            Hook::Authenticate,
            PamCode::BufErr,
            None,
            Some(PamCode::Success),
        );
        assert_eq!(code, PamCode::Success as i32);
    }

    /// A policy returning a code outside the small `PamCode` table — e.g.
    /// `PAM_NEW_AUTHTOK_REQD`(12), routine for `chauthtok`/`acct_mgmt` — must
    /// reach the hook's caller unchanged rather than collapsing to `Abort`.
    #[test]
    fn child_code_outside_the_known_table_passes_through_unchanged() {
        let code = map_result(Hook::AcctMgmt, PamCode::Success, Some(12), None);
        assert_eq!(code, 12);
    }
}
