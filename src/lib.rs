//! PAM service module entry points.
//!
//! Each `pam_sm_*` export here is the C ABI `libpam` calls directly; all six
//! do the same thing — fork a child to run the configured Python policy
//! module and relay that child's RPC traffic against the real PAM handle —
//! differing only in which [`core::Hook`] they pass to the orchestrator.

mod config;
mod orchestrator;

use std::ffi::{c_char, c_int};
use std::panic::{self, AssertUnwindSafe};

use core::{Hook, PamCode};
use host::pam_ffi::pam_handle_t;

/// Runs `orchestrator::dispatch` behind a `catch_unwind` so a panic at the
/// Python FFI boundary degrades to the hook's default error code instead of
/// unwinding into `libpam`, which is not a Rust panic-safe caller.
unsafe fn guarded_dispatch(
    hook: Hook,
    pamh: *mut pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        orchestrator::dispatch(hook, pamh, flags, argc, argv)
    }));
    match result {
        Ok(code) => code,
        Err(_) => {
            tracing::error!(%hook, "panic unwound to the pam_sm_* boundary");
            hook.default_code() as c_int
        }
    }
}

/// # Safety
/// Must only be called by `libpam` with a live handle and argv satisfying
/// its own C ABI contract for service module hooks.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_authenticate(
    pamh: *mut pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    guarded_dispatch(Hook::Authenticate, pamh, flags, argc, argv)
}

/// # Safety
/// Must only be called by `libpam` with a live handle and argv satisfying
/// its own C ABI contract for service module hooks.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_setcred(
    pamh: *mut pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    guarded_dispatch(Hook::SetCred, pamh, flags, argc, argv)
}

/// # Safety
/// Must only be called by `libpam` with a live handle and argv satisfying
/// its own C ABI contract for service module hooks.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_acct_mgmt(
    pamh: *mut pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    guarded_dispatch(Hook::AcctMgmt, pamh, flags, argc, argv)
}

/// # Safety
/// Must only be called by `libpam` with a live handle and argv satisfying
/// its own C ABI contract for service module hooks.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_open_session(
    pamh: *mut pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    guarded_dispatch(Hook::OpenSession, pamh, flags, argc, argv)
}

/// # Safety
/// Must only be called by `libpam` with a live handle and argv satisfying
/// its own C ABI contract for service module hooks.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_close_session(
    pamh: *mut pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    guarded_dispatch(Hook::CloseSession, pamh, flags, argc, argv)
}

/// # Safety
/// Must only be called by `libpam` with a live handle and argv satisfying
/// its own C ABI contract for service module hooks.
#[no_mangle]
pub unsafe extern "C" fn pam_sm_chauthtok(
    pamh: *mut pam_handle_t,
    flags: c_int,
    argc: c_int,
    argv: *const *const c_char,
) -> c_int {
    guarded_dispatch(Hook::ChAuthTok, pamh, flags, argc, argv)
}
