//! Raw Linux-PAM C ABI declarations.
//!
//! There is no crate in this lineage's dependency stack for the PAM ABI, so
//! this module hand-writes the handful of `extern "C"` declarations this
//! bridge actually calls, directly against `security/pam_appl.h` and
//! `security/_pam_types.h`'s public layout — the same kind of small,
//! targeted FFI shim this codebase already writes for other C libraries it
//! binds to, rather than a vendored or invented crate.

use std::os::raw::{c_char, c_int, c_uint, c_void};

/// Opaque; every PAM application and module only ever holds a pointer to
/// one, obtained from and passed back into `libpam`.
#[repr(C)]
pub struct pam_handle_t {
    _private: [u8; 0],
}

pub const PAM_SUCCESS: c_int = 0;
pub const PAM_BUF_ERR: c_int = 5;
pub const PAM_CONV_ERR: c_int = 22;

// Item-type numbering lives once, in `core::item`, since the `policy` crate
// needs `XAUTHDATA` just as much as this module does and the two must never
// drift apart.
pub const PAM_SERVICE: c_int = core::item::SERVICE;
pub const PAM_USER: c_int = core::item::USER;
pub const PAM_USER_PROMPT: c_int = core::item::USER_PROMPT;
pub const PAM_TTY: c_int = core::item::TTY;
pub const PAM_RUSER: c_int = core::item::RUSER;
pub const PAM_RHOST: c_int = core::item::RHOST;
pub const PAM_AUTHTOK: c_int = core::item::AUTHTOK;
pub const PAM_OLDAUTHTOK: c_int = core::item::OLDAUTHTOK;
pub const PAM_CONV: c_int = core::item::CONV;
pub const PAM_FAIL_DELAY: c_int = core::item::FAIL_DELAY;
pub const PAM_XDISPLAY: c_int = core::item::XDISPLAY;
pub const PAM_XAUTHDATA: c_int = core::item::XAUTHDATA;
pub const PAM_AUTHTOK_TYPE: c_int = core::item::AUTHTOK_TYPE;

pub const PAM_PROMPT_ECHO_OFF: c_int = 1;
pub const PAM_PROMPT_ECHO_ON: c_int = 2;
pub const PAM_ERROR_MSG: c_int = 3;
pub const PAM_TEXT_INFO: c_int = 4;

#[repr(C)]
pub struct pam_message {
    pub msg_style: c_int,
    pub msg: *const c_char,
}

#[repr(C)]
pub struct pam_response {
    pub resp: *mut c_char,
    pub resp_retcode: c_int,
}

pub type PamConvCallback = unsafe extern "C" fn(
    num_msg: c_int,
    msg: *mut *const pam_message,
    resp: *mut *mut pam_response,
    appdata_ptr: *mut c_void,
) -> c_int;

#[repr(C)]
pub struct pam_conv {
    pub conv: Option<PamConvCallback>,
    pub appdata_ptr: *mut c_void,
}

#[repr(C)]
pub struct pam_xauth_data {
    pub namelen: c_int,
    pub name: *mut c_char,
    pub datalen: c_int,
    pub data: *mut c_char,
}

unsafe extern "C" {
    pub fn pam_get_item(
        pamh: *const pam_handle_t,
        item_type: c_int,
        item: *mut *const c_void,
    ) -> c_int;

    pub fn pam_set_item(pamh: *mut pam_handle_t, item_type: c_int, item: *const c_void) -> c_int;

    pub fn pam_get_user(
        pamh: *mut pam_handle_t,
        user: *mut *const c_char,
        prompt: *const c_char,
    ) -> c_int;

    pub fn pam_fail_delay(pamh: *mut pam_handle_t, micro_sec: c_uint) -> c_int;

    pub fn pam_strerror(pamh: *mut pam_handle_t, errnum: c_int) -> *const c_char;

    pub fn pam_syslog(pamh: *const pam_handle_t, priority: c_int, fmt: *const c_char, ...);
}
