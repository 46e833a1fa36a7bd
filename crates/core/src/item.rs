//! The `PAM_*` item-type constants from `security/_pam_types.h`, shared by
//! both sides of the bridge: the `host` crate needs them to call the real
//! `pam_get_item`/`pam_set_item`, and the `policy` crate needs
//! [`XAUTHDATA`] specifically to know which wire shape a `GET_ITEM`/
//! `SET_ITEM` call takes before the host crate is even in the picture.

pub const SERVICE: i32 = 1;
pub const USER: i32 = 2;
pub const USER_PROMPT: i32 = 3;
pub const TTY: i32 = 4;
pub const RUSER: i32 = 5;
pub const RHOST: i32 = 6;
pub const AUTHTOK: i32 = 7;
pub const OLDAUTHTOK: i32 = 8;
pub const CONV: i32 = 9;
pub const FAIL_DELAY: i32 = 10;
pub const XDISPLAY: i32 = 11;
pub const XAUTHDATA: i32 = 12;
pub const AUTHTOK_TYPE: i32 = 13;

#[must_use]
pub const fn is_xauthdata(item_type: i32) -> bool {
    item_type == XAUTHDATA
}
