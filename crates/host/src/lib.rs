//! The parent side of the bridge: the raw PAM FFI surface, a safe facade
//! over `pam_handle_t`, and the per-tag request dispatcher that runs over
//! it.

pub mod dispatcher;
pub mod handle;
pub mod pam_ffi;

pub use dispatcher::run as run_dispatcher;
pub use handle::{MockPamHandle, PamHandleOps, RealPamHandle};
