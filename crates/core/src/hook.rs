//! The six PAM service-module hooks this bridge exports, and the fixed
//! per-hook default error code a failed dispatch or a crashed child falls
//! back to.

use std::fmt;

/// One of the six `pam_sm_*` entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Authenticate,
    SetCred,
    AcctMgmt,
    OpenSession,
    CloseSession,
    ChAuthTok,
}

impl Hook {
    /// Parses the C function name the orchestrator was invoked under.
    /// Anything unrecognized has no hook identity at all; the caller falls
    /// back to [`PamCode::Abort`] directly rather than guessing a hook.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "pam_sm_authenticate" => Some(Self::Authenticate),
            "pam_sm_setcred" => Some(Self::SetCred),
            "pam_sm_acct_mgmt" => Some(Self::AcctMgmt),
            "pam_sm_open_session" => Some(Self::OpenSession),
            "pam_sm_close_session" => Some(Self::CloseSession),
            "pam_sm_chauthtok" => Some(Self::ChAuthTok),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "pam_sm_authenticate",
            Self::SetCred => "pam_sm_setcred",
            Self::AcctMgmt => "pam_sm_acct_mgmt",
            Self::OpenSession => "pam_sm_open_session",
            Self::CloseSession => "pam_sm_close_session",
            Self::ChAuthTok => "pam_sm_chauthtok",
        }
    }

    /// The code this hook returns when the dispatcher fails, the child
    /// crashes or exits abnormally, or an interpreter exception escapes
    /// uncaught — unless the module's own `err_return=` argument overrides
    /// it.
    #[must_use]
    pub const fn default_code(self) -> PamCode {
        match self {
            Self::Authenticate | Self::AcctMgmt | Self::ChAuthTok => PamCode::AuthErr,
            Self::SetCred => PamCode::CredErr,
            Self::OpenSession | Self::CloseSession => PamCode::SessionErr,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of `<security/_pam_types.h>` return codes this bridge ever
/// produces or passes through. Values match the real Linux-PAM ABI — the
/// `host` crate's FFI layer and every `#[no_mangle]` hook export returns
/// these as a bare `c_int`, so the discriminants are load-bearing, not
/// cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PamCode {
    Success = 0,
    ServiceErr = 3,
    SystemErr = 4,
    BufErr = 5,
    AuthErr = 7,
    CredErr = 17,
    SessionErr = 14,
    AuthTokErr = 20,
    ConvErr = 22,
    Abort = 26,
}

impl PamCode {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Wraps a raw return code from the child's exit status or an explicit
    /// `err_return=` override. Anything outside the known set collapses to
    /// [`Self::Abort`] rather than being passed through uninterpreted.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Success,
            3 => Self::ServiceErr,
            4 => Self::SystemErr,
            5 => Self::BufErr,
            7 => Self::AuthErr,
            17 => Self::CredErr,
            14 => Self::SessionErr,
            20 => Self::AuthTokErr,
            22 => Self::ConvErr,
            _ => Self::Abort,
        }
    }
}

/// Hook with no recognized label at all falls back to this code directly,
/// matching the original's "unknown function name" branch.
pub const UNKNOWN_HOOK_DEFAULT: PamCode = PamCode::Abort;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_labels_round_trip() {
        for hook in [
            Hook::Authenticate,
            Hook::SetCred,
            Hook::AcctMgmt,
            Hook::OpenSession,
            Hook::CloseSession,
            Hook::ChAuthTok,
        ] {
            assert_eq!(Hook::from_label(hook.as_str()), Some(hook));
        }
    }

    #[test]
    fn unrecognized_label_has_no_hook_identity() {
        assert_eq!(Hook::from_label("pam_sm_bogus"), None);
    }

    #[test]
    fn default_codes_match_the_table() {
        assert_eq!(Hook::Authenticate.default_code(), PamCode::AuthErr);
        assert_eq!(Hook::SetCred.default_code(), PamCode::CredErr);
        assert_eq!(Hook::AcctMgmt.default_code(), PamCode::AuthErr);
        assert_eq!(Hook::OpenSession.default_code(), PamCode::SessionErr);
        assert_eq!(Hook::CloseSession.default_code(), PamCode::SessionErr);
        assert_eq!(Hook::ChAuthTok.default_code(), PamCode::AuthErr);
    }

    #[test]
    fn unknown_raw_code_collapses_to_abort() {
        assert_eq!(PamCode::from_raw(999), PamCode::Abort);
    }
}
