use std::fmt;

/// Outcome of a single framed read or write on the parent/child pipe pair.
///
/// Distinct from a host return code: a [`WireStatus`] never leaves the
/// dispatcher or a stub without first being collapsed into a hook default
/// error (on the parent side) or an exit status (on the child side). Only
/// [`WireStatus::Success`] permits the caller to continue the request loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum WireStatus {
    Success = 0,
    ReadEof = 1,
    ReadErr = 2,
    WriteErr = 3,
    MallocErr = 4,
}

impl WireStatus {
    /// `true` only when no error occurred and the peer has not closed the pipe.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// `true` when the peer closed the pipe before any bytes of a new request
    /// arrived. Distinguishes clean shutdown from a mid-frame failure.
    #[must_use]
    pub const fn is_clean_eof(self) -> bool {
        matches!(self, Self::ReadEof)
    }
}

impl fmt::Display for WireStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::ReadEof => "peer closed the pipe",
            Self::ReadErr => "read error on pipe",
            Self::WriteErr => "write error on pipe",
            Self::MallocErr => "allocation failure while framing a message",
        };
        f.write_str(text)
    }
}

impl std::error::Error for WireStatus {}
