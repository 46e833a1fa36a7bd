//! The internal diagnostic record that unifies the three disjoint error
//! spaces this bridge operates in — it never crosses the wire itself; it
//! exists so one `tracing` event and one `Display` line can describe a
//! failure regardless of which of the three spaces produced it.

use std::fmt;

use wire::WireStatus;

use crate::hook::{Hook, PamCode};

/// An interpreter-side exception, reduced to the pieces worth logging.
/// Python tracebacks are not reproduced here — the child logs the full
/// traceback to its own sink before this record is built.
#[derive(Debug, Clone)]
pub struct InterpreterException {
    pub exception_type: String,
    pub message: String,
}

impl fmt::Display for InterpreterException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exception_type, self.message)
    }
}

/// One coherent description of "why this hook invocation did not succeed",
/// collapsing wire failures, host return codes, and interpreter exceptions
/// into a single type for instrumentation.
#[derive(Debug, thiserror::Error)]
pub enum Diagnostic {
    #[error("pipe protocol failure for {hook}: {status}")]
    Wire { hook: Hook, status: WireStatus },

    #[error("{hook} returned {code:?}")]
    HostReturn { hook: Hook, code: PamCode },

    #[error("{hook} raised an uncaught exception: {exception}")]
    Interpreter {
        hook: Hook,
        exception: InterpreterException,
    },

    #[error("child for {hook} exited abnormally (signal or non-numeric status)")]
    ChildAbnormalExit { hook: Hook },

    #[error("failed to fork a child process for {hook}: {source}")]
    ForkFailed {
        hook: Hook,
        #[source]
        source: std::io::Error,
    },
}

impl Diagnostic {
    #[must_use]
    pub const fn hook(&self) -> Hook {
        match self {
            Self::Wire { hook, .. }
            | Self::HostReturn { hook, .. }
            | Self::Interpreter { hook, .. }
            | Self::ChildAbnormalExit { hook }
            | Self::ForkFailed { hook, .. } => *hook,
        }
    }

    /// Collapses this diagnostic to the return code the hook should report
    /// to its caller, honoring an explicit `err_return=` override ahead of
    /// the hook's own table default.
    #[must_use]
    pub fn into_pam_code(self, err_return_override: Option<PamCode>) -> PamCode {
        if let Some(code) = err_return_override {
            return code;
        }
        match self {
            Self::HostReturn { code, .. } => code,
            other => other.hook().default_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_return_diagnostic_keeps_its_own_code_without_override() {
        let diag = Diagnostic::HostReturn {
            hook: Hook::Authenticate,
            code: PamCode::BufErr,
        };
        assert_eq!(diag.into_pam_code(None), PamCode::BufErr);
    }

    #[test]
    fn wire_failure_falls_back_to_the_hook_default() {
        let diag = Diagnostic::Wire {
            hook: Hook::OpenSession,
            status: WireStatus::ReadErr,
        };
        assert_eq!(diag.into_pam_code(None), PamCode::SessionErr);
    }

    #[test]
    fn explicit_override_wins_over_everything() {
        let diag = Diagnostic::ChildAbnormalExit {
            hook: Hook::SetCred,
        };
        assert_eq!(
            diag.into_pam_code(Some(PamCode::Success)),
            PamCode::Success
        );
    }
}
