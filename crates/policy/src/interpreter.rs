//! The child-side interpreter host: initializes CPython with the built-in
//! module already registered, imports the configured policy module, invokes
//! the hook function, and maps whatever comes back to a process exit code.

use pyo3::prelude::*;
use pyo3::types::PyList;

use core::{Hook, InterpreterException};
use wire::PipeEnd;

use crate::channel;
use crate::pymodule::pam_bridge_module;

/// Everything the orchestrator already knows and the interpreter host
/// needs: which hook is running, the flags PAM passed in, the module's own
/// stack-file arguments, and which dotted module name holds the policy.
pub struct ChildInvocation {
    pub hook: Hook,
    pub flags: i32,
    pub argv: Vec<String>,
    pub policy_module: String,
}

/// Runs one hook invocation to completion in the current (already forked)
/// process and returns the process exit code.
///
/// Ordering, matching §4.4: register the built-in module, initialize (or
/// reinitialize) the interpreter, acquire the GIL, import the built-in
/// module, import the policy module, invoke the hook function, coerce its
/// return value, release the GIL, finalize, and report the resulting code
/// to the caller for `std::process::exit`.
///
/// A policy's own integer return is passed through unchanged (clamped to a
/// valid exit status), not normalized through the small [`PamCode`] table —
/// codes such as `PAM_NEW_AUTHTOK_REQD`(12) or `PAM_USER_UNKNOWN`(10) are
/// routine returns for `acct_mgmt`/`chauthtok` policies and must reach the
/// host unaltered, per §4.4 step 7's "an integer is used directly".
pub fn run_child(
    invocation: ChildInvocation,
    to_parent: PipeEnd,
    from_parent: PipeEnd,
) -> i32 {
    channel::install(to_parent, from_parent);

    // SAFETY: this process was just forked for exactly this invocation and
    // holds no other threads; nothing else touches the interpreter state
    // concurrently with the calls below.
    unsafe {
        pyo3::append_to_inittab!(pam_bridge_module);

        if pyo3::ffi::Py_IsInitialized() != 0 {
            // Only reachable if some earlier step in this same process
            // already initialized CPython; finalize first so the inittab
            // registration above is honored on a clean restart rather than
            // being silently ignored by an interpreter that is already up.
            pyo3::ffi::Py_FinalizeEx();
        }
        pyo3::ffi::Py_Initialize();
    }

    let outcome = Python::with_gil(|py| invoke(py, &invocation));

    unsafe {
        pyo3::ffi::Py_FinalizeEx();
    }

    match outcome {
        Ok(code) => code.clamp(0, 255),
        Err(exception) => {
            tracing::warn!(hook = %invocation.hook, %exception, "policy module raised");
            channel::with_channel(|ch| {
                let _ = wire::Request::SysLog {
                    priority: libc::LOG_ERR,
                    message: format!(
                        "pam-script-bridge: {} raised {}",
                        invocation.hook, exception
                    )
                    .into_bytes(),
                }
                .write(&mut ch.to_parent);
            });
            invocation.hook.default_code() as i32
        }
    }
}

fn invoke(py: Python<'_>, invocation: &ChildInvocation) -> Result<i32, InterpreterException> {
    // The built-in module is already in CPython's inittab; importing it
    // here is what actually constructs it the first time.
    py.import_bound("pam").map_err(|err| to_exception(py, &err))?;

    let module = py
        .import_bound(invocation.policy_module.as_str())
        .map_err(|err| to_exception(py, &err))?;

    let function = module
        .getattr(invocation.hook.as_str())
        .map_err(|err| to_exception(py, &err))?;

    let argv = PyList::new_bound(py, invocation.argv.iter());
    let result = function
        .call1((invocation.flags, argv))
        .map_err(|err| to_exception(py, &err))?;

    result
        .extract::<i32>()
        .map_err(|err| to_exception(py, &err))
}

fn to_exception(py: Python<'_>, err: &PyErr) -> InterpreterException {
    InterpreterException {
        exception_type: err.get_type_bound(py).name().map_or_else(
            |_| "<unknown>".to_string(),
            |name| name.to_string(),
        ),
        message: err.value_bound(py).to_string(),
    }
}
