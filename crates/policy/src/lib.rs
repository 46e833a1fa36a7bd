//! The child side of the bridge: an embedded CPython interpreter plus the
//! RPC client stubs a policy script calls to reach the real PAM handle held
//! by the parent.

pub mod channel;
pub mod interpreter;
pub mod pymodule;

pub use interpreter::{run_child, ChildInvocation};
