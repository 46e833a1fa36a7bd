//! Subscriber setup for this module's own operational diagnostics — fork
//! failures, wire errors, unknown tags, uncaught interpreter exceptions.
//!
//! This is never the sink for a policy script's own output; a script that
//! wants to log writes to the syslog RPC stub in the `policy` crate. This
//! crate only decides where *our* `tracing` events go.

use tracing_subscriber::EnvFilter;

/// Installs a stderr subscriber for the calling process (parent or, after
/// `fork()`, the child — each gets its own independent subscriber since
/// `tracing`'s global dispatcher does not survive across a fork boundary
/// cleanly on its own).
///
/// `debug` mirrors the module's `debug` argv token: when unset, only
/// `warn`-and-above events are emitted, so a correctly configured stack
/// entry stays silent. `RUST_LOG` still overrides this when set, matching
/// the usual `tracing-subscriber` convention.
///
/// Safe to call more than once in the same process; a second call is a
/// no-op rather than a panic, since library code initializing a global
/// subscriber twice is a programmer error we would rather ignore than
/// crash a PAM hook over.
pub fn init(debug: bool) {
    let default_directive = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_when_called_repeatedly() {
        init(true);
        init(false);
    }
}
