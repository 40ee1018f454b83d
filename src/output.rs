//! Human output switch
//!
//! Set once per process, either from `MOLT_QUIET` or by the CLI when stdout
//! carries machine-readable output.

use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

fn quiet_from_env() -> bool {
    std::env::var("MOLT_QUIET")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Silence the UI helpers; has no effect once output has started
pub fn set_quiet(quiet: bool) {
    let _ = QUIET.set(quiet || quiet_from_env());
}

pub fn is_quiet() -> bool {
    *QUIET.get_or_init(quiet_from_env)
}
