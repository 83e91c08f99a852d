use std::fmt::Display;

use tracing::warn;

/// Runs a cleanup step whose failure must never reach the caller. The error is
/// logged and dropped; the return value only reports whether it succeeded.
pub fn best_effort<E: Display>(
    what: &str,
    trace_id: &str,
    step: impl FnOnce() -> Result<(), E>,
) -> bool {
    match step() {
        Ok(()) => true,
        Err(err) => {
            warn!(trace_id = %trace_id, cleanup = what, error = %err, "cleanup failed, ignoring");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swallows_failures() {
        let ran = best_effort("kill all apps", "trace-1", || Err::<(), _>("device offline"));
        assert!(!ran);
    }

    #[test]
    fn reports_success() {
        assert!(best_effort("kill all apps", "trace-1", || Ok::<(), String>(())));
    }
}
