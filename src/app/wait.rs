//! Bounded polling with an absolute deadline.
//!
//! A [`Wait`] repeatedly evaluates a condition until it yields a value, an
//! error the caller did not mark as ignorable, or the deadline passes.

use std::fmt;
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum WaitError<E> {
    Timeout { message: String, last_error: Option<E> },
    Aborted(E),
}

impl<E: fmt::Display> fmt::Display for WaitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::Timeout {
                message,
                last_error: Some(err),
            } => write!(f, "{message} (last error: {err})"),
            WaitError::Timeout { message, .. } => write!(f, "{message}"),
            WaitError::Aborted(err) => write!(f, "{err}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for WaitError<E> {}

fn never_ignore<E>(_: &E) -> bool {
    false
}

pub struct Wait<E> {
    timeout: Duration,
    poll_interval: Duration,
    ignored: Box<dyn Fn(&E) -> bool>,
}

impl<E: 'static> Wait<E> {
    /// Errors abort the wait unless [`Wait::ignoring`] says otherwise.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            ignored: Box::new(never_ignore::<E>),
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        // A zero interval would spin; fall back to the default.
        self.poll_interval = if interval.is_zero() {
            DEFAULT_POLL_INTERVAL
        } else {
            interval
        };
        self
    }

    pub fn ignoring(mut self, predicate: impl Fn(&E) -> bool + 'static) -> Self {
        self.ignored = Box::new(predicate);
        self
    }

    /// Polls `condition` until it returns `Ok(Some(value))`.
    pub fn until<T>(
        &self,
        message: &str,
        mut condition: impl FnMut() -> Result<Option<T>, E>,
    ) -> Result<T, WaitError<E>> {
        let deadline = Instant::now() + self.timeout;
        let mut last_error = None;
        loop {
            match condition() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) if (self.ignored)(&err) => last_error = Some(err),
                Err(err) => return Err(WaitError::Aborted(err)),
            }
            if Instant::now() >= deadline {
                return Err(WaitError::Timeout {
                    message: message.to_string(),
                    last_error,
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            std::thread::sleep(self.poll_interval.min(remaining));
        }
    }

    /// Polls `condition` until it returns `Ok(false)`. An ignored error counts
    /// as the condition having cleared.
    pub fn until_not(
        &self,
        message: &str,
        mut condition: impl FnMut() -> Result<bool, E>,
    ) -> Result<(), WaitError<E>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match condition() {
                Ok(false) => return Ok(()),
                Ok(true) => {}
                Err(err) if (self.ignored)(&err) => return Ok(()),
                Err(err) => return Err(WaitError::Aborted(err)),
            }
            if Instant::now() >= deadline {
                return Err(WaitError::Timeout {
                    message: message.to_string(),
                    last_error: None,
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            std::thread::sleep(self.poll_interval.min(remaining));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn until_returns_first_ready_value() {
        let mut calls = 0;
        let wait: Wait<String> = Wait::new(Duration::from_secs(1)).poll_interval(Duration::from_millis(1));
        let value = wait
            .until("never ready", || {
                calls += 1;
                Ok(if calls == 3 { Some(calls) } else { None })
            })
            .expect("ready");
        assert_eq!(value, 3);
    }

    #[test]
    fn until_times_out_with_message() {
        let wait: Wait<String> = Wait::new(Duration::from_millis(20)).poll_interval(Duration::from_millis(5));
        let err = wait
            .until("element never appeared", || Ok::<Option<()>, String>(None))
            .expect_err("timeout");
        match err {
            WaitError::Timeout { message, last_error } => {
                assert_eq!(message, "element never appeared");
                assert!(last_error.is_none());
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn ignored_errors_keep_waiting_and_are_reported() {
        let wait = Wait::new(Duration::from_millis(20))
            .poll_interval(Duration::from_millis(5))
            .ignoring(|err: &String| err.starts_with("no such element"));
        let err = wait
            .until("element never appeared", || Err::<Option<()>, _>("no such element: #list".to_string()))
            .expect_err("timeout");
        assert_eq!(
            err.to_string(),
            "element never appeared (last error: no such element: #list)"
        );
    }

    #[test]
    fn other_errors_abort_immediately() {
        let mut calls = 0;
        let wait = Wait::new(Duration::from_secs(5))
            .poll_interval(Duration::from_millis(1))
            .ignoring(|err: &String| err.starts_with("no such element"));
        let err = wait
            .until("unreachable", || {
                calls += 1;
                Err::<Option<()>, _>("connection reset".to_string())
            })
            .expect_err("aborted");
        assert!(matches!(err, WaitError::Aborted(ref msg) if msg == "connection reset"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn until_not_treats_ignored_error_as_cleared() {
        let wait = Wait::new(Duration::from_secs(1))
            .poll_interval(Duration::from_millis(1))
            .ignoring(|_: &String| true);
        assert!(wait.until_not("still visible", || Err("gone".to_string())).is_ok());
    }

    #[test]
    fn zero_poll_interval_falls_back_to_default() {
        let wait: Wait<String> = Wait::new(Duration::from_secs(1)).poll_interval(Duration::ZERO);
        assert_eq!(wait.poll_interval, DEFAULT_POLL_INTERVAL);
    }
}
