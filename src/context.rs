//! Per-publish context and cooperative cancellation.

use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A cloneable cancellation flag that can be waited on.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the token and wakes every waiter. Idempotent.
    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks for up to `timeout`, returning early if the token is cancelled.
    ///
    /// Returns true if the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cancelled = cvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

/// Context passed along with a published message.
///
/// Carries a cancellation token and string-keyed values. Publishers may
/// consult it; the in-process emitter ignores it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancelToken,
    values: BTreeMap<String, String>,
}

impl Context {
    /// A context that is never cancelled and carries no values.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context tied to an existing token.
    #[must_use]
    pub fn with_cancel(cancel: CancelToken) -> Self {
        Self {
            cancel,
            values: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    #[must_use]
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out_without_cancel() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(10));
        token.cancel();
        assert!(handle.join().unwrap());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_context_values() {
        let ctx = Context::background().with_value("height", "7");
        assert_eq!(ctx.value("height"), Some("7"));
        assert_eq!(ctx.value("missing"), None);
        assert!(!ctx.is_cancelled());

        let token = CancelToken::new();
        let ctx = Context::with_cancel(token.clone());
        token.cancel();
        assert!(ctx.is_cancelled());
        assert!(ctx.cancel_token().is_cancelled());
    }
}
