use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Interrupter = Box<dyn Fn() + Send>;

/// Shared cancellation flag for one job. Once set it stays set.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    interrupter: Mutex<Option<Interrupter>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let guard = self.inner.interrupter.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(interrupt) = guard.as_ref() {
            interrupt();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fires immediately when the token is already cancelled.
    pub fn set_interrupter<F>(&self, interrupt: F)
    where
        F: Fn() + Send + 'static,
    {
        {
            let mut guard = self.inner.interrupter.lock().unwrap_or_else(|e| e.into_inner());
            *guard = Some(Box::new(interrupt));
        }
        if self.is_cancelled() {
            let guard = self.inner.interrupter.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(interrupt) = guard.as_ref() {
                interrupt();
            }
        }
    }

    pub fn is_interruptible(&self) -> bool {
        self.inner.interrupter.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    pub fn clear_interrupter(&self) {
        let mut guard = self.inner.interrupter.lock().unwrap_or_else(|e| e.into_inner());
        guard.take();
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("interruptible", &self.is_interruptible())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cancel_is_monotonic_and_idempotent() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(token.is_cancelled());
        assert!(token.clone().is_cancelled());
    }

    #[test]
    fn interrupter_fires_once_per_cancel() {
        let token = CancelToken::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        token.set_interrupter(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        token.cancel();
        token.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_registration_fires_immediately() {
        let token = CancelToken::new();
        token.cancel();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        token.set_interrupter(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleared_interrupter_is_not_called() {
        let token = CancelToken::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        token.set_interrupter(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(token.is_interruptible());
        token.clear_interrupter();
        assert!(!token.is_interruptible());
        token.cancel();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
