use std::sync::Mutex;

use tracing::{debug, trace};

use crate::error::{BoxError, RefError, RefResult};

type CleanupFn = Box<dyn FnOnce() -> Result<(), BoxError> + Send>;

struct RefState {
    count: usize,
    closed: bool,
    cleanup: Option<CleanupFn>,
}

/// Shared reference counter with a one-shot cleanup.
///
/// All mutation is serialized by one mutex. Exactly one caller observes the
/// count reaching zero; that caller alone runs the cleanup. The cleanup runs
/// after the counter has been marked closed and outside the lock, so a
/// concurrent [`add_ref`](Self::add_ref) already fails with
/// [`RefError::Closed`] and observers never wait on a slow cleanup.
pub struct RefCount {
    name: String,
    state: Mutex<RefState>,
}

impl RefCount {
    /// Create a counter with an initial count and a cleanup callback.
    ///
    /// An initial count of 0 describes a handle that must be explicitly
    /// referenced before use.
    pub fn new<F, E>(name: impl Into<String>, initial: usize, cleanup: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            name: name.into(),
            state: Mutex::new(RefState {
                count: initial,
                closed: false,
                cleanup: Some(Box::new(move || cleanup().map_err(Into::into))),
            }),
        }
    }

    /// Create a counter with nothing to clean up.
    pub fn without_cleanup(name: impl Into<String>, initial: usize) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(RefState {
                count: initial,
                closed: false,
                cleanup: None,
            }),
        }
    }

    /// Diagnostic name, used to wrap cleanup errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Increment the count.
    pub fn add_ref(&self) -> RefResult<()> {
        let mut state = self.state.lock().expect("refcount lock poisoned");
        if state.closed {
            return Err(RefError::Closed);
        }
        state.count += 1;
        trace!(name = %self.name, count = state.count, "ref");
        Ok(())
    }

    /// Decrement the count, running the cleanup when it reaches zero.
    pub fn unref(&self) -> RefResult<()> {
        let cleanup = {
            let mut state = self.state.lock().expect("refcount lock poisoned");
            if state.closed {
                return Err(RefError::Closed);
            }
            state.count = state.count.saturating_sub(1);
            trace!(name = %self.name, count = state.count, "unref");
            if state.count > 0 {
                return Ok(());
            }
            state.closed = true;
            state.cleanup.take()
        };
        self.run_cleanup(cleanup)
    }

    /// Decrement the count, but only if this is the last reference.
    ///
    /// Fails with [`RefError::StillReferenced`] and leaves the count untouched
    /// while other references remain.
    pub fn unref_last(&self) -> RefResult<()> {
        let cleanup = {
            let mut state = self.state.lock().expect("refcount lock poisoned");
            if state.closed {
                return Err(RefError::Closed);
            }
            if state.count > 1 {
                return Err(RefError::StillReferenced {
                    name: self.name.clone(),
                    pending: state.count - 1,
                });
            }
            state.count = 0;
            state.closed = true;
            state.cleanup.take()
        };
        self.run_cleanup(cleanup)
    }

    /// Current number of references.
    pub fn ref_count(&self) -> usize {
        self.state.lock().expect("refcount lock poisoned").count
    }

    /// Returns `true` once the cleanup transition has happened.
    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("refcount lock poisoned").closed
    }

    fn run_cleanup(&self, cleanup: Option<CleanupFn>) -> RefResult<()> {
        debug!(name = %self.name, "last reference released");
        match cleanup {
            Some(cleanup) => cleanup().map_err(|source| RefError::Cleanup {
                name: self.name.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for RefCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("refcount lock poisoned");
        f.debug_struct("RefCount")
            .field("name", &self.name)
            .field("count", &state.count)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn counting(name: &str, initial: usize) -> (RefCount, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let refs = RefCount::new(name, initial, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::io::Error>(())
        });
        (refs, calls)
    }

    #[test]
    fn cleanup_runs_at_zero() {
        let (refs, calls) = counting("res", 1);
        refs.add_ref().unwrap();
        assert_eq!(refs.ref_count(), 2);

        refs.unref().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!refs.is_closed());

        refs.unref().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(refs.is_closed());
        assert_eq!(refs.ref_count(), 0);
    }

    #[test]
    fn operations_after_close_fail() {
        let (refs, calls) = counting("res", 1);
        refs.unref().unwrap();
        assert!(refs.add_ref().unwrap_err().is_closed());
        assert!(refs.unref().unwrap_err().is_closed());
        assert!(refs.unref_last().unwrap_err().is_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unused_handle_can_be_referenced() {
        let (refs, calls) = counting("res", 0);
        refs.add_ref().unwrap();
        assert_eq!(refs.ref_count(), 1);
        refs.unref().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unref_on_unused_handle_cleans_up() {
        let (refs, calls) = counting("res", 0);
        refs.unref().unwrap();
        assert!(refs.is_closed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unref_last_requires_sole_reference() {
        let (refs, calls) = counting("repo", 1);
        refs.add_ref().unwrap();
        refs.add_ref().unwrap();

        let err = refs.unref_last().unwrap_err();
        match &err {
            RefError::StillReferenced { name, pending } => {
                assert_eq!(name.as_str(), "repo");
                assert_eq!(*pending, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.to_string(), "repo: still referenced, 2 pending");
        // state unchanged
        assert_eq!(refs.ref_count(), 3);
        assert!(!refs.is_closed());

        refs.unref().unwrap();
        refs.unref().unwrap();
        refs.unref_last().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(refs.is_closed());
    }

    #[test]
    fn cleanup_error_is_wrapped_and_not_retried() {
        let refs = RefCount::new("tmpblob", 1, || {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"))
        });
        let err = refs.unref().unwrap_err();
        assert!(matches!(err, RefError::Cleanup { ref name, .. } if name == "tmpblob"));
        assert_eq!(err.to_string(), "tmpblob: cleanup failed: denied");
        assert!(refs.is_closed());
        assert!(refs.unref().unwrap_err().is_closed());
    }

    #[test]
    fn without_cleanup_closes_quietly() {
        let refs = RefCount::without_cleanup("plain", 1);
        refs.unref().unwrap();
        assert!(refs.is_closed());
    }

    #[test]
    fn concurrent_unrefs_clean_up_once() {
        const N: usize = 64;
        let (refs, calls) = counting("shared", 1);
        let refs = Arc::new(refs);
        for _ in 1..N {
            refs.add_ref().unwrap();
        }

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let refs = Arc::clone(&refs);
                thread::spawn(move || refs.unref().unwrap())
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(refs.is_closed());
    }

    #[test]
    fn debug_format() {
        let refs = RefCount::without_cleanup("dbg", 2);
        let debug = format!("{refs:?}");
        assert!(debug.contains("dbg"));
        assert!(debug.contains("count: 2"));
    }
}
