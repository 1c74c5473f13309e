use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::error::{RefError, RefResult};
use crate::refcount::RefCount;

#[derive(Debug)]
struct ViewState {
    main: bool,
    closed: bool,
}

/// Per-consumer handle onto a shared [`RefCount`].
///
/// Every operation a consumer performs on the shared resource goes through
/// [`execute`](Self::execute), which fails with [`RefError::Closed`] once this
/// view has been closed, whatever its siblings do. Operations hold the view's
/// read lock while they run, so a concurrent close waits for them to finish.
///
/// A main view closes with [`finalize`](Self::finalize) semantics (it must be
/// the last reference); any other view closes with
/// [`release`](Self::release). Dropping a view that was never closed releases
/// its reference.
pub struct View {
    refs: Arc<RefCount>,
    state: RwLock<ViewState>,
}

impl View {
    /// Acquire a new view on `refs`.
    pub fn new(refs: Arc<RefCount>, main: bool) -> RefResult<Self> {
        refs.add_ref()?;
        Ok(Self::adopt(refs, main))
    }

    /// Wrap a reference that has already been counted.
    pub(crate) fn adopt(refs: Arc<RefCount>, main: bool) -> Self {
        Self {
            refs,
            state: RwLock::new(ViewState {
                main,
                closed: false,
            }),
        }
    }

    /// Run `f` unless this view is closed.
    ///
    /// The view's read lock is held while `f` runs. `f` must not close,
    /// release or finalize this same view, which would deadlock, and should
    /// not call `execute` on it again: a close waiting for the lock blocks
    /// the nested call.
    pub fn execute<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<RefError>,
    {
        let state = self.state.read().expect("view lock poisoned");
        if state.closed {
            return Err(RefError::Closed.into());
        }
        f()
    }

    /// Acquire an additional, non-main view on the same reference count.
    pub fn dup(&self) -> RefResult<View> {
        self.execute(|| View::new(Arc::clone(&self.refs), false))
    }

    /// Close this view using its configured discipline.
    pub fn close(&self) -> RefResult<()> {
        let mut state = self.state.write().expect("view lock poisoned");
        if state.closed {
            return Err(RefError::Closed);
        }
        let result = if state.main {
            self.refs.unref_last()
        } else {
            self.refs.unref()
        };
        self.settle(&mut state, result)
    }

    /// Close this view with an ordinary decrement, even if it is main.
    pub fn release(&self) -> RefResult<()> {
        let mut state = self.state.write().expect("view lock poisoned");
        if state.closed {
            return Err(RefError::Closed);
        }
        let result = self.refs.unref();
        self.settle(&mut state, result)
    }

    /// Close this view, requiring it to hold the last reference.
    ///
    /// While other references remain this fails with
    /// [`RefError::StillReferenced`] and the view stays open.
    pub fn finalize(&self) -> RefResult<()> {
        let mut state = self.state.write().expect("view lock poisoned");
        if state.closed {
            return Err(RefError::Closed);
        }
        let result = self.refs.unref_last();
        self.settle(&mut state, result)
    }

    /// Demote a main view to ordinary release-on-close behavior.
    pub fn lazy(&self) {
        self.state.write().expect("view lock poisoned").main = false;
    }

    pub fn is_main(&self) -> bool {
        self.state.read().expect("view lock poisoned").main
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().expect("view lock poisoned").closed
    }

    /// Number of references on the shared count, this view included.
    pub fn ref_count(&self) -> usize {
        self.refs.ref_count()
    }

    pub fn name(&self) -> &str {
        self.refs.name()
    }

    fn settle(&self, state: &mut ViewState, result: RefResult<()>) -> RefResult<()> {
        match result {
            Err(err @ RefError::StillReferenced { .. }) => Err(err),
            result => {
                state.closed = true;
                debug!(name = %self.refs.name(), main = state.main, ok = result.is_ok(), "view closed");
                result
            }
        }
    }
}

impl Drop for View {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.closed {
            return;
        }
        state.closed = true;
        match self.refs.unref() {
            Ok(()) => {}
            Err(RefError::Closed) => {
                debug!(name = %self.refs.name(), "dropped view on closed reference count");
            }
            Err(err) => warn!(name = %self.refs.name(), error = %err, "releasing dropped view failed"),
        }
    }
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("view lock poisoned");
        f.debug_struct("View")
            .field("name", &self.refs.name())
            .field("main", &state.main)
            .field("closed", &state.closed)
            .finish()
    }
}
