use std::sync::Arc;

use crate::error::{RefError, RefResult};
use crate::refcount::RefCount;
use crate::view::View;

/// A base object that owns something which must be released exactly once.
pub trait Closer: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Release the underlying resource. Called once, when the last view on
    /// the object goes away.
    fn close(&self) -> Result<(), Self::Error>;
}

/// Wrap `base` into a fresh reference count and hand the first view to
/// `creator`, which builds the externally visible façade.
///
/// The count's cleanup is `base.close()`. The first view is main or lazy as
/// requested; further views come from [`View::dup`].
pub fn new_resource<T, O, F>(name: impl Into<String>, base: Arc<T>, main: bool, creator: F) -> O
where
    T: Closer + ?Sized,
    F: FnOnce(Arc<T>, View) -> O,
{
    let closing = Arc::clone(&base);
    let refs = Arc::new(RefCount::new(name, 1, move || closing.close()));
    creator(base, View::adopt(refs, main))
}

/// Generic dup-able, closable façade over a shared base object.
///
/// All accessors go through [`execute`](Self::execute), which refuses to
/// touch the base once this façade has been closed. [`dup`](Self::dup)
/// returns another façade over the same base (no copy, no re-read), and the
/// base is closed when the last façade is closed or dropped.
pub struct ResourceView<T: Closer + ?Sized> {
    base: Arc<T>,
    view: View,
}

impl<T: Closer> ResourceView<T> {
    /// Wrap `base` behind a lazy (release-on-close) view.
    pub fn new(name: impl Into<String>, base: T) -> Self {
        Self::from_arc(name, Arc::new(base), false)
    }

    /// Wrap `base` behind a main view, which only closes as the last
    /// reference.
    pub fn new_main(name: impl Into<String>, base: T) -> Self {
        Self::from_arc(name, Arc::new(base), true)
    }
}

impl<T: Closer + ?Sized> ResourceView<T> {
    pub fn from_arc(name: impl Into<String>, base: Arc<T>, main: bool) -> Self {
        new_resource(name, base, main, |base, view| Self { base, view })
    }

    /// Run `f` against the base unless this façade is closed.
    pub fn execute<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&T) -> Result<R, E>,
        E: From<RefError>,
    {
        self.view.execute(|| f(&self.base))
    }

    /// Another façade sharing the same base.
    pub fn dup(&self) -> RefResult<Self> {
        let view = self.view.dup()?;
        Ok(Self {
            base: Arc::clone(&self.base),
            view,
        })
    }

    pub fn close(&self) -> RefResult<()> {
        self.view.close()
    }

    pub fn release(&self) -> RefResult<()> {
        self.view.release()
    }

    pub fn finalize(&self) -> RefResult<()> {
        self.view.finalize()
    }

    pub fn lazy(&self) {
        self.view.lazy()
    }

    pub fn is_closed(&self) -> bool {
        self.view.is_closed()
    }

    pub fn ref_count(&self) -> usize {
        self.view.ref_count()
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    /// Returns `true` if both façades share the same base object.
    pub fn same_base(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.base, &other.base)
    }
}

impl<T: Closer + ?Sized> std::fmt::Debug for ResourceView<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceView")
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}
