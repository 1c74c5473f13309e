//! Reference-counted views over shared closable resources.
//!
//! A resource that owns real OS state (open files, temp files, streams) is
//! shared between many consumers. Each consumer holds its own [`View`] and
//! closes it independently; the resource itself is cleaned up exactly once,
//! when the last view goes away.
//!
//! # Building Blocks
//!
//! - [`RefCount`] -- mutex-guarded counter with a one-shot cleanup
//! - [`View`] -- per-consumer handle with guarded execution and two close
//!   disciplines (lenient release, strict finalize)
//! - [`ResourceView`] -- generic façade routing every operation on a
//!   [`Closer`] base object through its view
//!
//! # Rules
//!
//! 1. Cleanup runs at most once, on the transition of the count to zero.
//! 2. A view closes at most once; afterwards every operation on it fails
//!    with [`RefError::Closed`], independent of its siblings.
//! 3. A main view only closes while it is the last reference.
//! 4. Dropping an unclosed view releases its reference.

pub mod error;
pub mod refcount;
pub mod resource;
pub mod view;

pub use error::{BoxError, RefError, RefResult};
pub use refcount::RefCount;
pub use resource::{new_resource, Closer, ResourceView};
pub use view::View;
