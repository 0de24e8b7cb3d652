//! Simulated collection.
//!
//! There is no real collector here. An instance counts as reachable while at least
//! one [`Rooted`] handle to it exists; dropping the last handle makes it eligible for
//! automatic cleanup, which happens the next time the [`FinalizationQueue`] is swept.
//! Until then the queue keeps the instance alive, the same way a pending finalizer
//! keeps an object alive in a managed runtime.
use crate::{
    object::Disposable,
    utils::sync::{Arc, Weak},
};
use std::{fmt::Debug, ops::Deref};

pub mod finalizer;

pub use finalizer::{CollectReport, FinalizationQueue};
pub(crate) use finalizer::FinalizerLink;

/// Marker shared by all clones of a [`Rooted`] handle. The finalization queue only
/// keeps a weak reference to it.
#[derive(Debug)]
pub(crate) struct RootToken;

/// Caller-held handle to a tracked instance.
pub struct Rooted<T: ?Sized> {
    object: Arc<T>,
    root: Arc<RootToken>,
}

impl<T: ?Sized> Rooted<T> {
    pub(crate) fn new(object: Arc<T>) -> (Self, Weak<RootToken>) {
        let root = Arc::new(RootToken);
        let weak = Arc::downgrade(&root);
        (Self { object, root }, weak)
    }

    /// Number of live handles to this instance.
    pub fn root_count(&self) -> usize {
        Arc::strong_count(&self.root)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }
}

impl<T: Disposable + 'static> Rooted<T> {
    pub fn into_dyn(self) -> Rooted<dyn Disposable> {
        Rooted {
            object: self.object,
            root: self.root,
        }
    }
}

impl<T: ?Sized> Clone for Rooted<T> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            root: self.root.clone(),
        }
    }
}

impl<T: ?Sized> Deref for Rooted<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: Disposable + ?Sized> Debug for Rooted<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rooted")
            .field("id", &self.object.id())
            .field("name", &self.object.name())
            .field("tier", &self.object.tier())
            .field("disposed", &self.object.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::Config,
        object::{DerivedResource, Disposable},
        session::Session,
    };

    #[test]
    fn test_clones_share_one_root() {
        let session = Session::new(Config::default());
        let first = DerivedResource::new(&session, "r");
        let other = DerivedResource::new(&session, "r");
        assert_eq!(first.root_count(), 1);

        let second = first.clone();
        assert_eq!(first.root_count(), 2);
        assert!(first.ptr_eq(&second));
        assert!(!first.ptr_eq(&other));

        drop(second);
        assert_eq!(first.root_count(), 1);
        assert!(session.collect().finalized.is_empty());
    }

    #[test]
    fn test_dyn_handle_keeps_instance_rooted() {
        let session = Session::new(Config::default());
        let handle = DerivedResource::new(&session, "erased").into_dyn();
        assert!(session.collect().finalized.is_empty());

        let id = handle.id();
        drop(handle);
        assert_eq!(session.collect().finalized, [id]);
    }
}
