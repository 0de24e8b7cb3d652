use super::{CleanupHook, Disposable, DisposableBase, DerivedResource, ObjectId};
use crate::{
    error::{DisposeError, ResourceError},
    gc::Rooted,
    native::{NativeHandle, Unmanaged, UnmanagedResource},
    session::Session,
    utils::sync::{Arc, Mutex},
};

/// Second tier, refining [`DerivedResource`]. On top of its parent's memory it holds
/// an OS-style handle and owns other disposable objects, which it disposes along with
/// itself.
///
/// Owned children are only released on explicit disposal. When the composite is
/// cleaned up automatically its children are left untouched; they become unreachable
/// once the composite is dropped and are picked up by a later sweep pass.
pub struct CompositeResource {
    parent: DerivedResource,
    handle: Mutex<Option<UnmanagedResource>>,
    children: Mutex<Vec<Rooted<dyn Disposable>>>,
}

impl CompositeResource {
    pub const TIER: &'static str = "Composite";

    pub fn new(session: &Session, name: impl Into<Arc<str>>) -> Rooted<Self> {
        let name: Arc<str> = name.into();
        let handle = session.native_heap().open_handle(format!("{}.handle", name));
        session.track(Self {
            parent: DerivedResource::parent_tier(session, name),
            handle: Mutex::new(Some(handle.into())),
            children: Mutex::new(Vec::new()),
        })
    }

    /// Takes ownership of `child`. It will be disposed when this composite is.
    ///
    /// Fails with [`DisposeError::OwnershipCycle`] if `child` is this composite or
    /// already owns it, directly or through other composites. A cycle would keep every
    /// member rooted forever and no sweep could reclaim it.
    pub fn adopt<T: Disposable + 'static>(&self, child: Rooted<T>) -> Result<(), DisposeError> {
        self.ensure_not_disposed("adopt")?;
        if child.id() == self.id() || child.owns(self.id()) {
            return Err(DisposeError::OwnershipCycle {
                owner: self.name().to_string(),
                child: child.name().to_string(),
            });
        }
        self.children.lock().push(child.into_dyn());
        Ok(())
    }

    pub fn children(&self) -> Result<Vec<ObjectId>, DisposeError> {
        self.ensure_not_disposed("children")?;
        Ok(self.children.lock().iter().map(|c| c.id()).collect())
    }

    pub fn os_handle(&self) -> Result<NativeHandle, DisposeError> {
        self.ensure_not_disposed("os_handle")?;
        self.handle
            .lock()
            .as_ref()
            .map(Unmanaged::handle)
            .ok_or_else(|| self.base().use_after_dispose("os_handle"))
    }

    pub fn native_handle(&self) -> Result<NativeHandle, DisposeError> {
        self.parent.native_handle()
    }

    pub fn write(&self, data: &[u8]) -> Result<usize, ResourceError> {
        self.parent.write(data)
    }

    pub fn read(&self) -> Result<Vec<u8>, ResourceError> {
        self.parent.read()
    }
}

impl CleanupHook for CompositeResource {
    fn tier(&self) -> &'static str {
        Self::TIER
    }

    fn cleanup_hook(&self, releasing_managed: bool) {
        let base = self.parent.base();
        base.emit(Self::TIER, releasing_managed);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.release(self.parent.heap()) {
                base.report_release_failure(Self::TIER, &e);
            }
        }

        if releasing_managed {
            let children = std::mem::take(&mut *self.children.lock());
            for child in &children {
                child.dispose();
            }
        }

        self.parent.cleanup_hook(releasing_managed);
    }
}

impl Disposable for CompositeResource {
    fn base(&self) -> &DisposableBase {
        self.parent.base()
    }

    fn owns(&self, id: ObjectId) -> bool {
        let children = self.children.lock().clone();
        children.iter().any(|c| c.id() == id || c.owns(id))
    }
}
