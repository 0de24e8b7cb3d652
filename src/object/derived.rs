use super::{CleanupHook, Disposable, DisposableBase};
use crate::{
    error::{DisposeError, ResourceError},
    gc::Rooted,
    native::{NativeHandle, NativeHeap, Unmanaged, UnmanagedResource},
    session::Session,
    utils::sync::{Arc, Mutex},
};

/// First tier above the base. Owns a block of native memory sized by
/// [`Config::buffer_size`](crate::config::Config::buffer_size) and a managed copy of
/// the bytes last written into it.
pub struct DerivedResource {
    base: DisposableBase,
    heap: Arc<NativeHeap>,
    memory: Mutex<Option<UnmanagedResource>>,
    staged: Mutex<Option<Vec<u8>>>,
}

impl DerivedResource {
    pub const TIER: &'static str = "Derived";

    pub fn new(session: &Session, name: impl Into<Arc<str>>) -> Rooted<Self> {
        session.track(Self::parent_tier(session, name))
    }

    /// Builds the tier without tracking it, for types that refine `DerivedResource`.
    /// The refining type is what gets handed to [`Session::track`].
    pub fn parent_tier(session: &Session, name: impl Into<Arc<str>>) -> Self {
        let heap = session.native_heap().clone();
        let memory = heap.alloc_memory(session.config().buffer_size);
        Self {
            base: DisposableBase::new(session, name),
            heap,
            memory: Mutex::new(Some(memory.into())),
            staged: Mutex::new(Some(Vec::new())),
        }
    }

    pub fn native_handle(&self) -> Result<NativeHandle, DisposeError> {
        self.ensure_not_disposed("native_handle")?;
        self.memory
            .lock()
            .as_ref()
            .map(Unmanaged::handle)
            .ok_or_else(|| self.base.use_after_dispose("native_handle"))
    }

    /// Copies `data` into native memory, truncated to the block size.
    pub fn write(&self, data: &[u8]) -> Result<usize, ResourceError> {
        self.ensure_not_disposed("write")?;
        let handle = self.native_handle()?;
        let written = self.heap.write(handle, data)?;

        let mut staged = self.staged.lock();
        let staged = staged
            .as_mut()
            .ok_or_else(|| self.base.use_after_dispose("write"))?;
        staged.clear();
        staged.extend_from_slice(&data[..written]);
        Ok(written)
    }

    /// Reads back the bytes last written, straight from native memory.
    pub fn read(&self) -> Result<Vec<u8>, ResourceError> {
        self.ensure_not_disposed("read")?;
        let handle = self.native_handle()?;
        let len = self.staged.lock().as_ref().map_or(0, Vec::len);
        Ok(self.heap.read(handle, len)?)
    }

    pub fn len(&self) -> Result<usize, DisposeError> {
        self.ensure_not_disposed("len")?;
        Ok(self.staged.lock().as_ref().map_or(0, Vec::len))
    }

    pub fn is_empty(&self) -> Result<bool, DisposeError> {
        self.len().map(|n| n == 0)
    }

    pub(crate) fn heap(&self) -> &NativeHeap {
        &self.heap
    }
}

impl CleanupHook for DerivedResource {
    fn tier(&self) -> &'static str {
        Self::TIER
    }

    fn cleanup_hook(&self, releasing_managed: bool) {
        self.base.emit(Self::TIER, releasing_managed);

        let memory = self.memory.lock().take();
        if let Some(memory) = memory {
            if let Err(e) = memory.release(&self.heap) {
                self.base.report_release_failure(Self::TIER, &e);
            }
        }

        if releasing_managed {
            self.staged.lock().take();
        }

        self.base.cleanup_hook(releasing_managed);
    }
}

impl Disposable for DerivedResource {
    fn base(&self) -> &DisposableBase {
        &self.base
    }
}
