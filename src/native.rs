//! Simulated unmanaged memory.
//!
//! The [`NativeHeap`] stands in for the allocator that lives outside any collector's
//! reach: blocks and handles taken from it stay allocated until someone frees them,
//! no matter what happens to the object that asked for them. Leaks show up as
//! [`NativeHeap::live_count`] staying above zero.
//!
//! Handles are slot indices plus one, with freed slots reused first-fit, the same
//! scheme a GC handle table uses.
use crate::{
    error::NativeError,
    utils::sync::{AtomicUsize, Mutex, Ordering},
};
use enum_dispatch::enum_dispatch;
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(usize);

impl NativeHandle {
    fn slot(self) -> usize {
        self.0 - 1
    }
}

impl Display for NativeHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

#[derive(Debug)]
enum Allocation {
    Memory(Box<[u8]>),
    Handle(String),
}

impl Allocation {
    fn kind(&self) -> &'static str {
        match self {
            Allocation::Memory(_) => NativeMemory::KIND,
            Allocation::Handle(_) => OsHandle::KIND,
        }
    }
}

#[derive(Debug, Default)]
pub struct NativeHeap {
    slots: Mutex<Vec<Option<Allocation>>>,
    live_bytes: AtomicUsize,
}

impl NativeHeap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, allocation: Allocation) -> NativeHandle {
        let mut slots = self.slots.lock();
        let index = if let Some(i) = slots.iter().position(|s| s.is_none()) {
            slots[i] = Some(allocation);
            i
        } else {
            slots.push(Some(allocation));
            slots.len() - 1
        };
        NativeHandle(index + 1)
    }

    /// Allocates a zeroed block of `bytes` bytes.
    pub fn alloc_memory(&self, bytes: usize) -> NativeMemory {
        let handle = self.insert(Allocation::Memory(vec![0; bytes].into_boxed_slice()));
        self.live_bytes.fetch_add(bytes, Ordering::Relaxed);
        tracing::trace!("native alloc {} ({} bytes)", handle, bytes);
        NativeMemory { handle, bytes }
    }

    pub fn open_handle(&self, label: impl Into<String>) -> OsHandle {
        let label = label.into();
        tracing::trace!("native open {:?}", label);
        let handle = self.insert(Allocation::Handle(label.clone()));
        OsHandle { handle, label }
    }

    fn remove(&self, handle: NativeHandle, expected: &'static str) -> Result<(), NativeError> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(handle.slot())
            .filter(|s| s.is_some())
            .ok_or(NativeError::InvalidHandle(handle))?;

        let actual = slot.as_ref().map(Allocation::kind).unwrap_or(expected);
        if actual != expected {
            return Err(NativeError::KindMismatch {
                handle,
                expected,
                actual,
            });
        }

        if let Some(Allocation::Memory(block)) = slot.take() {
            self.live_bytes.fetch_sub(block.len(), Ordering::Relaxed);
        }
        tracing::trace!("native free {}", handle);
        Ok(())
    }

    /// Releases whatever lives at `handle`, regardless of kind.
    pub fn free(&self, handle: NativeHandle) -> Result<(), NativeError> {
        let kind = self
            .slots
            .lock()
            .get(handle.slot())
            .and_then(|s| s.as_ref().map(Allocation::kind))
            .ok_or(NativeError::InvalidHandle(handle))?;
        self.remove(handle, kind)
    }

    /// Copies `data` into the block at `handle`, truncated to the block's size.
    pub fn write(&self, handle: NativeHandle, data: &[u8]) -> Result<usize, NativeError> {
        let mut slots = self.slots.lock();
        match slots.get_mut(handle.slot()) {
            Some(Some(Allocation::Memory(block))) => {
                let n = data.len().min(block.len());
                block[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(Some(other)) => Err(NativeError::KindMismatch {
                handle,
                expected: NativeMemory::KIND,
                actual: other.kind(),
            }),
            _ => Err(NativeError::InvalidHandle(handle)),
        }
    }

    pub fn read(&self, handle: NativeHandle, len: usize) -> Result<Vec<u8>, NativeError> {
        let slots = self.slots.lock();
        match slots.get(handle.slot()) {
            Some(Some(Allocation::Memory(block))) => Ok(block[..len.min(block.len())].to_vec()),
            Some(Some(other)) => Err(NativeError::KindMismatch {
                handle,
                expected: NativeMemory::KIND,
                actual: other.kind(),
            }),
            _ => Err(NativeError::InvalidHandle(handle)),
        }
    }

    pub fn label(&self, handle: NativeHandle) -> Option<String> {
        match self.slots.lock().get(handle.slot()) {
            Some(Some(Allocation::Handle(label))) => Some(label.clone()),
            _ => None,
        }
    }

    pub fn is_live(&self, handle: NativeHandle) -> bool {
        matches!(self.slots.lock().get(handle.slot()), Some(Some(_)))
    }

    pub fn live_count(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::Relaxed)
    }
}

#[enum_dispatch]
pub trait Unmanaged {
    fn handle(&self) -> NativeHandle;
    fn kind(&self) -> &'static str;
    /// Returns the resource to the native heap. Fails if the handle was already
    /// released behind the owner's back.
    fn release(&self, heap: &NativeHeap) -> Result<(), NativeError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct NativeMemory {
    handle: NativeHandle,
    bytes: usize,
}

impl NativeMemory {
    const KIND: &'static str = "memory block";

    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Unmanaged for NativeMemory {
    fn handle(&self) -> NativeHandle {
        self.handle
    }
    fn kind(&self) -> &'static str {
        Self::KIND
    }
    fn release(&self, heap: &NativeHeap) -> Result<(), NativeError> {
        heap.remove(self.handle, Self::KIND)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OsHandle {
    handle: NativeHandle,
    label: String,
}

impl OsHandle {
    const KIND: &'static str = "os handle";

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Unmanaged for OsHandle {
    fn handle(&self) -> NativeHandle {
        self.handle
    }
    fn kind(&self) -> &'static str {
        Self::KIND
    }
    fn release(&self, heap: &NativeHeap) -> Result<(), NativeError> {
        heap.remove(self.handle, Self::KIND)
    }
}

#[enum_dispatch(Unmanaged)]
#[derive(Clone, Debug, PartialEq)]
pub enum UnmanagedResource {
    NativeMemory,
    OsHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_free_tracks_bytes() {
        let heap = NativeHeap::new();
        let a = heap.alloc_memory(16);
        let b = heap.alloc_memory(8);
        assert_eq!((a.bytes(), b.bytes()), (16, 8));
        assert_eq!(heap.live_count(), 2);
        assert_eq!(heap.live_bytes(), 24);

        a.release(&heap).unwrap();
        assert!(!heap.is_live(a.handle()));
        assert_eq!(heap.live_bytes(), 8);

        heap.free(b.handle()).unwrap();
        assert_eq!(heap.live_count(), 0);
        assert_eq!(heap.live_bytes(), 0);
    }

    #[test]
    fn test_double_release_is_invalid_handle() {
        let heap = NativeHeap::new();
        let mem = heap.alloc_memory(4);
        mem.release(&heap).unwrap();
        assert_eq!(
            mem.release(&heap),
            Err(NativeError::InvalidHandle(mem.handle()))
        );
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let heap = NativeHeap::new();
        let first = heap.alloc_memory(1);
        let _second = heap.open_handle("log");
        heap.free(first.handle()).unwrap();
        let third = heap.open_handle("socket");
        assert_eq!(third.label(), "socket");
        assert_eq!(third.handle(), first.handle());
        assert_eq!(heap.label(third.handle()).as_deref(), Some("socket"));
    }

    #[test]
    fn test_kind_mismatch() {
        let heap = NativeHeap::new();
        let os = heap.open_handle("pipe");
        let err = heap.write(os.handle(), b"hi").unwrap_err();
        assert!(matches!(err, NativeError::KindMismatch { .. }));
        let as_memory: UnmanagedResource = NativeMemory {
            handle: os.handle(),
            bytes: 0,
        }
        .into();
        assert!(as_memory.release(&heap).is_err());
        assert!(heap.is_live(os.handle()));
    }

    #[test]
    fn test_write_truncates_to_block() {
        let heap = NativeHeap::new();
        let mem = heap.alloc_memory(3);
        assert_eq!(heap.write(mem.handle(), b"hello").unwrap(), 3);
        assert_eq!(heap.read(mem.handle(), 10).unwrap(), b"hel");
    }
}
