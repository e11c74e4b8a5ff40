//! Per-worker allocation. Each worker owns its own allocator instance so a
//! task running on worker W always allocates from W's memory, keeping tiles
//! and task structs NUMA-local to whichever worker produces them. Freeing
//! across workers (a resource produced on W0, freed by a task on W1) is
//! routed through a cross-worker queue rather than calling the owning
//! allocator directly from a foreign thread.

use crate::queue::RemoteInbox;
use std::alloc::{alloc, dealloc, Layout};
use std::collections::HashMap;
use std::sync::Mutex;

/// Allocates and frees fixed-size, cache-line-aligned chunks (task structs,
/// [`crate::resource::ResourcePointer`] targets) for a single worker.
pub struct TaskAllocator {
    chunk_size: usize,
    align: usize,
    allocated: Mutex<HashMap<usize, Layout>>,
}

impl TaskAllocator {
    pub fn new(chunk_size: usize, align: usize) -> Self {
        Self {
            chunk_size,
            align,
            allocated: Mutex::new(HashMap::new()),
        }
    }

    pub fn allocate(&self) -> *mut u8 {
        let layout = Layout::from_size_align(self.chunk_size, self.align)
            .expect("invalid chunk size/alignment");
        let ptr = unsafe { alloc(layout) };
        self.allocated.lock().unwrap().insert(ptr as usize, layout);
        ptr
    }

    /// # Safety
    /// `address` must have been returned by [`Self::allocate`] on this
    /// allocator and not freed already.
    pub unsafe fn free(&self, address: *mut u8) {
        let layout = self
            .allocated
            .lock()
            .unwrap()
            .remove(&(address as usize))
            .expect("freeing address not tracked by this allocator");
        dealloc(address, layout);
    }

    /// Address ranges still outstanding, keyed by a label useful for
    /// diagnostics (e.g. "tasks", "tiles").
    pub fn allocated_chunks(&self) -> Vec<(usize, usize)> {
        self.allocated
            .lock()
            .unwrap()
            .iter()
            .map(|(&addr, layout)| (addr, addr + layout.size()))
            .collect()
    }
}

/// Dynamic-size, cache-line-aligned allocator backing PAX tiles. Distinct
/// from [`TaskAllocator`] because tiles vary in size with schema width while
/// task structs are fixed-size.
pub struct TileAllocator {
    align: usize,
    allocated: Mutex<HashMap<usize, Layout>>,
}

impl TileAllocator {
    pub fn new(align: usize) -> Self {
        Self {
            align,
            allocated: Mutex::new(HashMap::new()),
        }
    }

    pub fn allocate(&self, size: usize) -> *mut u8 {
        let layout = Layout::from_size_align(size, self.align).expect("invalid tile size/alignment");
        let ptr = unsafe { alloc(layout) };
        self.allocated.lock().unwrap().insert(ptr as usize, layout);
        ptr
    }

    /// # Safety
    /// `address` must have been returned by [`Self::allocate`] on this
    /// allocator and not freed already.
    pub unsafe fn free(&self, address: *mut u8) {
        let layout = self
            .allocated
            .lock()
            .unwrap()
            .remove(&(address as usize))
            .expect("freeing address not tracked by this allocator");
        dealloc(address, layout);
    }

    pub fn allocated_chunks(&self) -> Vec<(usize, usize)> {
        self.allocated
            .lock()
            .unwrap()
            .iter()
            .map(|(&addr, layout)| (addr, addr + layout.size()))
            .collect()
    }
}

/// Carries a free request from whichever worker finished with a resource to
/// the worker that owns its allocator.
pub struct CrossWorkerFreeQueue {
    inboxes: Vec<RemoteInbox<*mut u8>>,
}

unsafe impl Send for CrossWorkerFreeQueue {}
unsafe impl Sync for CrossWorkerFreeQueue {}

impl CrossWorkerFreeQueue {
    pub fn new(worker_count: usize) -> Self {
        Self {
            inboxes: (0..worker_count).map(|_| RemoteInbox::new()).collect(),
        }
    }

    pub fn request_free(&self, owner_worker_id: usize, address: *mut u8) {
        self.inboxes[owner_worker_id].push(address);
    }

    pub fn drain_pending(&self, worker_id: usize) -> Vec<*mut u8> {
        let mut drained = Vec::new();
        while let Some(address) = self.inboxes[worker_id].pop() {
            drained.push(address);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_allocator_tracks_and_frees() {
        let allocator = TaskAllocator::new(64, 64);
        let ptr = allocator.allocate();
        assert_eq!(allocator.allocated_chunks().len(), 1);
        unsafe { allocator.free(ptr) };
        assert_eq!(allocator.allocated_chunks().len(), 0);
    }

    #[test]
    fn tile_allocator_supports_varying_sizes() {
        let allocator = TileAllocator::new(64);
        let small = allocator.allocate(128);
        let large = allocator.allocate(4096);
        assert_eq!(allocator.allocated_chunks().len(), 2);
        unsafe {
            allocator.free(small);
            allocator.free(large);
        }
    }

    #[test]
    fn cross_worker_free_queue_routes_to_owner() {
        let queue = CrossWorkerFreeQueue::new(2);
        let dummy = 1usize as *mut u8;
        queue.request_free(1, dummy);
        assert!(queue.drain_pending(0).is_empty());
        assert_eq!(queue.drain_pending(1), vec![dummy]);
    }
}
