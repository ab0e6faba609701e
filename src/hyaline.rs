use crate::utils::slot_list::SlotList;
use std::cell::RefCell;
use std::mem;
use std::ptr::null_mut;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release, SeqCst};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize};
use std::sync::Arc;
use tracing::{debug, trace};

/// A set of reclamation slots shared by every thread that reads or retires through it.
///
/// Retired objects are collected in per-slot batches. A full batch is handed to every slot that
/// is inside a critical section at publication time, and is destroyed when the last of those
/// slots leaves its outermost critical section.
#[derive(Default)]
pub(crate) struct Context<const N: usize> {
    slots: SlotList<Slot, N>,
    slots_reserved: AtomicUsize,
}

impl<const N: usize> Context<N> {
    pub(crate) fn reserve_slot(&self) -> &Slot {
        let reserved = self.slots_reserved.fetch_add(1, SeqCst) + 1;
        let slot = self.slots.claim(|slot| {
            slot.is_reserved
                .compare_exchange(false, true, SeqCst, SeqCst)
                .is_ok()
        });
        // Whatever a previous owner left behind can no longer be observed by anyone.
        slot.detach_head();
        debug!(reserved, "reserved reclamation slot");
        slot
    }

    pub(crate) fn leave_slot(&self, slot: &Slot) {
        self.flush(slot);
        slot.detach_head();
        slot.is_reserved.store(false, SeqCst);
        let reserved = self.slots_reserved.fetch_sub(1, SeqCst) - 1;
        debug!(reserved, "released reclamation slot");
    }

    pub(crate) fn retire(&self, slot: &Slot, deferred: Deferred) {
        let full = {
            let mut pending = slot.batch.borrow_mut();
            pending.push(deferred);
            if pending.len() < self.slots_reserved.load(SeqCst) {
                return;
            }
            mem::take(&mut *pending)
        };
        // The borrow is released before publishing: destructors may retire recursively.
        self.publish(full);
    }

    pub(crate) fn flush(&self, slot: &Slot) {
        let pending = mem::take(&mut *slot.batch.borrow_mut());
        if !pending.is_empty() {
            self.publish(pending);
        }
    }

    /// Hands `deferred` to every slot currently inside a critical section. If there are none,
    /// the batch is destroyed before returning.
    pub(crate) fn publish(&self, deferred: Vec<Deferred>) {
        let retired = deferred.len();
        let batch = Arc::new(deferred);
        let mut observers = 0usize;
        for slot in self.slots.iter() {
            if slot.active.load(SeqCst) > 0 {
                slot.push(Arc::clone(&batch));
                observers += 1;
            }
        }
        trace!(retired, observers, "published retirement batch");
    }
}

#[derive(Default)]
pub(crate) struct Slot {
    head: AtomicPtr<CollectionNode>,
    batch: RefCell<Vec<Deferred>>,
    active: AtomicUsize,
    is_reserved: AtomicBool,
}

// `batch` is only touched by the thread that reserved the slot.
unsafe impl Send for Slot {}

unsafe impl Sync for Slot {}

impl Slot {
    pub(crate) fn enter(&self) {
        self.active.fetch_add(1, SeqCst);
    }

    pub(crate) fn exit(&self) {
        if self.active.fetch_sub(1, SeqCst) == 1 {
            self.detach_head();
        }
    }

    fn push(&self, batch: Arc<Vec<Deferred>>) {
        let node = Box::into_raw(Box::new(CollectionNode {
            _batch: batch,
            next: null_mut(),
        }));
        let mut head = self.head.load(Relaxed);
        loop {
            unsafe {
                (*node).next = head;
            }
            match self
                .head
                .compare_exchange_weak(head, node, Release, Relaxed)
            {
                Ok(_) => return,
                Err(actual) => head = actual,
            }
        }
    }

    fn detach_head(&self) {
        let mut curr = self.head.swap(null_mut(), Acquire);
        while !curr.is_null() {
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next;
        }
    }
}

struct CollectionNode {
    _batch: Arc<Vec<Deferred>>,
    next: *mut CollectionNode,
}

/// A destructor waiting for every reader that might still observe `ptr` to move on.
pub(crate) struct Deferred {
    ptr: *mut u8,
    f: unsafe fn(*mut u8),
}

impl Deferred {
    /// # Safety
    /// `ptr` must come from [`Box::into_raw`], must already be unreachable for new readers, and
    /// must not be retired twice.
    pub(crate) unsafe fn boxed<T: Send>(ptr: *mut T) -> Self {
        Self {
            ptr: ptr.cast(),
            f: drop_box::<T>,
        }
    }
}

unsafe fn drop_box<T>(ptr: *mut u8) {
    drop(Box::from_raw(ptr.cast::<T>()));
}

impl Drop for Deferred {
    fn drop(&mut self) {
        unsafe { (self.f)(self.ptr) }
    }
}

unsafe impl Send for Deferred {}

unsafe impl Sync for Deferred {}
