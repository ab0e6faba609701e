use crate::hyaline::{Context, Deferred, Slot};
use std::cell::Cell;
use std::sync::OnceLock;
use std::thread::AccessError;

const SLOTS_PER_NODE: usize = 64;

static CONTEXT: OnceLock<Context<SLOTS_PER_NODE>> = OnceLock::new();

fn get_context() -> &'static Context<SLOTS_PER_NODE> {
    CONTEXT.get_or_init(Context::default)
}

thread_local! {
    static SLOT_HANDLE: SlotHandle = const { SlotHandle { slot: Cell::new(None) } };
}

fn get_slot() -> Result<&'static Slot, AccessError> {
    SLOT_HANDLE.try_with(SlotHandle::get_or_reserve)
}

/// Keeps every object retired from now on alive until the guard is dropped.
pub(crate) struct RegionGuard {
    slot: &'static Slot,
    temporary: bool,
}

impl Drop for RegionGuard {
    fn drop(&mut self) {
        self.slot.exit();
        if self.temporary {
            get_context().leave_slot(self.slot);
        }
    }
}

pub(crate) fn protect() -> RegionGuard {
    let (slot, temporary) = match get_slot() {
        Ok(slot) => (slot, false),
        // The thread-local handle is being destroyed; borrow a slot just for this section.
        Err(_) => (get_context().reserve_slot(), true),
    };
    slot.enter();
    RegionGuard { slot, temporary }
}

/// Schedules the box behind `ptr` for destruction.
///
/// # Safety
/// `ptr` must come from [`Box::into_raw`], must already be unreachable for new readers, and must
/// not be retired twice.
pub(crate) unsafe fn retire<T: Send>(ptr: *mut T) {
    let deferred = Deferred::boxed(ptr);
    match get_slot() {
        Ok(slot) => get_context().retire(slot, deferred),
        Err(_) => get_context().publish(vec![deferred]),
    }
}

struct SlotHandle {
    slot: Cell<Option<&'static Slot>>,
}

impl SlotHandle {
    fn get_or_reserve(&self) -> &'static Slot {
        match self.slot.get() {
            Some(slot) => slot,
            None => {
                let slot = get_context().reserve_slot();
                self.slot.set(Some(slot));
                slot
            }
        }
    }
}

impl Drop for SlotHandle {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            get_context().leave_slot(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::hyaline::Slot;
    use crate::statics::{get_slot, protect, retire};
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering::SeqCst;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, SeqCst);
        }
    }

    fn slot_addr() -> usize {
        get_slot().unwrap() as *const Slot as usize
    }

    #[test]
    fn test_slot_is_per_thread() {
        let here = slot_addr();
        let there = thread::spawn(slot_addr).join().unwrap();
        assert_ne!(here, there);
        assert_eq!(here, slot_addr());
    }

    #[test]
    fn test_retire_is_deferred_while_protected() {
        let dropped = Arc::new(AtomicBool::new(false));
        let addr = Box::into_raw(Box::new(DropFlag(Arc::clone(&dropped)))) as usize;

        let guard = protect();
        // The retiring thread publishes its batch on exit, while this thread is protected.
        thread::spawn(move || unsafe { retire(addr as *mut DropFlag) })
            .join()
            .unwrap();
        assert!(!dropped.load(SeqCst));

        drop(guard);
        // Readers in concurrently running tests may share the batch for a moment.
        let deadline = Instant::now() + Duration::from_secs(10);
        while !dropped.load(SeqCst) && Instant::now() < deadline {
            thread::yield_now();
        }
        assert!(dropped.load(SeqCst));
    }
}
