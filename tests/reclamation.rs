use atomic_value::AtomicCell;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use std::thread;
use std::time::Duration;

static CREATED: AtomicUsize = AtomicUsize::new(0);
static DROPPED: AtomicUsize = AtomicUsize::new(0);

struct Tracked(usize);

impl Tracked {
    fn new(val: usize) -> Self {
        CREATED.fetch_add(1, SeqCst);
        Self(val)
    }
}

impl Clone for Tracked {
    fn clone(&self) -> Self {
        Self::new(self.0)
    }
}

impl Default for Tracked {
    fn default() -> Self {
        Self::new(0)
    }
}

impl PartialEq for Tracked {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        DROPPED.fetch_add(1, SeqCst);
    }
}

// Delays thread exit, like a worker descheduled while its thread-locals are torn down.
struct SlowExit;

impl Drop for SlowExit {
    fn drop(&mut self) {
        thread::sleep(Duration::from_millis(20));
    }
}

thread_local! {
    static SLOW_EXIT: SlowExit = const { SlowExit };
}

// Kept as the only test in this binary: the counters are process-wide.
#[test]
fn test_every_value_is_dropped_once() {
    const THREADS_COUNT: usize = 6;
    const ITERS_PER_THREAD: usize = 300;

    let cell = AtomicCell::new(Tracked::new(0));
    thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS_COUNT)
            .map(|t| {
                let cell = &cell;
                s.spawn(move || {
                    SLOW_EXIT.with(|_| ());
                    for i in 0..ITERS_PER_THREAD {
                        match i % 4 {
                            0 => cell.store(Tracked::new(t)),
                            1 => drop(cell.swap(Tracked::new(t))),
                            2 => drop(cell.load()),
                            _ => {
                                let current = cell.load();
                                cell.compare_and_swap(&current, Tracked::new(t));
                            }
                        }
                    }
                })
            })
            .collect();
        // Joining waits for each thread's thread-local destructors, which publish the batches
        // still pending in its slot. Leaving the scope alone does not.
        for handle in handles {
            handle.join().unwrap();
        }
    });
    drop(cell);

    assert_eq!(DROPPED.load(SeqCst), CREATED.load(SeqCst));
}
