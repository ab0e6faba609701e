use crate::statics::{protect, retire};
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::null_mut;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering::SeqCst;

/// A lock-free cell holding a single value of any type.
///
/// Every value is boxed before it is published, so the cell itself only ever swaps one pointer
/// atomically. Readers clone the value out of the box; a replaced box is destroyed once no
/// concurrent reader can still be looking at it.
///
/// A cell is either empty (its initial state when created with [`AtomicCell::empty`]) or holds
/// one value. No operation empties it again. [`load`](AtomicCell::load) reads an empty cell as
/// `T::default()`; use [`load_opt`](AtomicCell::load_opt) to tell the two apart.
///
/// # Examples
/// ```
/// use atomic_value::AtomicCell;
///
/// let cell = AtomicCell::new(123);
/// assert_eq!(cell.swap(456), 123);
/// assert_eq!(cell.load(), 456);
///
/// assert!(!cell.compare_and_swap(&123, 789));
/// assert_eq!(cell.load(), 456);
/// assert!(cell.compare_and_swap(&456, 789));
/// assert_eq!(cell.load(), 789);
/// ```
pub struct AtomicCell<T> {
    ptr: AtomicPtr<T>,
    phantom: PhantomData<*const T>,
}

unsafe impl<T: Send> Send for AtomicCell<T> {}

unsafe impl<T: Send + Sync> Sync for AtomicCell<T> {}

impl<T> AtomicCell<T> {
    /// Creates a cell holding no value.
    pub const fn empty() -> Self {
        Self {
            ptr: AtomicPtr::new(null_mut()),
            phantom: PhantomData,
        }
    }

    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            ptr: AtomicPtr::new(Box::into_raw(Box::new(value))),
            phantom: PhantomData,
        }
    }

    /// Returns `true` if nothing has been stored yet. Once this returns `false` it never returns
    /// `true` again.
    pub fn is_empty(&self) -> bool {
        self.ptr.load(SeqCst).is_null()
    }

    /// Returns a mutable reference to the stored value, or [`None`] if the cell is empty.
    ///
    /// The exclusive borrow guarantees no other thread is reading, so no cloning is involved.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        unsafe { self.ptr.get_mut().as_mut() }
    }

    /// Consumes the cell and returns the stored value, or [`None`] if it was empty.
    pub fn into_inner(self) -> Option<T> {
        let this = ManuallyDrop::new(self);
        let ptr = this.ptr.load(SeqCst);
        if ptr.is_null() {
            None
        } else {
            unsafe { Some(*Box::from_raw(ptr)) }
        }
    }
}

impl<T: Clone> AtomicCell<T> {
    /// Returns a clone of the stored value, or `T::default()` if the cell is empty.
    pub fn load(&self) -> T
    where
        T: Default,
    {
        self.load_opt().unwrap_or_default()
    }

    /// Returns a clone of the stored value, or [`None`] if the cell is empty.
    pub fn load_opt(&self) -> Option<T> {
        let _guard = protect();
        let ptr = self.ptr.load(SeqCst);
        unsafe { ptr.as_ref() }.cloned()
    }
}

impl<T: Send> AtomicCell<T> {
    /// Stores `value`, replacing whatever the cell held.
    ///
    /// The replaced value is not dropped here: it joins this thread's batch of retired values,
    /// which is destroyed once it has grown to the number of threads using cells, or when this
    /// thread exits. A long-lived thread that replaces values rarely may therefore hold on to
    /// the last few of them (and any file, lock or other resource they own) indefinitely.
    pub fn store(&self, value: T) {
        let before = self.ptr.swap(Box::into_raw(Box::new(value)), SeqCst);
        if !before.is_null() {
            unsafe {
                retire(before);
            }
        }
    }

    /// Stores `new` and returns the value it replaced, or `T::default()` if the cell was empty.
    ///
    /// The returned value is a clone. The original is dropped later, as described on
    /// [`store`](AtomicCell::store).
    pub fn swap(&self, new: T) -> T
    where
        T: Clone + Default,
    {
        self.swap_opt(new).unwrap_or_default()
    }

    /// Stores `new` and returns the value it replaced, or [`None`] if the cell was empty.
    ///
    /// Like [`swap`](AtomicCell::swap), this returns a clone and defers dropping the original.
    pub fn swap_opt(&self, new: T) -> Option<T>
    where
        T: Clone,
    {
        let before = self.ptr.swap(Box::into_raw(Box::new(new)), SeqCst);
        if before.is_null() {
            return None;
        }
        // Only this call can retire `before`, so it stays valid until then. Readers may still
        // hold references into it, hence the clone.
        let value = unsafe { (*before).clone() };
        unsafe {
            retire(before);
        }
        Some(value)
    }

    /// Stores `new` if the cell holds a value equal to `current`, and reports whether it did.
    ///
    /// An empty cell compares as `T::default()`, matching [`load`](AtomicCell::load). Equality is
    /// whatever `T`'s [`PartialEq`] says; see [`Value`](crate::Value) for how polymorphic payloads
    /// compare.
    pub fn compare_and_swap(&self, current: &T, new: T) -> bool
    where
        T: PartialEq + Default,
    {
        let mut empty_matches = None;
        self.compare_exchange_by(
            |actual| match actual {
                Some(actual) => actual == current,
                None => *empty_matches.get_or_insert_with(|| *current == T::default()),
            },
            new,
            |_| (),
        )
        .is_ok()
    }

    /// Stores `new` if the cell holds a value equal to `current`, or is empty and `current` is
    /// [`None`].
    ///
    /// On failure, returns the value that was observed instead.
    ///
    /// # Examples
    /// ```
    /// use atomic_value::AtomicCell;
    ///
    /// let cell = AtomicCell::empty();
    /// assert_eq!(cell.compare_exchange(Some(&1), 2), Err(None));
    /// assert_eq!(cell.compare_exchange(None, 2), Ok(()));
    /// assert_eq!(cell.compare_exchange(None, 3), Err(Some(2)));
    /// ```
    pub fn compare_exchange(&self, current: Option<&T>, new: T) -> Result<(), Option<T>>
    where
        T: Clone + PartialEq,
    {
        self.compare_exchange_by(|actual| actual == current, new, |actual| actual.cloned())
    }

    /// Repeatedly applies `f` to the stored value (or `T::default()` if the cell is empty) until
    /// its result is stored without interference.
    ///
    /// Returns `Ok` with the replaced value once an update lands, or `Err` with the current value
    /// if `f` returns [`None`]. Conflicts are detected by identity of the stored box, so `T` does
    /// not need to be comparable.
    ///
    /// # Examples
    /// ```
    /// use atomic_value::AtomicCell;
    ///
    /// let cell = AtomicCell::new(vec![1]);
    /// let before = cell.fetch_update(|v| {
    ///     let mut v = v.clone();
    ///     v.push(2);
    ///     Some(v)
    /// });
    /// assert_eq!(before, Ok(vec![1]));
    /// assert_eq!(cell.fetch_update(|_| None), Err(vec![1, 2]));
    /// ```
    pub fn fetch_update<F>(&self, mut f: F) -> Result<T, T>
    where
        T: Clone + Default,
        F: FnMut(&T) -> Option<T>,
    {
        let guard = protect();
        let mut before = self.ptr.load(SeqCst);
        loop {
            let prev = unsafe { before.as_ref() }.cloned().unwrap_or_default();
            let next = match f(&prev) {
                Some(next) => Box::into_raw(Box::new(next)),
                None => return Err(prev),
            };
            match self.ptr.compare_exchange(before, next, SeqCst, SeqCst) {
                Ok(_) => {
                    drop(guard);
                    if !before.is_null() {
                        unsafe {
                            retire(before);
                        }
                    }
                    return Ok(prev);
                }
                Err(actual) => {
                    unsafe {
                        drop(Box::from_raw(next));
                    }
                    before = actual;
                }
            }
        }
    }

    /// Installs `new` once the stored value satisfies `matches`; otherwise returns whatever
    /// `on_mismatch` makes of the value that failed the check.
    ///
    /// The protected region keeps every observed box alive, so a box address cannot be recycled
    /// between the check and the exchange.
    fn compare_exchange_by<M, O, E>(&self, mut matches: M, new: T, on_mismatch: O) -> Result<(), E>
    where
        M: FnMut(Option<&T>) -> bool,
        O: FnOnce(Option<&T>) -> E,
    {
        let new = Box::into_raw(Box::new(new));
        let guard = protect();
        let mut before = self.ptr.load(SeqCst);
        loop {
            let actual = unsafe { before.as_ref() };
            if !matches(actual) {
                let err = on_mismatch(actual);
                drop(guard);
                unsafe {
                    drop(Box::from_raw(new));
                }
                return Err(err);
            }
            match self.ptr.compare_exchange(before, new, SeqCst, SeqCst) {
                Ok(_) => break,
                Err(changed) => before = changed,
            }
        }
        drop(guard);
        if !before.is_null() {
            unsafe {
                retire(before);
            }
        }
        Ok(())
    }
}

impl<T: Clone> Clone for AtomicCell<T> {
    fn clone(&self) -> Self {
        match self.load_opt() {
            Some(value) => Self::new(value),
            None => Self::empty(),
        }
    }
}

impl<T> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<T> for AtomicCell<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let _guard = protect();
        match unsafe { self.ptr.load(SeqCst).as_ref() } {
            Some(value) => f.debug_tuple("AtomicCell").field(value).finish(),
            None => f.write_str("AtomicCell(<empty>)"),
        }
    }
}

impl<T> Drop for AtomicCell<T> {
    fn drop(&mut self) {
        let ptr = *self.ptr.get_mut();
        if !ptr.is_null() {
            unsafe {
                drop(Box::from_raw(ptr));
            }
        }
    }
}
