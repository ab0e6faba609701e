use std::array;
use std::ptr::null_mut;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering::SeqCst;

/// An append-only list of `N`-item arrays. Items are never removed, so references handed out
/// stay valid for the lifetime of the list.
pub(crate) struct SlotList<T: Default, const N: usize> {
    head: Node<T, N>,
}

impl<T: Default, const N: usize> SlotList<T, N> {
    pub(crate) fn iter(&self) -> Iter<'_, T, N> {
        Iter {
            node: Some(&self.head),
            index: 0,
        }
    }

    /// Returns the first item accepted by `f`, appending a fresh node when every existing item
    /// has been rejected.
    pub(crate) fn claim<F: Fn(&T) -> bool>(&self, f: F) -> &T {
        let mut curr = &self.head;
        loop {
            if let Some(item) = curr.items.iter().find(|item| f(item)) {
                return item;
            }
            let mut next = curr.next.load(SeqCst);
            if next.is_null() {
                let fresh = Box::into_raw(Box::<Node<T, N>>::default());
                match curr.next.compare_exchange(null_mut(), fresh, SeqCst, SeqCst) {
                    Ok(_) => next = fresh,
                    Err(actual) => unsafe {
                        drop(Box::from_raw(fresh));
                        next = actual;
                    },
                }
            }
            curr = unsafe { &*next };
        }
    }
}

impl<T: Default, const N: usize> Default for SlotList<T, N> {
    fn default() -> Self {
        Self {
            head: Node::default(),
        }
    }
}

unsafe impl<T: Default + Send + Sync, const N: usize> Send for SlotList<T, N> {}

unsafe impl<T: Default + Send + Sync, const N: usize> Sync for SlotList<T, N> {}

struct Node<T, const N: usize> {
    items: [T; N],
    next: AtomicPtr<Node<T, N>>,
}

impl<T: Default, const N: usize> Default for Node<T, N> {
    fn default() -> Self {
        Self {
            items: array::from_fn(|_| T::default()),
            next: AtomicPtr::default(),
        }
    }
}

impl<T, const N: usize> Drop for Node<T, N> {
    fn drop(&mut self) {
        // Unlink iteratively so a long tail cannot overflow the stack.
        let mut next = *self.next.get_mut();
        while !next.is_null() {
            let mut node = unsafe { Box::from_raw(next) };
            next = *node.next.get_mut();
            *node.next.get_mut() = null_mut();
        }
    }
}

pub(crate) struct Iter<'a, T, const N: usize> {
    node: Option<&'a Node<T, N>>,
    index: usize,
}

impl<'a, T, const N: usize> Iterator for Iter<'a, T, N> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.node?;
            if let Some(item) = node.items.get(self.index) {
                self.index += 1;
                return Some(item);
            }
            self.node = unsafe { node.next.load(SeqCst).as_ref() };
            self.index = 0;
        }
    }
}
