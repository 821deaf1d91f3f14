//! A bounded async FIFO.
//!
//! Unlike the signalling [`Channel`](crate::sync::channel::Channel), the
//! queue never drops: [`push`](Queue::push) fails when full so the caller
//! can surface `QueueFull`, and [`pop`](Queue::pop) waits for work. The
//! MAC outbound path runs on one of these.

use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Poll, Waker};

use heapless::Deque;

struct Inner<T, const N: usize> {
    items: Deque<T, N>,
    pop_waker: Option<Waker>,
}

/// A bounded single-executor FIFO of `N` items.
pub struct Queue<T, const N: usize> {
    inner: RefCell<Inner<T, N>>,
}

impl<T, const N: usize> Queue<T, N> {
    /// Create a new, empty queue.
    pub const fn new() -> Self {
        Self { inner: RefCell::new(Inner { items: Deque::new(), pop_waker: None }) }
    }

    /// Append an item. Returns it back when the queue is full.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.borrow_mut();
        inner.items.push_back(item)?;
        if let Some(waker) = inner.pop_waker.take() {
            waker.wake();
        }
        Ok(())
    }

    /// Push an item to the front, ahead of queued work. Used to requeue a
    /// frame that lost its slot.
    pub fn push_front(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.borrow_mut();
        inner.items.push_front(item)?;
        if let Some(waker) = inner.pop_waker.take() {
            waker.wake();
        }
        Ok(())
    }

    /// Wait for the next item.
    pub async fn pop(&self) -> T {
        poll_fn(|cx| {
            let mut inner = self.inner.borrow_mut();
            match inner.items.pop_front() {
                Some(item) => Poll::Ready(item),
                None => {
                    match &mut inner.pop_waker {
                        Some(waker) => waker.clone_from(cx.waker()),
                        waker @ None => *waker = Some(cx.waker().clone()),
                    }
                    Poll::Pending
                }
            }
        })
        .await
    }

    /// Take the next item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.borrow_mut().items.pop_front()
    }

    /// Returns the number of queued items.
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use pollster::FutureExt as _;

    use super::*;
    use crate::sync::join::join;
    use crate::sync::yield_now::yield_now;

    #[test]
    fn fifo_order() {
        let queue: Queue<u8, 4> = Queue::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push_front(0).unwrap();
        assert_eq!(queue.try_pop(), Some(0));
        assert_eq!(queue.try_pop(), Some(1));
        assert_eq!(queue.try_pop(), Some(2));
        assert_eq!(queue.try_pop(), None);
    }

    #[test]
    fn full_queue_rejects() {
        let queue: Queue<u8, 2> = Queue::new();
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.push(3), Err(3));
    }

    #[test]
    fn pop_waits_for_push() {
        async {
            let queue: Queue<u8, 2> = Queue::new();
            join(
                async {
                    assert_eq!(queue.pop().await, 9);
                },
                async {
                    yield_now().await;
                    queue.push(9).unwrap();
                },
            )
            .await;
        }
        .block_on();
    }
}
