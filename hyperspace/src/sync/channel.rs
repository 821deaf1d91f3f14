//! A single-slot signalling channel.
//!
//! The sender side overwrites: posting a new message before the receiver
//! has taken the previous one replaces it. That is the behaviour the slot
//! pipeline wants for "latest state wins" signals. When back-pressure is
//! needed, [`send_wait`] parks the sender until the slot is free.
//!
//! Single-executor use only: the cell is never touched from two threads.
//!
//! [`send_wait`]: Sender::send_wait

use core::cell::{Cell, RefCell};
use core::future::poll_fn;
use core::task::{Poll, Waker};

struct Slot<T> {
    message: Option<T>,
    rx_waker: Option<Waker>,
    tx_waker: Option<Waker>,
}

/// A single-slot channel. [`split`](Self::split) it into a sender and a
/// receiver half.
pub struct Channel<T> {
    slot: RefCell<Slot<T>>,
    // Set when a send replaced an unread message, for diagnostics.
    overwrites: Cell<usize>,
}

impl<T> Channel<T> {
    /// Create a new, empty channel.
    pub const fn new() -> Self {
        Self {
            slot: RefCell::new(Slot { message: None, rx_waker: None, tx_waker: None }),
            overwrites: Cell::new(0),
        }
    }

    /// Split the channel into its sender and receiver halves, resetting
    /// any previous state.
    pub fn split(&mut self) -> (Sender<'_, T>, Receiver<'_, T>) {
        *self = Self::new();
        (Sender { channel: self }, Receiver { channel: self })
    }

    /// How many messages have been overwritten before being received.
    pub fn overwrites(&self) -> usize {
        self.overwrites.get()
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The sending half of a [`Channel`].
pub struct Sender<'a, T> {
    channel: &'a Channel<T>,
}

impl<T> Sender<'_, T> {
    /// Post a message, replacing any unread one. Returns `true` when a
    /// previous message was replaced.
    ///
    /// Sends may originate from the radio interrupt; the critical
    /// section orders them against the task-level receive.
    pub fn send(&self, message: T) -> bool {
        critical_section::with(|_| {
            let mut slot = self.channel.slot.borrow_mut();
            let replaced = slot.message.replace(message).is_some();
            if replaced {
                self.channel.overwrites.set(self.channel.overwrites.get() + 1);
            }
            if let Some(waker) = slot.rx_waker.take() {
                waker.wake();
            }
            replaced
        })
    }

    /// Returns `true` when an unread message is pending.
    pub fn is_full(&self) -> bool {
        self.channel.slot.borrow().message.is_some()
    }

    /// Wait until the slot is free, then post.
    pub async fn send_wait(&self, message: T) {
        poll_fn(|cx| {
            let mut slot = self.channel.slot.borrow_mut();
            if slot.message.is_some() {
                match &mut slot.tx_waker {
                    Some(waker) if waker.will_wake(cx.waker()) => {}
                    // A second sender task displaces the first; wake it so
                    // it re-queues itself.
                    Some(waker) => {
                        waker.wake_by_ref();
                        waker.clone_from(cx.waker());
                    }
                    waker @ None => *waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await;

        self.send(message);
    }
}

/// The receiving half of a [`Channel`].
pub struct Receiver<'a, T> {
    channel: &'a Channel<T>,
}

impl<T> Receiver<'_, T> {
    /// Wait for a message.
    pub async fn receive(&self) -> T {
        poll_fn(|cx| {
            let mut slot = self.channel.slot.borrow_mut();
            match slot.message.take() {
                Some(message) => {
                    if let Some(waker) = slot.tx_waker.take() {
                        waker.wake();
                    }
                    Poll::Ready(message)
                }
                None => {
                    match &mut slot.rx_waker {
                        Some(waker) => waker.clone_from(cx.waker()),
                        waker @ None => *waker = Some(cx.waker().clone()),
                    }
                    Poll::Pending
                }
            }
        })
        .await
    }

    /// Take a message without waiting.
    pub fn try_receive(&self) -> Option<T> {
        let mut slot = self.channel.slot.borrow_mut();
        let message = slot.message.take();
        if message.is_some() {
            if let Some(waker) = slot.tx_waker.take() {
                waker.wake();
            }
        }
        message
    }

    /// Returns `true` when a message is pending.
    pub fn has_item(&self) -> bool {
        self.channel.slot.borrow().message.is_some()
    }
}

#[cfg(test)]
mod tests {
    use pollster::FutureExt as _;

    use super::*;
    use crate::sync::join::join;
    use crate::sync::yield_now::yield_now;

    #[test]
    fn send_then_receive() {
        async {
            let mut channel = Channel::new();
            let (tx, rx) = channel.split();
            tx.send(7);
            assert_eq!(rx.receive().await, 7);
        }
        .block_on();
    }

    #[test]
    fn overwrite_keeps_latest() {
        let mut channel = Channel::new();
        let (tx, rx) = channel.split();
        assert!(!tx.send(1));
        assert!(tx.send(2));
        assert_eq!(rx.try_receive(), Some(2));
        assert_eq!(rx.try_receive(), None);
        assert_eq!(channel.overwrites(), 1);
    }

    #[test]
    fn ping_pong() {
        async {
            let mut channel = Channel::new();
            let (tx, rx) = channel.split();

            join(
                async {
                    for i in 0..16 {
                        tx.send_wait(i).await;
                    }
                },
                async {
                    for i in 0..16 {
                        assert_eq!(rx.receive().await, i);
                        yield_now().await;
                    }
                },
            )
            .await;
        }
        .block_on();
    }

    #[test]
    fn drop_replaced_message() {
        async {
            let mut channel = Channel::new();
            let (tx, rx) = channel.split();
            tx.send(Box::new(1));
            tx.send(Box::new(2));
            tx.send(Box::new(3));
            assert_eq!(*rx.receive().await, 3);
        }
        .block_on();
    }
}
