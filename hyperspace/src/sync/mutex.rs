//! A cooperative async mutex.

use core::cell::{RefCell, UnsafeCell};
use core::future::poll_fn;
use core::ops::{Deref, DerefMut};
use core::task::{Poll, Waker};

/// A mutex whose lock operation is async. Contention only ever comes from
/// other tasks on the same executor; there is no blocking.
pub struct Mutex<T> {
    value: UnsafeCell<T>,
    state: RefCell<State>,
}

struct State {
    locked: bool,
    waiter: Option<Waker>,
}

impl<T> Mutex<T> {
    /// Create a new mutex.
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            state: RefCell::new(State { locked: false, waiter: None }),
        }
    }

    /// Lock the mutex, waiting for the current holder to release it.
    pub async fn lock(&self) -> MutexGuard<'_, T> {
        poll_fn(|cx| {
            let mut state = self.state.borrow_mut();
            if state.locked {
                match &mut state.waiter {
                    Some(waker) if waker.will_wake(cx.waker()) => {}
                    // Wake a displaced waiter so it retries; fairness does
                    // not matter with the two or three tasks we run.
                    Some(waker) => {
                        waker.wake_by_ref();
                        waker.clone_from(cx.waker());
                    }
                    waker @ None => *waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            } else {
                state.locked = true;
                Poll::Ready(())
            }
        })
        .await;

        MutexGuard { mutex: self }
    }

    /// Try to lock the mutex without waiting.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut state = self.state.borrow_mut();
        if state.locked {
            None
        } else {
            state.locked = true;
            Some(MutexGuard { mutex: self })
        }
    }

    /// Get mutable access without locking. Requires exclusive ownership,
    /// so no other task can hold a guard.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

/// An RAII guard over a locked [`Mutex`].
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard proves the lock is held, and all tasks run on
        // the same executor thread.
        #[allow(unsafe_code)]
        unsafe {
            &*self.mutex.value.get()
        }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: as for Deref; the guard is unique while locked.
        #[allow(unsafe_code)]
        unsafe {
            &mut *self.mutex.value.get()
        }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.mutex.state.borrow_mut();
        state.locked = false;
        if let Some(waker) = state.waiter.take() {
            waker.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use pollster::FutureExt as _;

    use super::*;
    use crate::sync::join::join;
    use crate::sync::yield_now::yield_now;

    #[test]
    fn exclusive_access() {
        async {
            let mutex = Mutex::new(0u32);

            join(
                async {
                    for _ in 0..10 {
                        let mut guard = mutex.lock().await;
                        let value = *guard;
                        yield_now().await;
                        *guard = value + 1;
                    }
                },
                async {
                    for _ in 0..10 {
                        let mut guard = mutex.lock().await;
                        let value = *guard;
                        yield_now().await;
                        *guard = value + 1;
                    }
                },
            )
            .await;

            assert_eq!(*mutex.lock().await, 20);
        }
        .block_on();
    }

    #[test]
    fn try_lock_contention() {
        let mutex = Mutex::new(());
        let guard = mutex.try_lock().unwrap();
        assert!(mutex.try_lock().is_none());
        drop(guard);
        assert!(mutex.try_lock().is_some());
    }
}
