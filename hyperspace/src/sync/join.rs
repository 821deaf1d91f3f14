//! Run two futures to completion concurrently.

use core::future::Future;
use core::pin::pin;
use core::task::Poll;

/// Poll both futures until both complete, returning both outputs.
pub async fn join<A, B>(a: A, b: B) -> (A::Output, B::Output)
where
    A: Future,
    B: Future,
{
    let mut a = pin!(a);
    let mut b = pin!(b);
    let mut out_a = None;
    let mut out_b = None;

    core::future::poll_fn(move |cx| {
        if out_a.is_none() {
            if let Poll::Ready(value) = a.as_mut().poll(cx) {
                out_a = Some(value);
            }
        }
        if out_b.is_none() {
            if let Poll::Ready(value) = b.as_mut().poll(cx) {
                out_b = Some(value);
            }
        }
        if out_a.is_some() && out_b.is_some() {
            Poll::Ready((out_a.take().unwrap(), out_b.take().unwrap()))
        } else {
            Poll::Pending
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use pollster::FutureExt as _;

    use super::*;
    use crate::sync::tests::PollCountTimer;

    #[test]
    fn both_complete() {
        async {
            let (a, b) = join(async { 1 }, PollCountTimer::new(3)).await;
            assert_eq!(a, 1);
            assert_eq!(b, ());
        }
        .block_on();
    }
}
