//! Race two futures.

use core::future::Future;
use core::pin::pin;
use core::task::Poll;

use super::Either;

/// Poll both futures until one completes, dropping the other.
///
/// The first future is polled first, so it wins simultaneous readiness.
pub async fn select<A, B>(a: A, b: B) -> Either<A::Output, B::Output>
where
    A: Future,
    B: Future,
{
    let mut a = pin!(a);
    let mut b = pin!(b);

    core::future::poll_fn(move |cx| {
        if let Poll::Ready(value) = a.as_mut().poll(cx) {
            return Poll::Ready(Either::First(value));
        }
        if let Poll::Ready(value) = b.as_mut().poll(cx) {
            return Poll::Ready(Either::Second(value));
        }
        Poll::Pending
    })
    .await
}

#[cfg(test)]
mod tests {
    use pollster::FutureExt as _;

    use super::*;
    use crate::sync::tests::PollCountTimer;

    #[test]
    fn first_wins_ties() {
        async {
            match select(async { 1 }, async { 2 }).await {
                Either::First(value) => assert_eq!(value, 1),
                Either::Second(_) => panic!("first future should win"),
            }
        }
        .block_on();
    }

    #[test]
    fn slower_future_loses() {
        async {
            match select(PollCountTimer::new(5), async { 42 }).await {
                Either::First(_) => panic!("timer should lose"),
                Either::Second(value) => assert_eq!(value, 42),
            }
        }
        .block_on();
    }
}
