//! Lets a [`Promise`] be consumed from async code.

use crate::{
    error::{Abandoned, Error},
    promise::{lock, Promise},
};
use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    task::{Context, Poll},
};
use tracing::debug;

/// Future returned by [`Promise::wait`]. Any number of waiters may watch the
/// same promise; each gets its own clone of the outcome.
///
/// # Examples
///
/// ```
/// use promise_chain::Promise;
/// use futures::executor::block_on;
/// use std::thread;
/// let (promise, resolver) = Promise::<String>::pending();
///
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received {:?}", promise.await);
/// }));
/// resolver.fulfill("Hi".into()).unwrap();
/// task1.join().expect("The task1 thread has panicked.");
/// ```
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Wait<V> {
    promise: Promise<V>,
}

impl<V: Clone + Send + 'static> Promise<V> {
    pub fn wait(&self) -> Wait<V> {
        Wait {
            promise: self.clone(),
        }
    }
}

impl<V: Clone> Future for Wait<V> {
    type Output = Result<V, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = lock(self.promise.shared());
        if let Some(outcome) = inner.state.outcome() {
            return Poll::Ready(outcome);
        }
        if inner.resolvers == 0 {
            debug!("waiting on a promise nobody can settle");
            return Poll::Ready(Err(Error::new(Abandoned)));
        }
        if !inner.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            inner.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<V: Clone + Send + 'static> IntoFuture for Promise<V> {
    type Output = Result<V, Error>;
    type IntoFuture = Wait<V>;

    fn into_future(self) -> Self::IntoFuture {
        Wait { promise: self }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Abandoned, Error, Promise};
    use futures::executor::block_on;
    use std::thread;

    #[test]
    fn test_wait_resolve() {
        let (op, resolver) = Promise::<String>::pending();
        let task1 = thread::spawn(move || block_on(op.wait()));
        let task2 = thread::spawn(move || {
            resolver.fulfill(String::from("🍓")).unwrap();
        });
        task2.join().expect("The task2 thread has panicked");
        let value = task1.join().expect("The task1 thread has panicked");
        assert_eq!(value.unwrap(), "🍓");
    }

    #[test]
    fn test_two_waiters_resolve() {
        let (op, resolver) = Promise::<String>::pending();
        let op_b = op.clone();
        let task1 = thread::spawn(move || block_on(async { op.await }));
        let task2 = thread::spawn(move || block_on(async { op_b.await }));
        let task3 = thread::spawn(move || resolver.fulfill(String::from("🍓")));
        task3.join().expect("The task3 thread has panicked").unwrap();
        assert_eq!(task1.join().expect("The task1 thread has panicked").unwrap(), "🍓");
        assert_eq!(task2.join().expect("The task2 thread has panicked").unwrap(), "🍓");
    }

    #[test]
    fn test_wait_reject() {
        let promise = Promise::<i32>::rejected(Error::msg("reject!!"));
        let err = block_on(promise.map(|v| v + 1).wait()).unwrap_err();
        assert_eq!(err.to_string(), "reject!!");
    }

    #[test]
    fn test_wait_unresolved() {
        let (op, resolver) = Promise::<String>::pending();
        let task1 = thread::spawn(move || block_on(op.wait()));
        let task2 = thread::spawn(move || {
            // Move the resolver into this thread but never settle it.
            std::mem::drop(resolver);
        });
        task2.join().expect("The task2 thread has panicked");
        let err = task1
            .join()
            .expect("The task1 thread has panicked")
            .unwrap_err();
        assert!(err.is::<Abandoned>());
    }

    #[test]
    fn test_abandoned_leaves_state_pending() {
        let (op, resolver) = Promise::<i32>::pending();
        drop(resolver);
        assert!(block_on(op.wait()).is_err());
        assert!(op.is_pending());
    }

    #[test]
    fn test_abandoned_reaches_chained_promises() {
        let (op, resolver) = Promise::<i32>::pending();
        let chained = op.map(|v| v + 1).and_then(Promise::fulfilled);
        let task1 = thread::spawn(move || block_on(chained.wait()));
        drop(resolver);
        let err = task1
            .join()
            .expect("The task1 thread has panicked")
            .unwrap_err();
        assert!(err.is::<Abandoned>());
    }

    #[test]
    fn test_chaining_after_abandonment() {
        let (op, resolver) = Promise::<i32>::pending();
        drop(resolver);
        let mapped = op.map(|v| v + 1);
        let chained = op.and_then(Promise::fulfilled).then(|_| {}, |_| {});
        let task1 = thread::spawn(move || block_on(mapped.wait()));
        let task2 = thread::spawn(move || block_on(chained.wait()));
        let err = task1
            .join()
            .expect("The task1 thread has panicked")
            .unwrap_err();
        assert!(err.is::<Abandoned>());
        let err = task2
            .join()
            .expect("The task2 thread has panicked")
            .unwrap_err();
        assert!(err.is::<Abandoned>());
        assert!(op.is_pending());
    }
}
