use crate::error::{Error, SettleError};
use std::{
    fmt, mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::Waker,
};
use tracing::{trace, warn};

type OnFulfilled<V> = Box<dyn FnOnce(V) + Send + 'static>;
type OnRejected = Box<dyn FnOnce(Error) + Send + 'static>;

/// Where a promise is in its life. `Pending` is the only non-terminal state.
#[derive(Debug, Clone)]
pub enum State<V> {
    Pending,
    Fulfilled(V),
    Rejected(Error),
}

impl<V> State<V> {
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, State::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, State::Rejected(_))
    }
}

impl<V: Clone> State<V> {
    pub(crate) fn outcome(&self) -> Option<Result<V, Error>> {
        match self {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(error) => Some(Err(error.clone())),
        }
    }
}

pub(crate) struct Inner<V> {
    pub(crate) state: State<V>,
    fulfill_callbacks: Vec<OnFulfilled<V>>,
    reject_callbacks: Vec<OnRejected>,
    pub(crate) wakers: Vec<Waker>,
    // Live `Resolver` handles. Zero while pending means nobody can settle it.
    pub(crate) resolvers: usize,
}

impl<V> Inner<V> {
    fn new(state: State<V>, resolvers: usize) -> Self {
        Self {
            state,
            fulfill_callbacks: vec![],
            reject_callbacks: vec![],
            wakers: vec![],
            resolvers,
        }
    }
}

pub(crate) type Shared<V> = Arc<Mutex<Inner<V>>>;

// User callbacks never run under this lock, so a poisoned mutex still holds
// consistent state.
pub(crate) fn lock<V>(shared: &Shared<V>) -> MutexGuard<'_, Inner<V>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A single-assignment container for the eventual outcome of an
/// asynchronous operation.
///
/// A `Promise` is a shared handle: clones observe the same state. Observers
/// attached to an already settled promise run immediately, observers attached
/// to a pending one are queued and run, in registration order, on settlement.
///
/// # Examples
///
/// ```
/// use promise_chain::{Promise, State};
///
/// let (promise, resolver) = Promise::<i32>::pending();
/// let doubled = promise.map(|v| v + 1).map(|v| v * 2);
/// assert!(doubled.is_pending());
///
/// resolver.fulfill(3).unwrap();
/// assert!(matches!(doubled.state(), State::Fulfilled(8)));
/// ```
pub struct Promise<V> {
    inner: Shared<V>,
}

impl<V> Clone for Promise<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone + Send + 'static> Promise<V> {
    /// Creates a promise driven by `task`.
    ///
    /// The task runs right away, on the calling thread, and is handed the
    /// promise's [`Resolver`]. It may settle before returning or move the
    /// resolver elsewhere and settle later.
    pub fn new<F>(task: F) -> Self
    where
        F: FnOnce(Resolver<V>),
    {
        let (promise, resolver) = Self::pending();
        task(resolver);
        promise
    }

    /// Creates a pending promise with no task; the returned resolver is the
    /// only way to settle it.
    pub fn pending() -> (Self, Resolver<V>) {
        let inner = Arc::new(Mutex::new(Inner::new(State::Pending, 1)));
        (
            Self {
                inner: inner.clone(),
            },
            Resolver { inner },
        )
    }

    pub fn fulfilled(value: V) -> Self {
        Self::settled(State::Fulfilled(value))
    }

    pub fn rejected(error: Error) -> Self {
        Self::settled(State::Rejected(error))
    }

    fn settled(state: State<V>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new(state, 0))),
        }
    }

    /// Registers an observer pair and returns this same promise.
    ///
    /// Exactly one of the two callbacks will ever run. If the promise is
    /// already settled it runs before `then` returns.
    pub fn then<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Self
    where
        F: FnOnce(V) + Send + 'static,
        R: FnOnce(Error) + Send + 'static,
    {
        let outcome = {
            let mut inner = lock(&self.inner);
            match inner.state.outcome() {
                Some(outcome) => outcome,
                None if inner.resolvers == 0 => {
                    // Abandoned: neither callback can ever run. Dropping them
                    // abandons whatever they would have settled.
                    drop(inner);
                    drop(on_fulfilled);
                    drop(on_rejected);
                    return self.clone();
                }
                None => {
                    inner.fulfill_callbacks.push(Box::new(on_fulfilled));
                    inner.reject_callbacks.push(Box::new(on_rejected));
                    return self.clone();
                }
            }
        };
        match outcome {
            Ok(value) => on_fulfilled(value),
            Err(error) => on_rejected(error),
        }
        self.clone()
    }

    /// Observes a rejection without touching the success path.
    pub fn catch_error<R>(&self, on_rejected: R) -> Self
    where
        R: FnOnce(Error) + Send + 'static,
    {
        self.then(|_| {}, on_rejected)
    }

    /// Chains an asynchronous step.
    ///
    /// The returned promise follows the promise produced by `f`. A rejection
    /// of `self` is forwarded as is and `f` never runs.
    ///
    /// ```
    /// use promise_chain::{Error, Promise, State};
    ///
    /// let chained = Promise::fulfilled(true)
    ///     .and_then(|ok| {
    ///         if ok {
    ///             Promise::fulfilled(String::from("A"))
    ///         } else {
    ///             Promise::rejected(Error::msg("wrong info"))
    ///         }
    ///     })
    ///     .map(|s| s + "!");
    /// assert!(matches!(chained.state(), State::Fulfilled(s) if s == "A!"));
    /// ```
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(V) -> Promise<U> + Send + 'static,
    {
        let source = self.clone();
        Promise::new(move |resolver: Resolver<U>| {
            let rejecter = resolver.clone();
            source.then(
                move |value| f(value).forward(resolver),
                move |error| {
                    let _ = rejecter.reject(error);
                },
            );
        })
    }

    /// Transforms the success value. A rejection is forwarded as is and `f`
    /// never runs.
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(V) -> U + Send + 'static,
    {
        let source = self.clone();
        Promise::new(move |resolver: Resolver<U>| {
            let rejecter = resolver.clone();
            source.then(
                move |value| {
                    let _ = resolver.fulfill(f(value));
                },
                move |error| {
                    let _ = rejecter.reject(error);
                },
            );
        })
    }

    fn forward(&self, resolver: Resolver<V>) {
        let rejecter = resolver.clone();
        self.then(
            move |value| {
                let _ = resolver.fulfill(value);
            },
            move |error| {
                let _ = rejecter.reject(error);
            },
        );
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> State<V> {
        lock(&self.inner).state.clone()
    }
}

impl<V> Promise<V> {
    pub fn is_pending(&self) -> bool {
        lock(&self.inner).state.is_pending()
    }

    /// Whether both handles refer to the same promise.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    pub(crate) fn shared(&self) -> &Shared<V> {
        &self.inner
    }
}

impl<V: fmt::Debug> fmt::Debug for Promise<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &lock(&self.inner).state)
            .finish()
    }
}

/// The settling side of a [`Promise`].
///
/// Only the first `fulfill` or `reject` across all clones takes effect; later
/// calls leave the promise untouched and return a [`SettleError`].
pub struct Resolver<V> {
    inner: Shared<V>,
}

struct Drained<V> {
    fulfill: Vec<OnFulfilled<V>>,
    reject: Vec<OnRejected>,
    wakers: Vec<Waker>,
}

impl<V: Clone + Send + 'static> Resolver<V> {
    /// ```
    /// use promise_chain::{Promise, SettleError};
    /// use std::sync::{Arc, Mutex};
    ///
    /// let seen = Arc::new(Mutex::new(vec![]));
    /// let (promise, resolver) = Promise::<&str>::pending();
    /// let log = seen.clone();
    /// promise.then(move |v| log.lock().unwrap().push(v), |_| {});
    ///
    /// assert_eq!(resolver.fulfill("🍓"), Ok(()));
    /// assert_eq!(resolver.fulfill("🍐"), Err(SettleError::AlreadyFulfilled));
    /// assert_eq!(*seen.lock().unwrap(), vec!["🍓"]);
    /// ```
    pub fn fulfill(&self, value: V) -> Result<(), SettleError> {
        let drained = self.settle(State::Fulfilled(value.clone()))?;
        trace!(callbacks = drained.fulfill.len(), "promise fulfilled");
        for callback in drained.fulfill {
            callback(value.clone());
        }
        drained.wakers.into_iter().for_each(Waker::wake);
        drop(drained.reject);
        Ok(())
    }

    pub fn reject(&self, error: Error) -> Result<(), SettleError> {
        let drained = self.settle(State::Rejected(error.clone()))?;
        trace!(callbacks = drained.reject.len(), %error, "promise rejected");
        for callback in drained.reject {
            callback(error.clone());
        }
        drained.wakers.into_iter().for_each(Waker::wake);
        drop(drained.fulfill);
        Ok(())
    }

    /// Settles with a `Result`, `Ok` fulfilling and `Err` rejecting.
    pub fn settle_with(&self, result: Result<V, Error>) -> Result<(), SettleError> {
        match result {
            Ok(value) => self.fulfill(value),
            Err(error) => self.reject(error),
        }
    }

    // Callbacks are handed back and run after the lock is released.
    fn settle(&self, state: State<V>) -> Result<Drained<V>, SettleError> {
        let mut inner = lock(&self.inner);
        match inner.state {
            State::Pending => {}
            State::Fulfilled(_) => {
                warn!("ignoring settlement of an already fulfilled promise");
                return Err(SettleError::AlreadyFulfilled);
            }
            State::Rejected(_) => {
                warn!("ignoring settlement of an already rejected promise");
                return Err(SettleError::AlreadyRejected);
            }
        }
        inner.state = state;
        Ok(Drained {
            fulfill: mem::take(&mut inner.fulfill_callbacks),
            reject: mem::take(&mut inner.reject_callbacks),
            wakers: mem::take(&mut inner.wakers),
        })
    }
}

impl<V> Resolver<V> {
    pub fn is_settled(&self) -> bool {
        !lock(&self.inner).state.is_pending()
    }
}

impl<V> Clone for Resolver<V> {
    fn clone(&self) -> Self {
        lock(&self.inner).resolvers += 1;
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Drop for Resolver<V> {
    /// If this was the last resolver of a pending promise, its queued
    /// callbacks can never run. They are released, which in turn abandons any
    /// promise chained off this one, and waiters are woken.
    fn drop(&mut self) {
        let abandoned = {
            let mut inner = lock(&self.inner);
            inner.resolvers -= 1;
            if inner.resolvers == 0 && inner.state.is_pending() {
                Some(Drained {
                    fulfill: mem::take(&mut inner.fulfill_callbacks),
                    reject: mem::take(&mut inner.reject_callbacks),
                    wakers: mem::take(&mut inner.wakers),
                })
            } else {
                None
            }
        };
        if let Some(drained) = abandoned {
            drop(drained.fulfill);
            drop(drained.reject);
            drained.wakers.into_iter().for_each(Waker::wake);
        }
    }
}

impl<V> fmt::Debug for Resolver<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}
