use std::{error::Error as StdError, fmt, sync::Arc};

/// The rejection value carried by every [`Promise`](crate::Promise).
///
/// The payload is opaque to the promise machinery; it is cloned to each
/// observer and only ever inspected by user code through
/// [`Error::downcast_ref`].
#[derive(Clone)]
pub struct Error {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

impl Error {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// Builds an error out of a plain message.
    ///
    /// ```
    /// use promise_chain::Error;
    /// let err = Error::msg("💥");
    /// assert_eq!(err.to_string(), "💥");
    /// ```
    pub fn msg<M: fmt::Display>(message: M) -> Self {
        Self::new(Message(message.to_string()))
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

/// Returned by a [`Resolver`](crate::Resolver) when the promise was already
/// settled. The promise keeps its first outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SettleError {
    #[error("promise was already fulfilled")]
    AlreadyFulfilled,
    #[error("promise was already rejected")]
    AlreadyRejected,
}

/// Yielded by [`Wait`](crate::Wait) when every resolver of a pending promise
/// was dropped, so it can never settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("every resolver was dropped before the promise settled")]
pub struct Abandoned;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum Fetch {
        #[error("network is down")]
        Network,
    }

    #[test]
    fn test_error_downcast() {
        let err = Error::new(Fetch::Network);
        assert!(err.is::<Fetch>());
        assert_eq!(err.downcast_ref::<Fetch>(), Some(&Fetch::Network));
        assert!(err.downcast_ref::<Abandoned>().is_none());
        assert_eq!(err.to_string(), "network is down");
    }

    #[test]
    fn test_error_clone_shares_payload() {
        let err = Error::msg("reject!!");
        let copy = err.clone();
        assert!(Arc::ptr_eq(&err.inner, &copy.inner));
        assert_eq!(format!("{:?}", copy), "Message(\"reject!!\")");
    }
}
