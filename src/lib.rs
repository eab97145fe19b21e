//! A single-assignment promise with chaining combinators.
//!
//! A [`Promise`] starts pending and settles exactly once, either fulfilled
//! with a value or rejected with an [`Error`]. Observers registered with
//! [`Promise::then`] run in registration order when it settles, or
//! immediately if it already has. [`Promise::map`] and [`Promise::and_then`]
//! build new promises off old ones, so a sequence of asynchronous steps reads
//! as a flat pipeline instead of nested callbacks:
//!
//! ```
//! use promise_chain::{scheduler::ManualScheduler, Error, Promise, State};
//! use std::time::Duration;
//!
//! let scheduler = ManualScheduler::new();
//! let fetch = |ok: bool| {
//!     Promise::after(&scheduler, Duration::from_secs(1), move || {
//!         if ok { Ok(ok) } else { Err(Error::msg("network")) }
//!     })
//! };
//!
//! let list = fetch(true);
//! let info = fetch(true);
//! let done = list
//!     .and_then(move |_| info)
//!     .map(|_| "ok")
//!     .catch_error(|err| println!("{err}"));
//!
//! scheduler.run_until_idle();
//! assert!(matches!(done.state(), State::Fulfilled("ok")));
//! ```
//!
//! Settlement is guarded by a mutex, so producers may settle from any thread.
//! Callbacks run on whichever thread settles the promise.

mod error;
mod promise;
pub mod scheduler;
mod wait;

pub use error::{Abandoned, Error, SettleError};
pub use promise::{Promise, Resolver, State};
pub use wait::Wait;
