//! Single-assignment promises that settle to an [`Outcome`].
//!
//! A [`Promise`] is created by a producer, handed to any number of consumers,
//! and resolved exactly once from whatever thread the work finishes on.
//! Consumers attach observers or chain further promises before or after that
//! happens; both behave the same.
//!
//! ```
//! use result_promise::{ErrorValue, Outcome, Promise};
//!
//! let request = Promise::<String>::new();
//! let length = request
//!     .on_error(|err| eprintln!("request failed: {err}"))
//!     .then_map(|body| body.len())
//!     .then_result(|n| match n {
//!         0 => Outcome::Failure(ErrorValue::msg("empty body")),
//!         n => Outcome::Success(n),
//!     });
//!
//! request.resolve_value("Test".into());
//! assert_eq!(length.peek().and_then(Outcome::success), Some(4));
//! ```
//!
mod chain;
pub mod context;
mod error;
mod outcome;
mod promise;

pub use context::{ExecutionContext, Immediate, Job, RunLoop, SharedContext, WorkerQueue};
pub use error::ErrorValue;
pub use outcome::Outcome;
pub use promise::Promise;

/// Failures produced by this crate itself rather than by a producer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `then_map` or `then_try_map` mapper panicked.
    #[error("mapper panicked: {0}")]
    MapperPanicked(String),
}
