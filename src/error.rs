//! The failure payload carried by every [`Outcome`](crate::Outcome).
//!
use std::{error::Error as StdError, fmt, sync::Arc};

type Cause = dyn StdError + Send + Sync + 'static;

/// A type-erased, cheaply cloneable failure cause.
///
/// Every observer of a failed promise receives its own clone, all of them
/// pointing at the same underlying error. Any `std::error::Error` converts
/// into it with `?` or `.into()`.
///
/// # Examples
///
/// ```
/// use result_promise::ErrorValue;
///
/// let err: ErrorValue = std::io::Error::other("disk on fire").into();
/// assert!(err.is::<std::io::Error>());
/// assert_eq!(err.to_string(), "disk on fire");
/// ```
#[derive(Clone)]
pub struct ErrorValue(Arc<Cause>);

impl ErrorValue {
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        ErrorValue(Arc::new(err))
    }

    /// A failure that is nothing more than a message.
    pub fn msg(message: impl Into<String>) -> Self {
        ErrorValue(Arc::new(Message(message.into())))
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.0.is::<E>()
    }

    /// True when both values are clones of the same failure.
    pub fn ptr_eq(&self, other: &ErrorValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_error(&self) -> &Cause {
        &*self.0
    }
}

// No `impl StdError for ErrorValue`: it would overlap with the blanket `From`.
impl<E> From<E> for ErrorValue
where
    E: StdError + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        ErrorValue::new(err)
    }
}

impl fmt::Debug for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}
