use crate::ErrorValue;

/// The settled state of a [`Promise`](crate::Promise): either a value or
/// the cause of a failure, never both.
///
/// # Examples
///
/// ```
/// use result_promise::{ErrorValue, Outcome};
///
/// let len = Outcome::Success("four".to_string()).map(|s| s.len());
/// assert_eq!(len.into_result().unwrap(), 4);
///
/// let failed: Outcome<usize> = Outcome::Failure(ErrorValue::msg("nope"));
/// assert!(failed.flat_map(|n| Outcome::Success(n + 1)).is_failure());
/// ```
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Success(T),
    Failure(ErrorValue),
}

impl<T> Outcome<T> {
    /// Transforms a success value. `mapper` is not called on a failure, and
    /// a panic inside it is not caught here.
    pub fn map<U, F>(self, mapper: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Outcome::Success(value) => Outcome::Success(mapper(value)),
            Outcome::Failure(err) => Outcome::Failure(err),
        }
    }

    /// Like [`map`](Outcome::map), but `mapper` may itself fail.
    pub fn flat_map<U, F>(self, mapper: F) -> Outcome<U>
    where
        F: FnOnce(T) -> Outcome<U>,
    {
        match self {
            Outcome::Success(value) => mapper(value),
            Outcome::Failure(err) => Outcome::Failure(err),
        }
    }

    /// Unwraps into Rust's error channel, so `outcome.into_result()?` yields
    /// the value or returns the embedded cause.
    pub fn into_result(self) -> Result<T, ErrorValue> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(err) => Err(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(self) -> Option<ErrorValue> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(err) => Some(err),
        }
    }

    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Outcome::Success(value) => Outcome::Success(value),
            Outcome::Failure(err) => Outcome::Failure(err.clone()),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T>
where
    E: Into<ErrorValue>,
{
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err.into()),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T, ErrorValue> {
    fn from(outcome: Outcome<T>) -> Self {
        outcome.into_result()
    }
}
