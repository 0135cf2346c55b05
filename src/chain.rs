//! Operators that derive a new [`Promise`] from an existing one.
//!
//! Each operator returns its downstream promise right away and drives it from
//! an observer on the upstream one. Chain observers run on whichever thread
//! resolves the upstream promise. A failure upstream is passed down as-is and
//! the mapper is never called.
//!
use crate::{Error, ErrorValue, Outcome, Promise};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
};

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    /// Transforms the success value.
    ///
    /// A panic inside `mapper` does not escape into the resolving thread; the
    /// downstream promise fails with [`Error::MapperPanicked`] instead.
    ///
    /// # Examples
    ///
    /// ```
    /// use result_promise::Promise;
    ///
    /// let words = Promise::<String>::new();
    /// let length = words.then_map(|s| s.len());
    /// words.resolve_value("Test".into());
    /// assert_eq!(length.peek().and_then(|o| o.success()), Some(4));
    /// ```
    pub fn then_map<U, F>(&self, mapper: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then_try_map(move |value| Ok::<U, ErrorValue>(mapper(value)))
    }

    /// Transforms the success value with a mapper that may fail; an `Err`
    /// becomes the downstream failure.
    ///
    /// ```
    /// use result_promise::Promise;
    ///
    /// let raw = Promise::<String>::new();
    /// let parsed = raw.then_try_map(|s| s.parse::<u32>());
    /// raw.resolve_value("forty-two".into());
    /// let err = parsed.peek().and_then(|o| o.failure()).unwrap();
    /// assert!(err.is::<std::num::ParseIntError>());
    /// ```
    pub fn then_try_map<U, E, F>(&self, mapper: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        E: Into<ErrorValue>,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        self.pipe(move |value| match catch_unwind(AssertUnwindSafe(|| mapper(value))) {
            Ok(result) => result.into(),
            Err(payload) => Outcome::Failure(Error::MapperPanicked(panic_message(payload)).into()),
        })
    }

    /// Replaces the success value with whatever `mapper` decides, success or
    /// failure.
    pub fn then_result<U, F>(&self, mapper: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        self.pipe(mapper)
    }

    /// Continues with another asynchronous step. The downstream promise
    /// settles when the promise returned by `mapper` does.
    ///
    /// # Examples
    ///
    /// ```
    /// use result_promise::Promise;
    /// use std::thread;
    ///
    /// let name = Promise::<String>::new();
    /// let length = name.then_future(|s| {
    ///     let inner = Promise::new();
    ///     let producer = inner.clone();
    ///     thread::spawn(move || producer.resolve_value(s.len()));
    ///     inner
    /// });
    /// name.resolve_value("abcde".into());
    /// assert_eq!(futures::executor::block_on(length).success(), Some(5));
    /// ```
    pub fn then_future<U, F>(&self, mapper: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        let next = Promise::new();
        let downstream = next.clone();
        self.on_complete(move |outcome| match outcome {
            Outcome::Success(value) => {
                let success = downstream.clone();
                mapper(value)
                    .on_success(move |value| {
                        success.resolve_value(value);
                    })
                    .on_error(move |err| {
                        downstream.resolve_error(err);
                    });
            }
            Outcome::Failure(err) => {
                downstream.resolve_error(err);
            }
        });
        next
    }

    /// Drives a fresh promise from this one's outcome through `step`.
    fn pipe<U, F>(&self, step: F) -> Promise<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        let next = Promise::new();
        let downstream = next.clone();
        self.on_complete(move |outcome| {
            downstream.resolve_result(outcome.flat_map(step));
        });
        next
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "non-string panic payload".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use crate::{Error, ErrorValue, Outcome, Promise};
    use parking_lot::Mutex;
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
    };

    #[derive(Debug, thiserror::Error, PartialEq)]
    enum TestError {
        #[error("test")]
        Test,
        #[error("empty input")]
        EmptyInput,
    }

    fn settled<T: Clone + Send + 'static>(promise: &Promise<T>) -> Outcome<T> {
        promise.peek().expect("promise should be resolved")
    }

    #[test]
    fn test_then_a_to_type_b() {
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        let promise_a = Promise::<String>::new();
        let promise_b = promise_a.then_map(move |s| {
            *slot.lock() = Some(s.clone());
            s.len()
        });
        assert!(!promise_b.is_resolved());

        promise_a.resolve_value("Test".into());
        assert_eq!(seen.lock().as_deref(), Some("Test"));
        assert_eq!(settled(&promise_b).success(), Some(4));
    }

    #[test]
    fn test_map_short_circuits_on_failure() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let cause = ErrorValue::new(TestError::Test);
        let promise_a = Promise::<String>::rejected(cause.clone());
        let promise_b = promise_a.then_map(move |s| {
            flag.store(true, Ordering::SeqCst);
            s.len()
        });

        assert!(!called.load(Ordering::SeqCst));
        assert!(settled(&promise_b).failure().unwrap().ptr_eq(&cause));
    }

    #[test]
    fn test_map_error_becomes_failure() {
        let promise_a = Promise::<String>::new();
        let promise_b = promise_a.then_try_map(|s| {
            if s.is_empty() {
                Err(TestError::EmptyInput)
            } else {
                Ok(s.len())
            }
        });
        promise_a.resolve_value(String::new());
        let err = settled(&promise_b).failure().unwrap();
        assert_eq!(err.downcast_ref::<TestError>(), Some(&TestError::EmptyInput));
    }

    #[test]
    fn test_map_panic_becomes_failure() {
        let promise_a = Promise::<u32>::new();
        let promise_b = promise_a.then_map(|n| -> u32 { panic!("cannot map {n}") });
        assert!(promise_a.resolve_value(7));
        let err = settled(&promise_b).failure().unwrap();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MapperPanicked(msg)) if msg == "cannot map 7"
        ));
    }

    #[test]
    fn test_chain_composition() {
        let f = Promise::<String>::new();
        let f2 = f.then_map(|s| s.len());
        let f3 = f2.then_result(|n| {
            if n > 0 {
                Outcome::Success(n)
            } else {
                Outcome::Failure(TestError::EmptyInput.into())
            }
        });
        f.resolve_value("Test".into());
        assert_eq!(settled(&f3).success(), Some(4));
    }

    #[test]
    fn test_then_result_failure_from_mapper() {
        let f = Promise::<String>::new();
        let f2 = f.then_result(|s| -> Outcome<usize> {
            if s.is_empty() {
                Outcome::Failure(TestError::EmptyInput.into())
            } else {
                Outcome::Success(s.len())
            }
        });
        f.resolve_value(String::new());
        assert!(settled(&f2).failure().unwrap().is::<TestError>());
    }

    #[test]
    fn test_flat_result_failure_skips_mapper() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let promise_a = Promise::<String>::new();
        let promise_b = promise_a.then_result(move |s| {
            flag.store(true, Ordering::SeqCst);
            Outcome::Success(s.len())
        });
        promise_a.resolve_error(TestError::Test);
        assert!(!called.load(Ordering::SeqCst));
        assert!(settled(&promise_b).is_failure());
    }

    #[test]
    fn test_async_chain() {
        let f = Promise::<String>::new();
        let g = f.then_future(|s| {
            let inner = Promise::<usize>::new();
            inner.resolve_value(s.len());
            inner
        });
        f.resolve_value("abcde".into());
        assert_eq!(settled(&g).success(), Some(5));
    }

    #[test]
    fn test_async_chain_waits_for_inner_promise() {
        let inner = Promise::<usize>::new();
        let handed_out = inner.clone();
        let f = Promise::<String>::new();
        let g = f.then_future(move |_| handed_out);

        f.resolve_value("abc".into());
        assert!(!g.is_resolved());

        let producer = inner.clone();
        thread::spawn(move || producer.resolve_error(TestError::Test))
            .join()
            .expect("The producer thread has panicked");
        assert!(settled(&g).failure().unwrap().is::<TestError>());
    }

    #[test]
    fn test_failure_through_three_stages() {
        let called = Arc::new(AtomicBool::new(false));
        let (c1, c2, c3) = (called.clone(), called.clone(), called.clone());
        let cause = ErrorValue::new(TestError::Test);
        let promise = Promise::<String>::new();
        let last = promise
            .then_map(move |s| {
                c1.store(true, Ordering::SeqCst);
                s
            })
            .then_result(move |s| {
                c2.store(true, Ordering::SeqCst);
                Outcome::Success(s)
            })
            .then_future(move |s| {
                c3.store(true, Ordering::SeqCst);
                Promise::resolved(s)
            });

        let errors = Arc::new(Mutex::new(vec![]));
        let sink = errors.clone();
        last.on_error(move |err| sink.lock().push(err));

        promise.resolve_error(cause.clone());
        assert!(!called.load(Ordering::SeqCst));
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].ptr_eq(&cause));
    }

    #[test]
    fn test_chain_after_success() {
        let promise = Promise::resolved("Test".to_string());
        let last = promise
            .then_map(|s| s)
            .then_result(Outcome::Success)
            .then_future(Promise::resolved);
        assert_eq!(settled(&last).success().as_deref(), Some("Test"));
    }

    #[test]
    fn test_observers_and_chain_share_order() {
        let log = Arc::new(Mutex::new(vec![]));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        let promise = Promise::<u8>::new();
        let next = promise
            .on_success(move |_| a.lock().push("first"))
            .then_map(move |n| {
                b.lock().push("map");
                n * 2
            });
        promise.on_complete(move |_| c.lock().push("last"));

        promise.resolve_value(21);
        assert_eq!(*log.lock(), vec!["first", "map", "last"]);
        assert_eq!(settled(&next).success(), Some(42));
    }

    #[test]
    fn test_chain_runs_on_resolving_thread() {
        let promise = Promise::<u8>::new();
        let mapped_on = promise.then_map(|_| thread::current().id());
        let producer = promise.clone();
        let resolver = thread::spawn(move || {
            producer.resolve_value(1);
            thread::current().id()
        })
        .join()
        .expect("The producer thread has panicked");
        assert_eq!(settled(&mapped_on).success(), Some(resolver));
    }
}
