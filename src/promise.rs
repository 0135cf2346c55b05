use crate::{
    context::{run_on, Immediate, SharedContext},
    ErrorValue, Outcome,
};
use parking_lot::Mutex;
use std::{
    fmt,
    future::Future,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, Waker},
};
use tracing::warn;

/// A single-assignment, shared cell that eventually holds an [`Outcome`].
///
/// Clones are handles to the same cell: the producer keeps one to resolve
/// it, consumers keep others to observe or chain. The first resolution wins
/// and every later attempt is ignored.
///
/// # Examples
///
/// ```
/// use result_promise::Promise;
/// use futures::executor::block_on;
/// use std::thread;
///
/// let promise = Promise::<String>::new();
/// let producer = promise.clone();
/// let task = thread::spawn(move || producer.resolve_value("Hi".into()));
///
/// promise
///     .on_success(|s| println!("Received {s}"))
///     .on_error(|err| println!("Failed with {err}"));
/// assert_eq!(block_on(promise).success().as_deref(), Some("Hi"));
/// task.join().expect("The producer thread has panicked.");
/// ```
pub struct Promise<T> {
    promise: Arc<Mutex<Inner<T>>>,
    // Slot in `Inner::wakers` owned by this handle once it has been polled.
    waker_key: Option<usize>,
}

struct Inner<T> {
    state: Option<Outcome<T>>,
    observers: Vec<Observer<T>>,
    wakers: Vec<(usize, Waker)>,
    next_waker: usize,
}

enum Handler<T> {
    Success(Box<dyn FnOnce(T) + Send>),
    Failure(Box<dyn FnOnce(ErrorValue) + Send>),
    Complete(Box<dyn FnOnce(Outcome<T>) + Send>),
}

struct Observer<T> {
    context: SharedContext,
    handler: Handler<T>,
}

impl<T> Observer<T>
where
    T: Clone + Send + 'static,
{
    /// Hands `outcome` to the handler if its kind matches, on the captured
    /// context.
    fn notify(self, outcome: &Outcome<T>) {
        let Observer { context, handler } = self;
        match (handler, outcome) {
            (Handler::Success(handler), Outcome::Success(value)) => {
                let value = value.clone();
                run_on(&context, Box::new(move || handler(value)))
            }
            (Handler::Failure(handler), Outcome::Failure(err)) => {
                let err = err.clone();
                run_on(&context, Box::new(move || handler(err)))
            }
            (Handler::Complete(handler), outcome) => {
                let outcome = outcome.clone();
                run_on(&context, Box::new(move || handler(outcome)))
            }
            _ => {}
        }
    }
}

impl<T> Promise<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Promise {
            promise: Arc::new(Mutex::new(Inner {
                state: None,
                observers: vec![],
                wakers: vec![],
                next_waker: 0,
            })),
            waker_key: None,
        }
    }

    /// A promise that is already resolved to `outcome`.
    pub fn from_outcome(outcome: Outcome<T>) -> Self {
        let promise = Self::new();
        promise.resolve_result(outcome);
        promise
    }

    pub fn resolved(value: T) -> Self {
        Self::from_outcome(Outcome::Success(value))
    }

    pub fn rejected(err: impl Into<ErrorValue>) -> Self {
        Self::from_outcome(Outcome::Failure(err.into()))
    }

    pub fn resolve_value(&self, value: T) -> bool {
        self.resolve_result(Outcome::Success(value))
    }

    pub fn resolve_error(&self, err: impl Into<ErrorValue>) -> bool {
        self.resolve_result(Outcome::Failure(err.into()))
    }

    /// Settles the promise, wakes every task awaiting it, then notifies every
    /// pending observer in the order they were registered.
    ///
    /// If a handler running on this thread panics, the remaining observers
    /// still run and the first panic is resumed afterwards.
    ///
    /// Returns `false`, leaving the promise untouched, if it was already
    /// resolved.
    ///
    /// ```
    /// use result_promise::{ErrorValue, Outcome, Promise};
    ///
    /// let promise = Promise::<u8>::new();
    /// assert!(promise.resolve_result(Outcome::Success(1)));
    /// assert!(!promise.resolve_error(ErrorValue::msg("too late")));
    /// assert_eq!(promise.peek().and_then(Outcome::success), Some(1));
    /// ```
    pub fn resolve_result(&self, outcome: Outcome<T>) -> bool {
        let (observers, wakers) = {
            let mut promise = self.promise.lock();
            if let Some(ref current) = promise.state {
                let resolved_to = if current.is_success() { "success" } else { "failure" };
                warn!(resolved_to, "promise already resolved, ignoring resolution");
                return false;
            }
            promise.state = Some(outcome.clone());
            (
                std::mem::take(&mut promise.observers),
                std::mem::take(&mut promise.wakers),
            )
        };
        for (_, waker) in wakers {
            waker.wake()
        }
        // Handlers run outside the lock so they may touch this promise again.
        let mut panicked = None;
        for observer in observers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| observer.notify(&outcome))) {
                panicked.get_or_insert(payload);
            }
        }
        if let Some(payload) = panicked {
            resume_unwind(payload)
        }
        true
    }

    /// Runs `handler` with the value if the promise succeeds.
    pub fn on_success<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_success_in(Immediate::shared(), handler)
    }

    /// Runs `handler` with the cause if the promise fails.
    pub fn on_error<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(ErrorValue) + Send + 'static,
    {
        self.on_error_in(Immediate::shared(), handler)
    }

    /// Runs `handler` once the promise resolves, whichever way.
    pub fn on_complete<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.on_complete_in(Immediate::shared(), handler)
    }

    /// Like [`on_success`](Promise::on_success), but `handler` always runs
    /// on `context`.
    pub fn on_success_in<F>(&self, context: SharedContext, handler: F) -> &Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.observe(Observer {
            context,
            handler: Handler::Success(Box::new(handler)),
        })
    }

    pub fn on_error_in<F>(&self, context: SharedContext, handler: F) -> &Self
    where
        F: FnOnce(ErrorValue) + Send + 'static,
    {
        self.observe(Observer {
            context,
            handler: Handler::Failure(Box::new(handler)),
        })
    }

    pub fn on_complete_in<F>(&self, context: SharedContext, handler: F) -> &Self
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.observe(Observer {
            context,
            handler: Handler::Complete(Box::new(handler)),
        })
    }

    /// Queues `observer`, or notifies it right away when already resolved.
    /// The check and the push happen under the same lock as resolution.
    fn observe(&self, observer: Observer<T>) -> &Self {
        let resolved = {
            let mut guard = self.promise.lock();
            let promise = &mut *guard;
            match promise.state {
                Some(ref outcome) => outcome.clone(),
                None => {
                    promise.observers.push(observer);
                    return self;
                }
            }
        };
        observer.notify(&resolved);
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.promise.lock().state.is_some()
    }

    /// The outcome, if the promise has resolved. Never waits.
    pub fn peek(&self) -> Option<Outcome<T>> {
        self.promise.lock().state.clone()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            promise: self.promise.clone(),
            waker_key: None,
        }
    }
}

impl<T> Default for Promise<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Promise<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let promise = self.promise.lock();
        f.debug_struct("Promise")
            .field("state", &promise.state)
            .field("observers", &promise.observers.len())
            .finish()
    }
}

impl<T> Future for Promise<T>
where
    T: Clone + Send + 'static,
{
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut guard = this.promise.lock();
        let promise = &mut *guard;
        if let Some(ref outcome) = promise.state {
            return Poll::Ready(outcome.clone());
        }
        let slot = this
            .waker_key
            .and_then(|key| promise.wakers.iter_mut().find(|(k, _)| *k == key));
        match slot {
            Some((_, waker)) => {
                if !waker.will_wake(cx.waker()) {
                    *waker = cx.waker().clone();
                }
            }
            None => {
                let key = promise.next_waker;
                promise.next_waker += 1;
                promise.wakers.push((key, cx.waker().clone()));
                this.waker_key = Some(key);
            }
        }
        Poll::Pending
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(key) = self.waker_key {
            self.promise.lock().wakers.retain(|(k, _)| *k != key);
        }
    }
}

impl<T> Drop for Inner<T> {
    /// The last handle of an unresolved promise is gone; its observers are
    /// dropped without ever running.
    fn drop(&mut self) {
        if self.state.is_none() && !self.observers.is_empty() {
            warn!(
                observers = self.observers.len(),
                "promise dropped while pending, observers will never run"
            );
        }
    }
}
