//! Execution contexts decide where an observer runs.
//!
//! A handler registered with a context runs inline when the promise is
//! resolved on that context, and is redispatched onto it otherwise. The
//! handle is always passed explicitly; there is no ambient "current queue".
//!
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    fmt,
    sync::{
        mpsc::{channel, Sender},
        Arc, OnceLock,
    },
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// A unit of work handed to an [`ExecutionContext`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A context handle as captured by an observer.
pub type SharedContext = Arc<dyn ExecutionContext>;

pub trait ExecutionContext: Send + Sync {
    /// Whether the calling thread is already running on this context.
    fn is_current(&self) -> bool;

    /// Run `job` on this context, at some later point.
    fn execute(&self, job: Job);
}

/// Runs `job` inline when `context` is current, dispatches it otherwise.
pub(crate) fn run_on(context: &SharedContext, job: Job) {
    if context.is_current() {
        job()
    } else {
        context.execute(job)
    }
}

/// Runs every job on whichever thread asks. Observers registered without an
/// explicit context use this.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

static IMMEDIATE: OnceLock<SharedContext> = OnceLock::new();

impl Immediate {
    /// The process-wide handle; cloning it never allocates.
    pub fn shared() -> SharedContext {
        IMMEDIATE.get_or_init(|| Arc::new(Immediate)).clone()
    }
}

impl ExecutionContext for Immediate {
    fn is_current(&self) -> bool {
        true
    }

    fn execute(&self, job: Job) {
        job()
    }
}

/// A job queue owned by the thread that created it, in the manner of a UI
/// main loop: other threads only enqueue, the owner drains.
///
/// # Examples
///
/// ```
/// use result_promise::{Promise, RunLoop};
/// use std::{thread, time::Duration};
///
/// let run_loop = RunLoop::new();
/// let promise = Promise::<u32>::new();
/// let owner = thread::current().id();
/// promise.on_success_in(run_loop.context(), move |n| {
///     assert_eq!(thread::current().id(), owner);
///     assert_eq!(n, 7);
/// });
///
/// let producer = promise.clone();
/// thread::spawn(move || producer.resolve_value(7));
/// assert!(run_loop.run_one(Duration::from_secs(5)));
/// ```
#[derive(Clone)]
pub struct RunLoop {
    inner: Arc<RunLoopInner>,
}

struct RunLoopInner {
    owner: ThreadId,
    jobs: Mutex<VecDeque<Job>>,
    ready: Condvar,
}

impl RunLoop {
    /// Creates a run loop owned by the calling thread.
    pub fn new() -> Self {
        RunLoop {
            inner: Arc::new(RunLoopInner {
                owner: thread::current().id(),
                jobs: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
            }),
        }
    }

    pub fn context(&self) -> SharedContext {
        Arc::new(self.clone())
    }

    pub fn pending(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    /// Runs every queued job, including ones queued while draining, and
    /// returns how many ran. Only the owning thread drains.
    pub fn run_pending(&self) -> usize {
        if !self.is_current() {
            warn!("run_pending called off the run loop's owning thread");
            return 0;
        }
        let mut ran = 0;
        loop {
            let job = self.inner.jobs.lock().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Waits up to `timeout` for a single job and runs it.
    pub fn run_one(&self, timeout: Duration) -> bool {
        if !self.is_current() {
            warn!("run_one called off the run loop's owning thread");
            return false;
        }
        let deadline = Instant::now() + timeout;
        let job = {
            let mut jobs = self.inner.jobs.lock();
            loop {
                if let Some(job) = jobs.pop_front() {
                    break job;
                }
                if self.inner.ready.wait_until(&mut jobs, deadline).timed_out() {
                    match jobs.pop_front() {
                        Some(job) => break job,
                        None => return false,
                    }
                }
            }
        };
        job();
        true
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLoop")
            .field("owner", &self.inner.owner)
            .field("pending", &self.pending())
            .finish()
    }
}

impl ExecutionContext for RunLoop {
    fn is_current(&self) -> bool {
        thread::current().id() == self.inner.owner
    }

    fn execute(&self, job: Job) {
        self.inner.jobs.lock().push_back(job);
        self.inner.ready.notify_one();
    }
}

/// A dedicated background thread draining an mpsc channel of jobs in order.
///
/// Dropping the queue closes the channel and joins the thread once the
/// already queued jobs have run.
pub struct WorkerQueue {
    name: String,
    thread_id: ThreadId,
    sender: Mutex<Option<Sender<Job>>>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerQueue {
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (tx, rx) = channel::<Job>();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            for job in rx {
                job()
            }
        })?;
        debug!(queue = %name, "worker queue started");
        Ok(WorkerQueue {
            name,
            thread_id: handle.thread().id(),
            sender: Mutex::new(Some(tx)),
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for WorkerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerQueue")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

impl ExecutionContext for WorkerQueue {
    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn execute(&self, job: Job) {
        let rejected = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).err().map(|err| err.0),
            None => Some(job),
        };
        // A closed queue still owes the handler its single run.
        if let Some(job) = rejected {
            warn!(queue = %self.name, "worker queue closed, running job inline");
            job()
        }
    }
}

impl Drop for WorkerQueue {
    fn drop(&mut self) {
        self.sender.lock().take();
        if let Some(handle) = self.handle.take() {
            // The last reference may be released by one of our own jobs.
            if thread::current().id() == self.thread_id {
                debug!(queue = %self.name, "worker queue released on its own thread, detaching");
                return;
            }
            if handle.join().is_err() {
                warn!(queue = %self.name, "worker queue thread panicked");
            }
        }
        debug!(queue = %self.name, "worker queue stopped");
    }
}
