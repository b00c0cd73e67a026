//! # Job Pool
//!
//! Fixed set of named worker threads fed through a crossbeam channel.
//!
//! ```text
//! schedule(deps=[A, B], f)
//!      │
//!      ▼
//!  Pending { remaining: 3 } ──registered on──> A, B
//!      │        (2 deps + 1 guard released after registration)
//!      ▼  remaining hits 0
//!  channel ──> strata-worker-N ──> f(&ctx) ──> completion ──> dependents
//! ```
//!
//! A job is queued only after all of its dependencies completed, so workers
//! never wait on other jobs. A job whose dependency panicked is not run and
//! completes as panicked itself; `JobHandle::wait` reports it.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use super::accumulator::WorkerContext;
use crate::error::{CoreError, CoreResult};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

type JobFn = Box<dyn FnOnce(&WorkerContext) + Send + 'static>;

/// A runnable job and the signal it fires when done.
struct Task {
    run: JobFn,
    completion: Arc<Completion>,
}

struct CompletionState {
    done: bool,
    panicked: bool,
    continuations: Vec<Arc<Pending>>,
}

/// Completion signal shared by a job and its handles.
struct Completion {
    state: Mutex<CompletionState>,
    condvar: Condvar,
}

impl Completion {
    fn new(done: bool) -> Self {
        Self {
            state: Mutex::new(CompletionState {
                done,
                panicked: false,
                continuations: Vec::new(),
            }),
            condvar: Condvar::new(),
        }
    }

    fn finish(&self, panicked: bool) {
        let continuations = {
            let mut state = self.state.lock();
            state.done = true;
            state.panicked = panicked;
            std::mem::take(&mut state.continuations)
        };
        self.condvar.notify_all();

        for pending in continuations {
            pending.arrive(panicked);
        }
    }

    /// Runs `pending.arrive` now if done, otherwise when the job finishes.
    fn notify(&self, pending: &Arc<Pending>) {
        let finished = {
            let mut state = self.state.lock();
            if state.done {
                Some(state.panicked)
            } else {
                state.continuations.push(Arc::clone(pending));
                None
            }
        };
        if let Some(panicked) = finished {
            pending.arrive(panicked);
        }
    }

    fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while !state.done {
            self.condvar.wait(&mut state);
        }
        !state.panicked
    }
}

/// A job waiting for its dependencies.
struct Pending {
    remaining: AtomicUsize,
    poisoned: AtomicBool,
    task: Mutex<Option<Task>>,
    sender: Sender<Task>,
}

impl Pending {
    fn arrive(&self, dependency_panicked: bool) {
        if dependency_panicked {
            self.poisoned.store(true, Ordering::Release);
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        let Some(task) = self.task.lock().take() else {
            return;
        };
        if self.poisoned.load(Ordering::Acquire) {
            let Task { run, completion } = task;
            drop(run);
            completion.finish(true);
        } else {
            dispatch(&self.sender, task);
        }
    }
}

fn dispatch(sender: &Sender<Task>, task: Task) {
    if let Err(rejected) = sender.send(task) {
        let Task { run, completion } = rejected.into_inner();
        drop(run);
        completion.finish(true);
    }
}

/// Handle to a scheduled job.
///
/// Cloning is cheap; every clone observes the same completion.
#[derive(Clone)]
pub struct JobHandle {
    completion: Arc<Completion>,
}

impl JobHandle {
    /// A handle that is already complete. Useful as a neutral dependency.
    #[must_use]
    pub fn completed() -> Self {
        Self {
            completion: Arc::new(Completion::new(true)),
        }
    }

    /// Blocks until the job finished.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JobPanicked`] if the job or any job it
    /// transitively depended on panicked.
    pub fn wait(&self) -> CoreResult<()> {
        if self.completion.wait() {
            Ok(())
        } else {
            Err(CoreError::JobPanicked)
        }
    }

    /// Returns whether the job finished, successfully or not.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.completion.state.lock().done
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle").field("done", &self.is_done()).finish()
    }
}

/// Fixed-size worker pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = JobPool::new(4)?;
/// let a = pool.schedule(&[], |_| prepare());
/// let b = pool.parallel_for(1024, 64, &[a], |_ctx, range| process(range));
/// b.wait()?;
/// ```
pub struct JobPool {
    id: u64,
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl JobPool {
    /// Starts `worker_count` threads (at least one).
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn new(worker_count: usize) -> CoreResult<Self> {
        let worker_count = worker_count.max(1);
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded::<Task>();

        let mut workers = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("strata-worker-{index}"))
                .spawn(move || worker_loop(id, index, &receiver))
                .map_err(|e| CoreError::WorkerSpawn(e.to_string()))?;
            workers.push(handle);
        }

        tracing::debug!(pool = id, workers = worker_count, "job pool started");
        Ok(Self {
            id,
            sender: Some(sender),
            workers,
        })
    }

    /// Starts one worker per available core.
    ///
    /// # Errors
    ///
    /// Returns an error if a thread cannot be spawned.
    pub fn with_default_workers() -> CoreResult<Self> {
        let count = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::new(count)
    }

    /// Number of worker threads.
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Identity stamped into every [`WorkerContext`] of this pool.
    #[inline]
    #[must_use]
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    /// Schedules `job` to run once every handle in `deps` completed.
    ///
    /// Must not be called from inside a job that then waits on the result.
    pub fn schedule<F>(&self, deps: &[JobHandle], job: F) -> JobHandle
    where
        F: FnOnce(&WorkerContext) + Send + 'static,
    {
        let completion = Arc::new(Completion::new(false));
        let task = Task {
            run: Box::new(job),
            completion: Arc::clone(&completion),
        };

        let Some(sender) = &self.sender else {
            completion.finish(true);
            return JobHandle { completion };
        };

        if deps.is_empty() {
            dispatch(sender, task);
        } else {
            let pending = Arc::new(Pending {
                remaining: AtomicUsize::new(deps.len() + 1),
                poisoned: AtomicBool::new(false),
                task: Mutex::new(Some(task)),
                sender: sender.clone(),
            });
            for dep in deps {
                dep.completion.notify(&pending);
            }
            pending.arrive(false);
        }

        JobHandle { completion }
    }

    /// A handle that completes when all `handles` completed.
    pub fn combine(&self, handles: &[JobHandle]) -> JobHandle {
        match handles {
            [] => JobHandle::completed(),
            [single] => single.clone(),
            _ => self.schedule(handles, |_| {}),
        }
    }

    /// Runs `body` over `0..len` in chunks of `batch` indices.
    ///
    /// Chunks may run concurrently in any order. The returned handle
    /// completes when every chunk completed.
    pub fn parallel_for<F>(&self, len: usize, batch: usize, deps: &[JobHandle], body: F) -> JobHandle
    where
        F: Fn(&WorkerContext, Range<usize>) + Send + Sync + 'static,
    {
        if len == 0 {
            return self.combine(deps);
        }

        let batch = batch.max(1);
        let body = Arc::new(body);
        let chunks: Vec<JobHandle> = (0..len)
            .step_by(batch)
            .map(|start| {
                let body = Arc::clone(&body);
                let range = start..(start + batch).min(len);
                self.schedule(deps, move |ctx| body(ctx, range))
            })
            .collect();

        self.combine(&chunks)
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!(pool = self.id, "worker thread exited abnormally");
            }
        }
        tracing::debug!(pool = self.id, "job pool stopped");
    }
}

fn worker_loop(pool: u64, index: usize, receiver: &Receiver<Task>) {
    let ctx = WorkerContext::new(pool, index);

    while let Ok(Task { run, completion }) = receiver.recv() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| run(&ctx)));
        if let Err(payload) = &outcome {
            let message = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("<non-string panic>");
            tracing::error!(pool, worker = index, panic = message, "job panicked");
        }
        completion.finish(outcome.is_err());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_schedule_and_wait() {
        let pool = JobPool::new(2).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let handle = pool.schedule(&[], move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        handle.wait().unwrap();
        assert!(handle.is_done());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dependencies_run_first() {
        let pool = JobPool::new(4).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = Arc::clone(&log);
        let first = pool.schedule(&[], move |_| {
            thread::sleep(std::time::Duration::from_millis(20));
            l.lock().push("first");
        });
        let l = Arc::clone(&log);
        let second = pool.schedule(&[first.clone()], move |_| l.lock().push("second"));
        let l = Arc::clone(&log);
        let third = pool.schedule(&[first, second.clone()], move |_| l.lock().push("third"));

        third.wait().unwrap();
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_parallel_for_covers_every_index_once() {
        let pool = JobPool::new(4).unwrap();
        let seen: Arc<Vec<AtomicUsize>> = Arc::new((0..1000).map(|_| AtomicUsize::new(0)).collect());

        let s = Arc::clone(&seen);
        pool.parallel_for(1000, 7, &[], move |_, range| {
            for i in range {
                s[i].fetch_add(1, Ordering::Relaxed);
            }
        })
        .wait()
        .unwrap();

        assert!(seen.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn test_parallel_for_empty_waits_for_deps() {
        let pool = JobPool::new(1).unwrap();
        let handle = pool.parallel_for(0, 16, &[], |_, _| unreachable!());
        handle.wait().unwrap();
        assert!(JobHandle::completed().is_done());
    }

    #[test]
    fn test_panic_poisons_dependents() {
        let pool = JobPool::new(2).unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        let bad = pool.schedule(&[], |_| panic!("boom"));
        let r = Arc::clone(&ran);
        let dependent = pool.schedule(&[bad.clone()], move |_| r.store(true, Ordering::SeqCst));

        assert_eq!(bad.wait(), Err(CoreError::JobPanicked));
        assert_eq!(dependent.wait(), Err(CoreError::JobPanicked));
        assert!(!ran.load(Ordering::SeqCst));

        // The pool survives the panic.
        pool.schedule(&[], |_| {}).wait().unwrap();
    }

    #[test]
    fn test_workers_are_named() {
        let pool = JobPool::new(1).unwrap();
        let name = Arc::new(Mutex::new(String::new()));
        let n = Arc::clone(&name);
        pool.schedule(&[], move |ctx| {
            *n.lock() = thread::current().name().unwrap_or_default().to_string();
            assert_eq!(ctx.index(), 0);
        })
        .wait()
        .unwrap();
        assert_eq!(*name.lock(), "strata-worker-0");
    }
}
