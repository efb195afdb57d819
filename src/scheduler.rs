// MIT License
//
// Copyright (c) 2025 Ronan LE MEILLAT for SCTG Development
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Periodic job scheduler.
//!
//! Each job gets its own OS thread and sleeps between invocations on a
//! shared stop signal. Dropping the signal's sender wakes every sleeper at
//! once, so shutdown does not wait out a job's period.
//!
//! A failing or panicking action is logged and the job carries on with its
//! next tick. Sibling jobs never see it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Used by `Drop` when the scheduler was never stopped explicitly.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between two invocations of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// Sleep this long after each invocation.
    Every(Duration),
    /// Invoke back-to-back.
    Continuous,
}

impl Period {
    pub fn secs(secs: f64) -> Self {
        Period::Every(Duration::from_secs_f64(secs))
    }
}

/// How long a job keeps running once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFor {
    For(Duration),
    Indefinitely,
}

/// Handed to the action on every invocation.
#[derive(Debug, Clone, Copy)]
pub struct JobContext {
    /// Time since the scheduler was created.
    pub elapsed: Duration,
    /// 1 for the first invocation.
    pub invocation: u64,
}

type Action = Box<dyn FnMut(&JobContext) -> anyhow::Result<()> + Send + 'static>;

pub struct Job {
    name: String,
    period: Period,
    run_for: RunFor,
    action: Action,
}

impl Job {
    pub fn new<F>(name: impl Into<String>, period: Period, run_for: RunFor, action: F) -> Self
    where
        F: FnMut(&JobContext) -> anyhow::Result<()> + Send + 'static,
    {
        Job {
            name: name.into(),
            period,
            run_for,
            action: Box::new(action),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of [`Scheduler::stop`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// Jobs whose threads exited and were joined by this call.
    pub joined: Vec<String>,
    /// Jobs still inside an invocation when the timeout ran out.
    pub still_running: Vec<String>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.still_running.is_empty()
    }
}

/// Receiving end of the stop signal. Nothing is ever sent on the channel;
/// the signal is raised by dropping the sender.
#[derive(Clone)]
struct StopSignal(Receiver<()>);

impl StopSignal {
    fn is_raised(&self) -> bool {
        matches!(self.0.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `timeout`, returning early with `true` if stop is raised.
    fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.0.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
    // disconnects when the job thread returns
    done: Receiver<()>,
}

impl Worker {
    fn is_finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }
}

struct Inner {
    stop_tx: Option<Sender<()>>,
    signal: StopSignal,
    workers: Vec<Worker>,
}

type Teardown = Box<dyn FnOnce() + Send + 'static>;

pub struct Scheduler {
    origin: Instant,
    inner: Mutex<Inner>,
    teardown: Mutex<Vec<Teardown>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = channel::bounded(0);
        Scheduler {
            origin: Instant::now(),
            inner: Mutex::new(Inner {
                stop_tx: Some(stop_tx),
                signal: StopSignal(stop_rx),
                workers: Vec::new(),
            }),
            teardown: Mutex::new(Vec::new()),
        }
    }

    /// Register work to run once, after the job threads exit, on the first stop.
    pub fn on_shutdown<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.teardown.lock().push(Box::new(hook));
    }

    /// Start every job on its own thread.
    pub fn run(&self, jobs: Vec<Job>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.stop_tx.is_none() {
            return Err(Error::Io(std::io::Error::other(
                "scheduler already stopped; jobs not started",
            )));
        }
        for job in jobs {
            let name = job.name.clone();
            let signal = inner.signal.clone();
            let origin = self.origin;
            let (done_tx, done_rx) = channel::bounded::<()>(0);
            let handle = thread::Builder::new()
                .name(format!("job-{name}"))
                .spawn(move || {
                    let _done = done_tx;
                    run_job(job, &signal, origin);
                })?;
            inner.workers.push(Worker {
                name,
                handle,
                done: done_rx,
            });
        }
        Ok(())
    }

    /// Number of job threads that have not exited yet.
    pub fn active_jobs(&self) -> usize {
        self.inner
            .lock()
            .workers
            .iter()
            .filter(|w| !w.is_finished())
            .count()
    }

    pub fn is_running(&self) -> bool {
        self.active_jobs() > 0
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().stop_tx.is_none()
    }

    /// Ask every job to finish, wait up to `timeout` for their threads, then
    /// run the shutdown hooks.
    ///
    /// Safe to call any number of times and from several threads: callers
    /// queue on the same lock, and hooks run only once.
    ///
    /// Hooks run after the first wait even if some jobs timed out. A hook
    /// that parks hardware must keep it parked against those stragglers, as
    /// [`Bioreactor::shutdown`](crate::peripherals::Bioreactor::shutdown) does.
    pub fn stop(&self, timeout: Duration) -> StopReport {
        let mut inner = self.inner.lock();
        if inner.stop_tx.take().is_some() {
            info!("Stopping {} scheduled job(s)", inner.workers.len());
        }

        let deadline = Instant::now() + timeout;
        let mut report = StopReport::default();
        let mut stragglers = Vec::new();
        for worker in inner.workers.drain(..) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match worker.done.recv_timeout(remaining) {
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Job '{}' did not exit within {:?}", worker.name, timeout);
                    report.still_running.push(worker.name.clone());
                    stragglers.push(worker);
                }
                _ => {
                    if worker.handle.join().is_err() {
                        error!("Job '{}' thread panicked outside its action", worker.name);
                    }
                    debug!("Job '{}' joined", worker.name);
                    report.joined.push(worker.name);
                }
            }
        }
        inner.workers = stragglers;

        let hooks: Vec<Teardown> = std::mem::take(&mut *self.teardown.lock());
        for hook in hooks {
            hook();
        }
        report
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop(DEFAULT_STOP_TIMEOUT);
    }
}

fn run_job(mut job: Job, signal: &StopSignal, origin: Instant) {
    let started = Instant::now();
    let mut invocation = 0u64;
    info!(
        "Job '{}' started (period {:?}, run for {:?})",
        job.name, job.period, job.run_for
    );

    loop {
        if signal.is_raised() {
            break;
        }
        if let RunFor::For(limit) = job.run_for {
            if started.elapsed() >= limit {
                info!("Job '{}' finished after {:?}", job.name, limit);
                return;
            }
        }

        invocation += 1;
        let ctx = JobContext {
            elapsed: origin.elapsed(),
            invocation,
        };
        match panic::catch_unwind(AssertUnwindSafe(|| (job.action)(&ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Job '{}' failed on invocation {}: {:#}", job.name, invocation, e),
            Err(payload) => error!(
                "Job '{}' panicked on invocation {}: {}",
                job.name,
                invocation,
                panic_message(payload.as_ref())
            ),
        }

        if let Period::Every(period) = job.period {
            let sleep = match job.run_for {
                RunFor::For(limit) => period.min(limit.saturating_sub(started.elapsed())),
                RunFor::Indefinitely => period,
            };
            if signal.wait(sleep) {
                break;
            }
        }
    }
    info!("Job '{}' stopped after {} invocation(s)", job.name, invocation);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
