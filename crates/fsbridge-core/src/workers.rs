// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed pool of threads completing requests off the native loop thread

use crossbeam_queue::SegQueue;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    queue: SegQueue<Job>,
    signal: (Mutex<bool>, Condvar),
    shutdown: AtomicBool,
    completed: AtomicU64,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `thread_count` workers (at least one).
    pub fn new(thread_count: usize) -> Self {
        let shared = Arc::new(Shared {
            queue: SegQueue::new(),
            signal: (Mutex::new(false), Condvar::new()),
            shutdown: AtomicBool::new(false),
            completed: AtomicU64::new(0),
        });
        let thread_count = thread_count.max(1);
        let mut handles = Vec::with_capacity(thread_count);

        for index in 0..thread_count {
            let shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("fsbridge-worker-{}", index))
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => error!(target: "fsbridge::workers", index, %err, "failed to spawn worker"),
            }
        }
        debug!(target: "fsbridge::workers", threads = handles.len(), "worker pool started");

        Self { shared, handles }
    }

    /// Queue `job`. Jobs still queued at shutdown are run by the workers
    /// before they exit.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.handles.is_empty() {
            run_job(Box::new(job));
            return;
        }
        self.shared.queue.push(Box::new(job));
        let (lock, cvar) = &self.shared.signal;
        let mut pending = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *pending = true;
        cvar.notify_one();
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }
}

/// Text of a panic payload, when it carries one.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// A panicking job is logged and dropped; the worker keeps running.
fn run_job(job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        error!(target: "fsbridge::workers", panic = panic_message(payload.as_ref()), "job panicked");
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        match shared.queue.pop() {
            Some(job) => {
                run_job(job);
                shared.completed.fetch_add(1, Ordering::AcqRel);
            }
            None => {
                if shared.shutdown.load(Ordering::Acquire) {
                    break;
                }
                let (lock, cvar) = &shared.signal;
                let mut pending = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if !*pending {
                    pending = match cvar.wait_timeout(pending, Duration::from_millis(5)) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    };
                }
                *pending = false;
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let (lock, cvar) = &self.shared.signal;
        if let Ok(mut pending) = lock.lock() {
            *pending = true;
            cvar.notify_all();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
