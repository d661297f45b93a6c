//! A dedicated-thread [`WorkerHook`] driver: the simplest of the two
//! concrete strategies the core leaves to its embedder. A condvar-backed
//! flag wakes a single background thread, which drains `work()` until it
//! has nothing left to do.
//!
//! Construction is two-phase because `RemoteAccessServer::new` needs its
//! hook before the hook can reference the server it drives: [`ThreadWorker::new`]
//! builds the signal only, and [`ThreadWorker::attach`] spawns the thread
//! once the server exists.

use std::sync::Arc;
use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;

use roda_core::{RemoteAccessServer, WorkerHook};

struct Signal {
    pending: Mutex<bool>,
    condvar: Condvar,
}

/// Drives a single [`RemoteAccessServer`] on its own background thread.
pub struct ThreadWorker {
    signal: Arc<Signal>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            signal: Arc::new(Signal {
                pending: Mutex::new(false),
                condvar: Condvar::new(),
            }),
            handle: Mutex::new(None),
        })
    }

    /// Spawn the background thread driving `server`. Must be called exactly
    /// once, after the server that was handed this `ThreadWorker` as its
    /// hook has been constructed.
    pub fn attach(&self, server: Arc<RemoteAccessServer>) {
        let signal = self.signal.clone();
        let handle = std::thread::spawn(move || run(server, signal));

        *self.handle.lock().unwrap() = Some(handle);
    }
}

fn run(server: Arc<RemoteAccessServer>, signal: Arc<Signal>) {
    loop {
        {
            let mut pending = signal.pending.lock().unwrap();
            while !*pending {
                pending = signal.condvar.wait(pending).unwrap();
            }
            *pending = false;
        }

        server.work();
    }
}

impl WorkerHook for ThreadWorker {
    fn request_work_invocation(&self) {
        *self.signal.pending.lock().unwrap() = true;
        self.signal.condvar.notify_one();
    }
}
