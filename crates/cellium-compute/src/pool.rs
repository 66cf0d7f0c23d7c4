//! # Process Pool
//!
//! One dispatcher thread per worker process. Dispatchers share a single job
//! queue; whichever is idle takes the next job, writes it to its worker and
//! blocks on the reply.
//!
//! ```text
//!                 ┌──────────────┐   stdin/stdout   ┌──────────┐
//!            ┌──→ │ dispatcher 0 │ ←──────────────→ │ worker 0 │
//! submit() ──┤    └──────────────┘                  └──────────┘
//!   (queue)  │    ┌──────────────┐                  ┌──────────┐
//!            └──→ │ dispatcher N │ ←──────────────→ │ worker N │
//!                 └──────────────┘                  └──────────┘
//! ```
//!
//! A worker that dies mid-task fails that task with
//! [`ComputeError::WorkerCrashed`]; its dispatcher starts a fresh worker for
//! the next job.

use crate::errors::ComputeError;
use crate::handle::{Reply, TaskHandle};
use crate::protocol::{read_message, write_message, WorkerRequest, WorkerResponse};
use crate::registry::TaskCall;
use crate::worker::WORKER_ENV;
use parking_lot::Mutex;
use serde_json::Value;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// What every worker of one pool is started with.
#[derive(Debug, Clone)]
pub(crate) struct PoolSettings {
    pub size: usize,
    pub program: PathBuf,
    pub initializers: Vec<String>,
}

pub(crate) struct Job {
    id: u64,
    call: TaskCall,
    reply: Reply,
}

/// The live child of one dispatcher, reachable from the pool so an
/// abandoning shutdown can kill it while the dispatcher is blocked.
type ChildSlot = Arc<Mutex<Option<Child>>>;

pub(crate) struct Pool {
    sender: Option<mpsc::Sender<Job>>,
    dispatchers: Vec<JoinHandle<()>>,
    slots: Vec<ChildSlot>,
    abandoned: Arc<AtomicBool>,
    next_id: AtomicU64,
    size: usize,
}

impl Pool {
    /// Start dispatchers; each one launches its worker immediately.
    pub fn start(settings: PoolSettings) -> Result<Self, ComputeError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let settings = Arc::new(settings);
        let abandoned = Arc::new(AtomicBool::new(false));

        let mut pool = Self {
            sender: Some(sender),
            dispatchers: Vec::with_capacity(settings.size),
            slots: Vec::with_capacity(settings.size),
            abandoned: Arc::clone(&abandoned),
            next_id: AtomicU64::new(1),
            size: settings.size,
        };

        for index in 0..settings.size {
            let slot: ChildSlot = Arc::new(Mutex::new(None));
            let dispatcher = Dispatcher {
                index,
                settings: Arc::clone(&settings),
                jobs: Arc::clone(&receiver),
                slot: Arc::clone(&slot),
                abandoned: Arc::clone(&abandoned),
            };
            let handle = thread::Builder::new()
                .name(format!("cellium-dispatch-{index}"))
                .spawn(move || dispatcher.run())
                .map_err(|e| ComputeError::Spawn(format!("dispatcher thread: {e}")));
            match handle {
                Ok(handle) => {
                    pool.dispatchers.push(handle);
                    pool.slots.push(slot);
                }
                Err(e) => {
                    pool.shutdown(false);
                    return Err(e);
                }
            }
        }

        info!(
            workers = settings.size,
            program = %settings.program.display(),
            "[Pool] Process pool started"
        );
        Ok(pool)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn submit(&self, call: TaskCall) -> TaskHandle {
        let (reply, handle) = TaskHandle::channel(call.task.clone());
        let Some(sender) = &self.sender else {
            let _ = reply.send(Err(ComputeError::PoolShutdown));
            return handle;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Err(mpsc::SendError(job)) = sender.send(Job { id, call, reply }) {
            let _ = job.reply.send(Err(ComputeError::PoolShutdown));
        }
        handle
    }

    /// Stop the pool. Idempotent.
    ///
    /// `wait = true` drains the queue before workers exit. `wait = false`
    /// kills workers and fails everything still queued or running with
    /// [`ComputeError::PoolShutdown`].
    pub fn shutdown(&mut self, wait: bool) {
        let Some(sender) = self.sender.take() else {
            return;
        };

        if !wait {
            self.abandoned.store(true, Ordering::SeqCst);
            for slot in &self.slots {
                if let Some(child) = slot.lock().as_mut() {
                    let _ = child.kill();
                }
            }
        }

        drop(sender);
        for handle in self.dispatchers.drain(..) {
            if handle.join().is_err() {
                warn!("[Pool] Dispatcher thread panicked");
            }
        }
        info!(wait, "[Pool] Process pool shut down");
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown(true);
    }
}

struct Dispatcher {
    index: usize,
    settings: Arc<PoolSettings>,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    slot: ChildSlot,
    abandoned: Arc<AtomicBool>,
}

impl Dispatcher {
    fn run(self) {
        let mut worker = match self.launch() {
            Ok(worker) => Some(worker),
            Err(e) => {
                warn!(dispatcher = self.index, error = %e, "[Pool] Worker failed to start");
                None
            }
        };

        loop {
            // Lock released at the end of the statement, before the job runs.
            let job = self.jobs.lock().recv();
            let Ok(job) = job else {
                break;
            };

            if self.abandoned.load(Ordering::SeqCst) {
                let _ = job.reply.send(Err(ComputeError::PoolShutdown));
                continue;
            }

            if worker.is_none() {
                match self.launch() {
                    Ok(fresh) => worker = Some(fresh),
                    Err(e) => {
                        let _ = job.reply.send(Err(e));
                        continue;
                    }
                }
            }

            let result = match worker.as_mut() {
                Some(io) => io.run(job.id, &job.call),
                None => Err(ComputeError::PoolShutdown),
            };

            let result = match result {
                Err(ComputeError::WorkerCrashed { .. }) if self.abandoned.load(Ordering::SeqCst) => {
                    Err(ComputeError::PoolShutdown)
                }
                Err(ComputeError::WorkerCrashed { task, pid }) => {
                    warn!(dispatcher = self.index, pid, task = %task, "[Pool] Worker crashed, replacing");
                    worker = None;
                    self.reap();
                    Err(ComputeError::WorkerCrashed { task, pid })
                }
                other => other,
            };
            let _ = job.reply.send(result);
        }

        match worker {
            Some(io) => {
                io.close();
                let child = self.slot.lock().take();
                if let Some(mut child) = child {
                    let _ = child.wait();
                }
            }
            None => self.reap(),
        }
        debug!(dispatcher = self.index, "[Pool] Dispatcher stopped");
    }

    fn launch(&self) -> Result<WorkerIo, ComputeError> {
        let mut child = Command::new(&self.settings.program)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                ComputeError::Spawn(format!("{}: {e}", self.settings.program.display()))
            })?;

        let pid = child.id();
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ComputeError::Spawn("worker stdio not captured".to_string()));
        };

        {
            let mut slot = self.slot.lock();
            *slot = Some(child);
            if self.abandoned.load(Ordering::SeqCst) {
                if let Some(child) = slot.as_mut() {
                    let _ = child.kill();
                }
            }
        }

        let mut io = WorkerIo {
            pid,
            stdin,
            stdout: BufReader::new(stdout),
        };
        if let Err(e) = io.handshake(&self.settings.initializers) {
            self.reap();
            return Err(e);
        }
        debug!(dispatcher = self.index, pid, "[Pool] Worker ready");
        Ok(io)
    }

    /// Kill (if still running) and wait for the current child.
    fn reap(&self) {
        if let Some(mut child) = self.slot.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Pipes to one worker process.
struct WorkerIo {
    pid: u32,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerIo {
    fn handshake(&mut self, initializers: &[String]) -> Result<(), ComputeError> {
        let init = WorkerRequest::Init {
            initializers: initializers.to_vec(),
        };
        write_message(&mut self.stdin, &init)
            .map_err(|e| ComputeError::Spawn(format!("worker {}: {e}", self.pid)))?;

        match read_message::<_, WorkerResponse>(&mut self.stdout) {
            Ok(Some(WorkerResponse::Ready { .. })) => Ok(()),
            Ok(Some(WorkerResponse::InitFailed { pid, message })) => Err(ComputeError::Spawn(
                format!("worker {pid} initializer failed: {message}"),
            )),
            Ok(Some(other)) => Err(ComputeError::Spawn(format!(
                "worker {} sent {other:?} before ready",
                self.pid
            ))),
            Ok(None) => Err(ComputeError::Spawn(format!(
                "worker {} exited during startup",
                self.pid
            ))),
            Err(e) => Err(ComputeError::Spawn(format!("worker {}: {e}", self.pid))),
        }
    }

    fn run(&mut self, id: u64, call: &TaskCall) -> Result<Value, ComputeError> {
        let crashed = || ComputeError::WorkerCrashed {
            task: call.task.clone(),
            pid: self.pid,
        };

        let request = WorkerRequest::Run {
            id,
            call: call.clone(),
        };
        write_message(&mut self.stdin, &request).map_err(|_| crashed())?;

        match read_message::<_, WorkerResponse>(&mut self.stdout) {
            Ok(Some(WorkerResponse::Done { id: done, outcome })) if done == id => outcome.into(),
            Ok(Some(other)) => {
                warn!(pid = self.pid, response = ?other, "[Pool] Unexpected worker response");
                Err(crashed())
            }
            Ok(None) | Err(_) => Err(crashed()),
        }
    }

    /// Ask the worker to exit; it also exits on the EOF that follows.
    fn close(mut self) {
        let _ = write_message(&mut self.stdin, &WorkerRequest::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(program: &str) -> PoolSettings {
        PoolSettings {
            size: 1,
            program: PathBuf::from(program),
            initializers: Vec::new(),
        }
    }

    #[test]
    fn test_missing_program_fails_tasks_with_spawn_error() {
        let mut pool = Pool::start(settings("/nonexistent/cellium-worker")).unwrap();
        let result = pool.submit(TaskCall::new("anything")).wait();
        assert!(matches!(result, Err(ComputeError::Spawn(_))));
        pool.shutdown(true);
    }

    #[test]
    fn test_submit_after_shutdown() {
        let mut pool = Pool::start(settings("/nonexistent/cellium-worker")).unwrap();
        pool.shutdown(true);
        pool.shutdown(false);
        assert_eq!(
            pool.submit(TaskCall::new("anything")).wait(),
            Err(ComputeError::PoolShutdown)
        );
    }
}
