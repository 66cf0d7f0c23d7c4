//! # Multiprocess Manager
//!
//! Front door for CPU-bound work. Owns the lazily created [`Pool`] and falls
//! back to running tasks in-process when disabled.
//!
//! | Mode     | `submit`            | `submit_async`         |
//! |----------|---------------------|------------------------|
//! | enabled  | worker process      | worker process         |
//! | disabled | caller's thread     | one-off helper thread  |

use crate::config::MultiprocessConfig;
use crate::errors::ComputeError;
use crate::handle::TaskHandle;
use crate::pool::{Pool, PoolSettings};
use crate::registry::{TaskCall, TaskRegistry};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// Outcome of trying to hand a call to the pool.
enum Dispatched {
    Pooled(TaskHandle),
    /// Multiprocessing was switched off before the pool lock was taken.
    Inline(TaskCall),
}

pub struct MultiprocessManager {
    registry: Arc<TaskRegistry>,
    enabled: AtomicBool,
    pool_size: usize,
    worker_program: Option<PathBuf>,
    pool: Mutex<Option<Pool>>,
    initializers: Mutex<Vec<String>>,
}

impl MultiprocessManager {
    pub fn new(registry: Arc<TaskRegistry>, config: &MultiprocessConfig) -> Self {
        let pool_size = config.effective_pool_size();
        info!(
            enabled = config.enabled,
            pool_size,
            tasks = registry.len(),
            "[MP] Multiprocess manager initialized"
        );
        Self {
            registry,
            enabled: AtomicBool::new(config.enabled),
            pool_size,
            worker_program: config.worker_program.clone(),
            pool: Mutex::new(None),
            initializers: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turn worker processes on or off. Disabling shuts the pool down;
    /// enabling leaves pool creation to the next submission.
    ///
    /// The flag flips under the pool lock, so no pool can be started after
    /// a disable has returned.
    pub fn set_enabled(&self, enabled: bool) {
        let pool = {
            let mut slot = self.pool.lock();
            let was = self.enabled.swap(enabled, Ordering::SeqCst);
            if was != enabled {
                info!(enabled, "[MP] Multiprocessing toggled");
            }
            if enabled {
                None
            } else {
                slot.take()
            }
        };
        if let Some(mut pool) = pool {
            pool.shutdown(true);
        }
    }

    /// `true` once a pool has been created and not yet shut down.
    #[must_use]
    pub fn is_pool_running(&self) -> bool {
        self.pool.lock().is_some()
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Run a task and block until it finishes.
    pub fn submit(&self, call: TaskCall) -> Result<Value, ComputeError> {
        if !self.is_enabled() {
            return self.registry.execute(&call, None);
        }
        match self.dispatch(call)? {
            Dispatched::Pooled(handle) => handle.wait(),
            Dispatched::Inline(call) => self.registry.execute(&call, None),
        }
    }

    /// Start a task and return immediately.
    pub fn submit_async(&self, call: TaskCall) -> TaskHandle {
        if !self.is_enabled() {
            return self.run_on_helper_thread(call);
        }
        let task = call.task.clone();
        match self.dispatch(call) {
            Ok(Dispatched::Pooled(handle)) => handle,
            Ok(Dispatched::Inline(call)) => self.run_on_helper_thread(call),
            Err(e) => TaskHandle::ready(task, Err(e)),
        }
    }

    /// Apply `task` to each argument tuple; results keep input order.
    pub fn map(&self, task: &str, arg_tuples: Vec<Vec<Value>>) -> Result<Vec<Value>, ComputeError> {
        if !self.is_enabled() {
            return arg_tuples
                .into_iter()
                .map(|args| self.registry.execute(&TaskCall::with_args(task, args), None))
                .collect();
        }
        self.map_async(task, arg_tuples)
            .into_iter()
            .map(TaskHandle::wait)
            .collect()
    }

    /// Start `task` for each argument tuple.
    pub fn map_async(&self, task: &str, arg_tuples: Vec<Vec<Value>>) -> Vec<TaskHandle> {
        arg_tuples
            .into_iter()
            .map(|args| self.submit_async(TaskCall::with_args(task, args)))
            .collect()
    }

    /// Run the named registry task once in every worker before it takes
    /// work. Only pools created afterwards are affected.
    pub fn register_initializer(&self, name: &str) -> Result<(), ComputeError> {
        if !self.registry.contains(name) {
            return Err(ComputeError::UnknownTask(name.to_string()));
        }
        let mut initializers = self.initializers.lock();
        if initializers.iter().any(|existing| existing == name) {
            debug!(initializer = name, "[MP] Initializer already registered");
            return Ok(());
        }
        initializers.push(name.to_string());
        debug!(initializer = name, "[MP] Initializer registered");
        Ok(())
    }

    pub fn clear_initializers(&self) {
        self.initializers.lock().clear();
    }

    #[must_use]
    pub fn initializers(&self) -> Vec<String> {
        self.initializers.lock().clone()
    }

    /// Stop the pool if one is running. Idempotent.
    ///
    /// See [`Pool::shutdown`] for the meaning of `wait`.
    pub fn shutdown(&self, wait: bool) {
        let pool = self.pool.lock().take();
        if let Some(mut pool) = pool {
            pool.shutdown(wait);
        }
    }

    fn dispatch(&self, call: TaskCall) -> Result<Dispatched, ComputeError> {
        if !self.registry.contains(&call.task) {
            return Err(ComputeError::UnknownTask(call.task));
        }

        let mut slot = self.pool.lock();
        // Checked again under the lock; `set_enabled` flips the flag while
        // holding it.
        if !self.is_enabled() {
            return Ok(Dispatched::Inline(call));
        }
        if slot.is_none() {
            *slot = Some(Pool::start(self.pool_settings()?)?);
        }
        match slot.as_ref() {
            Some(pool) => Ok(Dispatched::Pooled(pool.submit(call))),
            None => Err(ComputeError::PoolShutdown),
        }
    }

    fn pool_settings(&self) -> Result<PoolSettings, ComputeError> {
        let program = match &self.worker_program {
            Some(program) => program.clone(),
            None => std::env::current_exe()
                .map_err(|e| ComputeError::Spawn(format!("cannot locate current executable: {e}")))?,
        };
        Ok(PoolSettings {
            size: self.pool_size,
            program,
            initializers: self.initializers(),
        })
    }

    fn run_on_helper_thread(&self, call: TaskCall) -> TaskHandle {
        let (reply, handle) = TaskHandle::channel(call.task.clone());
        let registry = Arc::clone(&self.registry);
        let spawned = thread::Builder::new()
            .name("cellium-task".to_string())
            .spawn(move || {
                let _ = reply.send(registry.execute(&call, None));
            });
        match spawned {
            Ok(_) => handle,
            Err(e) => TaskHandle::ready(
                handle.task().to_string(),
                Err(ComputeError::Spawn(format!("helper thread: {e}"))),
            ),
        }
    }
}

impl Drop for MultiprocessManager {
    fn drop(&mut self) {
        self.shutdown(true);
    }
}

impl std::fmt::Debug for MultiprocessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiprocessManager")
            .field("enabled", &self.is_enabled())
            .field("pool_size", &self.pool_size)
            .field("pool_running", &self.is_pool_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::registry;
    use serde_json::json;

    fn disabled() -> MultiprocessManager {
        MultiprocessManager::new(Arc::new(registry()), &MultiprocessConfig::disabled())
    }

    #[test]
    fn test_disabled_submit_runs_inline() {
        let manager = disabled();
        let result = manager.submit(TaskCall::new("test.add").arg(1).arg(2));
        assert_eq!(result, Ok(json!(3)));
        assert!(!manager.is_pool_running());
    }

    #[test]
    fn test_disabled_task_failure_has_no_pid() {
        let err = disabled().submit(TaskCall::new("test.fail")).unwrap_err();
        match err {
            ComputeError::TaskFailed(failure) => assert_eq!(failure.pid, None),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_disabled_submit_async_uses_helper_thread() {
        let handle = disabled().submit_async(TaskCall::new("test.add").arg(4).arg(5));
        assert_eq!(handle.wait(), Ok(json!(9)));
    }

    #[tokio::test]
    async fn test_disabled_submit_async_is_awaitable() {
        let manager = disabled();
        let value = manager.submit_async(TaskCall::new("test.add").arg(1)).await;
        assert_eq!(value, Ok(json!(1)));
    }

    #[test]
    fn test_disabled_map_preserves_order() {
        let results = disabled()
            .map("test.add", vec![vec![json!(1)], vec![json!(2), json!(3)], vec![]])
            .unwrap();
        assert_eq!(results, vec![json!(1), json!(5), json!(0)]);
    }

    #[test]
    fn test_disabled_map_async() {
        let handles = disabled().map_async("test.add", vec![vec![json!(7)], vec![json!(8)]]);
        let results: Vec<_> = handles.into_iter().map(TaskHandle::wait).collect();
        assert_eq!(results, vec![Ok(json!(7)), Ok(json!(8))]);
    }

    #[test]
    fn test_initializers_are_deduplicated_and_validated() {
        let manager = disabled();
        manager.register_initializer("test.add").unwrap();
        manager.register_initializer("test.add").unwrap();
        assert_eq!(manager.initializers(), vec!["test.add".to_string()]);

        assert_eq!(
            manager.register_initializer("nope"),
            Err(ComputeError::UnknownTask("nope".into()))
        );

        manager.clear_initializers();
        assert!(manager.initializers().is_empty());
    }

    #[test]
    fn test_enabled_unknown_task_is_rejected_before_pool_start() {
        let manager = MultiprocessManager::new(
            Arc::new(registry()),
            &MultiprocessConfig {
                worker_program: Some(PathBuf::from("/nonexistent/cellium-worker")),
                ..MultiprocessConfig::default()
            },
        );
        assert_eq!(
            manager.submit(TaskCall::new("nope")),
            Err(ComputeError::UnknownTask("nope".into()))
        );
        assert!(!manager.is_pool_running());
    }

    #[test]
    fn test_enabled_with_bad_program_reports_spawn_failure() {
        let manager = MultiprocessManager::new(
            Arc::new(registry()),
            &MultiprocessConfig {
                pool_size: Some(1),
                worker_program: Some(PathBuf::from("/nonexistent/cellium-worker")),
                ..MultiprocessConfig::default()
            },
        );
        let err = manager.submit(TaskCall::new("test.add")).unwrap_err();
        assert!(matches!(err, ComputeError::Spawn(_)));
        assert!(!err.is_task_failure());

        manager.set_enabled(false);
        assert!(!manager.is_pool_running());
        assert_eq!(manager.submit(TaskCall::new("test.add").arg(1)), Ok(json!(1)));
    }

    #[test]
    fn test_dispatch_after_disable_never_starts_pool() {
        let manager = MultiprocessManager::new(
            Arc::new(registry()),
            &MultiprocessConfig {
                pool_size: Some(1),
                worker_program: Some(PathBuf::from("/nonexistent/cellium-worker")),
                ..MultiprocessConfig::default()
            },
        );
        manager.set_enabled(false);

        // A submitter that passed the enabled check before the toggle lands here.
        match manager.dispatch(TaskCall::new("test.add").arg(2)) {
            Ok(Dispatched::Inline(call)) => {
                assert_eq!(manager.registry().execute(&call, None), Ok(json!(2)));
            }
            Ok(Dispatched::Pooled(_)) => panic!("pool used while disabled"),
            Err(e) => panic!("unexpected error: {e:?}"),
        }
        assert!(!manager.is_pool_running());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let manager = disabled();
        manager.shutdown(true);
        manager.shutdown(false);
        manager.set_enabled(true);
        assert!(manager.is_enabled());
        assert!(!manager.is_pool_running());
    }
}
