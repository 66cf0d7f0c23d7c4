//! Pending task results.

use crate::errors::ComputeError;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

pub(crate) type Reply = oneshot::Sender<Result<Value, ComputeError>>;

/// Handle to a submitted task.
///
/// Wait for it synchronously with [`wait`](Self::wait) or `.await` it. A
/// handle whose producer disappeared (pool torn down, dispatcher gone)
/// resolves to [`ComputeError::PoolShutdown`].
#[derive(Debug)]
pub struct TaskHandle {
    task: String,
    receiver: oneshot::Receiver<Result<Value, ComputeError>>,
}

impl TaskHandle {
    pub(crate) fn channel(task: impl Into<String>) -> (Reply, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            Self {
                task: task.into(),
                receiver,
            },
        )
    }

    /// A handle that is already resolved.
    pub fn ready(task: impl Into<String>, result: Result<Value, ComputeError>) -> Self {
        let (sender, handle) = Self::channel(task);
        // The receiver is alive in `handle`, so this cannot fail.
        let _ = sender.send(result);
        handle
    }

    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Block the current thread until the task finishes.
    pub fn wait(self) -> Result<Value, ComputeError> {
        futures::executor::block_on(self)
    }

    /// Take the result if it is already available.
    pub fn try_result(&mut self) -> Option<Result<Value, ComputeError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ComputeError::PoolShutdown)),
        }
    }
}

impl Future for TaskHandle {
    type Output = Result<Value, ComputeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ComputeError::PoolShutdown)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ready_handle() {
        let handle = TaskHandle::ready("t", Ok(json!(1)));
        assert_eq!(handle.task(), "t");
        assert_eq!(handle.wait(), Ok(json!(1)));
    }

    #[test]
    fn test_dropped_sender_is_pool_shutdown() {
        let (sender, mut handle) = TaskHandle::channel("t");
        assert_eq!(handle.try_result(), None);
        drop(sender);
        assert_eq!(handle.try_result(), Some(Err(ComputeError::PoolShutdown)));
    }

    #[tokio::test]
    async fn test_handle_is_awaitable() {
        let (sender, handle) = TaskHandle::channel("t");
        std::thread::spawn(move || sender.send(Ok(json!("done"))));
        assert_eq!(handle.await, Ok(json!("done")));
    }
}
