//! Helpers for joining the worker task

use tokio::task::JoinError;

/// Returns the task's output, or `None` if it was cancelled.
///
/// A panic inside the worker is resumed on the joining task.
pub(crate) fn propagate_panics<T>(result: Result<T, JoinError>) -> Option<T> {
    match result {
        Ok(output) => Some(output),
        Err(err) if err.is_cancelled() => None,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => {
            panic!("Unexpected join error (other than panic or cancellation): {err}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn cancelled_task_yields_nothing() {
        let handle = tokio::task::spawn(std::future::pending::<()>());
        handle.abort();
        assert_eq!(None, propagate_panics(handle.await));
    }

    #[tokio::test]
    #[should_panic(expected = "worker exploded")]
    async fn panics_are_resumed() {
        let handle = tokio::task::spawn(async { panic!("worker exploded") });
        propagate_panics::<()>(handle.await);
    }
}
