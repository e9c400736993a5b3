use std::fmt;

use serde::Serialize;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::error::RuntimeFault;

/// Observable states of a runtime instance.
///
/// Legal transitions:
/// `INITIALIZING -> READY -> EXECUTING -> READY` (loop),
/// `INITIALIZING | EXECUTING -> ERROR` on failure, and
/// `* -> TERMINATED` via an explicit destroy. `ERROR` and `TERMINATED` are
/// sticky; an instance in either must be discarded, not reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeStatus {
    Initializing,
    Ready,
    Executing,
    Error,
    Terminated,
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeStatus::Initializing => "INITIALIZING",
            RuntimeStatus::Ready => "READY",
            RuntimeStatus::Executing => "EXECUTING",
            RuntimeStatus::Error => "ERROR",
            RuntimeStatus::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// Drives one instance's state machine and broadcasts every transition to
/// observers.
///
/// All transitions are compare-and-swap operations on a single watch channel,
/// so concurrent callers cannot both win the same edge and observers see each
/// state change exactly once per transition.
pub struct Lifecycle {
    tx: watch::Sender<RuntimeStatus>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RuntimeStatus::Initializing);
        Self { tx }
    }

    pub fn status(&self) -> RuntimeStatus {
        *self.tx.borrow()
    }

    /// Subscribes to state transitions.
    pub fn observe(&self) -> watch::Receiver<RuntimeStatus> {
        self.tx.subscribe()
    }

    /// Transition notifications as an async stream, for observers that want
    /// to consume them like any other event source.
    pub fn stream(&self) -> WatchStream<RuntimeStatus> {
        WatchStream::new(self.tx.subscribe())
    }

    /// INITIALIZING -> READY. Returns false if that edge was not available.
    pub fn mark_ready(&self) -> bool {
        self.swap(RuntimeStatus::Initializing, RuntimeStatus::Ready)
    }

    /// READY -> EXECUTING. Rejects every other starting state, which is how
    /// a second concurrent `execute` (or a call on a destroyed instance) is
    /// refused without racing.
    pub fn begin_execution(&self) -> Result<(), RuntimeFault> {
        let mut observed = RuntimeStatus::Ready;
        let moved = self.tx.send_if_modified(|status| {
            observed = *status;
            if *status == RuntimeStatus::Ready {
                *status = RuntimeStatus::Executing;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(RuntimeFault::IllegalState {
                expected: RuntimeStatus::Ready,
                actual: observed,
            })
        }
    }

    /// EXECUTING -> READY. Unconditional on the outcome of the execution;
    /// a no-op if the instance was concurrently destroyed.
    pub fn finish_execution(&self) -> bool {
        self.swap(RuntimeStatus::Executing, RuntimeStatus::Ready)
    }

    /// INITIALIZING | EXECUTING -> ERROR.
    pub fn fail(&self) -> bool {
        self.tx.send_if_modified(|status| {
            if matches!(*status, RuntimeStatus::Initializing | RuntimeStatus::Executing) {
                *status = RuntimeStatus::Error;
                true
            } else {
                false
            }
        })
    }

    /// Any state -> TERMINATED. Returns false if already terminated.
    pub fn terminate(&self) -> bool {
        self.tx.send_if_modified(|status| {
            if *status == RuntimeStatus::Terminated {
                false
            } else {
                *status = RuntimeStatus::Terminated;
                true
            }
        })
    }

    fn swap(&self, from: RuntimeStatus, to: RuntimeStatus) -> bool {
        self.tx.send_if_modified(|status| {
            if *status == from {
                *status = to;
                true
            } else {
                false
            }
        })
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle").field("status", &self.status()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_the_happy_path() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.status(), RuntimeStatus::Initializing);

        assert!(lifecycle.mark_ready());
        assert_eq!(lifecycle.status(), RuntimeStatus::Ready);

        lifecycle.begin_execution().unwrap();
        assert_eq!(lifecycle.status(), RuntimeStatus::Executing);

        assert!(lifecycle.finish_execution());
        assert_eq!(lifecycle.status(), RuntimeStatus::Ready);
    }

    #[test]
    fn rejects_execution_outside_ready() {
        let lifecycle = Lifecycle::new();

        let err = lifecycle.begin_execution().unwrap_err();
        assert!(matches!(
            err,
            RuntimeFault::IllegalState {
                expected: RuntimeStatus::Ready,
                actual: RuntimeStatus::Initializing,
            }
        ));
        // The refused call must not have moved the state.
        assert_eq!(lifecycle.status(), RuntimeStatus::Initializing);

        lifecycle.mark_ready();
        lifecycle.begin_execution().unwrap();
        let err = lifecycle.begin_execution().unwrap_err();
        assert!(matches!(
            err,
            RuntimeFault::IllegalState {
                actual: RuntimeStatus::Executing,
                ..
            }
        ));
    }

    #[test]
    fn error_is_reachable_from_initializing_and_executing_only() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.fail());
        assert_eq!(lifecycle.status(), RuntimeStatus::Error);

        let lifecycle = Lifecycle::new();
        lifecycle.mark_ready();
        assert!(!lifecycle.fail());
        assert_eq!(lifecycle.status(), RuntimeStatus::Ready);

        lifecycle.begin_execution().unwrap();
        assert!(lifecycle.fail());
        assert_eq!(lifecycle.status(), RuntimeStatus::Error);
    }

    #[test]
    fn terminated_is_sticky() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.terminate());
        assert!(!lifecycle.terminate());
        assert!(!lifecycle.mark_ready());
        assert!(lifecycle.begin_execution().is_err());
        assert_eq!(lifecycle.status(), RuntimeStatus::Terminated);
    }

    #[tokio::test]
    async fn observers_see_each_transition() {
        let lifecycle = Lifecycle::new();
        let mut observer = lifecycle.observe();
        assert_eq!(*observer.borrow_and_update(), RuntimeStatus::Initializing);

        lifecycle.mark_ready();
        observer.changed().await.unwrap();
        assert_eq!(*observer.borrow_and_update(), RuntimeStatus::Ready);

        lifecycle.begin_execution().unwrap();
        observer.changed().await.unwrap();
        assert_eq!(*observer.borrow_and_update(), RuntimeStatus::Executing);

        lifecycle.finish_execution();
        observer.changed().await.unwrap();
        assert_eq!(*observer.borrow_and_update(), RuntimeStatus::Ready);
    }

    #[tokio::test]
    async fn stream_yields_status_updates() {
        use tokio_stream::StreamExt;

        let lifecycle = Lifecycle::new();
        let mut stream = lifecycle.stream();
        // The stream starts with the current state.
        assert_eq!(stream.next().await, Some(RuntimeStatus::Initializing));

        lifecycle.mark_ready();
        assert_eq!(stream.next().await, Some(RuntimeStatus::Ready));
    }
}
