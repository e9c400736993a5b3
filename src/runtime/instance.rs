use std::fmt;
use std::sync::Mutex as StdMutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::timeout;

use crate::capture::{CaptureHandle, OutputCapture};
use crate::config::ExecutionLimits;
use crate::domain::{EngineOutcome, ExecutionMetrics, Language};
use crate::error::{PackageInstallError, RuntimeFault};
use crate::lifecycle::{Lifecycle, RuntimeStatus};
use crate::runtime::{EngineBackend, RuntimeAdapter};

enum Command {
    Execute {
        code: String,
        reply: oneshot::Sender<EngineOutcome>,
    },
    Install {
        package: String,
        reply: oneshot::Sender<Result<(), PackageInstallError>>,
    },
    Shutdown,
}

/// One loaded interpreter bound to exactly one language.
///
/// The interpreter itself lives on a dedicated worker thread; this handle
/// drives its state machine and exchanges commands with the worker over
/// channels. The handle side is `Send + Sync`, so instances can be pooled
/// and shared even though the engines underneath are thread-bound.
pub struct RuntimeInstance {
    language: Language,
    lifecycle: Lifecycle,
    commands: StdMutex<Option<mpsc::Sender<Command>>>,
    init: Mutex<Option<oneshot::Receiver<Result<(), String>>>>,
    started_at: StdMutex<Option<DateTime<Utc>>>,
    wall_limit_ms: Option<u64>,
}

impl RuntimeInstance {
    /// Starts the worker thread and hands it `factory` to build the engine.
    ///
    /// The factory runs on the worker thread, which is what allows engine
    /// types that are not `Send`. The instance starts INITIALIZING; await
    /// [`RuntimeAdapter::initialize`] for the interpreter-load verdict.
    pub fn spawn<B, F>(language: Language, limits: &ExecutionLimits, factory: F) -> Self
    where
        B: EngineBackend + 'static,
        F: FnOnce(CaptureHandle) -> Result<B, String> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (init_tx, init_rx) = oneshot::channel();

        let spawned = std::thread::Builder::new()
            .name(format!("codecell-{language}"))
            .spawn(move || worker_loop(factory, cmd_rx, init_tx));
        if let Err(error) = spawned {
            // The dropped init sender reports this as an initialization
            // failure when the caller awaits readiness.
            tracing::error!(%error, %language, "failed to start runtime worker thread");
        } else {
            tracing::debug!(%language, "runtime worker thread started");
        }

        Self {
            language,
            lifecycle: Lifecycle::new(),
            commands: StdMutex::new(Some(cmd_tx)),
            init: Mutex::new(Some(init_rx)),
            started_at: StdMutex::new(None),
            wall_limit_ms: limits.wall_time_ms,
        }
    }

    /// When the currently running (or most recent) execution began.
    pub fn execution_started_at(&self) -> Option<DateTime<Utc>> {
        *lock_ignoring_poison(&self.started_at)
    }

    fn sender(&self) -> Result<mpsc::Sender<Command>, RuntimeFault> {
        lock_ignoring_poison(&self.commands)
            .as_ref()
            .cloned()
            .ok_or(RuntimeFault::IllegalState {
                expected: RuntimeStatus::Ready,
                actual: RuntimeStatus::Terminated,
            })
    }

    async fn await_outcome(
        &self,
        reply: oneshot::Receiver<EngineOutcome>,
    ) -> Result<EngineOutcome, RuntimeFault> {
        match self.wall_limit_ms {
            Some(limit_ms) => {
                match timeout(std::time::Duration::from_millis(limit_ms), reply).await {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(_)) => Err(RuntimeFault::EngineGone),
                    Err(_) => Err(RuntimeFault::Timeout { limit_ms }),
                }
            }
            None => reply.await.map_err(|_| RuntimeFault::EngineGone),
        }
    }
}

#[async_trait::async_trait]
impl RuntimeAdapter for RuntimeInstance {
    fn language(&self) -> Language {
        self.language
    }

    fn status(&self) -> RuntimeStatus {
        self.lifecycle.status()
    }

    fn observe(&self) -> tokio::sync::watch::Receiver<RuntimeStatus> {
        self.lifecycle.observe()
    }

    async fn initialize(&self) -> Result<(), RuntimeFault> {
        let receiver = self.init.lock().await.take();
        match receiver {
            Some(rx) => match rx.await {
                Ok(Ok(())) => {
                    if self.lifecycle.mark_ready() {
                        tracing::info!(language = %self.language, "runtime ready");
                        Ok(())
                    } else {
                        // Destroyed while the interpreter was still loading.
                        Err(RuntimeFault::IllegalState {
                            expected: RuntimeStatus::Ready,
                            actual: self.lifecycle.status(),
                        })
                    }
                }
                Ok(Err(message)) => {
                    self.lifecycle.fail();
                    tracing::error!(language = %self.language, %message, "runtime initialization failed");
                    Err(RuntimeFault::Initialization { message })
                }
                Err(_) => {
                    self.lifecycle.fail();
                    Err(RuntimeFault::Initialization {
                        message: "interpreter worker never reported readiness".to_string(),
                    })
                }
            },
            // Someone else already consumed the readiness report; wait for
            // the verdict they produced.
            None => {
                let mut observer = self.lifecycle.observe();
                let status = observer
                    .wait_for(|status| !matches!(status, RuntimeStatus::Initializing))
                    .await
                    .map_err(|_| RuntimeFault::EngineGone)?;
                match *status {
                    RuntimeStatus::Ready | RuntimeStatus::Executing => Ok(()),
                    RuntimeStatus::Error => Err(RuntimeFault::Initialization {
                        message: "interpreter previously failed to load".to_string(),
                    }),
                    actual => Err(RuntimeFault::IllegalState {
                        expected: RuntimeStatus::Ready,
                        actual,
                    }),
                }
            }
        }
    }

    #[tracing::instrument(skip(self, code), fields(language = %self.language, code_len = code.len()))]
    async fn execute(&self, code: &str) -> Result<EngineOutcome, RuntimeFault> {
        let sender = self.sender()?;
        self.lifecycle.begin_execution()?;
        *lock_ignoring_poison(&self.started_at) = Some(Utc::now());

        let (reply_tx, reply_rx) = oneshot::channel();
        let command = Command::Execute {
            code: code.to_string(),
            reply: reply_tx,
        };
        if sender.send(command).await.is_err() {
            self.lifecycle.fail();
            return Err(RuntimeFault::EngineGone);
        }

        match self.await_outcome(reply_rx).await {
            Ok(outcome) => {
                self.lifecycle.finish_execution();
                tracing::debug!(
                    language = %self.language,
                    success = outcome.success,
                    execution_time_ms = outcome.metrics.execution_time_ms,
                    "execution finished"
                );
                Ok(outcome)
            }
            Err(fault) => {
                // The engine is stuck or dead; the instance cannot be
                // trusted for another run.
                self.lifecycle.fail();
                tracing::error!(language = %self.language, %fault, "execution fault");
                Err(fault)
            }
        }
    }

    async fn install_package(&self, package: &str) -> Result<(), RuntimeFault> {
        let sender = self.sender()?;
        // Installation occupies the instance the same way a run does; the
        // state machine has no separate installing state.
        self.lifecycle.begin_execution()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let command = Command::Install {
            package: package.to_string(),
            reply: reply_tx,
        };
        if sender.send(command).await.is_err() {
            self.lifecycle.fail();
            return Err(RuntimeFault::EngineGone);
        }

        match reply_rx.await {
            Ok(result) => {
                self.lifecycle.finish_execution();
                result.map_err(RuntimeFault::from)
            }
            Err(_) => {
                self.lifecycle.fail();
                Err(RuntimeFault::EngineGone)
            }
        }
    }

    fn destroy(&self) {
        let sender = lock_ignoring_poison(&self.commands).take();
        if self.lifecycle.terminate() {
            tracing::info!(language = %self.language, "runtime destroyed");
        }
        if let Some(sender) = sender {
            // Best effort: if the queue is full the worker still exits once
            // the last sender clone drops and the channel closes.
            let _ = sender.try_send(Command::Shutdown);
        }
    }
}

impl fmt::Debug for RuntimeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeInstance")
            .field("language", &self.language)
            .field("status", &self.lifecycle.status())
            .finish()
    }
}

fn lock_ignoring_poison<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn worker_loop<B, F>(
    factory: F,
    mut commands: mpsc::Receiver<Command>,
    init_tx: oneshot::Sender<Result<(), String>>,
) where
    B: EngineBackend + 'static,
    F: FnOnce(CaptureHandle) -> Result<B, String>,
{
    let mut capture = OutputCapture::new();
    let mut backend = match factory(capture.handle()) {
        Ok(backend) => {
            let _ = init_tx.send(Ok(()));
            backend
        }
        Err(message) => {
            let _ = init_tx.send(Err(message));
            return;
        }
    };

    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Execute { code, reply } => {
                // Stale output from a prior run must never leak forward.
                capture.clear();
                let started = Instant::now();
                let evaluation = backend.run(&code);
                let streams = capture.drain();
                let metrics = ExecutionMetrics {
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    peak_memory_bytes: None,
                    operation_count: None,
                };
                let outcome =
                    EngineOutcome::from_evaluation(evaluation, streams.stdout, streams.stderr, metrics);
                let _ = reply.send(outcome);
            }
            Command::Install { package, reply } => {
                let _ = reply.send(backend.install(&package));
            }
            Command::Shutdown => break,
        }
    }
}
