//! Per-language runtime adapters.
//!
//! Every supported language pairs an [`EngineBackend`] (the embedded
//! interpreter, living on a dedicated worker thread because none of the
//! embedded engines are `Send`) with the shared [`RuntimeInstance`] plumbing
//! that drives its lifecycle and shuttles commands to the worker.

pub mod instance;
pub mod javascript;
pub mod python;
pub mod transpile;
pub mod typescript;

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::ExecutionLimits;
use crate::domain::{EngineOutcome, Language, RawEvaluation};
use crate::error::{PackageInstallError, RuntimeFault};
use crate::lifecycle::RuntimeStatus;

pub use instance::RuntimeInstance;
pub use javascript::{JavaScriptEngine, JavaScriptRuntimeFactory};
pub use python::{PythonEngine, PythonRuntimeFactory};
pub use typescript::{TypeScriptEngine, TypeScriptRuntimeFactory};

/// A language engine as seen from its worker thread.
///
/// Implementations are constructed on the worker thread and never leave it,
/// which is what lets non-`Send` interpreters live behind a `Send` adapter.
/// `run` must never panic or error for failures caused by the submitted code;
/// those come back as data in the [`RawEvaluation`].
#[mockall::automock]
pub trait EngineBackend {
    fn run(&mut self, code: &str) -> RawEvaluation;

    fn install(&mut self, package: &str) -> Result<(), PackageInstallError>;
}

/// The uniform execution contract, identical in shape for every language.
#[async_trait::async_trait]
pub trait RuntimeAdapter: std::fmt::Debug + Send + Sync {
    fn language(&self) -> Language;

    fn status(&self) -> RuntimeStatus;

    /// Subscribes to lifecycle transitions.
    fn observe(&self) -> watch::Receiver<RuntimeStatus>;

    /// Waits for the interpreter to come up. A no-op on an already-ready
    /// instance; fails if the interpreter could not be loaded.
    async fn initialize(&self) -> Result<(), RuntimeFault>;

    /// Runs one submission. User-code failures are reported inside the
    /// returned outcome; only adapter-level problems surface as faults.
    async fn execute(&self, code: &str) -> Result<EngineOutcome, RuntimeFault>;

    /// Best-effort dependency installation into the same interpreter.
    async fn install_package(&self, package: &str) -> Result<(), RuntimeFault>;

    /// Releases the interpreter. Further calls fail with an illegal-state
    /// fault; the instance is never silently recreated.
    fn destroy(&self);
}

/// Builds ready-to-initialize adapters for one language.
pub trait AdapterFactory: std::fmt::Debug + Send + Sync {
    fn language(&self) -> Language;

    fn spawn(&self, limits: &ExecutionLimits) -> Arc<dyn RuntimeAdapter>;
}
