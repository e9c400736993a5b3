//! In-process polyglot code execution with canonical result reporting.
//!
//! Submissions run against embedded interpreters (RustPython for Python, Boa
//! for JavaScript and type-stripped TypeScript) instead of a remote compute
//! cluster. Each language pairs an engine backend, confined to a dedicated
//! worker thread, with shared instance plumbing that drives a strict
//! lifecycle state machine and captures output streams per execution.
//! Heterogeneous engine outcomes are normalized into one hierarchical result
//! tree so callers never need to know which interpreter produced a verdict.
//!
//! The entry point is [`ExecutionOrchestrator::run`]: it selects an adapter
//! from a language registry, leases the instance pooled for the requesting
//! user, executes, and folds the outcome into an [`ExecutionResponse`].
//! Broken or hostile submissions come back as data in the result tree; only
//! adapter-level faults (initialization failure, illegal state, timeout)
//! surface as an error response, and those can never escape as panics.

pub mod capture;
pub mod config;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod normalize;
pub mod orchestrator;
pub mod runtime;

#[cfg(test)]
mod integration_test;

pub use capture::{CaptureHandle, CapturedStreams, OutputCapture, StreamKind};
pub use config::ExecutionLimits;
pub use domain::{
    EngineOutcome, ExecutionMetrics, ExecutionRequest, Language, RawEvaluation, UnknownLanguage,
};
pub use error::{PackageInstallError, RuntimeFault};
pub use lifecycle::{Lifecycle, RuntimeStatus};
pub use normalize::{NodeKind, ResultCounts, ResultNode, normalize};
pub use orchestrator::{AdapterRegistry, ExecutionOrchestrator, ExecutionResponse, OutcomeType};
pub use runtime::{AdapterFactory, EngineBackend, RuntimeAdapter, RuntimeInstance};
