use crate::domain::Language;
use crate::lifecycle::RuntimeStatus;

/// Adapter-level faults.
///
/// These are the only failures `execute` and its callers ever raise. Failures
/// caused by the submitted code itself (syntax errors, uncaught exceptions,
/// assertion failures, static diagnostics) are never represented here; they
/// travel as ordinary data inside an [`EngineOutcome`](crate::domain::EngineOutcome).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeFault {
    #[error("interpreter initialization failed: {message}")]
    Initialization { message: String },

    #[error("instance is {actual}, expected {expected}")]
    IllegalState {
        expected: RuntimeStatus,
        actual: RuntimeStatus,
    },

    #[error(transparent)]
    PackageInstall(#[from] PackageInstallError),

    #[error("no runtime adapter registered for {0}")]
    UnsupportedLanguage(Language),

    #[error("execution exceeded the {limit_ms}ms wall-clock limit")]
    Timeout { limit_ms: u64 },

    #[error("interpreter worker terminated unexpectedly")]
    EngineGone,
}

impl RuntimeFault {
    /// Whether the instance that produced this fault is still usable.
    ///
    /// A fault that leaves the interpreter in an unknown state forces the
    /// owner to discard the instance and build a fresh one.
    pub fn poisons_instance(&self) -> bool {
        matches!(
            self,
            RuntimeFault::Initialization { .. } | RuntimeFault::Timeout { .. } | RuntimeFault::EngineGone
        )
    }
}

/// Best-effort dependency installation failures. The instance stays READY.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PackageInstallError {
    #[error("module '{module}' is not available in the embedded {language} runtime: {message}")]
    ModuleUnavailable {
        language: Language,
        module: String,
        message: String,
    },

    #[error("the embedded {language} runtime has no package registry")]
    RegistryUnavailable { language: Language },
}
