use std::sync::Arc;

use crate::capture::CaptureHandle;
use crate::config::ExecutionLimits;
use crate::domain::{Language, RawEvaluation};
use crate::error::PackageInstallError;
use crate::runtime::instance::RuntimeInstance;
use crate::runtime::javascript::JavaScriptEngine;
use crate::runtime::transpile::strip_types;
use crate::runtime::{AdapterFactory, EngineBackend, RuntimeAdapter};

/// The TypeScript runtime: the erasable-syntax front end in front of the
/// embedded JavaScript engine.
///
/// Static findings do not stop the run; the stripped source executes and the
/// findings are attached to the evaluation, so one submission can carry both
/// diagnostics and a runtime outcome.
pub struct TypeScriptEngine {
    inner: JavaScriptEngine,
}

impl TypeScriptEngine {
    pub fn boot(capture: CaptureHandle, limits: &ExecutionLimits) -> Result<Self, String> {
        Ok(Self {
            inner: JavaScriptEngine::boot(capture, limits)?,
        })
    }
}

impl EngineBackend for TypeScriptEngine {
    fn run(&mut self, code: &str) -> RawEvaluation {
        let transpiled = strip_types(code);
        let mut raw = self.inner.run(&transpiled.source);
        raw.diagnostics = transpiled
            .diagnostics
            .iter()
            .map(|diagnostic| diagnostic.to_string())
            .collect();
        raw
    }

    fn install(&mut self, _package: &str) -> Result<(), PackageInstallError> {
        Err(PackageInstallError::RegistryUnavailable {
            language: Language::TypeScript,
        })
    }
}

/// Spawns TypeScript runtime instances.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypeScriptRuntimeFactory;

impl AdapterFactory for TypeScriptRuntimeFactory {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn spawn(&self, limits: &ExecutionLimits) -> Arc<dyn RuntimeAdapter> {
        let boot_limits = limits.clone();
        Arc::new(RuntimeInstance::spawn(
            Language::TypeScript,
            limits,
            move |capture| TypeScriptEngine::boot(capture, &boot_limits),
        ))
    }
}
