use std::sync::Arc;

use boa_engine::{Context, Source};

use crate::capture::{CaptureHandle, StreamKind};
use crate::config::ExecutionLimits;
use crate::domain::{Language, RawEvaluation};
use crate::error::PackageInstallError;
use crate::runtime::instance::RuntimeInstance;
use crate::runtime::{AdapterFactory, EngineBackend, RuntimeAdapter};

/// Installs a `console` shim whose output lands in per-stream buffers, and
/// empties those buffers. Idempotent, so it doubles as the per-execution
/// reset: re-running it discards anything a previous run left behind.
const SETUP_SCRIPT: &str = r#"
(function () {
    globalThis.__capture_stdout = [];
    globalThis.__capture_stderr = [];
    function writer(buffer) {
        return function () {
            var parts = [];
            for (var i = 0; i < arguments.length; i++) {
                parts.push(String(arguments[i]));
            }
            buffer.push(parts.join(" "));
        };
    }
    globalThis.console = {
        log: writer(__capture_stdout),
        info: writer(__capture_stdout),
        debug: writer(__capture_stdout),
        trace: writer(__capture_stdout),
        warn: writer(__capture_stderr),
        error: writer(__capture_stderr),
    };
})();
"#;

/// An embedded JavaScript engine.
///
/// One Boa context per instance; globals persist across executions. Not
/// `Send`; lives on the instance's worker thread.
pub struct JavaScriptEngine {
    context: Context,
    capture: CaptureHandle,
}

impl JavaScriptEngine {
    pub fn boot(capture: CaptureHandle, limits: &ExecutionLimits) -> Result<Self, String> {
        let mut context = Context::default();
        if let Some(iterations) = limits.loop_iteration_limit {
            context.runtime_limits_mut().set_loop_iteration_limit(iterations);
        }
        if let Some(depth) = limits.recursion_limit {
            context.runtime_limits_mut().set_recursion_limit(depth);
        }

        context
            .eval(Source::from_bytes(SETUP_SCRIPT))
            .map_err(|error| format!("console setup failed: {error}"))?;

        Ok(Self { context, capture })
    }

    fn forward_stream(&mut self, buffer_name: &str, stream: StreamKind) {
        // The buffers are read back through JSON so chunk boundaries survive
        // the trip out of the engine. If the submission destroyed the
        // buffers there is nothing left to forward.
        let script = format!("JSON.stringify({buffer_name})");
        let Ok(value) = self.context.eval(Source::from_bytes(script.as_bytes())) else {
            return;
        };
        let Ok(encoded) = value.to_string(&mut self.context) else {
            return;
        };
        let Ok(lines) = serde_json::from_str::<Vec<String>>(&encoded.to_std_string_escaped()) else {
            return;
        };
        for line in lines {
            self.capture.write(stream, format!("{line}\n"));
        }
    }
}

impl EngineBackend for JavaScriptEngine {
    fn run(&mut self, code: &str) -> RawEvaluation {
        if let Err(error) = self.context.eval(Source::from_bytes(SETUP_SCRIPT)) {
            return RawEvaluation::failure(format!("console setup failed: {error}"));
        }

        let evaluation = self.context.eval(Source::from_bytes(code.as_bytes()));
        let raw = match evaluation {
            Ok(value) => {
                if value.is_undefined() {
                    RawEvaluation::success(None)
                } else {
                    RawEvaluation::success(Some(value.display().to_string()))
                }
            }
            Err(error) => RawEvaluation::failure(error.to_string()),
        };

        self.forward_stream("__capture_stdout", StreamKind::Stdout);
        self.forward_stream("__capture_stderr", StreamKind::Stderr);
        raw
    }

    fn install(&mut self, _package: &str) -> Result<(), PackageInstallError> {
        Err(PackageInstallError::RegistryUnavailable {
            language: Language::JavaScript,
        })
    }
}

/// Spawns JavaScript runtime instances.
#[derive(Clone, Copy, Debug, Default)]
pub struct JavaScriptRuntimeFactory;

impl AdapterFactory for JavaScriptRuntimeFactory {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn spawn(&self, limits: &ExecutionLimits) -> Arc<dyn RuntimeAdapter> {
        let boot_limits = limits.clone();
        Arc::new(RuntimeInstance::spawn(
            Language::JavaScript,
            limits,
            move |capture| JavaScriptEngine::boot(capture, &boot_limits),
        ))
    }
}
