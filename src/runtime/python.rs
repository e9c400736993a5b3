use std::sync::Arc;

use rustpython::InterpreterConfig;
use rustpython::vm::builtins::PyBaseExceptionRef;
use rustpython::vm::compiler::Mode;
use rustpython::vm::scope::Scope;
use rustpython::vm::{Interpreter, PyObjectRef, VirtualMachine};

use crate::capture::{CaptureHandle, StreamKind};
use crate::config::ExecutionLimits;
use crate::domain::{Language, RawEvaluation};
use crate::error::PackageInstallError;
use crate::runtime::instance::RuntimeInstance;
use crate::runtime::{AdapterFactory, EngineBackend, RuntimeAdapter};

const SOURCE_NAME: &str = "<submission>";

/// Rebinds the interpreter's output streams to in-memory buffers. Run once
/// at boot and again before every execution, so each run starts with empty
/// streams even if the previous submission wrote to them.
const REDIRECT_STREAMS: &str = "import sys, io
sys.stdout = io.StringIO()
sys.stderr = io.StringIO()
";

/// An embedded Python interpreter.
///
/// Holds one virtual machine and one global scope for the whole life of the
/// instance, so variables defined by one execution remain visible to the
/// next. Not `Send`; lives on the instance's worker thread.
pub struct PythonEngine {
    scope: Scope,
    interpreter: Interpreter,
    capture: CaptureHandle,
}

impl PythonEngine {
    pub fn boot(capture: CaptureHandle, limits: &ExecutionLimits) -> Result<Self, String> {
        let interpreter = InterpreterConfig::new().init_stdlib().interpreter();

        let mut setup = String::from(REDIRECT_STREAMS);
        if let Some(depth) = limits.recursion_limit {
            setup.push_str(&format!("sys.setrecursionlimit({depth})\n"));
        }

        let scope = interpreter.enter(|vm| {
            let scope = vm.new_scope_with_builtins();
            run_script(vm, scope.clone(), &setup).map(|_| scope)
        })?;

        Ok(Self {
            scope,
            interpreter,
            capture,
        })
    }
}

impl EngineBackend for PythonEngine {
    fn run(&mut self, code: &str) -> RawEvaluation {
        let scope = self.scope.clone();
        let capture = &self.capture;
        self.interpreter.enter(|vm| {
            if let Err(message) = run_script(vm, scope.clone(), REDIRECT_STREAMS) {
                return RawEvaluation::failure(format!("stream redirection failed: {message}"));
            }

            let evaluation = evaluate(vm, scope.clone(), code);

            forward_stream(vm, scope.clone(), "stdout", StreamKind::Stdout, capture);
            forward_stream(vm, scope, "stderr", StreamKind::Stderr, capture);

            match evaluation {
                Ok(result) => RawEvaluation::success(result),
                Err(error) => RawEvaluation::failure(error),
            }
        })
    }

    fn install(&mut self, package: &str) -> Result<(), PackageInstallError> {
        if !is_module_name(package) {
            return Err(PackageInstallError::ModuleUnavailable {
                language: Language::Python,
                module: package.to_string(),
                message: "not a valid module name".to_string(),
            });
        }

        // There is no package index to reach from an embedded interpreter;
        // installation binds a bundled module into the instance's scope.
        let scope = self.scope.clone();
        self.interpreter.enter(|vm| {
            let script = format!("import {package}");
            run_script(vm, scope, &script).map_err(|message| {
                PackageInstallError::ModuleUnavailable {
                    language: Language::Python,
                    module: package.to_string(),
                    message,
                }
            })
        })
    }
}

/// Tries the submission as a single expression first so its value can be
/// reported, then falls back to executing it as a module body.
fn evaluate(vm: &VirtualMachine, scope: Scope, code: &str) -> Result<Option<String>, String> {
    if let Ok(expr) = vm.compile(code, Mode::Eval, SOURCE_NAME.to_owned()) {
        return match vm.run_code_obj(expr, scope) {
            Ok(value) => Ok(render_value(vm, value)),
            Err(exc) => Err(exception_text(vm, &exc)),
        };
    }

    match vm.compile(code, Mode::Exec, SOURCE_NAME.to_owned()) {
        Ok(body) => match vm.run_code_obj(body, scope) {
            Ok(_) => Ok(None),
            Err(exc) => Err(exception_text(vm, &exc)),
        },
        Err(error) => Err(error.to_string()),
    }
}

fn run_script(vm: &VirtualMachine, scope: Scope, source: &str) -> Result<(), String> {
    let code = vm
        .compile(source, Mode::Exec, "<runtime setup>".to_owned())
        .map_err(|error| error.to_string())?;
    vm.run_code_obj(code, scope)
        .map(|_| ())
        .map_err(|exc| exception_text(vm, &exc))
}

fn render_value(vm: &VirtualMachine, value: PyObjectRef) -> Option<String> {
    if vm.is_none(&value) {
        return None;
    }
    match value.repr(vm) {
        Ok(repr) => Some(repr.as_str().to_string()),
        Err(_) => Some("<unrepresentable value>".to_string()),
    }
}

fn forward_stream(
    vm: &VirtualMachine,
    scope: Scope,
    name: &str,
    stream: StreamKind,
    capture: &CaptureHandle,
) {
    // If the submission replaced sys.stdout with something that is not a
    // StringIO there is nothing left to forward.
    let script = format!("sys.{name}.getvalue()");
    let Ok(code) = vm.compile(&script, Mode::Eval, "<capture>".to_owned()) else {
        return;
    };
    let Ok(value) = vm.run_code_obj(code, scope) else {
        return;
    };
    let Ok(text) = value.str(vm) else {
        return;
    };
    if !text.as_str().is_empty() {
        capture.write(stream, text.as_str().to_string());
    }
}

fn exception_text(vm: &VirtualMachine, exc: &PyBaseExceptionRef) -> String {
    let mut text = String::new();
    if vm.write_exception(&mut text, exc).is_err() {
        return "unprintable exception".to_string();
    }
    text.trim_end().to_string()
}

fn is_module_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Spawns Python runtime instances.
#[derive(Clone, Copy, Debug, Default)]
pub struct PythonRuntimeFactory;

impl AdapterFactory for PythonRuntimeFactory {
    fn language(&self) -> Language {
        Language::Python
    }

    fn spawn(&self, limits: &ExecutionLimits) -> Arc<dyn RuntimeAdapter> {
        let boot_limits = limits.clone();
        Arc::new(RuntimeInstance::spawn(
            Language::Python,
            limits,
            move |capture| PythonEngine::boot(capture, &boot_limits),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::OutputCapture;

    fn engine() -> (PythonEngine, OutputCapture) {
        let capture = OutputCapture::new();
        let engine = PythonEngine::boot(capture.handle(), &ExecutionLimits::default())
            .expect("interpreter should boot");
        (engine, capture)
    }

    #[test]
    fn reports_expression_values() {
        let (mut engine, _capture) = engine();
        let raw = engine.run("40 + 2");
        assert!(raw.success);
        assert_eq!(raw.result.as_deref(), Some("42"));
        assert!(raw.diagnostics.is_empty());
    }

    #[test]
    fn strings_render_as_reprs() {
        let (mut engine, _capture) = engine();
        let raw = engine.run("'abc'");
        assert_eq!(raw.result.as_deref(), Some("'abc'"));
    }

    #[test]
    fn print_is_captured_not_returned() {
        let (mut engine, mut capture) = engine();
        let raw = engine.run("print('hi')");
        assert!(raw.success);
        assert_eq!(raw.result, None);
        assert_eq!(capture.drain().stdout, "hi\n");
    }

    #[test]
    fn state_persists_across_runs_but_output_does_not() {
        let (mut engine, mut capture) = engine();

        let raw = engine.run("x = 41\nprint('defining')");
        assert!(raw.success);
        assert_eq!(capture.drain().stdout, "defining\n");

        let raw = engine.run("x + 1");
        assert!(raw.success);
        assert_eq!(raw.result.as_deref(), Some("42"));
        assert_eq!(capture.drain().stdout, "");
    }

    #[test]
    fn output_before_a_crash_is_still_captured() {
        let (mut engine, mut capture) = engine();
        let raw = engine.run("print(\"hi\"); 1/0");
        assert!(!raw.success);
        let error = raw.error.expect("crash must carry error text");
        assert!(error.contains("ZeroDivisionError"), "got: {error}");
        assert!(capture.drain().stdout.contains("hi"));
    }

    #[test]
    fn syntax_errors_come_back_as_data() {
        let (mut engine, _capture) = engine();
        let raw = engine.run("def (");
        assert!(!raw.success);
        assert!(!raw.error.unwrap_or_default().is_empty());
    }

    #[test]
    fn stderr_writes_are_separated_from_stdout() {
        let (mut engine, mut capture) = engine();
        let raw = engine.run("import sys\nsys.stderr.write('warned')");
        assert!(raw.success);
        let streams = capture.drain();
        assert_eq!(streams.stderr, "warned");
        assert!(!streams.stdout.contains("warned"));
    }

    #[test]
    fn install_binds_bundled_modules() {
        let (mut engine, _capture) = engine();
        engine.install("json").expect("json ships with the runtime");

        let raw = engine.run("json.dumps([1, 2])");
        assert!(raw.success);
        assert_eq!(raw.result.as_deref(), Some("'[1, 2]'"));
    }

    #[test]
    fn install_of_a_missing_module_fails_cleanly() {
        let (mut engine, _capture) = engine();
        let err = engine.install("surely_not_a_real_module").unwrap_err();
        assert!(matches!(err, PackageInstallError::ModuleUnavailable { .. }));

        // The failed install must not have corrupted the interpreter.
        assert!(engine.run("1 + 1").success);
    }

    #[test]
    fn install_rejects_non_module_names() {
        let (mut engine, _capture) = engine();
        let err = engine.install("os; import sys").unwrap_err();
        assert!(matches!(err, PackageInstallError::ModuleUnavailable { .. }));
    }
}
