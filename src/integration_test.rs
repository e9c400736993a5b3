//! End-to-end flows through the orchestrator with the real embedded engines.

use uuid::Uuid;

use crate::config::ExecutionLimits;
use crate::domain::{ExecutionRequest, Language};
use crate::error::RuntimeFault;
use crate::lifecycle::RuntimeStatus;
use crate::normalize::{
    CODE_EXECUTION_LABEL, NodeKind, ResultNode, STANDARD_OUTPUT_LABEL, TYPE_CHECKING_LABEL,
};
use crate::orchestrator::{ExecutionOrchestrator, OutcomeType};
use crate::runtime::{AdapterFactory, PythonRuntimeFactory, RuntimeAdapter};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn orchestrator() -> ExecutionOrchestrator {
    init_tracing();
    ExecutionOrchestrator::with_builtin_languages(ExecutionLimits::default())
}

fn request(code: &str, language: Language, user: Uuid) -> ExecutionRequest {
    ExecutionRequest::new(code, language, user, Uuid::new_v4())
}

fn find_case<'a>(tree: &'a ResultNode, label: &str) -> Option<&'a ResultNode> {
    tree.children.iter().find(|child| child.label == label)
}

#[tokio::test]
async fn python_output_survives_a_crash() {
    let orchestrator = orchestrator();

    let response = orchestrator
        .run(request("print(\"hi\"); 1/0", Language::Python, Uuid::new_v4()))
        .await;

    // The adapter call completed; the failure belongs to the submission.
    assert_eq!(response.outcome_type, OutcomeType::Success);
    assert!(response.stdout.contains("hi"));
    assert!(!response.result_tree.passed);

    let execution = find_case(&response.result_tree, CODE_EXECUTION_LABEL).expect("execution case");
    assert_eq!(execution.children.len(), 1);
    assert_eq!(execution.children[0].kind, NodeKind::Failed);
    assert!(execution.children[0].label.contains("ZeroDivisionError"));
    assert_eq!(response.counts.failed, 1);
}

#[tokio::test]
async fn quiet_python_success_has_no_stdout_case() {
    let orchestrator = orchestrator();

    let response = orchestrator
        .run(request("1 + 1", Language::Python, Uuid::new_v4()))
        .await;

    assert_eq!(response.outcome_type, OutcomeType::Success);
    assert!(response.result_tree.passed);
    assert!(find_case(&response.result_tree, STANDARD_OUTPUT_LABEL).is_none());

    let execution = find_case(&response.result_tree, CODE_EXECUTION_LABEL).expect("execution case");
    assert_eq!(execution.children[0].label, "Result: 2");
    assert_eq!(execution.children[0].kind, NodeKind::Passed);
}

#[tokio::test]
async fn typescript_type_error_is_reported_alongside_the_run() {
    let orchestrator = orchestrator();

    let response = orchestrator
        .run(request(
            "const x: number = \"hello\"; 1",
            Language::TypeScript,
            Uuid::new_v4(),
        ))
        .await;

    assert_eq!(response.outcome_type, OutcomeType::Success);
    assert!(!response.result_tree.passed);

    let type_checking =
        find_case(&response.result_tree, TYPE_CHECKING_LABEL).expect("type checking case");
    assert_eq!(type_checking.children.len(), 1);
    assert_eq!(type_checking.children[0].kind, NodeKind::Failed);
    assert!(type_checking.children[0].label.contains("not assignable"));

    // The stripped source still executed.
    let execution = find_case(&response.result_tree, CODE_EXECUTION_LABEL).expect("execution case");
    assert!(execution.passed);
    assert_eq!(execution.children[0].label, "Result: 1");

    assert_eq!(response.counts.errors, 1);
    assert_eq!(response.counts.failed, 0);
}

#[tokio::test]
async fn javascript_console_output_is_ordered_before_the_result() {
    let orchestrator = orchestrator();

    let response = orchestrator
        .run(request(
            "console.log('one'); console.log('two'); 7 * 6",
            Language::JavaScript,
            Uuid::new_v4(),
        ))
        .await;

    assert!(response.result_tree.passed);
    let labels: Vec<&str> = response
        .result_tree
        .children
        .iter()
        .map(|child| child.label.as_str())
        .collect();
    assert_eq!(labels, vec![STANDARD_OUTPUT_LABEL, CODE_EXECUTION_LABEL]);
    assert_eq!(response.stdout, "one\ntwo\n");

    let execution = find_case(&response.result_tree, CODE_EXECUTION_LABEL).expect("execution case");
    assert_eq!(execution.children[0].label, "Result: 42");
}

#[tokio::test]
async fn output_never_leaks_between_runs_of_one_instance() {
    let orchestrator = orchestrator();
    let user = Uuid::new_v4();

    let first = orchestrator
        .run(request("print('first')", Language::Python, user))
        .await;
    assert_eq!(first.stdout, "first\n");

    let second = orchestrator
        .run(request("print('second')", Language::Python, user))
        .await;
    assert_eq!(second.stdout, "second\n");
    assert!(!second.stdout.contains("first"));
}

#[tokio::test]
async fn interpreter_state_persists_within_a_session() {
    let orchestrator = orchestrator();
    let user = Uuid::new_v4();

    orchestrator
        .run(request("x = 41", Language::Python, user))
        .await;
    let response = orchestrator
        .run(request("x + 1", Language::Python, user))
        .await;

    let execution = find_case(&response.result_tree, CODE_EXECUTION_LABEL).expect("execution case");
    assert_eq!(execution.children[0].label, "Result: 42");
}

#[tokio::test]
async fn a_runaway_submission_times_out_and_the_slot_recovers() {
    init_tracing();
    let limits = ExecutionLimits {
        wall_time_ms: Some(300),
        ..ExecutionLimits::default()
    };
    let orchestrator = ExecutionOrchestrator::with_builtin_languages(limits);
    let user = Uuid::new_v4();

    let stuck = orchestrator
        .run(request("while True: pass", Language::Python, user))
        .await;
    assert_eq!(stuck.outcome_type, OutcomeType::Error);
    assert!(stuck.timed_out);
    assert_eq!(stuck.counts.errors, 1);

    // A fresh instance serves the next request for the same slot.
    let recovered = orchestrator
        .run(request("2 + 2", Language::Python, user))
        .await;
    assert_eq!(recovered.outcome_type, OutcomeType::Success);
    assert!(recovered.result_tree.passed);
}

#[tokio::test]
async fn different_languages_run_concurrently_for_one_user() {
    let orchestrator = orchestrator();
    let user = Uuid::new_v4();

    let (python, javascript) = futures::future::join(
        orchestrator.run(request("21 * 2", Language::Python, user)),
        orchestrator.run(request("'js' + '!'", Language::JavaScript, user)),
    )
    .await;

    assert!(python.result_tree.passed);
    assert!(javascript.result_tree.passed);
}

#[tokio::test]
async fn package_install_is_best_effort_and_never_poisons_the_instance() {
    init_tracing();
    let adapter = PythonRuntimeFactory.spawn(&ExecutionLimits::default());
    adapter.initialize().await.unwrap();

    adapter
        .install_package("json")
        .await
        .expect("bundled module installs");
    let outcome = adapter.execute("json.dumps([1, 2])").await.unwrap();
    assert!(outcome.success);

    let err = adapter
        .install_package("surely_not_a_real_package")
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeFault::PackageInstall(_)));
    assert_eq!(adapter.status(), RuntimeStatus::Ready);

    let outcome = adapter.execute("1 + 1").await.unwrap();
    assert!(outcome.success);

    adapter.destroy();
}

#[tokio::test]
async fn destroyed_adapters_refuse_further_work() {
    init_tracing();
    let adapter = PythonRuntimeFactory.spawn(&ExecutionLimits::default());
    adapter.initialize().await.unwrap();
    adapter.destroy();
    assert_eq!(adapter.status(), RuntimeStatus::Terminated);

    let err = adapter.execute("1").await.unwrap_err();
    assert!(matches!(err, RuntimeFault::IllegalState { .. }));
}

#[tokio::test]
async fn lifecycle_observers_see_the_execution_loop() {
    init_tracing();
    let adapter = PythonRuntimeFactory.spawn(&ExecutionLimits::default());
    let mut observer = adapter.observe();
    assert_eq!(*observer.borrow_and_update(), RuntimeStatus::Initializing);

    adapter.initialize().await.unwrap();
    observer.changed().await.unwrap();
    assert_eq!(*observer.borrow_and_update(), RuntimeStatus::Ready);

    adapter.execute("1 + 1").await.unwrap();
    // The observer has seen EXECUTING and is back at READY.
    assert_eq!(*observer.borrow_and_update(), RuntimeStatus::Ready);

    adapter.destroy();
}

#[tokio::test]
async fn the_response_envelope_serializes_for_the_ui() {
    let orchestrator = orchestrator();

    let response = orchestrator
        .run(request(
            "print('payload')",
            Language::Python,
            Uuid::new_v4(),
        ))
        .await;
    let json = serde_json::to_value(&response).expect("response serializes");

    assert_eq!(json["outcomeType"], "execution success");
    assert_eq!(json["stdout"], "payload\n");
    assert_eq!(json["resultTree"]["label"], "Python Execution");
    assert_eq!(json["counts"]["failed"], 0);
}
