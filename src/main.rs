use std::panic;
use std::process::ExitCode;

use itertools::Itertools;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use codecell::{
    ExecutionLimits, ExecutionOrchestrator, ExecutionRequest, Language, OutcomeType, ResultNode,
};

/// Development runner: executes one source file and prints the result tree.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    let mut args = std::env::args().skip(1);
    let (Some(language), Some(path)) = (args.next(), args.next()) else {
        eprintln!("usage: codecell <language> <file>");
        return ExitCode::FAILURE;
    };

    let language: Language = match language.parse() {
        Ok(language) => language,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };
    let code = match std::fs::read_to_string(&path) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("failed to read {path}: {error}");
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = ExecutionOrchestrator::with_builtin_languages(ExecutionLimits::default());
    let request = ExecutionRequest::new(code, language, Uuid::new_v4(), Uuid::new_v4());
    let response = orchestrator.run(request).await;

    println!("{}", render_tree(&response.result_tree, 0));
    println!();
    println!(
        "{} ({} passed, {} failed, {} errors) in {}ms",
        response.message,
        response.counts.passed,
        response.counts.failed,
        response.counts.errors,
        response.wall_time_ms,
    );
    if !response.stderr.is_empty() {
        eprintln!("{}", response.stderr);
    }

    if response.outcome_type == OutcomeType::Success && response.exit_code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn render_tree(node: &ResultNode, depth: usize) -> String {
    let marker = if node.passed { "+" } else { "-" };
    let line = format!("{}{} {}", "  ".repeat(depth), marker, node.label);
    if node.children.is_empty() {
        line
    } else {
        let children = node
            .children
            .iter()
            .map(|child| render_tree(child, depth + 1))
            .join("\n");
        format!("{line}\n{children}")
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
