use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Languages with a built-in runtime adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    /// Human-readable name used in result-tree labels.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
        }
    }

    /// The literal an execution with no value renders as.
    pub fn void_literal(&self) -> &'static str {
        match self {
            Language::Python => "None",
            Language::JavaScript | Language::TypeScript => "undefined",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::JavaScript),
            "typescript" | "ts" => Ok(Language::TypeScript),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

/// One code submission. Created by the caller, consumed once.
#[derive(Clone, Debug)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    pub user_id: Uuid,
    pub submission_id: Uuid,
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, language: Language, user_id: Uuid, submission_id: Uuid) -> Self {
        Self {
            code: code.into(),
            language,
            user_id,
            submission_id,
            submitted_at: chrono::Utc::now(),
        }
    }
}

/// Measurements taken around one execution.
///
/// Wall time is always measured. Peak memory and interpreter operation counts
/// are not collected by the embedded engines; they stay `None` rather than
/// reporting a misleading zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub execution_time_ms: u64,
    pub peak_memory_bytes: Option<u64>,
    pub operation_count: Option<u64>,
}

/// What an engine backend reports for one run, before stream capture and
/// timing are attached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEvaluation {
    pub success: bool,
    /// Rendering of the final expression value, if the run produced one.
    pub result: Option<String>,
    /// Error text when the submitted code failed. Always non-empty on failure.
    pub error: Option<String>,
    /// Static-analysis findings. Empty for dynamic languages.
    pub diagnostics: Vec<String>,
}

impl RawEvaluation {
    pub fn success(result: Option<String>) -> Self {
        Self {
            success: true,
            result,
            error: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.is_empty() {
            "Execution failed".to_string()
        } else {
            error
        };
        Self {
            success: false,
            result: None,
            error: Some(error),
            diagnostics: Vec::new(),
        }
    }
}

/// The complete language-specific outcome of one execution, as handed to the
/// normalizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineOutcome {
    pub success: bool,
    pub result: Option<String>,
    pub error: Option<String>,
    pub diagnostics: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    pub metrics: ExecutionMetrics,
}

impl EngineOutcome {
    pub fn from_evaluation(
        evaluation: RawEvaluation,
        stdout: String,
        stderr: String,
        metrics: ExecutionMetrics,
    ) -> Self {
        Self {
            success: evaluation.success,
            result: evaluation.result,
            error: evaluation.error,
            diagnostics: evaluation.diagnostics,
            stdout,
            stderr,
            metrics,
        }
    }
}
