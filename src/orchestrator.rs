//! The single entry point of the engine.
//!
//! Adapter selection goes through a registry keyed by language, and live
//! instances are pooled per (user, language) so concurrent sessions never
//! contend for the same interpreter. A fault that poisons an instance evicts
//! it from the pool; the next request for that slot gets a fresh one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::config::ExecutionLimits;
use crate::domain::{EngineOutcome, ExecutionRequest, Language};
use crate::error::RuntimeFault;
use crate::normalize::{ResultCounts, ResultNode, fault_tree, normalize};
use crate::runtime::{
    AdapterFactory, JavaScriptRuntimeFactory, PythonRuntimeFactory, RuntimeAdapter,
    TypeScriptRuntimeFactory,
};

/// Maps languages to adapter factories.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    factories: HashMap<Language, Arc<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry covering every language that ships with the crate.
    pub fn with_builtin_languages() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PythonRuntimeFactory));
        registry.register(Arc::new(JavaScriptRuntimeFactory));
        registry.register(Arc::new(TypeScriptRuntimeFactory));
        registry
    }

    pub fn register(&mut self, factory: Arc<dyn AdapterFactory>) {
        self.factories.insert(factory.language(), factory);
    }

    pub fn supports(&self, language: Language) -> bool {
        self.factories.contains_key(&language)
    }

    fn factory_for(&self, language: Language) -> Result<&Arc<dyn AdapterFactory>, RuntimeFault> {
        self.factories
            .get(&language)
            .ok_or(RuntimeFault::UnsupportedLanguage(language))
    }
}

/// Whether the adapter call itself completed. Pass/fail of the submitted
/// code is carried by the result tree, not here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OutcomeType {
    #[serde(rename = "execution success")]
    Success,
    #[serde(rename = "execution error")]
    Error,
}

impl fmt::Display for OutcomeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeType::Success => f.write_str("execution success"),
            OutcomeType::Error => f.write_str("execution error"),
        }
    }
}

/// The caller-facing envelope. Built once per request, never mutated.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub outcome_type: OutcomeType,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub wall_time_ms: u64,
    pub timed_out: bool,
    pub message: String,
    pub result_tree: ResultNode,
    pub counts: ResultCounts,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PoolKey {
    user_id: Uuid,
    language: Language,
}

/// Turns execution requests into canonical responses.
#[derive(Debug)]
pub struct ExecutionOrchestrator {
    registry: AdapterRegistry,
    limits: ExecutionLimits,
    pool: DashMap<PoolKey, Arc<dyn RuntimeAdapter>>,
}

impl ExecutionOrchestrator {
    pub fn new(registry: AdapterRegistry, limits: ExecutionLimits) -> Self {
        Self {
            registry,
            limits,
            pool: DashMap::new(),
        }
    }

    pub fn with_builtin_languages(limits: ExecutionLimits) -> Self {
        Self::new(AdapterRegistry::with_builtin_languages(), limits)
    }

    /// Runs one submission to completion and reports the outcome.
    ///
    /// Never fails: adapter faults are folded into an `"execution error"`
    /// response, and user-code failures are ordinary data in the result
    /// tree. No retries; one report per request.
    #[tracing::instrument(
        skip(self, request),
        fields(language = %request.language, submission = %request.submission_id)
    )]
    pub async fn run(&self, request: ExecutionRequest) -> ExecutionResponse {
        let started = Instant::now();
        match self.try_run(&request).await {
            Ok(outcome) => success_response(&request, &outcome, started),
            Err(fault) => {
                tracing::warn!(%fault, "request failed at the adapter level");
                fault_response(&request, &fault, started)
            }
        }
    }

    /// Destroys every instance owned by one user session.
    pub fn end_session(&self, user_id: Uuid) {
        let keys: Vec<PoolKey> = self
            .pool
            .iter()
            .filter(|entry| entry.key().user_id == user_id)
            .map(|entry| *entry.key())
            .collect();
        for key in keys {
            if let Some((_, adapter)) = self.pool.remove(&key) {
                adapter.destroy();
            }
        }
    }

    async fn try_run(&self, request: &ExecutionRequest) -> Result<EngineOutcome, RuntimeFault> {
        let adapter = self.adapter_for(request.user_id, request.language)?;

        let result = match adapter.initialize().await {
            Ok(()) => adapter.execute(&request.code).await,
            Err(fault) => Err(fault),
        };

        if let Err(fault) = &result {
            if fault.poisons_instance() {
                // Cooperative interpreters cannot be interrupted in place;
                // a poisoned instance is discarded and rebuilt on demand.
                let key = PoolKey {
                    user_id: request.user_id,
                    language: request.language,
                };
                if let Some((_, poisoned)) = self.pool.remove(&key) {
                    poisoned.destroy();
                }
            }
        }

        result
    }

    fn adapter_for(
        &self,
        user_id: Uuid,
        language: Language,
    ) -> Result<Arc<dyn RuntimeAdapter>, RuntimeFault> {
        let factory = self.registry.factory_for(language)?;
        let key = PoolKey { user_id, language };
        let adapter = self
            .pool
            .entry(key)
            .or_insert_with(|| factory.spawn(&self.limits))
            .clone();
        Ok(adapter)
    }
}

fn success_response(
    request: &ExecutionRequest,
    outcome: &EngineOutcome,
    started: Instant,
) -> ExecutionResponse {
    let result_tree = normalize(request.language, outcome);
    let counts = ResultCounts::from_tree(&result_tree);
    let message = if outcome.success {
        "execution completed".to_string()
    } else {
        outcome
            .error
            .clone()
            .unwrap_or_else(|| "execution failed".to_string())
    };

    ExecutionResponse {
        outcome_type: OutcomeType::Success,
        stdout: outcome.stdout.clone(),
        stderr: outcome.stderr.clone(),
        exit_code: if outcome.success { 0 } else { 1 },
        wall_time_ms: started.elapsed().as_millis() as u64,
        timed_out: false,
        message,
        result_tree,
        counts,
    }
}

fn fault_response(
    request: &ExecutionRequest,
    fault: &RuntimeFault,
    started: Instant,
) -> ExecutionResponse {
    let message = fault.to_string();
    let result_tree = fault_tree(request.language, &message);
    let counts = ResultCounts::from_tree(&result_tree);

    ExecutionResponse {
        outcome_type: OutcomeType::Error,
        stdout: String::new(),
        stderr: String::new(),
        exit_code: -1,
        wall_time_ms: started.elapsed().as_millis() as u64,
        timed_out: matches!(fault, RuntimeFault::Timeout { .. }),
        message,
        result_tree,
        counts,
    }
}
