//! The canonical result tree.
//!
//! Every language-specific outcome is folded into the same hierarchical
//! pass/fail shape so consumers never need to know which engine produced a
//! result. The child order of the root suite is a contract: static
//! diagnostics first, then captured standard output, then the execution
//! outcome.

use serde::Serialize;

use crate::domain::{EngineOutcome, Language};

pub const TYPE_CHECKING_LABEL: &str = "Type Checking";
pub const STANDARD_OUTPUT_LABEL: &str = "Standard Output";
pub const CODE_EXECUTION_LABEL: &str = "Code Execution";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Suite,
    Case,
    Passed,
    Failed,
    Error,
    /// Informational timing leaf. Never gates aggregation.
    Timing,
}

impl NodeKind {
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            NodeKind::Passed | NodeKind::Failed | NodeKind::Error | NodeKind::Timing
        )
    }
}

/// One node of the canonical tree.
///
/// Container nodes (`suite`, `case`) aggregate: their `passed` flag is the
/// conjunction of their children's. Leaves carry their own outcome and have
/// no children.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResultNode {
    pub kind: NodeKind,
    pub label: String,
    pub passed: bool,
    pub children: Vec<ResultNode>,
}

impl ResultNode {
    pub fn leaf(kind: NodeKind, label: impl Into<String>) -> Self {
        let passed = matches!(kind, NodeKind::Passed | NodeKind::Timing);
        Self {
            kind,
            label: label.into(),
            passed,
            children: Vec::new(),
        }
    }

    pub fn case(label: impl Into<String>, children: Vec<ResultNode>) -> Self {
        Self::container(NodeKind::Case, label, children)
    }

    pub fn suite(label: impl Into<String>, children: Vec<ResultNode>) -> Self {
        Self::container(NodeKind::Suite, label, children)
    }

    fn container(kind: NodeKind, label: impl Into<String>, children: Vec<ResultNode>) -> Self {
        let passed = children.iter().all(|child| child.passed);
        Self {
            kind,
            label: label.into(),
            passed,
            children,
        }
    }

    /// Recomputes the aggregate outcome from the leaves. Matches `passed`
    /// on every tree built through the constructors above.
    pub fn aggregated_passed(&self) -> bool {
        if self.kind.is_leaf() {
            self.passed
        } else {
            self.children.iter().all(|child| child.aggregated_passed())
        }
    }
}

/// Maps one engine outcome into the canonical tree. Deterministic and pure.
pub fn normalize(language: Language, outcome: &EngineOutcome) -> ResultNode {
    let mut children = Vec::new();

    if !outcome.diagnostics.is_empty() {
        let leaves = outcome
            .diagnostics
            .iter()
            .map(|diagnostic| ResultNode::leaf(NodeKind::Failed, diagnostic.clone()))
            .collect();
        children.push(ResultNode::case(TYPE_CHECKING_LABEL, leaves));
    }

    if !outcome.stdout.is_empty() {
        children.push(ResultNode::case(
            STANDARD_OUTPUT_LABEL,
            vec![ResultNode::leaf(NodeKind::Passed, outcome.stdout.clone())],
        ));
    }

    let execution_leaf = if outcome.success {
        let value = outcome
            .result
            .clone()
            .unwrap_or_else(|| language.void_literal().to_string());
        ResultNode::leaf(NodeKind::Passed, format!("Result: {value}"))
    } else {
        let reason = outcome
            .error
            .clone()
            .filter(|error| !error.is_empty())
            .or_else(|| {
                if outcome.stderr.is_empty() {
                    None
                } else {
                    Some(outcome.stderr.clone())
                }
            })
            .unwrap_or_else(|| "Execution failed".to_string());
        ResultNode::leaf(NodeKind::Failed, format!("Error: {reason}"))
    };
    children.push(ResultNode::case(CODE_EXECUTION_LABEL, vec![execution_leaf]));

    ResultNode::suite(format!("{} Execution", language.display_name()), children)
}

/// Builds the tree for a request the adapter itself could not serve.
pub fn fault_tree(language: Language, message: &str) -> ResultNode {
    let leaf = ResultNode::leaf(NodeKind::Error, format!("Error: {message}"));
    ResultNode::suite(
        format!("{} Execution", language.display_name()),
        vec![ResultNode::case(CODE_EXECUTION_LABEL, vec![leaf])],
    )
}

/// Leaf tallies for one tree.
///
/// `errors` counts adapter faults and static diagnostics; `failed` counts
/// user-code logic failures. Diagnostic leaves live under the type-checking
/// case, which is how the two are told apart here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResultCounts {
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
}

impl ResultCounts {
    pub fn from_tree(tree: &ResultNode) -> Self {
        let mut counts = Self::default();
        tally(tree, false, &mut counts);
        counts
    }
}

fn tally(node: &ResultNode, in_diagnostics: bool, counts: &mut ResultCounts) {
    match node.kind {
        NodeKind::Passed => counts.passed += 1,
        NodeKind::Error => counts.errors += 1,
        NodeKind::Failed => {
            if in_diagnostics {
                counts.errors += 1;
            } else {
                counts.failed += 1;
            }
        }
        NodeKind::Timing => {}
        NodeKind::Suite | NodeKind::Case => {
            let entering_diagnostics =
                in_diagnostics || (node.kind == NodeKind::Case && node.label == TYPE_CHECKING_LABEL);
            for child in &node.children {
                tally(child, entering_diagnostics, counts);
            }
        }
    }
}
