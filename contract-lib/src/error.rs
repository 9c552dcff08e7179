use itertools::Itertools;
use smt::SmtError;
use thiserror::Error;

use crate::ir::{NodeId, OperationKind};

/// Where an analysis stopped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub function: String,
    pub node: Option<NodeId>,
    /// The printed operation.
    pub operation: String,
    /// The identities tracked by the domain at the time of the failure.
    pub domain: String,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Encountering an operation without a registered handler is a
    /// configuration error, never silently skipped.
    #[error(
        "no handler registered for {kind} operations in `{}` at node {}: `{}` (implemented: {})",
        .context.function,
        print_node(.context.node),
        .context.operation,
        .implemented.iter().join(", ")
    )]
    UnimplementedOperation {
        kind: OperationKind,
        implemented: Vec<OperationKind>,
        context: Box<ErrorContext>,
    },

    #[error("{source} (in `{}`, operation `{}`)", print_function(.context), print_operation(.context))]
    Smt {
        source: SmtError,
        context: Option<Box<ErrorContext>>,
    },

    #[error("the analysis of `{function}` did not reach a fixpoint within {limit} visits per node")]
    DidNotConverge { function: String, limit: usize },
}

fn print_node(node: Option<NodeId>) -> String {
    node.map_or_else(|| "?".to_owned(), |id| id.to_string())
}

fn print_function(context: &Option<Box<ErrorContext>>) -> &str {
    context.as_ref().map_or("?", |ctx| ctx.function.as_str())
}

fn print_operation(context: &Option<Box<ErrorContext>>) -> &str {
    context.as_ref().map_or("?", |ctx| ctx.operation.as_str())
}

impl From<SmtError> for AnalysisError {
    fn from(source: SmtError) -> Self {
        AnalysisError::Smt {
            source,
            context: None,
        }
    }
}

impl AnalysisError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            AnalysisError::UnimplementedOperation { context, .. } => Some(context),
            AnalysisError::Smt { context, .. } => context.as_deref(),
            AnalysisError::DidNotConverge { .. } => None,
        }
    }

    /// Attach the location to errors that do not carry one yet. Errors
    /// raised inside a callee keep the callee's location.
    pub(crate) fn with_context(self, make: impl FnOnce() -> ErrorContext) -> Self {
        match self {
            AnalysisError::Smt {
                source,
                context: None,
            } => AnalysisError::Smt {
                source,
                context: Some(Box::new(make())),
            },
            other => other,
        }
    }
}
