use std::collections::BTreeSet;

use tracing::trace;

use super::domain::VariableStore;
use super::handlers::{HandlerContext, HandlerResult};
use super::{arithmetic, assignment, builtins, calls, references};
use crate::error::{AnalysisError, ErrorContext};
use crate::ir::{Node, Operation, OperationKind};

lazy_static! {
    static ref STANDARD_HANDLERS: BTreeSet<OperationKind> =
        OperationKind::ALL.into_iter().collect();
}

/// Kinds whose handler deliberately leaves the domain unchanged.
const NO_OP_KINDS: [OperationKind; 4] = [
    OperationKind::Condition,
    OperationKind::Transfer,
    OperationKind::EventCall,
    OperationKind::Nop,
];

/// The operation kinds the interval analysis knows how to handle. Meeting
/// an operation of any other kind aborts the analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerRegistry {
    kinds: BTreeSet<OperationKind>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl HandlerRegistry {
    /// A handler for every kind of the IR.
    pub fn standard() -> Self {
        Self {
            kinds: STANDARD_HANDLERS.clone(),
        }
    }

    pub fn empty() -> Self {
        Self {
            kinds: BTreeSet::new(),
        }
    }

    pub fn with(mut self, kind: OperationKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn without(mut self, kind: OperationKind) -> Self {
        self.kinds.remove(&kind);
        self
    }

    pub fn handles(&self, kind: OperationKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn implemented(&self) -> Vec<OperationKind> {
        self.kinds.iter().copied().collect()
    }

    /// The registered kinds that are accepted without changing the domain.
    pub fn no_ops(&self) -> Vec<OperationKind> {
        NO_OP_KINDS
            .into_iter()
            .filter(|kind| self.handles(*kind))
            .collect()
    }

    /// Apply the handler registered for the operation's kind.
    pub fn handle<'ctx>(
        &self,
        op: &Operation,
        node: &Node,
        store: &mut dyn VariableStore<'ctx>,
        cx: &mut HandlerContext<'_, 'ctx>,
    ) -> HandlerResult {
        let kind = op.kind();
        if !self.handles(kind) {
            return Err(AnalysisError::UnimplementedOperation {
                kind,
                implemented: self.implemented(),
                context: Box::new(error_context(op, node, store, cx)),
            });
        }
        trace!(node = node.id, %op, "handling operation");
        dispatch(op, node, store, cx)
            .map_err(|err| err.with_context(|| error_context(op, node, &*store, &*cx)))
    }
}

fn error_context(
    op: &Operation,
    node: &Node,
    store: &dyn VariableStore<'_>,
    cx: &HandlerContext<'_, '_>,
) -> ErrorContext {
    ErrorContext {
        function: cx.function().to_owned(),
        node: Some(node.id),
        operation: op.to_string(),
        domain: store.snapshot(),
    }
}

fn dispatch<'ctx>(
    op: &Operation,
    node: &Node,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    match op {
        Operation::Assignment { lvalue, rvalue } => assignment::assign(lvalue, rvalue, store, cx),
        Operation::Binary {
            lvalue,
            op,
            left,
            right,
        } => arithmetic::binary(lvalue, *op, left, right, store, cx),
        Operation::Unary {
            lvalue,
            op,
            operand,
        } => arithmetic::unary(lvalue, *op, operand, store, cx),
        Operation::TypeConversion {
            lvalue,
            operand,
            ty,
        } => assignment::convert(lvalue, operand, ty, store, cx),
        Operation::Index {
            lvalue,
            base,
            index,
        } => references::index(lvalue, base, index, store, cx),
        Operation::Member {
            lvalue,
            base,
            field,
        } => references::member(lvalue, base, field, store, cx),
        Operation::InitArray { lvalue, values } => {
            references::init_array(lvalue, values, store, cx)
        }
        Operation::Length { lvalue, base } => references::length(lvalue, base, store, cx),
        Operation::InternalCall {
            lvalue,
            function,
            arguments,
        } => calls::internal_call(lvalue.as_ref(), function, arguments, store, cx),
        Operation::LibraryCall {
            lvalue,
            library,
            function,
            arguments,
        } => calls::internal_call(
            lvalue.as_ref(),
            &format!("{library}.{function}"),
            arguments,
            store,
            cx,
        ),
        Operation::HighLevelCall { lvalue, .. }
        | Operation::LowLevelCall { lvalue, .. }
        | Operation::Send { lvalue, .. } => assignment::unconstrained(lvalue.as_ref(), store, cx),
        Operation::NewElementaryType { lvalue, .. }
        | Operation::NewContract { lvalue, .. }
        | Operation::NewArray { lvalue, .. }
        | Operation::NewStructure { lvalue, .. } => {
            assignment::unconstrained(Some(lvalue), store, cx)
        }
        Operation::SolidityCall {
            lvalue,
            function,
            arguments,
        } => builtins::solidity_call(lvalue.as_ref(), function, arguments, store, cx),
        Operation::Return { values } => assignment::ret(values, node, store, cx),
        Operation::Unpack {
            lvalue,
            tuple,
            index,
        } => assignment::unpack(lvalue, tuple, *index, store, cx),
        Operation::Phi { lvalue, rvalues } => assignment::phi(lvalue, rvalues, store, cx),
        Operation::PhiCallback { lvalue, rvalues } => {
            assignment::phi_callback(lvalue, rvalues, store, cx)
        }
        Operation::Delete { lvalue, .. } => assignment::delete(lvalue, store, cx),
        Operation::Condition { .. }
        | Operation::Transfer { .. }
        | Operation::EventCall { .. }
        | Operation::Nop => Ok(()),
    }
}
