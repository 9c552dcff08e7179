use analysis::cfg::OpPos;
use smt::z3::ast::BV;
use smt::{SmtError, SmtSolver, Sort};
use tracing::trace;

use super::IntervalConfig;
use super::domain::{TrackedVariable, VariableStore};
use super::registry::HandlerRegistry;
use crate::error::AnalysisError;
use crate::ir::{ElementaryType, NodeId, Operand, Program, Variable, VariableKind};

pub(crate) type HandlerResult<T = ()> = Result<T, AnalysisError>;

/// Everything a handler needs besides the domain it mutates.
pub struct HandlerContext<'a, 'ctx> {
    pub solver: &'a mut SmtSolver<'ctx>,
    pub program: &'a Program,
    pub registry: &'a HandlerRegistry,
    pub config: &'a IntervalConfig,
    /// The analyzed function followed by the inlined callees.
    pub call_stack: Vec<String>,
    /// The operation being handled, in the innermost function.
    pub position: OpPos,
}

impl HandlerContext<'_, '_> {
    pub fn function(&self) -> &str {
        self.call_stack.last().map_or("", String::as_str)
    }
}

/// A value ready to be constrained against a tracked variable.
pub(crate) struct Value<'ctx> {
    pub term: BV<'ctx>,
    pub signed: bool,
}

impl<'ctx> From<&TrackedVariable<'ctx>> for Value<'ctx> {
    fn from(var: &TrackedVariable<'ctx>) -> Self {
        Value {
            term: var.term.clone(),
            signed: var.is_signed(),
        }
    }
}

fn width_of(ty: &ElementaryType) -> Result<u32, SmtError> {
    ty.bit_width().ok_or(SmtError::UnsupportedSort(Sort::BitVec(0)))
}

/// Declare a fresh symbol for `identity`, replacing any previous entry.
pub(crate) fn create<'ctx>(
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
    identity: &str,
    ty: &ElementaryType,
) -> HandlerResult<TrackedVariable<'ctx>> {
    let qualified = store.qualify(identity);
    let term = cx.solver.declare_bv(&qualified, width_of(ty)?)?;
    let overflow = cx.solver.declare_bool(&format!("{qualified}.overflow"));
    let var = TrackedVariable::new(qualified, ty.clone(), term, overflow);
    trace!(identity = %var.identity, symbol = var.symbol(), "tracking variable");
    store.insert(identity, var.clone());
    Ok(var)
}

/// Reuse the tracked variable when there is one. Revisiting an operation
/// must constrain the same symbols again.
pub(crate) fn get_or_create<'ctx>(
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
    identity: &str,
    ty: &ElementaryType,
) -> HandlerResult<TrackedVariable<'ctx>> {
    match store.get(identity) {
        Some(var) => Ok(var.clone()),
        None => create(store, cx, identity, ty),
    }
}

/// Like [`get_or_create`] but replaces an entry of another type.
pub(crate) fn rederive<'ctx>(
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
    identity: &str,
    ty: &ElementaryType,
) -> HandlerResult<TrackedVariable<'ctx>> {
    match store.get(identity) {
        Some(var) if &var.ty == ty => Ok(var.clone()),
        _ => create(store, cx, identity, ty),
    }
}

/// The tracked variable for a read. Reads of unknown variables produce an
/// unconstrained symbol, parameters additionally start in range.
pub(crate) fn read_variable<'ctx>(
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
    var: &Variable,
) -> HandlerResult<Option<TrackedVariable<'ctx>>> {
    let identity = var.identity();
    if let Some(tracked) = store.get(&identity) {
        return Ok(Some(tracked.clone()));
    }
    let Some(ty) = var.ty.word() else {
        return Ok(None);
    };
    let tracked = create(store, cx, &identity, ty)?;
    if var.kind == VariableKind::Parameter {
        assert_no_overflow(cx, &tracked);
    }
    Ok(Some(tracked))
}

/// The value of an operand. Constants take the width of `ty`.
pub(crate) fn operand_value<'ctx>(
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
    operand: &Operand,
    ty: &ElementaryType,
) -> HandlerResult<Option<Value<'ctx>>> {
    match operand {
        Operand::Constant(constant) => {
            let Some(value) = constant.as_int() else {
                return Ok(None);
            };
            Ok(Some(Value {
                term: cx.solver.bv_constant(&value, width_of(ty)?)?,
                signed: ty.is_signed(),
            }))
        }
        Operand::Variable(var) => {
            Ok(read_variable(store, cx, var)?.as_ref().map(Value::from))
        }
    }
}

/// Assert `target == value`, converting the value to the width of the
/// target first.
pub(crate) fn assert_equal<'ctx>(
    cx: &mut HandlerContext<'_, 'ctx>,
    target: &TrackedVariable<'ctx>,
    value: &Value<'ctx>,
) -> HandlerResult {
    let value = cx.solver.resize(&value.term, target.width(), value.signed)?;
    let constraint = cx.solver.eq(&target.term, &value)?;
    cx.solver.assert_constraint(&constraint);
    Ok(())
}

/// The target equals at least one of `values`, which must not be empty.
pub(crate) fn assert_one_of<'ctx>(
    cx: &mut HandlerContext<'_, 'ctx>,
    target: &TrackedVariable<'ctx>,
    values: &[Value<'ctx>],
) -> HandlerResult {
    let mut options = Vec::with_capacity(values.len());
    for value in values {
        let value = cx.solver.resize(&value.term, target.width(), value.signed)?;
        options.push(cx.solver.eq(&target.term, &value)?);
    }
    let constraint = cx.solver.or(&options);
    cx.solver.assert_constraint(&constraint);
    Ok(())
}

pub(crate) fn assert_no_overflow<'ctx>(
    cx: &mut HandlerContext<'_, 'ctx>,
    var: &TrackedVariable<'ctx>,
) {
    let constraint = cx.solver.not(&var.overflow);
    cx.solver.assert_constraint(&constraint);
}

/// Literal return values get an identity derived from their position.
pub fn return_identity(node: NodeId, index: usize) -> String {
    format!("ret#{node}.{index}")
}

/// The identity of a component of a tuple valued variable.
pub fn tuple_element_identity(tuple: &str, index: usize) -> String {
    format!("{tuple}[{index}]")
}
