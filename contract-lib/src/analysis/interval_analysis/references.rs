use num_bigint::BigInt;
use tracing::trace;

use super::domain::VariableStore;
use super::handlers::{
    HandlerContext, HandlerResult, Value, assert_equal, get_or_create, operand_value,
    read_variable,
};
use crate::ir::{ArrayInit, ElementaryType, Operand, Type, Variable, VariableKind};

/// The identity elements of `base` are named after. Different SSA versions
/// of a variable share their elements, references resolve to the element
/// they point to.
fn container_identity(base: &Variable, store: &dyn VariableStore<'_>) -> String {
    match base.kind {
        VariableKind::Reference => store
            .resolve_alias(&base.identity())
            .unwrap_or_else(|| base.identity()),
        _ => base.name.clone(),
    }
}

fn index_key(index: &Operand) -> String {
    match index {
        Operand::Constant(constant) => constant.to_string(),
        Operand::Variable(var) => var.identity(),
    }
}

/// The reference and the element it points to are the same value.
fn link<'ctx>(
    reference: &Variable,
    element: &str,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    store.alias(&reference.identity(), element);
    let Some(ty) = reference.ty.word() else {
        trace!(%reference, element, "reference to a non-word value");
        return Ok(());
    };
    let reference = get_or_create(store, cx, &reference.identity(), ty)?;
    let target = get_or_create(store, cx, element, ty)?;
    assert_equal(cx, &reference, &Value::from(&target))
}

pub(crate) fn index<'ctx>(
    lvalue: &Variable,
    base: &Variable,
    index: &Operand,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let element = format!("{}[{}]", container_identity(base, store), index_key(index));
    link(lvalue, &element, store, cx)?;

    // Reading a fixed size array out of bounds reverts.
    if let (Type::Array(_, Some(len)), Operand::Variable(index_var)) = (&base.ty, index) {
        let Some(position) = read_variable(store, cx, index_var)? else {
            return Ok(());
        };
        let position = cx.solver.resize(&position.term, 256, false)?;
        let len = cx.solver.bv_constant(&BigInt::from(*len), 256)?;
        let constraint = cx.solver.bv_ult(&position, &len)?;
        cx.solver.assert_constraint(&constraint);
    }
    Ok(())
}

pub(crate) fn member<'ctx>(
    lvalue: &Variable,
    base: &Variable,
    field: &str,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let element = format!("{}.{field}", container_identity(base, store));
    link(lvalue, &element, store, cx)
}

/// Only the top level of literal arrays is modeled.
pub(crate) fn init_array<'ctx>(
    lvalue: &Variable,
    values: &[ArrayInit],
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Type::Array(element_ty, _) = &lvalue.ty else {
        return Ok(());
    };
    let Some(element_ty) = element_ty.word() else {
        return Ok(());
    };
    for (position, value) in values.iter().enumerate() {
        let ArrayInit::Value(operand) = value else {
            trace!(%lvalue, position, "skipping nested array literal");
            continue;
        };
        let identity = format!("{}[{position}]", lvalue.name);
        let target = get_or_create(store, cx, &identity, element_ty)?;
        if let Some(value) = operand_value(store, cx, operand, element_ty)? {
            assert_equal(cx, &target, &value)?;
        }
    }
    Ok(())
}

pub(crate) fn length<'ctx>(
    lvalue: &Variable,
    base: &Variable,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let ty = lvalue.ty.word().cloned().unwrap_or(ElementaryType::Uint(256));
    let target = get_or_create(store, cx, &lvalue.identity(), &ty)?;
    if let Type::Array(_, Some(len)) = &base.ty {
        let len = cx.solver.bv_constant(&BigInt::from(*len), target.width())?;
        assert_equal(
            cx,
            &target,
            &Value {
                term: len,
                signed: false,
            },
        )?;
    }
    Ok(())
}
