use tracing::{debug, trace};

use super::domain::VariableStore;
use super::handlers::{
    HandlerContext, HandlerResult, Value, assert_equal, assert_no_overflow, assert_one_of, create,
    get_or_create, operand_value, read_variable, rederive, return_identity,
    tuple_element_identity,
};
use crate::ir::{Node, Operand, Type, Variable};

pub(crate) fn assign<'ctx>(
    lvalue: &Variable,
    rvalue: &Operand,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(ty) = lvalue.ty.word() else {
        trace!(%lvalue, "assignment of a non-word value");
        return Ok(());
    };
    let target = get_or_create(store, cx, &lvalue.identity(), ty)?;
    if let Some(value) = operand_value(store, cx, rvalue, ty)? {
        assert_equal(cx, &target, &value)?;
    }
    Ok(())
}

/// Conversions extend by the signedness of the source and truncate
/// otherwise. The result is always in range.
pub(crate) fn convert<'ctx>(
    lvalue: &Variable,
    operand: &Operand,
    ty: &Type,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(target_ty) = ty.word() else {
        trace!(%lvalue, %ty, "conversion to a non-word type");
        return Ok(());
    };
    let target = rederive(store, cx, &lvalue.identity(), target_ty)?;
    let value = match operand {
        Operand::Constant(_) => operand_value(store, cx, operand, target_ty)?,
        Operand::Variable(var) => read_variable(store, cx, var)?.as_ref().map(Value::from),
    };
    if let Some(value) = value {
        assert_equal(cx, &target, &value)?;
    }
    assert_no_overflow(cx, &target);
    Ok(())
}

/// Define the lvalue without constraining it.
pub(crate) fn unconstrained<'ctx>(
    lvalue: Option<&Variable>,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(var) = lvalue else {
        return Ok(());
    };
    if let Some(ty) = var.ty.word() {
        get_or_create(store, cx, &var.identity(), ty)?;
    }
    Ok(())
}

pub(crate) fn ret<'ctx>(
    values: &[Operand],
    node: &Node,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    for (index, value) in values.iter().enumerate() {
        match value {
            Operand::Constant(constant) => {
                let Some(ty) = constant.ty.word() else {
                    continue;
                };
                let target = get_or_create(store, cx, &return_identity(node.id, index), ty)?;
                if let Some(value) = operand_value(store, cx, value, ty)? {
                    assert_equal(cx, &target, &value)?;
                }
            }
            Operand::Variable(var) => {
                read_variable(store, cx, var)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn unpack<'ctx>(
    lvalue: &Variable,
    tuple: &Variable,
    index: usize,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(ty) = lvalue.ty.word() else {
        return Ok(());
    };
    let target = get_or_create(store, cx, &lvalue.identity(), ty)?;
    let element = tuple_element_identity(&tuple.identity(), index);
    match store.get(&element).map(Value::from) {
        Some(value) => assert_equal(cx, &target, &value),
        None => {
            debug!(%tuple, index, "unpacking an untracked tuple element");
            Ok(())
        }
    }
}

/// The lvalue equals one of the tracked incoming versions.
pub(crate) fn phi_callback<'ctx>(
    lvalue: &Variable,
    rvalues: &[Variable],
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(ty) = lvalue.ty.word() else {
        return Ok(());
    };
    let target = get_or_create(store, cx, &lvalue.identity(), ty)?;
    let incoming: Vec<Value> = rvalues
        .iter()
        .filter_map(|var| store.get(&var.identity()).map(Value::from))
        .collect();
    if incoming.is_empty() {
        return Ok(());
    }
    assert_one_of(cx, &target, &incoming)
}

/// A merge of SSA versions. The lvalue is constrained once, when it is
/// first defined and every incoming version is already tracked. A loop
/// header sees its back edge versions only on later visits, so its phi
/// stays unconstrained: one symbol stands for every iteration.
pub(crate) fn phi<'ctx>(
    lvalue: &Variable,
    rvalues: &[Variable],
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(ty) = lvalue.ty.word() else {
        return Ok(());
    };
    let identity = lvalue.identity();
    if store.get(&identity).is_some() {
        return Ok(());
    }
    let incoming: Option<Vec<Value>> = rvalues
        .iter()
        .map(|var| store.get(&var.identity()).map(Value::from))
        .collect();
    let target = create(store, cx, &identity, ty)?;
    match incoming {
        Some(incoming) if !incoming.is_empty() => assert_one_of(cx, &target, &incoming),
        _ => {
            trace!(%lvalue, "phi with untracked incoming versions");
            Ok(())
        }
    }
}

/// `delete` resets the value to zero.
pub(crate) fn delete<'ctx>(
    lvalue: &Variable,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(ty) = lvalue.ty.word() else {
        return Ok(());
    };
    let target = get_or_create(store, cx, &lvalue.identity(), ty)?;
    let zero = cx.solver.bv_u64(0, target.width())?;
    assert_equal(
        cx,
        &target,
        &Value {
            term: zero,
            signed: false,
        },
    )
}
