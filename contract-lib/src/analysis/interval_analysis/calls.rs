use std::collections::HashMap;

use analysis::cfg::OpPos;
use tracing::{debug, warn};

use super::assignment::unconstrained;
use super::domain::{PrefixedDomain, TrackedVariable, VariableStore};
use super::handlers::{
    HandlerContext, HandlerResult, Value, assert_equal, assert_one_of, create, get_or_create,
    operand_value, return_identity, tuple_element_identity,
};
use crate::ir::{Function, Operand, Type, Variable, VariableKind};

/// The prefix qualifying the callee's variables for one call site. It only
/// depends on the call site, so revisiting the call reuses the symbols.
pub fn call_prefix(callee: &str, position: OpPos) -> String {
    format!("{callee}@{}.{}::", position.block_id, position.op_id)
}

/// Inline a call to a function of the program: bind the parameters to the
/// arguments, run every operation of the callee in a prefixed view of the
/// caller's domain and equate the lvalue with one of the returned values.
/// Whenever the call cannot be modeled the result is unconstrained.
pub(crate) fn internal_call<'ctx>(
    lvalue: Option<&Variable>,
    callee_name: &str,
    arguments: &[Operand],
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let program = cx.program;
    let Some(callee) = program.function(callee_name) else {
        debug!(callee = callee_name, "callee is not part of the program");
        return unconstrained(lvalue, store, cx);
    };
    if cx.call_stack.len() > cx.config.max_call_depth {
        warn!(callee = callee_name, depth = cx.call_stack.len(), "call depth limit reached");
        return unconstrained(lvalue, store, cx);
    }
    if arguments.len() != callee.parameters.len() {
        warn!(
            callee = callee_name,
            arguments = arguments.len(),
            parameters = callee.parameters.len(),
            "arity mismatch"
        );
        return unconstrained(lvalue, store, cx);
    }
    let Some(bindings) = resolve_arguments(callee, arguments, store, cx)? else {
        debug!(callee = callee_name, "unresolvable argument");
        return unconstrained(lvalue, store, cx);
    };

    let prefix = call_prefix(callee_name, cx.position);
    let returned = {
        let mut view = PrefixedDomain::new(store, &prefix);
        bind_parameters(callee, &bindings, &mut view, cx)?;
        run_callee(callee, &mut view, cx)?;
        returned_values(callee, &view)
    };

    let Some(lvalue) = lvalue else {
        return Ok(());
    };
    match &lvalue.ty {
        Type::Tuple(types) => {
            for (index, ty) in types.iter().enumerate() {
                let Some(ty) = ty.word() else {
                    continue;
                };
                let identity = tuple_element_identity(&lvalue.identity(), index);
                let target = get_or_create(store, cx, &identity, ty)?;
                bind_result(cx, &target, &returned, index)?;
            }
            Ok(())
        }
        ty => {
            let Some(ty) = ty.word() else {
                return Ok(());
            };
            let target = get_or_create(store, cx, &lvalue.identity(), ty)?;
            bind_result(cx, &target, &returned, 0)
        }
    }
}

/// The result equals the value one of the return sites yields at `index`.
/// It stays unconstrained when some return site has no tracked value there.
fn bind_result<'ctx>(
    cx: &mut HandlerContext<'_, 'ctx>,
    target: &TrackedVariable<'ctx>,
    returned: &[Vec<Option<TrackedVariable<'ctx>>>],
    index: usize,
) -> HandlerResult {
    let values: Option<Vec<Value>> = returned
        .iter()
        .map(|site| site.get(index)?.as_ref().map(Value::from))
        .collect();
    match values {
        Some(values) if !values.is_empty() => assert_one_of(cx, target, &values),
        _ => {
            debug!(result = %target.identity, "returned value is not tracked");
            Ok(())
        }
    }
}

/// The argument value of every word typed parameter, keyed by the
/// parameter's name. `None` when an argument has no value.
fn resolve_arguments<'ctx>(
    callee: &Function,
    arguments: &[Operand],
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult<Option<HashMap<String, Value<'ctx>>>> {
    let mut bindings = HashMap::new();
    for (parameter, argument) in callee.parameters.iter().zip(arguments) {
        let Some(ty) = parameter.ty.word() else {
            continue;
        };
        let Some(value) = operand_value(store, cx, argument, ty)? else {
            return Ok(None);
        };
        bindings.insert(parameter.name.clone(), value);
    }
    Ok(Some(bindings))
}

/// Every SSA version of a parameter read by the callee starts out equal to
/// the argument.
fn bind_parameters<'ctx>(
    callee: &Function,
    bindings: &HashMap<String, Value<'ctx>>,
    view: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let occurrences = callee.parameters.iter().chain(
        callee
            .nodes
            .iter()
            .flat_map(|node| node.operations.iter())
            .flat_map(|op| op.variables())
            .filter(|var| var.kind == VariableKind::Parameter),
    );
    for var in occurrences {
        let (Some(value), Some(ty)) = (bindings.get(&var.name), var.ty.word()) else {
            continue;
        };
        let identity = var.identity();
        if view.get(&identity).is_some() {
            continue;
        }
        let parameter = create(view, cx, &identity, ty)?;
        assert_equal(cx, &parameter, value)?;
    }
    Ok(())
}

fn run_callee<'ctx>(
    callee: &Function,
    view: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let registry = cx.registry;
    let caller_position = cx.position;
    cx.call_stack.push(callee.name.clone());
    let result = callee.nodes.iter().try_for_each(|node| {
        node.operations
            .iter()
            .enumerate()
            .try_for_each(|(op_id, op)| {
                cx.position = OpPos {
                    block_id: node.id,
                    op_id,
                };
                registry.handle(op, node, view, cx)
            })
    });
    cx.call_stack.pop();
    cx.position = caller_position;
    result
}

/// The tracked values of every return operation of the callee.
fn returned_values<'ctx>(
    callee: &Function,
    view: &dyn VariableStore<'ctx>,
) -> Vec<Vec<Option<TrackedVariable<'ctx>>>> {
    callee
        .return_sites()
        .into_iter()
        .map(|(node, values)| {
            values
                .iter()
                .enumerate()
                .map(|(index, value)| {
                    let identity = match value {
                        Operand::Variable(var) => var.identity(),
                        Operand::Constant(_) => return_identity(node, index),
                    };
                    view.get(&identity).cloned()
                })
                .collect()
        })
        .collect()
}
