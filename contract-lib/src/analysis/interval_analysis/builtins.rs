use tracing::{debug, trace};

use super::assignment::unconstrained;
use super::domain::VariableStore;
use super::handlers::{
    HandlerContext, HandlerResult, Value, assert_equal, get_or_create, operand_value,
    read_variable,
};
use crate::ir::{ElementaryType, Operand, SolidityFunction, Variable};

const WORD: ElementaryType = ElementaryType::Uint(256);

#[derive(Clone, Copy)]
enum Space {
    Storage,
    Memory,
}

impl Space {
    fn key(self, slot: &Operand) -> String {
        let space = match self {
            Space::Storage => "storage",
            Space::Memory => "memory",
        };
        match slot {
            Operand::Constant(constant) => format!("{space}[{constant}]"),
            Operand::Variable(var) => format!("{space}[{}]", var.identity()),
        }
    }
}

pub(crate) fn solidity_call<'ctx>(
    lvalue: Option<&Variable>,
    function: &SolidityFunction,
    arguments: &[Operand],
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    match function {
        SolidityFunction::Sstore => write_word(Space::Storage, lvalue, arguments, store, cx),
        SolidityFunction::Mstore => write_word(Space::Memory, lvalue, arguments, store, cx),
        SolidityFunction::Sload => read_word(Space::Storage, lvalue, arguments, store, cx),
        SolidityFunction::Mload => read_word(Space::Memory, lvalue, arguments, store, cx),
        SolidityFunction::Require | SolidityFunction::Assert => {
            assume(arguments.first(), store, cx)?;
            unconstrained(lvalue, store, cx)
        }
        SolidityFunction::Revert => Ok(()),
        SolidityFunction::Keccak256 | SolidityFunction::Other(_) => {
            unconstrained(lvalue, store, cx)
        }
    }
}

/// Record the stored word so a later load of the same key can see it.
fn write_word<'ctx>(
    space: Space,
    lvalue: Option<&Variable>,
    arguments: &[Operand],
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let [slot, value, ..] = arguments else {
        debug!(arguments = arguments.len(), "store with missing arguments");
        return unconstrained(lvalue, store, cx);
    };
    let key = space.key(slot);
    let writer = match lvalue {
        Some(var) => var.identity(),
        None => format!(
            "{key}@{}.{}",
            cx.position.block_id, cx.position.op_id
        ),
    };
    let target = get_or_create(store, cx, &writer, &WORD)?;
    if let Some(value) = operand_value(store, cx, value, &WORD)? {
        assert_equal(cx, &target, &value)?;
    }
    store.record_write(&key, &writer);
    Ok(())
}

/// A load correlates with the write of the same key when there is exactly
/// one, and is unconstrained otherwise.
fn read_word<'ctx>(
    space: Space,
    lvalue: Option<&Variable>,
    arguments: &[Operand],
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(var) = lvalue else {
        return Ok(());
    };
    let ty = var.ty.word().cloned().unwrap_or(WORD);
    let target = get_or_create(store, cx, &var.identity(), &ty)?;
    let Some(slot) = arguments.first() else {
        return Ok(());
    };
    let writers = store.writers(&space.key(slot));
    let [writer] = writers.as_slice() else {
        trace!(writers = writers.len(), "no unique writer, load is unconstrained");
        return Ok(());
    };
    match store.get(writer).map(Value::from) {
        Some(value) => assert_equal(cx, &target, &value),
        None => Ok(()),
    }
}

/// `require` and `assert` only let executions through where the condition
/// holds.
fn assume<'ctx>(
    condition: Option<&Operand>,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(Operand::Variable(var)) = condition else {
        return Ok(());
    };
    let Some(condition) = read_variable(store, cx, var)? else {
        return Ok(());
    };
    let zero = cx.solver.bv_u64(0, condition.width())?;
    let holds = cx.solver.not(&cx.solver.eq(&condition.term, &zero)?);
    cx.solver.assert_constraint(&holds);
    Ok(())
}
