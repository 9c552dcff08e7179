use num_traits::ToPrimitive;
use smt::ArithOp;
use smt::z3::ast::{BV, Bool};
use tracing::debug;

use super::domain::{TrackedVariable, VariableStore};
use super::handlers::{
    HandlerContext, HandlerResult, Value, assert_equal, get_or_create, operand_value,
};
use crate::ir::{BinaryOp, ElementaryType, Operand, UnaryOp, Variable};

/// Exponents above this are left unconstrained.
const MAX_CONSTANT_EXPONENT: u32 = 256;

const WORD: ElementaryType = ElementaryType::Uint(256);

pub(crate) fn binary<'ctx>(
    lvalue: &Variable,
    op: BinaryOp,
    left: &Operand,
    right: &Operand,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(result_ty) = lvalue.ty.word() else {
        debug!(%lvalue, "binary result is not a word");
        return Ok(());
    };
    let result = get_or_create(store, cx, &lvalue.identity(), result_ty)?;
    if op.is_comparison() {
        compare(&result, op, left, right, store, cx)
    } else {
        arithmetic(&result, op, left, right, store, cx)
    }
}

/// The type comparison operands are brought to: the type of the first
/// variable operand, constants adapt to it.
fn comparison_type(left: &Operand, right: &Operand) -> ElementaryType {
    [left, right]
        .into_iter()
        .filter(|operand| operand.as_variable().is_some())
        .chain([left, right])
        .find_map(|operand| operand.ty().word().cloned())
        .unwrap_or(WORD)
}

fn compare<'ctx>(
    result: &TrackedVariable<'ctx>,
    op: BinaryOp,
    left: &Operand,
    right: &Operand,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let operand_ty = comparison_type(left, right);
    let lhs = operand_value(store, cx, left, &operand_ty)?;
    let rhs = operand_value(store, cx, right, &operand_ty)?;
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return Ok(());
    };
    let (lhs, rhs) = cx.solver.match_width(&lhs.term, lhs.signed, &rhs.term, rhs.signed)?;
    let signed = operand_ty.is_signed();
    let zero = cx.solver.bv_u64(0, lhs.get_size())?;
    let flag = match op {
        BinaryOp::Lt => cx.solver.lt(&lhs, &rhs, signed)?,
        BinaryOp::Gt => cx.solver.lt(&rhs, &lhs, signed)?,
        BinaryOp::Le => cx.solver.le(&lhs, &rhs, signed)?,
        BinaryOp::Ge => cx.solver.le(&rhs, &lhs, signed)?,
        BinaryOp::Eq => cx.solver.eq(&lhs, &rhs)?,
        BinaryOp::Ne => cx.solver.not(&cx.solver.eq(&lhs, &rhs)?),
        BinaryOp::And => cx.solver.and(&[is_set(cx, &lhs, &zero)?, is_set(cx, &rhs, &zero)?]),
        BinaryOp::Or => cx.solver.or(&[is_set(cx, &lhs, &zero)?, is_set(cx, &rhs, &zero)?]),
        other => {
            debug!(%other, "not a comparison");
            return Ok(());
        }
    };
    let value = cx.solver.bool_to_bv(&flag, result.width())?;
    assert_equal(
        cx,
        result,
        &Value {
            term: value,
            signed: false,
        },
    )
}

fn is_set<'ctx>(
    cx: &HandlerContext<'_, 'ctx>,
    term: &BV<'ctx>,
    zero: &BV<'ctx>,
) -> HandlerResult<Bool<'ctx>> {
    Ok(cx.solver.not(&cx.solver.eq(term, zero)?))
}

fn arithmetic<'ctx>(
    result: &TrackedVariable<'ctx>,
    op: BinaryOp,
    left: &Operand,
    right: &Operand,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let (width, signed) = (result.width(), result.is_signed());
    let is_shift = matches!(op, BinaryOp::Shl | BinaryOp::Shr);
    // A shift amount keeps the type it was computed in.
    let rhs_ty = match right.ty().word() {
        Some(ty) if is_shift => ty.clone(),
        _ => result.ty.clone(),
    };
    let lhs = operand_value(store, cx, left, &result.ty)?;
    let rhs = operand_value(store, cx, right, &rhs_ty)?;
    let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
        return Ok(());
    };
    let amount = rhs.term.clone();
    let lhs = cx.solver.resize(&lhs.term, width, lhs.signed)?;
    // Shift amounts and exponents are always unsigned.
    let rhs_signed = rhs.signed && !is_shift && op != BinaryOp::Pow;
    let rhs = cx.solver.resize(&rhs.term, width, rhs_signed)?;

    let checked = match op {
        BinaryOp::Add => Some(ArithOp::Add),
        BinaryOp::Sub => Some(ArithOp::Sub),
        BinaryOp::Mul => Some(ArithOp::Mul),
        _ => None,
    };
    let term = match op {
        BinaryOp::Add => cx.solver.bv_add(&lhs, &rhs)?,
        BinaryOp::Sub => cx.solver.bv_sub(&lhs, &rhs)?,
        BinaryOp::Mul => cx.solver.bv_mul(&lhs, &rhs)?,
        BinaryOp::Div if signed => cx.solver.bv_sdiv(&lhs, &rhs)?,
        BinaryOp::Div => cx.solver.bv_udiv(&lhs, &rhs)?,
        BinaryOp::Mod if signed => cx.solver.bv_srem(&lhs, &rhs)?,
        BinaryOp::Mod => cx.solver.bv_urem(&lhs, &rhs)?,
        BinaryOp::Shl | BinaryOp::Shr => shift(cx, op, &lhs, &amount, signed)?,
        BinaryOp::BitAnd => cx.solver.bv_and(&lhs, &rhs)?,
        BinaryOp::BitOr => cx.solver.bv_or(&lhs, &rhs)?,
        BinaryOp::BitXor => cx.solver.bv_xor(&lhs, &rhs)?,
        BinaryOp::Pow => {
            let exponent = match right {
                Operand::Constant(constant) => constant.as_int().and_then(|e| e.to_u32()),
                Operand::Variable(_) => None,
            };
            match exponent {
                Some(exponent) if exponent <= MAX_CONSTANT_EXPONENT => {
                    power(cx, &lhs, exponent)?
                }
                _ => {
                    debug!(identity = %result.identity, "exponent is not a small constant");
                    return Ok(());
                }
            }
        }
        other => {
            debug!(%other, "not an arithmetic operator");
            return Ok(());
        }
    };
    assert_equal(
        cx,
        result,
        &Value {
            term,
            signed,
        },
    )?;

    let overflowed = match checked {
        Some(arith) => cx.solver.not(&cx.solver.no_overflow(arith, &lhs, &rhs, signed)?),
        None => cx.solver.bool_constant(false),
    };
    let constraint = cx.solver.iff(&result.overflow, &overflowed);
    cx.solver.assert_constraint(&constraint);
    Ok(())
}

/// Shift at the wider of the two widths, then keep the low bits. An amount
/// of at least the value's width shifts every bit out.
fn shift<'ctx>(
    cx: &HandlerContext<'_, 'ctx>,
    op: BinaryOp,
    value: &BV<'ctx>,
    amount: &BV<'ctx>,
    signed: bool,
) -> HandlerResult<BV<'ctx>> {
    let width = value.get_size();
    let wide = width.max(amount.get_size());
    let value = cx.solver.extend(value, wide, signed)?;
    let amount = cx.solver.extend(amount, wide, false)?;
    let shifted = match op {
        BinaryOp::Shl => cx.solver.bv_shl(&value, &amount)?,
        BinaryOp::Shr if signed => cx.solver.bv_ashr(&value, &amount)?,
        _ => cx.solver.bv_lshr(&value, &amount)?,
    };
    Ok(cx.solver.truncate(&shifted, width)?)
}

/// `base ** exponent` by squaring, wrapping like the machine does.
fn power<'ctx>(cx: &HandlerContext<'_, 'ctx>, base: &BV<'ctx>, exponent: u32) -> HandlerResult<BV<'ctx>> {
    let mut result = cx.solver.bv_u64(1, base.get_size())?;
    let mut square = base.clone();
    let mut remaining = exponent;
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = cx.solver.bv_mul(&result, &square)?;
        }
        remaining >>= 1;
        if remaining > 0 {
            square = cx.solver.bv_mul(&square, &square)?;
        }
    }
    Ok(result)
}

pub(crate) fn unary<'ctx>(
    lvalue: &Variable,
    op: UnaryOp,
    operand: &Operand,
    store: &mut dyn VariableStore<'ctx>,
    cx: &mut HandlerContext<'_, 'ctx>,
) -> HandlerResult {
    let Some(result_ty) = lvalue.ty.word() else {
        debug!(%lvalue, "unary result is not a word");
        return Ok(());
    };
    let result = get_or_create(store, cx, &lvalue.identity(), result_ty)?;
    let Some(value) = operand_value(store, cx, operand, result_ty)? else {
        return Ok(());
    };
    let term = match op {
        UnaryOp::Not => {
            let zero = cx.solver.bv_u64(0, value.term.get_size())?;
            let is_zero = cx.solver.eq(&value.term, &zero)?;
            cx.solver.bool_to_bv(&is_zero, result.width())?
        }
        UnaryOp::Tilde => {
            let resized = cx.solver.resize(&value.term, result.width(), value.signed)?;
            cx.solver.bv_not(&resized)
        }
    };
    assert_equal(
        cx,
        &result,
        &Value {
            term,
            signed: result.is_signed(),
        },
    )
}
