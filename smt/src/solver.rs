use std::collections::HashMap;

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};
use paste::paste;
use tracing::{trace, warn};
use z3::ast::{Ast, BV, Bool, Int};
use z3::{Context, Solver};

use crate::{ArithOp, Satisfiability, SmtError, SmtResult, Sort, Term};

/// Solver settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SolverConfig {
    /// Per query timeout. Queries that time out report
    /// [`Satisfiability::Unknown`].
    pub timeout_ms: Option<u64>,
}

impl SolverConfig {
    /// Build the z3 configuration for a new context.
    pub fn z3_config(&self) -> z3::Config {
        let mut cfg = z3::Config::new();
        if let Some(timeout) = self.timeout_ms {
            cfg.set_timeout_msec(timeout);
        }
        cfg
    }
}

/// The smallest and largest value a term can take under the current
/// assertions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Bounds {
    pub min: BigInt,
    pub max: BigInt,
}

/// A solver context that only ever accumulates assertions. Symbols are
/// never aliased: declaring a name twice yields two distinct constants.
pub struct SmtSolver<'ctx> {
    ctx: &'ctx Context,
    solver: Solver<'ctx>,
    declared: HashMap<String, usize>,
    assertions: usize,
}

macro_rules! bv_binary_ops {
    ($($op:ident),* $(,)?) => {
        paste! {
            $(
                #[doc = concat!("`bv", stringify!($op), "` over two terms of the same width.")]
                pub fn [<bv_ $op>](&self, lhs: &BV<'ctx>, rhs: &BV<'ctx>) -> SmtResult<BV<'ctx>> {
                    same_width(stringify!($op), lhs, rhs)?;
                    Ok(lhs.[<bv $op>](rhs))
                }
            )*
        }
    };
}

macro_rules! bv_comparisons {
    ($($op:ident),* $(,)?) => {
        paste! {
            $(
                #[doc = concat!("`bv", stringify!($op), "` over two terms of the same width.")]
                pub fn [<bv_ $op>](&self, lhs: &BV<'ctx>, rhs: &BV<'ctx>) -> SmtResult<Bool<'ctx>> {
                    same_width(stringify!($op), lhs, rhs)?;
                    Ok(lhs.[<bv $op>](rhs))
                }
            )*
        }
    };
}

fn same_width(operation: &'static str, lhs: &BV<'_>, rhs: &BV<'_>) -> SmtResult<()> {
    let (lhs, rhs) = (lhs.get_size(), rhs.get_size());
    if lhs == rhs {
        Ok(())
    } else {
        Err(SmtError::WidthMismatch {
            operation,
            lhs,
            rhs,
        })
    }
}

/// Two's complement wrap of `value` into `width` bits.
pub fn wrap(value: &BigInt, width: u32) -> BigUint {
    let modulus = BigInt::one() << width;
    let wrapped = ((value % &modulus) + &modulus) % &modulus;
    wrapped.to_biguint().unwrap_or_default()
}

/// Interpret the low `width` bits of `value` as a number.
pub fn interpret(value: &BigUint, width: u32, signed: bool) -> BigInt {
    let value = BigInt::from(value.clone());
    if signed && width > 0 && value.bit(u64::from(width - 1)) {
        value - (BigInt::one() << width)
    } else {
        value
    }
}

/// The range of a `width`-bit integer.
pub fn type_range(width: u32, signed: bool) -> (BigInt, BigInt) {
    if signed {
        let half = BigInt::one() << (width - 1);
        (-half.clone(), half - 1)
    } else {
        (BigInt::zero(), (BigInt::one() << width) - 1)
    }
}

fn parse_numeral(text: &str) -> Option<BigUint> {
    if let Some(hex) = text.strip_prefix("#x") {
        BigUint::parse_bytes(hex.as_bytes(), 16)
    } else if let Some(bin) = text.strip_prefix("#b") {
        BigUint::parse_bytes(bin.as_bytes(), 2)
    } else {
        BigUint::parse_bytes(text.as_bytes(), 10)
    }
}

impl<'ctx> SmtSolver<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self {
            ctx,
            solver: Solver::new(ctx),
            declared: HashMap::new(),
            assertions: 0,
        }
    }

    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    /// Number of constraints asserted so far.
    pub fn assertion_count(&self) -> usize {
        self.assertions
    }

    ///////////////
    // Symbols. //
    ///////////////

    fn fresh_symbol(&mut self, name: &str) -> String {
        let count = self.declared.entry(name.to_owned()).or_insert(0);
        let symbol = if *count == 0 {
            name.to_owned()
        } else {
            format!("{name}!{count}")
        };
        *count += 1;
        symbol
    }

    /// Declare a fresh constant. Asking for a name that was declared before
    /// gets a suffixed symbol, so earlier constraints never leak onto the
    /// new constant.
    pub fn declare_const(&mut self, name: &str, sort: Sort) -> SmtResult<Term<'ctx>> {
        sort.check()?;
        let symbol = self.fresh_symbol(name);
        trace!(%symbol, %sort, "declared constant");
        Ok(match sort {
            Sort::Bool => Term::Bool(Bool::new_const(self.ctx, symbol)),
            Sort::BitVec(width) => Term::BitVec(BV::new_const(self.ctx, symbol, width)),
        })
    }

    pub fn declare_bv(&mut self, name: &str, width: u32) -> SmtResult<BV<'ctx>> {
        self.declare_const(name, Sort::BitVec(width))?.into_bv()
    }

    pub fn declare_bool(&mut self, name: &str) -> Bool<'ctx> {
        let symbol = self.fresh_symbol(name);
        Bool::new_const(self.ctx, symbol)
    }

    /////////////////
    // Constants. //
    /////////////////

    pub fn create_constant(&self, value: &BigInt, sort: Sort) -> SmtResult<Term<'ctx>> {
        match sort.check()? {
            Sort::Bool => Ok(Term::Bool(self.bool_constant(!value.is_zero()))),
            Sort::BitVec(width) => Ok(Term::BitVec(self.bv_constant(value, width)?)),
        }
    }

    /// A bitvector constant, negative values and values wider than `width`
    /// wrap around like two's complement integers.
    pub fn bv_constant(&self, value: &BigInt, width: u32) -> SmtResult<BV<'ctx>> {
        Sort::BitVec(width).check()?;
        let wrapped = wrap(value, width);
        if let Ok(small) = u64::try_from(&wrapped) {
            return Ok(BV::from_u64(self.ctx, small, width));
        }
        let int = Int::from_str(self.ctx, &wrapped.to_string())
            .ok_or_else(|| SmtError::InvalidConstant(value.to_string()))?;
        Ok(BV::from_int(&int, width))
    }

    pub fn bv_u64(&self, value: u64, width: u32) -> SmtResult<BV<'ctx>> {
        self.bv_constant(&BigInt::from(value), width)
    }

    pub fn bool_constant(&self, value: bool) -> Bool<'ctx> {
        Bool::from_bool(self.ctx, value)
    }

    ///////////////////
    // Assertions. //
    ///////////////////

    /// Add a constraint to the solver. It is never retracted.
    pub fn assert_constraint(&mut self, constraint: &Bool<'ctx>) {
        trace!(%constraint, "assert");
        self.solver.assert(constraint);
        self.assertions += 1;
    }

    pub fn assert_term(&mut self, constraint: &Term<'ctx>) -> SmtResult<()> {
        let constraint = constraint.as_bool()?.clone();
        self.assert_constraint(&constraint);
        Ok(())
    }

    //////////////////
    // Operators. //
    //////////////////

    bv_binary_ops!(add, sub, mul, udiv, sdiv, urem, srem, and, or, xor, shl, lshr, ashr);

    bv_comparisons!(ult, ule, ugt, uge, slt, sle, sgt, sge);

    pub fn bv_not(&self, term: &BV<'ctx>) -> BV<'ctx> {
        term.bvnot()
    }

    pub fn bv_neg(&self, term: &BV<'ctx>) -> BV<'ctx> {
        term.bvneg()
    }

    pub fn bv_size(term: &BV<'ctx>) -> u32 {
        term.get_size()
    }

    pub fn eq(&self, lhs: &BV<'ctx>, rhs: &BV<'ctx>) -> SmtResult<Bool<'ctx>> {
        same_width("eq", lhs, rhs)?;
        Ok(lhs._eq(rhs))
    }

    /// Signed or unsigned `lhs < rhs`.
    pub fn lt(&self, lhs: &BV<'ctx>, rhs: &BV<'ctx>, signed: bool) -> SmtResult<Bool<'ctx>> {
        if signed {
            self.bv_slt(lhs, rhs)
        } else {
            self.bv_ult(lhs, rhs)
        }
    }

    /// Signed or unsigned `lhs <= rhs`.
    pub fn le(&self, lhs: &BV<'ctx>, rhs: &BV<'ctx>, signed: bool) -> SmtResult<Bool<'ctx>> {
        if signed {
            self.bv_sle(lhs, rhs)
        } else {
            self.bv_ule(lhs, rhs)
        }
    }

    pub fn make_ite(
        &self,
        cond: &Bool<'ctx>,
        then: &BV<'ctx>,
        otherwise: &BV<'ctx>,
    ) -> SmtResult<BV<'ctx>> {
        same_width("ite", then, otherwise)?;
        Ok(cond.ite(then, otherwise))
    }

    /// A 1-bit vector that is 1 exactly when `cond` holds.
    pub fn bool_to_bv(&self, cond: &Bool<'ctx>, width: u32) -> SmtResult<BV<'ctx>> {
        let one = self.bv_u64(1, width)?;
        let zero = self.bv_u64(0, width)?;
        self.make_ite(cond, &one, &zero)
    }

    /// Disjunction, false for no terms.
    pub fn or(&self, terms: &[Bool<'ctx>]) -> Bool<'ctx> {
        let refs: Vec<&Bool<'ctx>> = terms.iter().collect();
        Bool::or(self.ctx, &refs)
    }

    /// Conjunction, true for no terms.
    pub fn and(&self, terms: &[Bool<'ctx>]) -> Bool<'ctx> {
        let refs: Vec<&Bool<'ctx>> = terms.iter().collect();
        Bool::and(self.ctx, &refs)
    }

    pub fn not(&self, term: &Bool<'ctx>) -> Bool<'ctx> {
        term.not()
    }

    /// `lhs <=> rhs`.
    pub fn iff(&self, lhs: &Bool<'ctx>, rhs: &Bool<'ctx>) -> Bool<'ctx> {
        lhs._eq(rhs)
    }

    /// The predicate that `lhs op rhs` does not overflow (or underflow) as a
    /// signed or unsigned operation.
    pub fn no_overflow(
        &self,
        op: ArithOp,
        lhs: &BV<'ctx>,
        rhs: &BV<'ctx>,
        signed: bool,
    ) -> SmtResult<Bool<'ctx>> {
        same_width("no_overflow", lhs, rhs)?;
        Ok(match (op, signed) {
            (ArithOp::Add, false) => lhs.bvadd_no_overflow(rhs, false),
            (ArithOp::Add, true) => self.and(&[
                lhs.bvadd_no_overflow(rhs, true),
                lhs.bvadd_no_underflow(rhs),
            ]),
            (ArithOp::Sub, false) => lhs.bvsub_no_underflow(rhs, false),
            (ArithOp::Sub, true) => self.and(&[
                lhs.bvsub_no_overflow(rhs),
                lhs.bvsub_no_underflow(rhs, true),
            ]),
            (ArithOp::Mul, false) => lhs.bvmul_no_overflow(rhs, false),
            (ArithOp::Mul, true) => self.and(&[
                lhs.bvmul_no_overflow(rhs, true),
                lhs.bvmul_no_underflow(rhs),
            ]),
        })
    }

    ///////////////////////
    // Width handling. //
    ///////////////////////

    /// Sign or zero extend `term` to `width` bits.
    pub fn extend(&self, term: &BV<'ctx>, width: u32, signed: bool) -> SmtResult<BV<'ctx>> {
        let size = term.get_size();
        if width < size || !Sort::BitVec(width).is_supported() {
            return Err(SmtError::InvalidResize {
                operation: "extend",
                from: size,
                to: width,
            });
        }
        Ok(match (width - size, signed) {
            (0, _) => term.clone(),
            (extra, true) => term.sign_ext(extra),
            (extra, false) => term.zero_ext(extra),
        })
    }

    /// Keep the low `width` bits of `term`.
    pub fn truncate(&self, term: &BV<'ctx>, width: u32) -> SmtResult<BV<'ctx>> {
        let size = term.get_size();
        if width > size || width == 0 {
            return Err(SmtError::InvalidResize {
                operation: "truncate",
                from: size,
                to: width,
            });
        }
        Ok(if width == size {
            term.clone()
        } else {
            term.extract(width - 1, 0)
        })
    }

    /// Extend or truncate `term` to `width` bits.
    pub fn resize(&self, term: &BV<'ctx>, width: u32, signed: bool) -> SmtResult<BV<'ctx>> {
        if width >= term.get_size() {
            self.extend(term, width, signed)
        } else {
            self.truncate(term, width)
        }
    }

    /// Bring two terms to a common width by extending the narrower one
    /// according to its own signedness.
    pub fn match_width(
        &self,
        lhs: &BV<'ctx>,
        lhs_signed: bool,
        rhs: &BV<'ctx>,
        rhs_signed: bool,
    ) -> SmtResult<(BV<'ctx>, BV<'ctx>)> {
        let (lhs_size, rhs_size) = (lhs.get_size(), rhs.get_size());
        if lhs_size < rhs_size {
            Ok((self.extend(lhs, rhs_size, lhs_signed)?, rhs.clone()))
        } else if rhs_size < lhs_size {
            Ok((lhs.clone(), self.extend(rhs, lhs_size, rhs_signed)?))
        } else {
            Ok((lhs.clone(), rhs.clone()))
        }
    }

    ////////////////
    // Queries. //
    ////////////////

    pub fn check_sat(&self) -> Satisfiability {
        let result = self.solver.check().into();
        if result == Satisfiability::Unknown {
            warn!("solver returned unknown");
        }
        result
    }

    /// Check the assertions together with `hypotheses`. The hypotheses are
    /// only assumed for this query.
    pub fn check_assuming(&self, hypotheses: &[Bool<'ctx>]) -> Satisfiability {
        let result = self.solver.check_assumptions(hypotheses).into();
        if result == Satisfiability::Unknown {
            warn!("solver returned unknown");
        }
        result
    }

    /// True when `claim` holds in every model of the assertions.
    pub fn is_valid(&self, claim: &Bool<'ctx>) -> SmtResult<bool> {
        match self.check_assuming(&[claim.not()]) {
            Satisfiability::Unsat => Ok(true),
            Satisfiability::Sat => Ok(false),
            Satisfiability::Unknown => Err(SmtError::SolverUnknown),
        }
    }

    /// True when `claim` holds in at least one model of the assertions.
    pub fn is_possible(&self, claim: &Bool<'ctx>) -> SmtResult<bool> {
        match self.check_assuming(std::slice::from_ref(claim)) {
            Satisfiability::Sat => Ok(true),
            Satisfiability::Unsat => Ok(false),
            Satisfiability::Unknown => Err(SmtError::SolverUnknown),
        }
    }

    /// The value of `term` in a model of the assertions, if there is one.
    pub fn model_value(&self, term: &BV<'ctx>, signed: bool) -> Option<BigInt> {
        if self.check_sat() != Satisfiability::Sat {
            return None;
        }
        let model = self.solver.get_model()?;
        let value = model.eval(term, true)?;
        let raw = match value.as_u64() {
            Some(small) => BigUint::from(small),
            None => parse_numeral(&value.to_string())?,
        };
        Some(interpret(&raw, term.get_size(), signed))
    }

    /// The tightest bounds of `term` under the current assertions, `None`
    /// when the assertions are unsatisfiable.
    pub fn bounds(&self, term: &BV<'ctx>, signed: bool) -> SmtResult<Option<Bounds>> {
        match self.check_sat() {
            Satisfiability::Unsat => return Ok(None),
            Satisfiability::Unknown => return Err(SmtError::SolverUnknown),
            Satisfiability::Sat => {}
        }
        let width = term.get_size();
        let (type_min, type_max) = type_range(width, signed);

        // Smallest v with term <= v possible.
        let (mut lo, mut hi) = (type_min.clone(), type_max.clone());
        while lo < hi {
            let mid: BigInt = (&lo + &hi) >> 1;
            let bound = self.bv_constant(&mid, width)?;
            if self.is_possible(&self.le(term, &bound, signed)?)? {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        let min = lo;

        // Largest v with term >= v possible.
        let (mut lo, mut hi) = (min.clone(), type_max);
        while lo < hi {
            let mid: BigInt = (&lo + &hi + 1) >> 1;
            let bound = self.bv_constant(&mid, width)?;
            if self.is_possible(&self.le(&bound, term, signed)?)? {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        Ok(Some(Bounds { min, max: lo }))
    }
}

impl core::fmt::Debug for SmtSolver<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SmtSolver")
            .field("declared", &self.declared.len())
            .field("assertions", &self.assertions)
            .finish()
    }
}
