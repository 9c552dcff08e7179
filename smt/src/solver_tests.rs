use itertools::Itertools;
use num_bigint::BigInt;
use z3::{Config, Context};

use crate::*;

fn context() -> Context {
    Context::new(&Config::new())
}

#[test]
fn redeclaring_a_name_does_not_alias() {
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let first = solver.declare_bv("x", 8).unwrap();
    let one = solver.bv_u64(1, 8).unwrap();
    solver.assert_constraint(&solver.eq(&first, &one).unwrap());

    let second = solver.declare_bv("x", 8).unwrap();
    let two = solver.bv_u64(2, 8).unwrap();
    assert!(solver.is_possible(&solver.eq(&second, &two).unwrap()).unwrap());
    assert!(solver.is_valid(&solver.eq(&first, &one).unwrap()).unwrap());
}

#[test]
fn unsupported_sorts_fail_fast() {
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    assert_eq!(
        solver.declare_const("x", Sort::BitVec(0)).unwrap_err(),
        SmtError::UnsupportedSort(Sort::BitVec(0))
    );
    assert!(solver.bv_u64(1, MAX_WIDTH + 1).is_err());
    assert!(solver.declare_const("b", Sort::Bool).is_ok());
}

#[test]
fn mismatched_widths_fail_fast() {
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let narrow = solver.declare_bv("a", 8).unwrap();
    let wide = solver.declare_bv("b", 16).unwrap();
    assert_eq!(
        solver.bv_add(&narrow, &wide).unwrap_err(),
        SmtError::WidthMismatch {
            operation: "add",
            lhs: 8,
            rhs: 16
        }
    );
    assert!(solver.eq(&narrow, &wide).is_err());
    assert!(solver.make_ite(&solver.bool_constant(true), &narrow, &wide).is_err());
    assert!(solver.truncate(&narrow, 16).is_err());
    assert!(solver.extend(&wide, 8, false).is_err());
}

#[test]
fn constants_wrap_like_twos_complement() {
    let ctx = context();
    let solver = SmtSolver::new(&ctx);
    let minus_one = solver.bv_constant(&BigInt::from(-1), 8).unwrap();
    assert_eq!(solver.model_value(&minus_one, false), Some(BigInt::from(255)));
    assert_eq!(solver.model_value(&minus_one, true), Some(BigInt::from(-1)));

    let big = BigInt::from(1) << 200;
    let term = solver.bv_constant(&big, 256).unwrap();
    assert_eq!(solver.model_value(&term, false), Some(big));

    let overflowing = solver.bv_constant(&BigInt::from(300), 8).unwrap();
    assert_eq!(solver.model_value(&overflowing, false), Some(BigInt::from(44)));
}

#[test]
fn extend_then_truncate_is_identity() {
    let widths = [1, 2, 7, 8, 16, 32, 64, 128, 160, 256];
    for (narrow, wide) in widths.iter().copied().tuple_combinations() {
        for signed in [false, true] {
            let ctx = context();
            let mut solver = SmtSolver::new(&ctx);
            let x = solver.declare_bv("x", narrow).unwrap();
            let extended = solver.extend(&x, wide, signed).unwrap();
            assert_eq!(SmtSolver::bv_size(&extended), wide);
            let back = solver.truncate(&extended, narrow).unwrap();
            let same = solver.eq(&back, &x).unwrap();
            assert_eq!(
                solver.check_assuming(&[solver.not(&same)]),
                Satisfiability::Unsat,
                "{narrow} -> {wide}, signed: {signed}"
            );
        }
    }
}

#[test]
fn match_width_follows_the_narrower_signedness() {
    let ctx = context();
    let solver = SmtSolver::new(&ctx);
    let minus_one = solver.bv_constant(&BigInt::from(-1), 8).unwrap();
    let wide = solver.bv_u64(0, 16).unwrap();

    let (signed, _) = solver.match_width(&minus_one, true, &wide, false).unwrap();
    assert_eq!(solver.model_value(&signed, false), Some(BigInt::from(0xFFFF)));

    let (_, unsigned) = solver.match_width(&wide, false, &minus_one, false).unwrap();
    assert_eq!(solver.model_value(&unsigned, false), Some(BigInt::from(0xFF)));

    let truncated = solver.truncate(&solver.bv_u64(0x1234, 16).unwrap(), 8).unwrap();
    assert_eq!(solver.model_value(&truncated, false), Some(BigInt::from(0x34)));
}

#[test]
fn bounds_follow_the_assertions() {
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let x = solver.declare_bv("x", 8).unwrap();
    let ten = solver.bv_u64(10, 8).unwrap();
    solver.assert_constraint(&solver.bv_ult(&x, &ten).unwrap());
    assert_eq!(
        solver.bounds(&x, false).unwrap(),
        Some(Bounds {
            min: BigInt::from(0),
            max: BigInt::from(9)
        })
    );

    let y = solver.declare_bv("y", 8).unwrap();
    let zero = solver.bv_u64(0, 8).unwrap();
    let minus_five = solver.bv_constant(&BigInt::from(-5), 8).unwrap();
    solver.assert_constraint(&solver.bv_slt(&y, &zero).unwrap());
    solver.assert_constraint(&solver.bv_sgt(&y, &minus_five).unwrap());
    assert_eq!(
        solver.bounds(&y, true).unwrap(),
        Some(Bounds {
            min: BigInt::from(-4),
            max: BigInt::from(-1)
        })
    );

    solver.assert_constraint(&solver.eq(&x, &ten).unwrap());
    assert_eq!(solver.bounds(&x, false).unwrap(), None);
}

#[test]
fn overflow_predicates() {
    let ctx = context();
    let solver = SmtSolver::new(&ctx);
    let a = solver.bv_u64(200, 8).unwrap();
    let b = solver.bv_u64(100, 8).unwrap();
    let small = solver.bv_u64(20, 8).unwrap();

    let unsigned_add = solver.no_overflow(ArithOp::Add, &a, &b, false).unwrap();
    assert!(!solver.is_possible(&unsigned_add).unwrap());
    let fits = solver.no_overflow(ArithOp::Add, &small, &b, false).unwrap();
    assert!(solver.is_valid(&fits).unwrap());

    let underflow = solver.no_overflow(ArithOp::Sub, &small, &b, false).unwrap();
    assert!(!solver.is_possible(&underflow).unwrap());

    // 100 * 20 does not fit into a signed byte.
    let signed_mul = solver.no_overflow(ArithOp::Mul, &b, &small, true).unwrap();
    assert!(!solver.is_possible(&signed_mul).unwrap());
}

#[test]
fn ite_and_connectives() {
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let flag = solver.declare_bool("flag");
    let as_bv = solver.bool_to_bv(&flag, 1).unwrap();
    let one = solver.bv_u64(1, 1).unwrap();
    solver.assert_constraint(&flag);
    assert!(solver.is_valid(&solver.eq(&as_bv, &one).unwrap()).unwrap());

    let x = solver.declare_bv("x", 8).unwrap();
    let options = [
        solver.eq(&x, &solver.bv_u64(3, 8).unwrap()).unwrap(),
        solver.eq(&x, &solver.bv_u64(5, 8).unwrap()).unwrap(),
    ];
    solver.assert_constraint(&solver.or(&options));
    assert_eq!(
        solver.bounds(&x, false).unwrap(),
        Some(Bounds {
            min: BigInt::from(3),
            max: BigInt::from(5)
        })
    );
    assert!(!solver.is_possible(&solver.eq(&x, &solver.bv_u64(4, 8).unwrap()).unwrap()).unwrap());
    assert_eq!(solver.check_sat(), Satisfiability::Sat);
    assert!(solver.assertion_count() >= 2);
}
