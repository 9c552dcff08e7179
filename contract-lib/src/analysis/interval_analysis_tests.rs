use analysis::cfg::OpPos;
use num_bigint::BigInt;
use pretty_assertions::assert_eq;
use smt::z3::Context;
use smt::{Bounds, SmtSolver};

use super::interval_analysis::*;
use super::test_utils::*;
use crate::error::AnalysisError;
use crate::ir::*;

fn context() -> Context {
    Context::new(&IntervalConfig::default().solver.z3_config())
}

fn between(min: i64, max: i64) -> Option<Bounds> {
    Some(Bounds {
        min: BigInt::from(min),
        max: BigInt::from(max),
    })
}

fn exactly(value: i64) -> Option<Bounds> {
    Some(Bounds {
        min: BigInt::from(value),
        max: BigInt::from(value),
    })
}

fn program_of(functions: Vec<Function>) -> Program {
    let mut program = Program::default();
    for function in functions {
        program.add_function(function);
    }
    program
}

fn binary(lvalue: Variable, op: BinaryOp, left: impl Into<Operand>, right: impl Into<Operand>) -> Operation {
    Operation::Binary {
        lvalue,
        op,
        left: left.into(),
        right: right.into(),
    }
}

#[test]
fn constants_have_exact_bounds() {
    let f = straight_line(
        "f",
        Vec::new(),
        vec![
            vec![assign(uint("x", 1), constant(5))],
            vec![binary(uint("y", 1), BinaryOp::Mul, uint("x", 1), constant(3))],
            vec![binary(uint("z", 1), BinaryOp::Pow, constant(3), constant(2))],
        ],
    );
    let program = program_of(vec![f.clone()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &f, &mut solver)
        .unwrap();

    assert_eq!(results.bounds(&solver, "x_1").unwrap(), exactly(5));
    assert_eq!(results.bounds(&solver, "y_1").unwrap(), exactly(15));
    assert_eq!(results.bounds(&solver, "z_1").unwrap(), exactly(9));
    assert_eq!(results.bounds(&solver, "missing").unwrap(), None);
}

#[test]
fn parameters_start_in_their_type_range() {
    let a = Variable::parameter("a", 1, Type::uint(8));
    let f = straight_line(
        "f",
        vec![a.clone()],
        vec![vec![assign(uint8("x", 1), a)]],
    );
    let program = program_of(vec![f.clone()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &f, &mut solver)
        .unwrap();

    assert_eq!(
        results.bounds(&solver, "x_1").unwrap(),
        Some(Bounds {
            min: BigInt::from(0),
            max: BigInt::from(255),
        })
    );
    assert!(!results.may_overflow(&solver, "a_1").unwrap());
}

#[test]
fn wrapping_arithmetic_sets_the_overflow_flag() {
    let a = Variable::parameter("a", 1, Type::uint(8));
    let one = Constant::int(1, Type::uint(8));
    let f = straight_line(
        "f",
        vec![a.clone()],
        vec![vec![
            binary(uint8("sum", 1), BinaryOp::Add, a.clone(), one.clone()),
            binary(uint8("masked", 1), BinaryOp::BitAnd, a, one),
            binary(
                uint8("small", 1),
                BinaryOp::Add,
                Constant::int(3, Type::uint(8)),
                Constant::int(4, Type::uint(8)),
            ),
        ]],
    );
    let program = program_of(vec![f.clone()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &f, &mut solver)
        .unwrap();

    assert!(results.may_overflow(&solver, "sum_1").unwrap());
    assert!(!results.may_overflow(&solver, "masked_1").unwrap());
    assert!(!results.may_overflow(&solver, "small_1").unwrap());
    assert_eq!(results.bounds(&solver, "small_1").unwrap(), exactly(7));
}

#[test]
fn require_narrows_the_range() {
    let a = Variable::parameter("a", 1, Type::uint(256));
    let below = Variable::temporary("TMP_0", Type::bool());
    let f = straight_line(
        "f",
        vec![a.clone()],
        vec![vec![
            binary(below.clone(), BinaryOp::Lt, a, constant(10)),
            Operation::SolidityCall {
                lvalue: None,
                function: SolidityFunction::Require,
                arguments: vec![below.into()],
            },
        ]],
    );
    let program = program_of(vec![f.clone()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &f, &mut solver)
        .unwrap();

    assert_eq!(
        results.bounds(&solver, "a_1").unwrap(),
        Some(Bounds {
            min: BigInt::from(0),
            max: BigInt::from(9),
        })
    );
}

#[test]
fn writes_through_references_reach_later_reads() {
    let balances = Variable::state(
        "balances",
        1,
        Type::mapping(Type::address(), Type::uint(256)),
    );
    let who = Variable::parameter("who", 1, Type::address());
    let amount = Variable::parameter("amount", 1, Type::uint(256));
    let write_ref = Variable::reference("REF_0", Type::uint(256), balances.clone());
    let read_ref = Variable::reference("REF_1", Type::uint(256), balances.clone());
    let f = straight_line(
        "f",
        vec![who.clone(), amount.clone()],
        vec![
            vec![
                Operation::Index {
                    lvalue: write_ref.clone(),
                    base: balances.clone(),
                    index: who.clone().into(),
                },
                assign(write_ref, amount),
            ],
            vec![
                Operation::Index {
                    lvalue: read_ref.clone(),
                    base: balances,
                    index: who.into(),
                },
                assign(uint("x", 1), read_ref),
            ],
        ],
    );
    let program = program_of(vec![f.clone()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &f, &mut solver)
        .unwrap();

    let x = results.variable("x_1").unwrap();
    let amount = results.variable("amount_1").unwrap();
    assert!(solver.is_valid(&solver.eq(&x.term, &amount.term).unwrap()).unwrap());
    assert!(results.state(2).unwrap().contains("balances[who_1]"));
}

#[test]
fn loads_see_the_unique_store() {
    let value = Variable::parameter("value", 1, Type::uint(256));
    let loaded = uint("loaded", 1);
    let f = straight_line(
        "f",
        vec![value.clone()],
        vec![
            vec![Operation::SolidityCall {
                lvalue: None,
                function: SolidityFunction::Sstore,
                arguments: vec![constant(0), value.into()],
            }],
            vec![Operation::SolidityCall {
                lvalue: Some(loaded),
                function: SolidityFunction::Sload,
                arguments: vec![constant(0)],
            }],
        ],
    );
    let program = program_of(vec![f.clone()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &f, &mut solver)
        .unwrap();

    let loaded = results.variable("loaded_1").unwrap();
    let value = results.variable("value_1").unwrap();
    assert!(solver.is_valid(&solver.eq(&loaded.term, &value.term).unwrap()).unwrap());
}

#[test]
fn fixed_array_indices_stay_in_bounds() {
    let values = Variable::parameter("values", 1, Type::fixed_array(Type::uint(256), 4));
    let index = Variable::parameter("i", 1, Type::uint(256));
    let element = Variable::reference("REF_0", Type::uint(256), values.clone());
    let f = straight_line(
        "f",
        vec![values.clone(), index.clone()],
        vec![vec![
            Operation::Index {
                lvalue: element.clone(),
                base: values,
                index: index.into(),
            },
            assign(uint("x", 1), element),
        ]],
    );
    let program = program_of(vec![f.clone()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &f, &mut solver)
        .unwrap();

    assert_eq!(
        results.bounds(&solver, "i_1").unwrap(),
        Some(Bounds {
            min: BigInt::from(0),
            max: BigInt::from(3),
        })
    );
    assert!(results.state(1).unwrap().contains("values[3]"));
}

#[test]
fn state_variables_start_at_their_initial_value() {
    let total = Variable::state("total", 1, Type::uint(256));
    let f = straight_line(
        "f",
        Vec::new(),
        vec![vec![binary(uint("next", 1), BinaryOp::Add, total.clone(), constant(1))]],
    );
    let mut program = program_of(vec![f.clone()]);
    program.add_state_variable(total, Some(Constant::int(41, Type::uint(256))));
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &f, &mut solver)
        .unwrap();

    assert_eq!(results.bounds(&solver, "next_1").unwrap(), exactly(42));
}

#[test]
fn unregistered_operations_are_fatal() {
    let f = straight_line(
        "f",
        Vec::new(),
        vec![
            vec![assign(uint("x", 1), constant(1))],
            vec![binary(uint("y", 1), BinaryOp::Add, uint("x", 1), constant(1))],
        ],
    );
    let program = program_of(vec![f.clone()]);
    let analysis = IntervalAnalysis::default()
        .with_registry(HandlerRegistry::standard().without(OperationKind::Binary));
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let err = analysis.analyze(&program, &f, &mut solver).unwrap_err();

    let AnalysisError::UnimplementedOperation {
        kind,
        implemented,
        context,
    } = &err
    else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*kind, OperationKind::Binary);
    assert!(!implemented.contains(&OperationKind::Binary));
    assert!(implemented.contains(&OperationKind::Assignment));
    assert_eq!(context.function, "f");
    assert_eq!(context.node, Some(2));
    assert_eq!(context.operation, "y_1(uint256) = x_1 + 1");
    assert!(context.domain.contains("x_1"));
    assert!(err.to_string().contains("Binary"));
}

#[test]
fn no_op_kinds_are_registered() {
    let registry = HandlerRegistry::standard();
    assert_eq!(registry.implemented().len(), OperationKind::ALL.len());
    assert!(registry.no_ops().contains(&OperationKind::Condition));
    assert!(!registry.no_ops().contains(&OperationKind::Phi));
    assert!(HandlerRegistry::empty().no_ops().is_empty());
    assert!(
        HandlerRegistry::empty()
            .with(OperationKind::Nop)
            .handles(OperationKind::Nop)
    );
}

fn double() -> Function {
    let p = Variable::parameter("p", 1, Type::uint(256));
    let mut callee = straight_line(
        "double",
        vec![p.clone()],
        vec![
            vec![binary(uint("q", 1), BinaryOp::Add, p.clone(), p)],
            vec![Operation::Return {
                values: vec![uint("q", 1).into()],
            }],
        ],
    );
    callee.returns = vec![Type::uint(256)];
    callee
}

#[test]
fn internal_calls_bind_arguments_and_results() {
    let caller = straight_line(
        "caller",
        Vec::new(),
        vec![vec![Operation::InternalCall {
            lvalue: Some(uint("r", 1)),
            function: "double".to_owned(),
            arguments: vec![constant(21)],
        }]],
    );
    let program = program_of(vec![caller.clone(), double()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &caller, &mut solver)
        .unwrap();

    assert_eq!(results.bounds(&solver, "r_1").unwrap(), exactly(42));
    let prefix = call_prefix(
        "double",
        OpPos {
            block_id: 1,
            op_id: 0,
        },
    );
    let inlined = format!("{prefix}q_1");
    assert!(results.state(1).unwrap().contains(&inlined));
    assert_eq!(results.bounds(&solver, &inlined).unwrap(), exactly(42));
}

#[test]
fn arity_mismatch_leaves_the_result_unconstrained() {
    let caller = straight_line(
        "caller",
        Vec::new(),
        vec![vec![Operation::InternalCall {
            lvalue: Some(uint("r", 1)),
            function: "double".to_owned(),
            arguments: Vec::new(),
        }]],
    );
    let program = program_of(vec![caller.clone(), double()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &caller, &mut solver)
        .unwrap();

    let r = results.variable("r_1").unwrap();
    let zero = solver.bv_u64(0, 256).unwrap();
    let is_zero = solver.eq(&r.term, &zero).unwrap();
    assert!(solver.is_possible(&is_zero).unwrap());
    assert!(solver.is_possible(&solver.not(&is_zero)).unwrap());
}

#[test]
fn tuple_results_fan_out() {
    let mut pair = straight_line(
        "pair",
        Vec::new(),
        vec![vec![Operation::Return {
            values: vec![constant(1), constant(2)],
        }]],
    );
    pair.returns = vec![Type::uint(256), Type::uint(256)];
    let tuple = Variable::tuple("TUPLE_0", vec![Type::uint(256), Type::uint(256)]);
    let caller = straight_line(
        "caller",
        Vec::new(),
        vec![vec![
            Operation::InternalCall {
                lvalue: Some(tuple.clone()),
                function: "pair".to_owned(),
                arguments: Vec::new(),
            },
            Operation::Unpack {
                lvalue: uint("second", 1),
                tuple,
                index: 1,
            },
        ]],
    );
    let program = program_of(vec![caller.clone(), pair]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &caller, &mut solver)
        .unwrap();

    assert_eq!(
        results
            .bounds(&solver, &tuple_element_identity("TUPLE_0", 0))
            .unwrap(),
        exactly(1)
    );
    assert_eq!(results.bounds(&solver, "second_1").unwrap(), exactly(2));
}

#[test]
fn recursion_is_cut_at_the_depth_limit() {
    let n = Variable::parameter("n", 1, Type::uint(256));
    let mut countdown = straight_line(
        "countdown",
        vec![n.clone()],
        vec![
            vec![Operation::InternalCall {
                lvalue: Some(uint("r", 1)),
                function: "countdown".to_owned(),
                arguments: vec![n.into()],
            }],
            vec![Operation::Return {
                values: vec![uint("r", 1).into()],
            }],
        ],
    );
    countdown.returns = vec![Type::uint(256)];
    let program = program_of(vec![countdown.clone()]);
    let config = IntervalConfig {
        max_call_depth: 2,
        ..IntervalConfig::default()
    };
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::new(config)
        .analyze(&program, &countdown, &mut solver)
        .unwrap();
    assert!(results.variable("r_1").is_some());
}

#[test]
fn loops_reach_a_fixpoint() {
    let mut f = Function::new("f", Vec::new(), Vec::new());
    let entry = f.add_node(NodeType::Entry, vec![assign(uint("i", 1), constant(0))]);
    let body = f.add_node(
        NodeType::Expression,
        vec![
            Operation::Phi {
                lvalue: uint("i", 2),
                rvalues: vec![uint("i", 1), uint("i", 3)],
            },
            binary(uint("i", 3), BinaryOp::Add, uint("i", 2), constant(1)),
        ],
    );
    let exit = f.add_node(NodeType::Expression, vec![Operation::Nop]);
    f.add_edge(entry, body).add_edge(body, body).add_edge(body, exit);
    let program = program_of(vec![f.clone()]);
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(&program, &f, &mut solver)
        .unwrap();

    assert!(results.visits[body] >= 2);
    let edges: usize = f.nodes.iter().map(|node| node.sons.len()).sum();
    assert!(results.visits.iter().sum::<usize>() <= 2 * edges);
    assert!(results.state(exit).unwrap().contains("i_3"));
    // One symbol stands for every iteration, so the merged counter is free.
    let i = results.variable("i_2").unwrap();
    let five = solver.bv_u64(5, 256).unwrap();
    assert!(solver.is_possible(&solver.eq(&i.term, &five).unwrap()).unwrap());
}

#[test]
fn repeated_runs_are_identical() {
    let a = Variable::parameter("a", 1, Type::uint(8));
    let f = straight_line(
        "f",
        vec![a.clone()],
        vec![
            vec![binary(uint8("x", 1), BinaryOp::Mul, a, Constant::int(2, Type::uint(8)))],
            vec![Operation::InternalCall {
                lvalue: Some(uint("r", 1)),
                function: "double".to_owned(),
                arguments: vec![uint8("x", 1).into()],
            }],
        ],
    );
    let program = program_of(vec![f.clone(), double()]);
    let run = || {
        let ctx = context();
        let mut solver = SmtSolver::new(&ctx);
        let results = IntervalAnalysis::default()
            .analyze(&program, &f, &mut solver)
            .unwrap();
        format!("{:?}", results.states)
    };
    assert_eq!(run(), run());
}

/// Whether the variable can hold both zero and a non-zero value.
fn is_free<'ctx>(results: &IntervalResults<'ctx>, solver: &SmtSolver<'ctx>, identity: &str) -> bool {
    let var = results.variable(identity).unwrap();
    let zero = solver.bv_u64(0, var.term.get_size()).unwrap();
    let is_zero = solver.eq(&var.term, &zero).unwrap();
    solver.is_possible(&is_zero).unwrap() && solver.is_possible(&solver.not(&is_zero)).unwrap()
}

fn run(
    program: &Program,
    function: &Function,
    check: impl for<'ctx> FnOnce(&IntervalResults<'ctx>, &SmtSolver<'ctx>),
) {
    let ctx = context();
    let mut solver = SmtSolver::new(&ctx);
    let results = IntervalAnalysis::default()
        .analyze(program, function, &mut solver)
        .unwrap();
    check(&results, &solver);
}

/// `if (c) return 1; return 2;`
fn pick() -> Function {
    let c = Variable::parameter("c", 1, Type::bool());
    let mut function = Function::new("pick", vec![c.clone()], vec![Type::uint(256)]);
    let entry = function.add_node(NodeType::Entry, Vec::new());
    let branch = function.add_node(
        NodeType::If,
        vec![Operation::Condition { value: c.into() }],
    );
    let first = function.add_node(
        NodeType::Return,
        vec![Operation::Return {
            values: vec![constant(1)],
        }],
    );
    let second = function.add_node(
        NodeType::Return,
        vec![Operation::Return {
            values: vec![constant(2)],
        }],
    );
    function
        .add_edge(entry, branch)
        .add_edge(branch, first)
        .add_edge(branch, second);
    function
}

#[test]
fn every_return_site_bounds_the_result() {
    let flag = Variable::parameter("flag", 1, Type::bool());
    let caller = straight_line(
        "caller",
        vec![flag.clone()],
        vec![vec![Operation::InternalCall {
            lvalue: Some(uint("r", 1)),
            function: "pick".to_owned(),
            arguments: vec![flag.into()],
        }]],
    );
    let program = program_of(vec![caller.clone(), pick()]);
    run(&program, &caller, |results, solver| {
        assert_eq!(results.bounds(solver, "r_1").unwrap(), between(1, 2));
    });
}

#[test]
fn untracked_return_values_leave_the_result_free() {
    let mut opaque = pick();
    opaque.nodes[3].operations = vec![Operation::Return {
        values: vec![Constant::string("two").into()],
    }];
    opaque.name = "opaque".to_owned();
    let flag = Variable::parameter("flag", 1, Type::bool());
    let caller = straight_line(
        "caller",
        vec![flag.clone()],
        vec![vec![Operation::InternalCall {
            lvalue: Some(uint("r", 1)),
            function: "opaque".to_owned(),
            arguments: vec![flag.into()],
        }]],
    );
    let program = program_of(vec![caller.clone(), opaque]);
    run(&program, &caller, |results, solver| {
        assert!(is_free(results, solver, "r_1"));
    });
}

#[test]
fn phi_merges_both_branches() {
    let c = Variable::parameter("c", 1, Type::bool());
    let mut f = Function::new("f", vec![c.clone()], Vec::new());
    let entry = f.add_node(NodeType::Entry, Vec::new());
    let branch = f.add_node(
        NodeType::If,
        vec![Operation::Condition { value: c.into() }],
    );
    let then = f.add_node(NodeType::Expression, vec![assign(uint("x", 1), constant(1))]);
    let otherwise = f.add_node(NodeType::Expression, vec![assign(uint("x", 2), constant(2))]);
    let join = f.add_node(
        NodeType::EndIf,
        vec![
            Operation::Phi {
                lvalue: uint("x", 3),
                rvalues: vec![uint("x", 1), uint("x", 2)],
            },
            assign(uint("y", 1), uint("x", 3)),
        ],
    );
    f.add_edge(entry, branch)
        .add_edge(branch, then)
        .add_edge(branch, otherwise)
        .add_edge(then, join)
        .add_edge(otherwise, join);
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        assert_eq!(results.bounds(solver, "y_1").unwrap(), between(1, 2));
    });
}

#[test]
fn shift_amounts_keep_their_width() {
    let a = Variable::parameter("a", 1, Type::uint(8));
    let s = Variable::parameter("s", 1, Type::uint(256));
    let f = straight_line(
        "f",
        vec![a.clone(), s.clone()],
        vec![vec![
            binary(uint8("left", 1), BinaryOp::Shl, a.clone(), constant(256)),
            binary(uint8("right", 1), BinaryOp::Shr, a.clone(), constant(300)),
            binary(uint8("twice", 1), BinaryOp::Shl, Constant::int(3, Type::uint(8)), constant(1)),
            binary(uint8("wide", 1), BinaryOp::Shl, a, s),
        ]],
    );
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        assert_eq!(results.bounds(solver, "left_1").unwrap(), exactly(0));
        assert_eq!(results.bounds(solver, "right_1").unwrap(), exactly(0));
        assert_eq!(results.bounds(solver, "twice_1").unwrap(), exactly(6));
        assert!(!results.may_overflow(solver, "left_1").unwrap());

        let wide = results.variable("wide_1").unwrap();
        let amount = results.variable("s_1").unwrap();
        let past_width = solver.bv_u64(256, 256).unwrap();
        let shifted_out = solver.bv_u64(0, 8).unwrap();
        let guard = solver.eq(&amount.term, &past_width).unwrap();
        let zero = solver.eq(&wide.term, &shifted_out).unwrap();
        assert!(!solver.is_possible(&solver.and(&[guard, solver.not(&zero)])).unwrap());
    });
}

#[test]
fn conversions_extend_by_the_source_sign_and_truncate() {
    let narrow = Variable::local("narrow", 1, Type::int(8));
    let word = Variable::local("word", 1, Type::uint(16));
    let widened = Variable::local("widened", 1, Type::int(16));
    let reinterpreted = Variable::local("reinterpreted", 1, Type::uint(16));
    let low = Variable::local("low", 1, Type::uint(8));
    let convert = |lvalue: &Variable, operand: &Variable| Operation::TypeConversion {
        lvalue: lvalue.clone(),
        operand: operand.clone().into(),
        ty: lvalue.ty.clone(),
    };
    let f = straight_line(
        "f",
        Vec::new(),
        vec![
            vec![
                assign(narrow.clone(), Constant::int(-1, Type::int(8))),
                assign(word.clone(), Constant::int(0x1234, Type::uint(16))),
            ],
            vec![
                convert(&widened, &narrow),
                convert(&reinterpreted, &narrow),
                convert(&low, &word),
            ],
        ],
    );
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        assert_eq!(results.bounds(solver, "widened_1").unwrap(), exactly(-1));
        assert_eq!(results.bounds(solver, "reinterpreted_1").unwrap(), exactly(0xffff));
        assert_eq!(results.bounds(solver, "low_1").unwrap(), exactly(0x34));
        assert!(!results.may_overflow(solver, "low_1").unwrap());
    });
}

#[test]
fn unary_operators() {
    let zero = uint8("zero", 1);
    let negated = Variable::temporary("TMP_0", Type::bool());
    let f = straight_line(
        "f",
        Vec::new(),
        vec![
            vec![assign(zero.clone(), Constant::int(0, Type::uint(8)))],
            vec![
                Operation::Unary {
                    lvalue: negated,
                    op: UnaryOp::Not,
                    operand: zero.clone().into(),
                },
                Operation::Unary {
                    lvalue: uint8("inverted", 1),
                    op: UnaryOp::Tilde,
                    operand: zero.into(),
                },
            ],
        ],
    );
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        assert_eq!(results.bounds(solver, "TMP_0").unwrap(), exactly(1));
        assert_eq!(results.bounds(solver, "inverted_1").unwrap(), exactly(255));
    });
}

#[test]
fn array_literals_define_their_top_level_elements() {
    let values = Variable::local("values", 1, Type::fixed_array(Type::uint(256), 3));
    let f = straight_line(
        "f",
        Vec::new(),
        vec![vec![Operation::InitArray {
            lvalue: values,
            values: vec![
                ArrayInit::Value(constant(1)),
                ArrayInit::Nested(vec![ArrayInit::Value(constant(9))]),
                ArrayInit::Value(constant(3)),
            ],
        }]],
    );
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        assert_eq!(results.bounds(solver, "values[0]").unwrap(), exactly(1));
        assert_eq!(results.bounds(solver, "values[2]").unwrap(), exactly(3));
        assert!(!results.state(1).unwrap().contains("values[1]"));
    });
}

#[test]
fn member_writes_reach_later_reads() {
    let pool = Variable::state("pool", 1, Type::Struct("Pool".to_owned()));
    let amount = Variable::parameter("amount", 1, Type::uint(256));
    let write_ref = Variable::reference("REF_0", Type::uint(256), pool.clone());
    let read_ref = Variable::reference("REF_1", Type::uint(256), pool.clone());
    let member = |lvalue: &Variable| Operation::Member {
        lvalue: lvalue.clone(),
        base: pool.clone(),
        field: "reserve".to_owned(),
    };
    let f = straight_line(
        "f",
        vec![amount.clone()],
        vec![
            vec![member(&write_ref), assign(write_ref.clone(), amount)],
            vec![member(&read_ref), assign(uint("x", 1), read_ref.clone())],
        ],
    );
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        let x = results.variable("x_1").unwrap();
        let amount = results.variable("amount_1").unwrap();
        assert!(solver.is_valid(&solver.eq(&x.term, &amount.term).unwrap()).unwrap());
        assert!(results.state(2).unwrap().contains("pool.reserve"));
    });
}

#[test]
fn only_fixed_array_lengths_are_known() {
    let fixed = Variable::parameter("fixed", 1, Type::fixed_array(Type::uint(256), 4));
    let dynamic = Variable::parameter("dynamic", 1, Type::dynamic_array(Type::uint(256)));
    let f = straight_line(
        "f",
        vec![fixed.clone(), dynamic.clone()],
        vec![vec![
            Operation::Length {
                lvalue: uint("fixed_len", 1),
                base: fixed,
            },
            Operation::Length {
                lvalue: uint("dynamic_len", 1),
                base: dynamic,
            },
        ]],
    );
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        assert_eq!(results.bounds(solver, "fixed_len_1").unwrap(), exactly(4));
        assert!(is_free(results, solver, "dynamic_len_1"));
    });
}

#[test]
fn phi_callbacks_merge_tracked_versions() {
    let f = straight_line(
        "f",
        Vec::new(),
        vec![
            vec![assign(uint("x", 1), constant(3))],
            vec![
                Operation::PhiCallback {
                    lvalue: uint("x", 2),
                    rvalues: vec![uint("x", 1), uint("x", 0)],
                },
                Operation::PhiCallback {
                    lvalue: uint("y", 2),
                    rvalues: vec![uint("y", 0), uint("y", 1)],
                },
            ],
        ],
    );
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        assert_eq!(results.bounds(solver, "x_2").unwrap(), exactly(3));
        assert!(is_free(results, solver, "y_2"));
    });
}

#[test]
fn delete_resets_to_zero() {
    let f = straight_line(
        "f",
        Vec::new(),
        vec![
            vec![assign(uint("x", 1), constant(5))],
            vec![Operation::Delete {
                lvalue: uint("x", 2),
                variable: uint("x", 1),
            }],
        ],
    );
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        assert_eq!(results.bounds(solver, "x_1").unwrap(), exactly(5));
        assert_eq!(results.bounds(solver, "x_2").unwrap(), exactly(0));
    });
}

#[test]
fn memory_loads_see_memory_stores_only() {
    let stored = Variable::parameter("stored", 1, Type::uint(256));
    let persisted = Variable::parameter("persisted", 1, Type::uint(256));
    let store = |function: SolidityFunction, value: &Variable| Operation::SolidityCall {
        lvalue: None,
        function,
        arguments: vec![constant(64), value.clone().into()],
    };
    let f = straight_line(
        "f",
        vec![stored.clone(), persisted.clone()],
        vec![
            vec![
                store(SolidityFunction::Mstore, &stored),
                store(SolidityFunction::Sstore, &persisted),
            ],
            vec![Operation::SolidityCall {
                lvalue: Some(uint("loaded", 1)),
                function: SolidityFunction::Mload,
                arguments: vec![constant(64)],
            }],
        ],
    );
    let program = program_of(vec![f.clone()]);
    run(&program, &f, |results, solver| {
        let loaded = results.variable("loaded_1").unwrap();
        let stored = results.variable("stored_1").unwrap();
        let persisted = results.variable("persisted_1").unwrap();
        assert!(solver.is_valid(&solver.eq(&loaded.term, &stored.term).unwrap()).unwrap());
        assert!(!solver.is_valid(&solver.eq(&loaded.term, &persisted.term).unwrap()).unwrap());
    });
}
