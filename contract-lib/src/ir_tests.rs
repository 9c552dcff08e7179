use std::collections::BTreeSet;

use analysis::cfg::{ControlFlowGraph, get_back_edges};
use pretty_assertions::assert_eq;

use crate::ir::*;

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[test]
fn identities_carry_the_ssa_version() {
    assert_eq!(Variable::local("x", 3, Type::uint(256)).identity(), "x_3");
    assert_eq!(Variable::temporary("TMP_0", Type::bool()).identity(), "TMP_0");
}

#[test]
fn references_resolve_to_their_storage_root() {
    let balances = Variable::state(
        "balances",
        1,
        Type::mapping(Type::address(), Type::uint(256)),
    );
    let sender = Variable::local("sender", 1, Type::address());
    let reference = Variable::reference("REF_0", Type::uint(256), balances.clone());
    let node = Node {
        id: 1,
        kind: NodeType::Expression,
        operations: vec![
            Operation::Index {
                lvalue: reference.clone(),
                base: balances,
                index: sender.into(),
            },
            Operation::Assignment {
                lvalue: reference,
                rvalue: Constant::int(0, Type::uint(256)).into(),
            },
        ],
        sons: Vec::new(),
        fathers: Vec::new(),
    };
    assert_eq!(node.state_variables_written(), names(&["balances"]));
    assert_eq!(node.state_variables_read(), names(&["balances"]));
}

#[test]
fn local_writes_are_not_state_writes() {
    let total = Variable::state("total", 1, Type::uint(256));
    let copy = Variable::local("copy", 1, Type::uint(256));
    let node = Node {
        id: 0,
        kind: NodeType::Expression,
        operations: vec![Operation::Assignment {
            lvalue: copy,
            rvalue: total.into(),
        }],
        sons: Vec::new(),
        fathers: Vec::new(),
    };
    assert!(node.state_variables_written().is_empty());
    assert_eq!(node.state_variables_read(), names(&["total"]));
}

#[test]
fn negated_conditions_are_recognized() {
    let success = Variable::temporary("TMP_1", Type::bool());
    let negated = Variable::temporary("TMP_2", Type::bool());
    let mut node = Node {
        id: 2,
        kind: NodeType::If,
        operations: vec![
            Operation::Unary {
                lvalue: negated.clone(),
                op: UnaryOp::Not,
                operand: success.clone().into(),
            },
            Operation::Condition {
                value: negated.into(),
            },
        ],
        sons: vec![3, 4],
        fathers: vec![1],
    };
    assert!(node.has_negated_condition());

    node.operations[1] = Operation::Condition {
        value: success.into(),
    };
    assert!(!node.has_negated_condition());
}

#[test]
fn builder_links_both_directions() {
    let mut function = Function::new("loop", Vec::new(), Vec::new());
    let entry = function.add_node(NodeType::Entry, Vec::new());
    let head = function.add_node(NodeType::IfLoop, Vec::new());
    let body = function.add_node(NodeType::Expression, vec![Operation::Nop]);
    let exit = function.add_node(NodeType::EndLoop, Vec::new());
    function
        .add_edge(entry, head)
        .add_edge(head, body)
        .add_edge(body, head)
        .add_edge(head, exit);

    assert_eq!(function.blocks()[head].fathers, vec![entry, body]);
    assert_eq!(function.blocks()[head].sons, vec![body, exit]);
    assert!(get_back_edges(&function).contains(&(body, head)));
}

#[test]
fn operations_report_their_kind_and_operands() {
    let x = Variable::local("x", 1, Type::uint(8));
    let y = Variable::local("y", 1, Type::uint(8));
    let op = Operation::Binary {
        lvalue: x.clone(),
        op: BinaryOp::Add,
        left: y.clone().into(),
        right: Constant::int(1, Type::uint(8)).into(),
    };
    assert_eq!(op.kind(), OperationKind::Binary);
    assert_eq!(op.lvalue(), Some(&x));
    assert_eq!(op.reads(), vec![&y]);
    assert_eq!(op.to_string(), "x_1(uint8) = y_1 + 1");
    assert_eq!(OperationKind::ALL.len(), 27);
}

#[test]
fn return_sites_follow_node_order() {
    let mut function = Function::new("f", Vec::new(), vec![Type::uint(256)]);
    let entry = function.add_node(NodeType::Entry, Vec::new());
    let first = function.add_node(
        NodeType::Return,
        vec![Operation::Return {
            values: vec![Constant::int(1, Type::uint(256)).into()],
        }],
    );
    let second = function.add_node(
        NodeType::Return,
        vec![Operation::Return {
            values: vec![Constant::int(2, Type::uint(256)).into()],
        }],
    );
    function.add_edge(entry, first).add_edge(entry, second);
    let sites = function.return_sites();
    assert_eq!(
        sites.iter().map(|&(node, _)| node).collect::<Vec<_>>(),
        vec![first, second]
    );
    assert_eq!(sites[1].1[0].to_string(), "2");
}

#[test]
fn print_as_dot() {
    let mut function = Function::new("f", Vec::new(), Vec::new());
    let entry = function.add_node(NodeType::Entry, Vec::new());
    let ret = function.add_node(NodeType::Return, vec![Operation::Return { values: Vec::new() }]);
    function.add_edge(entry, ret);
    let expected = r#"digraph CFG {
  Node_0[label=""]
  Node_1[label="RETURN "]

  Node_0 -> Node_1
}
"#;
    assert_eq!(print_function(&function), expected);
}
