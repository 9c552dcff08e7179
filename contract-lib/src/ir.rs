use core::fmt::Display;
use std::collections::BTreeSet;

use analysis::cfg::{CfgBlock, ControlFlowGraph};
use itertools::Itertools;
use num_bigint::BigInt;

pub type NodeId = usize;

/// Value types that fit into a machine word.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementaryType {
    Uint(u32),
    Int(u32),
    Bool,
    Address,
    /// `bytesN`, the payload is the number of bytes.
    FixedBytes(u32),
    Bytes,
    String,
}

impl ElementaryType {
    /// The number of bits of the value, `None` for dynamically sized types.
    pub fn bit_width(&self) -> Option<u32> {
        match self {
            ElementaryType::Uint(bits) | ElementaryType::Int(bits) => Some(*bits),
            ElementaryType::Bool => Some(1),
            ElementaryType::Address => Some(160),
            ElementaryType::FixedBytes(bytes) => Some(bytes * 8),
            ElementaryType::Bytes | ElementaryType::String => None,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, ElementaryType::Int(_))
    }
}

impl Display for ElementaryType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ElementaryType::Uint(bits) => write!(f, "uint{bits}"),
            ElementaryType::Int(bits) => write!(f, "int{bits}"),
            ElementaryType::Bool => write!(f, "bool"),
            ElementaryType::Address => write!(f, "address"),
            ElementaryType::FixedBytes(bytes) => write!(f, "bytes{bytes}"),
            ElementaryType::Bytes => write!(f, "bytes"),
            ElementaryType::String => write!(f, "string"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Elementary(ElementaryType),
    /// Element type and the length of fixed size arrays.
    Array(Box<Type>, Option<usize>),
    Mapping(Box<Type>, Box<Type>),
    Struct(String),
    Contract(String),
    Tuple(Vec<Type>),
}

impl Type {
    pub fn uint(bits: u32) -> Self {
        Type::Elementary(ElementaryType::Uint(bits))
    }

    pub fn int(bits: u32) -> Self {
        Type::Elementary(ElementaryType::Int(bits))
    }

    pub fn bool() -> Self {
        Type::Elementary(ElementaryType::Bool)
    }

    pub fn address() -> Self {
        Type::Elementary(ElementaryType::Address)
    }

    pub fn fixed_array(element: Type, len: usize) -> Self {
        Type::Array(Box::new(element), Some(len))
    }

    pub fn dynamic_array(element: Type) -> Self {
        Type::Array(Box::new(element), None)
    }

    pub fn mapping(key: Type, value: Type) -> Self {
        Type::Mapping(Box::new(key), Box::new(value))
    }

    pub fn elementary(&self) -> Option<&ElementaryType> {
        match self {
            Type::Elementary(ty) => Some(ty),
            _ => None,
        }
    }

    /// The elementary type when it can be modeled as a bitvector.
    pub fn word(&self) -> Option<&ElementaryType> {
        self.elementary().filter(|ty| ty.bit_width().is_some())
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Type::Elementary(ty) => write!(f, "{ty}"),
            Type::Array(element, Some(len)) => write!(f, "{element}[{len}]"),
            Type::Array(element, None) => write!(f, "{element}[]"),
            Type::Mapping(key, value) => write!(f, "mapping({key} => {value})"),
            Type::Struct(name) | Type::Contract(name) => write!(f, "{name}"),
            Type::Tuple(types) => write!(f, "({})", types.iter().join(",")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VariableKind {
    Local,
    State,
    Parameter,
    Temporary,
    /// Points into an element or a member of another variable.
    Reference,
    Tuple,
    Constant,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: String,
    /// The SSA version, temporaries and references have none.
    pub ssa: Option<u32>,
    pub ty: Type,
    pub kind: VariableKind,
    /// The variable a reference was derived from.
    pub points_to: Option<Box<Variable>>,
}

impl Variable {
    pub fn new(name: &str, ssa: Option<u32>, ty: Type, kind: VariableKind) -> Self {
        Self {
            name: name.to_owned(),
            ssa,
            ty,
            kind,
            points_to: None,
        }
    }

    pub fn local(name: &str, ssa: u32, ty: Type) -> Self {
        Self::new(name, Some(ssa), ty, VariableKind::Local)
    }

    pub fn state(name: &str, ssa: u32, ty: Type) -> Self {
        Self::new(name, Some(ssa), ty, VariableKind::State)
    }

    pub fn parameter(name: &str, ssa: u32, ty: Type) -> Self {
        Self::new(name, Some(ssa), ty, VariableKind::Parameter)
    }

    pub fn temporary(name: &str, ty: Type) -> Self {
        Self::new(name, None, ty, VariableKind::Temporary)
    }

    pub fn tuple(name: &str, types: Vec<Type>) -> Self {
        Self::new(name, None, Type::Tuple(types), VariableKind::Tuple)
    }

    pub fn reference(name: &str, ty: Type, points_to: Variable) -> Self {
        Self {
            points_to: Some(Box::new(points_to)),
            ..Self::new(name, None, ty, VariableKind::Reference)
        }
    }

    /// The SSA qualified name, unique within a function.
    pub fn identity(&self) -> String {
        match self.ssa {
            Some(version) => format!("{}_{version}", self.name),
            None => self.name.clone(),
        }
    }

    /// The state variable this variable or reference ultimately refers to.
    pub fn storage_root(&self) -> Option<&Variable> {
        match self.kind {
            VariableKind::State => Some(self),
            VariableKind::Reference => self.points_to.as_deref()?.storage_root(),
            _ => None,
        }
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.identity())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConstantValue {
    Int(BigInt),
    Bool(bool),
    Str(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Constant {
    pub value: ConstantValue,
    pub ty: Type,
}

impl Constant {
    pub fn int(value: impl Into<BigInt>, ty: Type) -> Self {
        Self {
            value: ConstantValue::Int(value.into()),
            ty,
        }
    }

    pub fn bool(value: bool) -> Self {
        Self {
            value: ConstantValue::Bool(value),
            ty: Type::bool(),
        }
    }

    pub fn string(value: &str) -> Self {
        Self {
            value: ConstantValue::Str(value.to_owned()),
            ty: Type::Elementary(ElementaryType::String),
        }
    }

    /// The numeric value, booleans are 0 or 1.
    pub fn as_int(&self) -> Option<BigInt> {
        match &self.value {
            ConstantValue::Int(value) => Some(value.clone()),
            ConstantValue::Bool(value) => Some(BigInt::from(u8::from(*value))),
            ConstantValue::Str(_) => None,
        }
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.value {
            ConstantValue::Int(value) => write!(f, "{value}"),
            ConstantValue::Bool(value) => write!(f, "{value}"),
            ConstantValue::Str(value) => write!(f, "{value:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Variable(Variable),
    Constant(Constant),
}

impl Operand {
    pub fn ty(&self) -> &Type {
        match self {
            Operand::Variable(var) => &var.ty,
            Operand::Constant(constant) => &constant.ty,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Operand::Variable(var) => Some(var),
            Operand::Constant(_) => None,
        }
    }
}

impl From<Variable> for Operand {
    fn from(value: Variable) -> Self {
        Operand::Variable(value)
    }
}

impl From<Constant> for Operand {
    fn from(value: Constant) -> Self {
        Operand::Constant(value)
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operand::Variable(var) => write!(f, "{var}"),
            Operand::Constant(constant) => write!(f, "{constant}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    /// True for operators producing a boolean.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{symbol}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Bitwise negation.
    Tilde,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Tilde => write!(f, "~"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LowLevelKind {
    Call,
    DelegateCall,
    StaticCall,
}

impl Display for LowLevelKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LowLevelKind::Call => write!(f, "call"),
            LowLevelKind::DelegateCall => write!(f, "delegatecall"),
            LowLevelKind::StaticCall => write!(f, "staticcall"),
        }
    }
}

/// Builtins of the language and inline assembly.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SolidityFunction {
    Sstore,
    Sload,
    Mstore,
    Mload,
    Require,
    Assert,
    Revert,
    Keccak256,
    Other(String),
}

impl Display for SolidityFunction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SolidityFunction::Sstore => write!(f, "sstore"),
            SolidityFunction::Sload => write!(f, "sload"),
            SolidityFunction::Mstore => write!(f, "mstore"),
            SolidityFunction::Mload => write!(f, "mload"),
            SolidityFunction::Require => write!(f, "require"),
            SolidityFunction::Assert => write!(f, "assert"),
            SolidityFunction::Revert => write!(f, "revert"),
            SolidityFunction::Keccak256 => write!(f, "keccak256"),
            SolidityFunction::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Literal array initializers can nest.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArrayInit {
    Value(Operand),
    Nested(Vec<ArrayInit>),
}

impl Display for ArrayInit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ArrayInit::Value(value) => write!(f, "{value}"),
            ArrayInit::Nested(values) => write!(f, "[{}]", values.iter().join(", ")),
        }
    }
}

/// The SSA operations of the IR.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Assignment {
        lvalue: Variable,
        rvalue: Operand,
    },
    Binary {
        lvalue: Variable,
        op: BinaryOp,
        left: Operand,
        right: Operand,
    },
    Unary {
        lvalue: Variable,
        op: UnaryOp,
        operand: Operand,
    },
    TypeConversion {
        lvalue: Variable,
        operand: Operand,
        ty: Type,
    },
    /// `lvalue -> base[index]`, the lvalue is a reference.
    Index {
        lvalue: Variable,
        base: Variable,
        index: Operand,
    },
    /// `lvalue -> base.field`, the lvalue is a reference.
    Member {
        lvalue: Variable,
        base: Variable,
        field: String,
    },
    InitArray {
        lvalue: Variable,
        values: Vec<ArrayInit>,
    },
    Length {
        lvalue: Variable,
        base: Variable,
    },
    InternalCall {
        lvalue: Option<Variable>,
        function: String,
        arguments: Vec<Operand>,
    },
    LibraryCall {
        lvalue: Option<Variable>,
        library: String,
        function: String,
        arguments: Vec<Operand>,
    },
    HighLevelCall {
        lvalue: Option<Variable>,
        destination: Variable,
        function: String,
        arguments: Vec<Operand>,
        value: Option<Operand>,
        /// View and pure targets cannot modify state.
        is_static: bool,
    },
    LowLevelCall {
        lvalue: Option<Variable>,
        destination: Variable,
        kind: LowLevelKind,
        arguments: Vec<Operand>,
        value: Option<Operand>,
    },
    Send {
        lvalue: Option<Variable>,
        destination: Variable,
        value: Operand,
    },
    Transfer {
        destination: Variable,
        value: Operand,
    },
    SolidityCall {
        lvalue: Option<Variable>,
        function: SolidityFunction,
        arguments: Vec<Operand>,
    },
    EventCall {
        name: String,
        arguments: Vec<Operand>,
    },
    Return {
        values: Vec<Operand>,
    },
    /// `lvalue = tuple[index]`
    Unpack {
        lvalue: Variable,
        tuple: Variable,
        index: usize,
    },
    Phi {
        lvalue: Variable,
        rvalues: Vec<Variable>,
    },
    /// A phi for state variables that a call may have changed.
    PhiCallback {
        lvalue: Variable,
        rvalues: Vec<Variable>,
    },
    Condition {
        value: Operand,
    },
    NewElementaryType {
        lvalue: Variable,
        ty: Type,
    },
    NewContract {
        lvalue: Variable,
        contract: String,
        arguments: Vec<Operand>,
    },
    NewArray {
        lvalue: Variable,
        ty: Type,
        arguments: Vec<Operand>,
    },
    NewStructure {
        lvalue: Variable,
        structure: String,
        arguments: Vec<Operand>,
    },
    Delete {
        lvalue: Variable,
        variable: Variable,
    },
    Nop,
}

/// The discriminant of [`Operation`], used to register handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Assignment,
    Binary,
    Unary,
    TypeConversion,
    Index,
    Member,
    InitArray,
    Length,
    InternalCall,
    LibraryCall,
    HighLevelCall,
    LowLevelCall,
    Send,
    Transfer,
    SolidityCall,
    EventCall,
    Return,
    Unpack,
    Phi,
    PhiCallback,
    Condition,
    NewElementaryType,
    NewContract,
    NewArray,
    NewStructure,
    Delete,
    Nop,
}

impl OperationKind {
    pub const ALL: [OperationKind; 27] = [
        OperationKind::Assignment,
        OperationKind::Binary,
        OperationKind::Unary,
        OperationKind::TypeConversion,
        OperationKind::Index,
        OperationKind::Member,
        OperationKind::InitArray,
        OperationKind::Length,
        OperationKind::InternalCall,
        OperationKind::LibraryCall,
        OperationKind::HighLevelCall,
        OperationKind::LowLevelCall,
        OperationKind::Send,
        OperationKind::Transfer,
        OperationKind::SolidityCall,
        OperationKind::EventCall,
        OperationKind::Return,
        OperationKind::Unpack,
        OperationKind::Phi,
        OperationKind::PhiCallback,
        OperationKind::Condition,
        OperationKind::NewElementaryType,
        OperationKind::NewContract,
        OperationKind::NewArray,
        OperationKind::NewStructure,
        OperationKind::Delete,
        OperationKind::Nop,
    ];
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Assignment { .. } => OperationKind::Assignment,
            Operation::Binary { .. } => OperationKind::Binary,
            Operation::Unary { .. } => OperationKind::Unary,
            Operation::TypeConversion { .. } => OperationKind::TypeConversion,
            Operation::Index { .. } => OperationKind::Index,
            Operation::Member { .. } => OperationKind::Member,
            Operation::InitArray { .. } => OperationKind::InitArray,
            Operation::Length { .. } => OperationKind::Length,
            Operation::InternalCall { .. } => OperationKind::InternalCall,
            Operation::LibraryCall { .. } => OperationKind::LibraryCall,
            Operation::HighLevelCall { .. } => OperationKind::HighLevelCall,
            Operation::LowLevelCall { .. } => OperationKind::LowLevelCall,
            Operation::Send { .. } => OperationKind::Send,
            Operation::Transfer { .. } => OperationKind::Transfer,
            Operation::SolidityCall { .. } => OperationKind::SolidityCall,
            Operation::EventCall { .. } => OperationKind::EventCall,
            Operation::Return { .. } => OperationKind::Return,
            Operation::Unpack { .. } => OperationKind::Unpack,
            Operation::Phi { .. } => OperationKind::Phi,
            Operation::PhiCallback { .. } => OperationKind::PhiCallback,
            Operation::Condition { .. } => OperationKind::Condition,
            Operation::NewElementaryType { .. } => OperationKind::NewElementaryType,
            Operation::NewContract { .. } => OperationKind::NewContract,
            Operation::NewArray { .. } => OperationKind::NewArray,
            Operation::NewStructure { .. } => OperationKind::NewStructure,
            Operation::Delete { .. } => OperationKind::Delete,
            Operation::Nop => OperationKind::Nop,
        }
    }

    /// The variable defined by the operation.
    pub fn lvalue(&self) -> Option<&Variable> {
        match self {
            Operation::Assignment { lvalue, .. }
            | Operation::Binary { lvalue, .. }
            | Operation::Unary { lvalue, .. }
            | Operation::TypeConversion { lvalue, .. }
            | Operation::Index { lvalue, .. }
            | Operation::Member { lvalue, .. }
            | Operation::InitArray { lvalue, .. }
            | Operation::Length { lvalue, .. }
            | Operation::Unpack { lvalue, .. }
            | Operation::Phi { lvalue, .. }
            | Operation::PhiCallback { lvalue, .. }
            | Operation::NewElementaryType { lvalue, .. }
            | Operation::NewContract { lvalue, .. }
            | Operation::NewArray { lvalue, .. }
            | Operation::NewStructure { lvalue, .. }
            | Operation::Delete { lvalue, .. } => Some(lvalue),
            Operation::InternalCall { lvalue, .. }
            | Operation::LibraryCall { lvalue, .. }
            | Operation::HighLevelCall { lvalue, .. }
            | Operation::LowLevelCall { lvalue, .. }
            | Operation::Send { lvalue, .. }
            | Operation::SolidityCall { lvalue, .. } => lvalue.as_ref(),
            Operation::Transfer { .. }
            | Operation::EventCall { .. }
            | Operation::Return { .. }
            | Operation::Condition { .. }
            | Operation::Nop => None,
        }
    }

    /// Names of the state variables the operation reads.
    pub fn state_variables_read(&self) -> Vec<String> {
        self.reads()
            .into_iter()
            .filter_map(Variable::storage_root)
            .map(|var| var.name.clone())
            .collect()
    }

    /// The state variable the operation writes. Defining a reference does
    /// not write the variable it points into, assigning through the
    /// reference does.
    pub fn state_variable_written(&self) -> Option<String> {
        if matches!(self, Operation::Index { .. } | Operation::Member { .. }) {
            return None;
        }
        self.lvalue()
            .and_then(Variable::storage_root)
            .map(|var| var.name.clone())
    }

    /// The variables the operation reads.
    pub fn reads(&self) -> Vec<&Variable> {
        fn vars(operands: &[Operand]) -> impl Iterator<Item = &Variable> {
            operands.iter().filter_map(Operand::as_variable)
        }
        fn init_vars<'a>(values: &'a [ArrayInit], out: &mut Vec<&'a Variable>) {
            for value in values {
                match value {
                    ArrayInit::Value(Operand::Variable(var)) => out.push(var),
                    ArrayInit::Value(Operand::Constant(_)) => {}
                    ArrayInit::Nested(nested) => init_vars(nested, out),
                }
            }
        }

        let mut result = Vec::new();
        match self {
            Operation::Assignment { rvalue, .. } => result.extend(rvalue.as_variable()),
            Operation::Binary { left, right, .. } => {
                result.extend(left.as_variable());
                result.extend(right.as_variable());
            }
            Operation::Unary { operand, .. } | Operation::TypeConversion { operand, .. } => {
                result.extend(operand.as_variable())
            }
            Operation::Index { base, index, .. } => {
                result.push(base);
                result.extend(index.as_variable());
            }
            Operation::Member { base, .. } | Operation::Length { base, .. } => result.push(base),
            Operation::InitArray { values, .. } => init_vars(values, &mut result),
            Operation::InternalCall { arguments, .. }
            | Operation::LibraryCall { arguments, .. }
            | Operation::SolidityCall { arguments, .. }
            | Operation::EventCall { arguments, .. }
            | Operation::NewContract { arguments, .. }
            | Operation::NewArray { arguments, .. }
            | Operation::NewStructure { arguments, .. } => result.extend(vars(arguments)),
            Operation::HighLevelCall {
                destination,
                arguments,
                value,
                ..
            }
            | Operation::LowLevelCall {
                destination,
                arguments,
                value,
                ..
            } => {
                result.push(destination);
                result.extend(vars(arguments));
                result.extend(value.as_ref().and_then(Operand::as_variable));
            }
            Operation::Send {
                destination, value, ..
            }
            | Operation::Transfer { destination, value } => {
                result.push(destination);
                result.extend(value.as_variable());
            }
            Operation::Return { values } => result.extend(vars(values)),
            Operation::Unpack { tuple, .. } => result.push(tuple),
            Operation::Phi { rvalues, .. } | Operation::PhiCallback { rvalues, .. } => {
                result.extend(rvalues.iter())
            }
            Operation::Condition { value } => result.extend(value.as_variable()),
            Operation::Delete { variable, .. } => result.push(variable),
            Operation::NewElementaryType { .. } | Operation::Nop => {}
        }
        result
    }

    /// Every variable mentioned by the operation.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.lvalue().into_iter().chain(self.reads())
    }
}

fn print_lvalue(lvalue: &Option<Variable>) -> String {
    match lvalue {
        Some(var) => format!("{var} = "),
        None => String::new(),
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operation::Assignment { lvalue, rvalue } => {
                write!(f, "{lvalue}({}) := {rvalue}", lvalue.ty)
            }
            Operation::Binary {
                lvalue,
                op,
                left,
                right,
            } => write!(f, "{lvalue}({}) = {left} {op} {right}", lvalue.ty),
            Operation::Unary {
                lvalue,
                op,
                operand,
            } => write!(f, "{lvalue}({}) = {op}{operand}", lvalue.ty),
            Operation::TypeConversion {
                lvalue,
                operand,
                ty,
            } => write!(f, "{lvalue} = CONVERT {operand} to {ty}"),
            Operation::Index {
                lvalue,
                base,
                index,
            } => write!(f, "{lvalue}({}) -> {base}[{index}]", lvalue.ty),
            Operation::Member {
                lvalue,
                base,
                field,
            } => write!(f, "{lvalue}({}) -> {base}.{field}", lvalue.ty),
            Operation::InitArray { lvalue, values } => {
                write!(f, "{lvalue}({}) = [{}]", lvalue.ty, values.iter().join(", "))
            }
            Operation::Length { lvalue, base } => write!(f, "{lvalue} = LENGTH {base}"),
            Operation::InternalCall {
                lvalue,
                function,
                arguments,
            } => write!(
                f,
                "{}INTERNAL_CALL {function}({})",
                print_lvalue(lvalue),
                arguments.iter().join(", ")
            ),
            Operation::LibraryCall {
                lvalue,
                library,
                function,
                arguments,
            } => write!(
                f,
                "{}LIBRARY_CALL {library}.{function}({})",
                print_lvalue(lvalue),
                arguments.iter().join(", ")
            ),
            Operation::HighLevelCall {
                lvalue,
                destination,
                function,
                arguments,
                value,
                ..
            } => {
                write!(
                    f,
                    "{}HIGH_LEVEL_CALL {destination}.{function}({})",
                    print_lvalue(lvalue),
                    arguments.iter().join(", ")
                )?;
                if let Some(value) = value {
                    write!(f, " value:{value}")?;
                }
                Ok(())
            }
            Operation::LowLevelCall {
                lvalue,
                destination,
                kind,
                arguments,
                value,
            } => {
                write!(
                    f,
                    "{}LOW_LEVEL_CALL {destination}.{kind}({})",
                    print_lvalue(lvalue),
                    arguments.iter().join(", ")
                )?;
                if let Some(value) = value {
                    write!(f, " value:{value}")?;
                }
                Ok(())
            }
            Operation::Send {
                lvalue,
                destination,
                value,
            } => write!(f, "{}SEND dest:{destination} value:{value}", print_lvalue(lvalue)),
            Operation::Transfer { destination, value } => {
                write!(f, "TRANSFER dest:{destination} value:{value}")
            }
            Operation::SolidityCall {
                lvalue,
                function,
                arguments,
            } => write!(
                f,
                "{}SOLIDITY_CALL {function}({})",
                print_lvalue(lvalue),
                arguments.iter().join(", ")
            ),
            Operation::EventCall { name, arguments } => {
                write!(f, "Emit {name}({})", arguments.iter().join(", "))
            }
            Operation::Return { values } => write!(f, "RETURN {}", values.iter().join(", ")),
            Operation::Unpack {
                lvalue,
                tuple,
                index,
            } => write!(f, "{lvalue}({}) = UNPACK {tuple} index: {index}", lvalue.ty),
            Operation::Phi { lvalue, rvalues } => {
                write!(f, "{lvalue}({}) := \u{3d5}({})", lvalue.ty, rvalues.iter().join(", "))
            }
            Operation::PhiCallback { lvalue, rvalues } => write!(
                f,
                "{lvalue}({}) := \u{3d5}callback({})",
                lvalue.ty,
                rvalues.iter().join(", ")
            ),
            Operation::Condition { value } => write!(f, "CONDITION {value}"),
            Operation::NewElementaryType { lvalue, ty } => write!(f, "{lvalue} = new {ty}()"),
            Operation::NewContract {
                lvalue,
                contract,
                arguments,
            } => write!(
                f,
                "{lvalue} = new {contract}({})",
                arguments.iter().join(", ")
            ),
            Operation::NewArray {
                lvalue,
                ty,
                arguments,
            } => write!(f, "{lvalue} = new {ty}({})", arguments.iter().join(", ")),
            Operation::NewStructure {
                lvalue,
                structure,
                arguments,
            } => write!(
                f,
                "{lvalue} = new {structure}({})",
                arguments.iter().join(", ")
            ),
            Operation::Delete { lvalue, variable } => write!(f, "{lvalue} = delete {variable}"),
            Operation::Nop => write!(f, "NOP"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    Entry,
    Expression,
    Variable,
    If,
    IfLoop,
    StartLoop,
    EndLoop,
    EndIf,
    Return,
    Throw,
    Placeholder,
    Other,
}

impl NodeType {
    pub fn is_branch(self) -> bool {
        matches!(self, NodeType::If | NodeType::IfLoop)
    }
}

/// A node of a function's control flow graph. For branches, `sons[0]` is
/// the true successor and `sons[1]` the false one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeType,
    pub operations: Vec<Operation>,
    pub sons: Vec<NodeId>,
    pub fathers: Vec<NodeId>,
}

impl Node {
    /// Names of the state variables read by the node.
    pub fn state_variables_read(&self) -> BTreeSet<String> {
        self.operations
            .iter()
            .flat_map(Operation::state_variables_read)
            .collect()
    }

    /// Names of the state variables written by the node.
    pub fn state_variables_written(&self) -> BTreeSet<String> {
        self.operations
            .iter()
            .filter_map(Operation::state_variable_written)
            .collect()
    }

    pub fn condition(&self) -> Option<&Operand> {
        self.operations.iter().find_map(|op| match op {
            Operation::Condition { value } => Some(value),
            _ => None,
        })
    }

    /// True when the branch condition is the logical negation of another
    /// value computed in the same node.
    pub fn has_negated_condition(&self) -> bool {
        let Some(Operand::Variable(cond)) = self.condition() else {
            return false;
        };
        self.operations.iter().any(|op| {
            matches!(op, Operation::Unary { lvalue, op: UnaryOp::Not, .. } if lvalue == cond)
        })
    }
}

impl CfgBlock for Node {
    type Operation = Operation;

    fn operations(&self) -> &[Operation] {
        &self.operations
    }

    fn successors(&self) -> &[usize] {
        &self.sons
    }

    fn predecessors(&self) -> &[usize] {
        &self.fathers
    }
}

/// A function body, the node with index 0 is the entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    pub parameters: Vec<Variable>,
    pub returns: Vec<Type>,
    pub nodes: Vec<Node>,
}

impl Function {
    pub fn new(name: &str, parameters: Vec<Variable>, returns: Vec<Type>) -> Self {
        Self {
            name: name.to_owned(),
            parameters,
            returns,
            nodes: Vec::new(),
        }
    }

    pub fn add_node(&mut self, kind: NodeType, operations: Vec<Operation>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            kind,
            operations,
            sons: Vec::new(),
            fathers: Vec::new(),
        });
        id
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        self.nodes[from].sons.push(to);
        self.nodes[to].fathers.push(from);
        self
    }

    /// Every return operation, in node order, with the node holding it.
    pub fn return_sites(&self) -> Vec<(NodeId, &[Operand])> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.operations.iter().filter_map(move |op| match op {
                    Operation::Return { values } => Some((node.id, values.as_slice())),
                    _ => None,
                })
            })
            .collect()
    }
}

impl ControlFlowGraph for Function {
    type Block = Node;

    fn blocks(&self) -> &[Node] {
        &self.nodes
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateVariable {
    pub variable: Variable,
    pub initial_value: Option<Constant>,
}

/// A contract: its state variables and the functions to analyze.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Program {
    pub state_variables: Vec<StateVariable>,
    pub functions: Vec<Function>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    pub fn add_function(&mut self, function: Function) -> &mut Self {
        self.functions.push(function);
        self
    }

    pub fn add_state_variable(&mut self, variable: Variable, initial_value: Option<Constant>) -> &mut Self {
        self.state_variables.push(StateVariable {
            variable,
            initial_value,
        });
        self
    }
}

pub fn print_function(function: &Function) -> String {
    analysis::cfg::print(function, |op| op.to_string())
}
