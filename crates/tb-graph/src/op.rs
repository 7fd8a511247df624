use std::fmt;

use tb_tensor::DataType;

/// Elementwise unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation. Signed integers and floats.
    Neg,
    /// Logical negation. Booleans only.
    LogicalNot,
    /// Bitwise complement. Integers only.
    BitNot,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::LogicalNot => "not",
            UnaryOp::BitNot => "bit_not",
        }
    }

    /// Returns true if the operator is defined on elements of `dtype`.
    pub fn accepts(&self, dtype: DataType) -> bool {
        match self {
            UnaryOp::Neg => dtype.is_numeric() && dtype.is_signed(),
            UnaryOp::LogicalNot => dtype == DataType::Bool,
            UnaryOp::BitNot => dtype.is_integer(),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elementwise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Minimum,
    Maximum,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::Minimum => "min",
            BinaryOp::Maximum => "max",
            BinaryOp::BitAnd => "bit_and",
            BinaryOp::BitOr => "bit_or",
            BinaryOp::BitXor => "bit_xor",
            BinaryOp::LogicalAnd => "and",
            BinaryOp::LogicalOr => "or",
            BinaryOp::Equal => "eq",
            BinaryOp::NotEqual => "ne",
            BinaryOp::Less => "lt",
            BinaryOp::LessEqual => "le",
            BinaryOp::Greater => "gt",
            BinaryOp::GreaterEqual => "ge",
        }
    }

    /// Returns true for operators producing a boolean array.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }

    /// Returns true if the operator is defined on operands of `dtype`.
    pub fn accepts(&self, dtype: DataType) -> bool {
        match self {
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Rem
            | BinaryOp::Minimum
            | BinaryOp::Maximum
            | BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual => dtype.is_numeric(),
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                dtype.is_integer() || dtype == DataType::Bool
            }
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => dtype == DataType::Bool,
            BinaryOp::Equal | BinaryOp::NotEqual => dtype.is_valid(),
        }
    }

    /// Element kind of the result for operands of `dtype`.
    pub fn result_dtype(&self, dtype: DataType) -> DataType {
        if self.is_comparison() {
            DataType::Bool
        } else {
            dtype
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transcendental functions provided by the math capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFunction {
    Cos,
    Sin,
    Tanh,
}

impl MathFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MathFunction::Cos => "cos",
            MathFunction::Sin => "sin",
            MathFunction::Tanh => "tanh",
        }
    }
}

impl fmt::Display for MathFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
