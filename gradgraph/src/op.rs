//! The closed set of recorded operations.
//!
//! Every operator that can appear in a graph is one of the variants
//! below. Each kind carries a forward formula and its local partial
//! derivative(s); the chain rule is applied by the scheduler, which
//! multiplies the local partials by the upstream adjoint.
//!
//! | kind     | forward  | ∂/∂x      | ∂/∂y     |
//! |----------|----------|-----------|----------|
//! | `Add`    | x + y    | 1         | 1        |
//! | `Sub`    | x − y    | 1         | −1       |
//! | `Mul`    | x · y    | y         | x        |
//! | `Div`    | x / y    | 1/y       | −x/y²    |
//! | `Neg`    | −x       | −1        |          |
//! | `Recip`  | 1/x      | −1/x²     |          |
//! | `Square` | x²       | 2x        |          |
//! | `Exp`    | eˣ       | eˣ        |          |
//! | `Ln`     | ln x     | 1/x       |          |
//! | `Sqrt`   | √x       | 1/(2√x)   |          |
//! | `Sin`    | sin x    | cos x     |          |
//! | `Cos`    | cos x    | −sin x    |          |

use std::fmt;

use num_traits::Float;

use crate::tape::ValueId;

/// Operations with a single operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Recip,
    Square,
    Exp,
    Ln,
    Sqrt,
    Sin,
    Cos,
}

impl UnaryOp {
    /// Evaluates the operator at `x`.
    pub fn forward<T: Float>(self, x: T) -> T {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Recip => x.recip(),
            UnaryOp::Square => x * x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Ln => x.ln(),
            UnaryOp::Sqrt => x.sqrt(),
            UnaryOp::Sin => x.sin(),
            UnaryOp::Cos => x.cos(),
        }
    }

    /// Local derivative `∂out/∂x`, given the operand `x` and the
    /// already computed result `out = forward(x)`.
    pub fn derivative<T: Float>(self, x: T, out: T) -> T {
        match self {
            UnaryOp::Neg => -T::one(),
            UnaryOp::Recip => -(out * out),
            UnaryOp::Square => x + x,
            UnaryOp::Exp => out,
            UnaryOp::Ln => x.recip(),
            UnaryOp::Sqrt => (out + out).recip(),
            UnaryOp::Sin => x.cos(),
            UnaryOp::Cos => -x.sin(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "Neg",
            UnaryOp::Recip => "Recip",
            UnaryOp::Square => "Square",
            UnaryOp::Exp => "Exp",
            UnaryOp::Ln => "Ln",
            UnaryOp::Sqrt => "Sqrt",
            UnaryOp::Sin => "Sin",
            UnaryOp::Cos => "Cos",
        }
    }
}

/// Operations with two operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// Evaluates the operator at `(x, y)`.
    pub fn forward<T: Float>(self, x: T, y: T) -> T {
        match self {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => x / y,
        }
    }

    /// Local derivatives `(∂out/∂x, ∂out/∂y)` at `(x, y)`.
    pub fn derivatives<T: Float>(self, x: T, y: T) -> (T, T) {
        match self {
            BinaryOp::Add => (T::one(), T::one()),
            BinaryOp::Sub => (T::one(), -T::one()),
            BinaryOp::Mul => (y, x),
            BinaryOp::Div => (y.recip(), -x / (y * y)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::Div => "Div",
        }
    }
}

/// A recorded operation: the kind tag plus the arena indices of its
/// operands.
///
/// Operands always have a smaller index than the value the operation
/// produces, so an `Operation` can only ever point backwards in the
/// arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Unary { op: UnaryOp, arg: ValueId },
    Binary { op: BinaryOp, lhs: ValueId, rhs: ValueId },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Unary { op, .. } => op.name(),
            Operation::Binary { op, .. } => op.name(),
        }
    }

    /// The operand ids, left to right.
    pub fn operands(&self) -> impl Iterator<Item = ValueId> {
        let (first, second) = match *self {
            Operation::Unary { arg, .. } => (arg, None),
            Operation::Binary { lhs, rhs, .. } => (lhs, Some(rhs)),
        };
        std::iter::once(first).chain(second)
    }

    /// Evaluates the operation, reading operand scalars from `values`.
    pub(crate) fn forward<T: Float>(&self, values: &[T]) -> T {
        match *self {
            Operation::Unary { op, arg } => op.forward(values[arg.index()]),
            Operation::Binary { op, lhs, rhs } => {
                op.forward(values[lhs.index()], values[rhs.index()])
            }
        }
    }

    /// Distributes `upstream` (the adjoint of the result) onto the
    /// operands.
    ///
    /// `values` holds the forward scalars and `out` is the scalar this
    /// operation produced.
    pub(crate) fn backward<T: Float>(&self, values: &[T], out: T, upstream: T) -> Partials<T> {
        match *self {
            Operation::Unary { op, arg } => {
                let d = op.derivative(values[arg.index()], out);
                Partials::One(arg, upstream * d)
            }
            Operation::Binary { op, lhs, rhs } => {
                let (dx, dy) = op.derivatives(values[lhs.index()], values[rhs.index()]);
                Partials::Two((lhs, upstream * dx), (rhs, upstream * dy))
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Unary { op, arg } => write!(f, "{}(#{})", op.name(), arg.index()),
            Operation::Binary { op, lhs, rhs } => {
                write!(f, "{}(#{}, #{})", op.name(), lhs.index(), rhs.index())
            }
        }
    }
}

/// Contributions produced by one backward step, one per operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Partials<T> {
    One(ValueId, T),
    Two((ValueId, T), (ValueId, T)),
}

impl<T> Partials<T> {
    pub(crate) fn for_each(self, mut f: impl FnMut(ValueId, T)) {
        match self {
            Partials::One(id, d) => f(id, d),
            Partials::Two((a, da), (b, db)) => {
                f(a, da);
                f(b, db);
            }
        }
    }
}
