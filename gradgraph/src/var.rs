//! Differentiable values and the operators that record them.

use std::cell::RefCell;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use num_traits::Float;

use crate::backward::{PassSummary, Schedule};
use crate::op::{BinaryOp, UnaryOp};
use crate::tape::{Graph, Tape, ValueId};

/// A value recorded in a [`Graph`].
///
/// Every operator applied to a `Var` evaluates its result immediately
/// and records a new node wired to its operands. Operators are
/// implemented for both owned values and references, so shared
/// sub-expressions can be reused without cloning.
///
/// A shared sub-expression feeding two operations:
///
/// ```
/// use gradgraph::Graph;
///
/// let graph = Graph::new();
/// let x = graph.var(1.4);
/// let a = x.square();
/// let y = &a.exp() + &a.square(); // e^(x²) + x⁴
/// y.backward();
///
/// let expected = 2.0 * 1.4 * 1.96_f64.exp() + 4.0 * 1.4_f64.powi(3);
/// assert!((x.grad() - expected).abs() < 1e-12);
/// ```
pub struct Var<T: Float = f64> {
    tape: Rc<RefCell<Tape<T>>>,
    id: ValueId,
}

impl<T: Float> Clone for Var<T> {
    fn clone(&self) -> Self {
        Self {
            tape: Rc::clone(&self.tape),
            id: self.id,
        }
    }
}

impl<T: Float + fmt::Debug> fmt::Debug for Var<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tape = self.tape.borrow();
        f.debug_struct("Var")
            .field("id", &self.id.index())
            .field("value", &tape.vals[self.id.index()])
            .field("grad", &tape.grads[self.id.index()])
            .field("generation", &tape.generations[self.id.index()])
            .finish()
    }
}

impl<T: Float> Var<T> {
    pub(crate) fn from_parts(tape: Rc<RefCell<Tape<T>>>, id: ValueId) -> Self {
        Self { tape, id }
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    /// The graph this value belongs to.
    pub fn graph(&self) -> Graph<T> {
        Graph {
            tape: Rc::clone(&self.tape),
        }
    }

    pub fn value(&self) -> T {
        self.tape.borrow().vals[self.id.index()]
    }

    /// The accumulated gradient. Zero until a backward pass reaches
    /// this value.
    pub fn grad(&self) -> T {
        self.tape.borrow().grads[self.id.index()]
    }

    pub fn generation(&self) -> usize {
        self.tape.borrow().generations[self.id.index()]
    }

    pub fn is_leaf(&self) -> bool {
        self.generation() == 0
    }

    /// Back-propagates from this value with the default schedule.
    ///
    /// Afterwards every value this one depends on holds `∂self/∂value`
    /// in its gradient. Gradients accumulate: a second call adds a
    /// second copy of every derivative. Use [`Graph::zero_grad`] to
    /// start over.
    ///
    /// ```
    /// use gradgraph::Graph;
    ///
    /// let graph = Graph::new();
    /// let x = graph.var(2.0);
    /// let y = &x * &x;
    ///
    /// y.backward();
    /// assert_eq!(x.grad(), 4.0);
    /// y.backward();
    /// assert_eq!(x.grad(), 8.0);
    /// graph.zero_grad();
    /// assert_eq!(x.grad(), 0.0);
    /// ```
    pub fn backward(&self) {
        self.backward_with(Schedule::default());
    }

    /// Back-propagates with an explicit worklist schedule and reports
    /// the order in which operations were visited.
    pub fn backward_with(&self, schedule: Schedule) -> PassSummary {
        self.tape.borrow_mut().backward_from(self.id, schedule)
    }

    pub fn square(&self) -> Self {
        unary(self, UnaryOp::Square)
    }

    pub fn exp(&self) -> Self {
        unary(self, UnaryOp::Exp)
    }

    pub fn recip(&self) -> Self {
        unary(self, UnaryOp::Recip)
    }

    /// NaN for negative values; the graph records it like any other.
    pub fn ln(&self) -> Self {
        unary(self, UnaryOp::Ln)
    }

    pub fn sqrt(&self) -> Self {
        unary(self, UnaryOp::Sqrt)
    }

    pub fn sin(&self) -> Self {
        unary(self, UnaryOp::Sin)
    }

    pub fn cos(&self) -> Self {
        unary(self, UnaryOp::Cos)
    }

    fn constant_on_same_graph(&self, value: T) -> Self {
        let id = self.tape.borrow_mut().push_leaf(value);
        Self::from_parts(Rc::clone(&self.tape), id)
    }
}

fn unary<T: Float>(x: &Var<T>, op: UnaryOp) -> Var<T> {
    let id = x.tape.borrow_mut().push_unary(op, x.id);
    Var::from_parts(Rc::clone(&x.tape), id)
}

fn binary<T: Float>(lhs: &Var<T>, rhs: &Var<T>, op: BinaryOp) -> Var<T> {
    assert!(Rc::ptr_eq(&lhs.tape, &rhs.tape), "Vars must share a graph");
    let id = lhs.tape.borrow_mut().push_binary(op, lhs.id, rhs.id);
    Var::from_parts(Rc::clone(&lhs.tape), id)
}

macro_rules! binary_ops {
    ($($trait:ident, $method:ident, $op:expr;)*) => {$(
        impl<T: Float> $trait for Var<T> {
            type Output = Var<T>;
            fn $method(self, rhs: Self) -> Var<T> {
                binary(&self, &rhs, $op)
            }
        }

        impl<T: Float> $trait<&Var<T>> for Var<T> {
            type Output = Var<T>;
            fn $method(self, rhs: &Var<T>) -> Var<T> {
                binary(&self, rhs, $op)
            }
        }

        impl<T: Float> $trait<Var<T>> for &Var<T> {
            type Output = Var<T>;
            fn $method(self, rhs: Var<T>) -> Var<T> {
                binary(self, &rhs, $op)
            }
        }

        impl<T: Float> $trait<&Var<T>> for &Var<T> {
            type Output = Var<T>;
            fn $method(self, rhs: &Var<T>) -> Var<T> {
                binary(self, rhs, $op)
            }
        }

        impl<T: Float> $trait<T> for Var<T> {
            type Output = Var<T>;
            fn $method(self, c: T) -> Var<T> {
                let c = self.constant_on_same_graph(c);
                binary(&self, &c, $op)
            }
        }

        impl<T: Float> $trait<T> for &Var<T> {
            type Output = Var<T>;
            fn $method(self, c: T) -> Var<T> {
                let c = self.constant_on_same_graph(c);
                binary(self, &c, $op)
            }
        }
    )*};
}

binary_ops! {
    Add, add, BinaryOp::Add;
    Sub, sub, BinaryOp::Sub;
    Mul, mul, BinaryOp::Mul;
    Div, div, BinaryOp::Div;
}

impl<T: Float> Neg for Var<T> {
    type Output = Var<T>;
    fn neg(self) -> Var<T> {
        unary(&self, UnaryOp::Neg)
    }
}

impl<T: Float> Neg for &Var<T> {
    type Output = Var<T>;
    fn neg(self) -> Var<T> {
        unary(self, UnaryOp::Neg)
    }
}

/// Records `f` on a fresh graph at `x`, back-propagates once and
/// returns `(f(x), f'(x))`.
///
/// ```
/// use gradgraph::{reverse_diff, Var};
///
/// // (t + 1)(t - 1) at t = 3
/// let f = |t: Var<f64>| (&t + 1.0) * (&t - 1.0);
/// assert_eq!(reverse_diff(f, 3.0), (8.0, 6.0));
///
/// // t·t - t, the same closure at two points
/// let g = |t: Var<f64>| &t * &t - t;
/// assert_eq!(reverse_diff(g, 2.0), (2.0, 3.0));
/// assert_eq!(reverse_diff(g, 5.0), (20.0, 9.0));
/// ```
pub fn reverse_diff<T, F>(f: F, x: T) -> (T, T)
where
    T: Float,
    F: FnOnce(Var<T>) -> Var<T>,
{
    let graph = Graph::new();
    let var = graph.var(x);
    let result = f(var.clone());
    result.backward();
    (result.value(), var.grad())
}

/// Reverse-mode counterpart of [`gradient`](crate::gradient): one
/// recording and one backward pass give the whole gradient.
///
/// ```
/// use gradgraph::{reverse_gradient, Var};
///
/// // f(p, q) = p/q + q at (1, 2)
/// let (value, grad) = reverse_gradient(|[p, q]: [Var<f64>; 2]| &p / &q + q, [1.0, 2.0]);
/// assert_eq!(value, 2.5);
/// assert_eq!(grad, [0.5, 0.75]);
/// ```
pub fn reverse_gradient<T, F, const N: usize>(f: F, point: [T; N]) -> (T, [T; N])
where
    T: Float,
    F: FnOnce([Var<T>; N]) -> Var<T>,
{
    let graph = Graph::new();
    let inputs: [Var<T>; N] = std::array::from_fn(|i| graph.var(point[i]));
    let result = f(inputs.clone());
    result.backward();
    (result.value(), std::array::from_fn(|i| inputs[i].grad()))
}
